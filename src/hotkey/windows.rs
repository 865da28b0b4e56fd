//! Win32 keyboard hook — `WH_KEYBOARD_LL` on a dedicated message-loop thread.
//!
//! A low-level hook is called on the thread that installed it, and only
//! while that thread pumps messages. The hook thread therefore owns the
//! COM apartment, the gate and the message loop; the async side only
//! learns its thread id so it can post `WM_QUIT` at shutdown.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::thread::JoinHandle;

use tokio::sync::oneshot;
use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, HHOOK, KBDLLHOOKSTRUCT, LLKHF_INJECTED, MSG,
    PostThreadMessageW, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, WH_KEYBOARD_LL,
    WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYUP,
};
use windows::core::PCWSTR;

use super::key::{RepeatFilter, TriggerKey};
use super::{HookError, TriggerGate, TriggerHandler, log_decision};
use crate::desktop::windows::Win32Desktop;
use crate::lifecycle::ExitSignal;
use crate::resolver::windows::ComApartment;

/// Per-thread hook registration read by [`keyboard_proc`].
struct HookSlot {
    hook: HHOOK,
    key: TriggerKey,
    repeat: RepeatFilter,
    on_key: Rc<dyn Fn()>,
}

thread_local! {
    static SLOT: RefCell<Option<HookSlot>> = const { RefCell::new(None) };
}

/// An installed low-level keyboard hook. Removed on drop.
pub struct KeyboardHook {
    hook: HHOOK,
    _not_send: PhantomData<*const ()>,
}

impl KeyboardHook {
    /// Install the hook on the current thread.
    ///
    /// `on_key` runs for each fresh press of `key`, outside any borrow of
    /// the hook slot, so it may pump messages and re-enter the hook.
    pub fn install(key: TriggerKey, on_key: Rc<dyn Fn()>) -> Result<Self, HookError> {
        let module = unsafe { GetModuleHandleW(PCWSTR::null()) }
            .map_err(|e| HookError::Install(format!("GetModuleHandleW: {e}")))?;
        let instance: HINSTANCE = module.into();
        let hook = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), instance, 0) }
            .map_err(|e| HookError::Install(format!("SetWindowsHookExW: {e}")))?;

        tracing::info!(%key, hook = format_args!("0x{:X}", hook.0 as usize), "keyboard hook installed");

        SLOT.with(|slot| {
            *slot.borrow_mut() = Some(HookSlot {
                hook,
                key,
                repeat: RepeatFilter::default(),
                on_key,
            });
        });

        Ok(Self {
            hook,
            _not_send: PhantomData,
        })
    }
}

impl Drop for KeyboardHook {
    fn drop(&mut self) {
        SLOT.with(|slot| slot.borrow_mut().take());
        if let Err(e) = unsafe { UnhookWindowsHookEx(self.hook) } {
            tracing::warn!(error = %e, "UnhookWindowsHookEx failed");
        } else {
            tracing::info!("keyboard hook removed");
        }
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    // Negative codes must be passed through untouched.
    if code >= 0
        && let Some(on_key) = fresh_press(wparam, lparam)
    {
        on_key();
    }

    let hook = SLOT
        .with(|slot| slot.borrow().as_ref().map(|s| s.hook))
        .unwrap_or_default();
    unsafe { CallNextHookEx(hook, code, wparam, lparam) }
}

/// The press callback if this event is a fresh, physical press of the
/// trigger key. Key-ups re-arm the repeat filter.
fn fresh_press(wparam: WPARAM, lparam: LPARAM) -> Option<Rc<dyn Fn()>> {
    let event = unsafe { &*(lparam.0 as *const KBDLLHOOKSTRUCT) };
    if event.flags.0 & LLKHF_INJECTED.0 != 0 {
        return None;
    }

    SLOT.with(|slot| {
        let slot = slot.borrow();
        let slot = slot.as_ref()?;
        if event.vkCode != slot.key.code() {
            return None;
        }
        match wparam.0 as u32 {
            WM_KEYDOWN => slot.repeat.key_down().then(|| Rc::clone(&slot.on_key)),
            WM_KEYUP | WM_SYSKEYUP => {
                slot.repeat.key_up();
                None
            }
            _ => None,
        }
    })
}

/// Pump messages until `WM_QUIT`.
fn run_message_loop() {
    let mut msg = MSG::default();
    while unsafe { GetMessageW(&mut msg, None, 0, 0) }.0 > 0 {
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// Ask the hook thread's message loop to finish.
fn post_quit(thread_id: u32) {
    if let Err(e) = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
        tracing::warn!(thread_id, error = %e, "failed to post WM_QUIT to hook thread");
    }
}

/// Spawn the hook thread and report its id once the hook is live.
fn spawn_hook_thread<H>(
    key: TriggerKey,
    handler: H,
    ready: oneshot::Sender<Result<u32, HookError>>,
) -> Result<JoinHandle<()>, HookError>
where
    H: TriggerHandler + Send + 'static,
    H::Outcome: fmt::Debug,
{
    let thread = std::thread::Builder::new()
        .name("keyboard-hook".into())
        .spawn(move || {
            let _apartment = match ComApartment::enter() {
                Ok(apartment) => apartment,
                Err(e) => {
                    let _ = ready.send(Err(HookError::Install(format!("COM init: {e}"))));
                    return;
                }
            };

            let gate = Rc::new(TriggerGate::new(Win32Desktop, handler));
            let on_key: Rc<dyn Fn()> = {
                let gate = Rc::clone(&gate);
                Rc::new(move || log_decision(&gate.on_key_down()))
            };

            let hook = match KeyboardHook::install(key, on_key) {
                Ok(hook) => hook,
                Err(e) => {
                    let _ = ready.send(Err(e));
                    return;
                }
            };

            let _ = ready.send(Ok(unsafe { GetCurrentThreadId() }));
            run_message_loop();
            drop(hook);
            tracing::debug!("hook thread exiting");
        })?;
    Ok(thread)
}

pub async fn run<H>(key: TriggerKey, handler: H, exit: ExitSignal) -> Result<(), HookError>
where
    H: TriggerHandler + Send + 'static,
    H::Outcome: fmt::Debug,
{
    let (ready_tx, ready_rx) = oneshot::channel();
    let thread = spawn_hook_thread(key, handler, ready_tx)?;

    let thread_id = match ready_rx.await {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            let _ = thread.join();
            return Err(e);
        }
        Err(_) => {
            let _ = thread.join();
            return Err(HookError::Thread("hook thread exited during startup".into()));
        }
    };

    tracing::info!("trigger gate running, press Ctrl+C to stop");

    tokio::select! {
        _ = exit.triggered() => tracing::info!("exit requested"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "ctrl-c handler failed");
            }
            tracing::info!("received Ctrl+C, shutting down");
            exit.trigger();
        }
    }

    post_quit(thread_id);
    tokio::task::spawn_blocking(move || thread.join())
        .await
        .map_err(|e| HookError::Thread(e.to_string()))?
        .map_err(|_| HookError::Thread("hook thread panicked".into()))?;

    tracing::info!("trigger gate stopped");
    Ok(())
}
