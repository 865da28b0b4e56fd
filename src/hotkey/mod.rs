//! Trigger gate — global key hook with guard conditions.
//!
//! A low-level keyboard hook reports presses of the trigger key. Each
//! press passes three guards before the registered handler runs:
//!
//! - A: the foreground window belongs to the file manager or desktop.
//! - B: keyboard focus is not in a text-entry control.
//! - C: no previous trigger is still in flight.
//!
//! Presses that fail a guard are ignored; presses arriving during a
//! flight are dropped, never queued. The hook always forwards the key to
//! the next hook in the chain, so the file manager still sees it.

pub mod key;
#[cfg(windows)]
mod windows;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::desktop::{DesktopProbe, WindowHandle};
use crate::lifecycle::ExitSignal;

pub use key::TriggerKey;

/// Foreground classes owned by the file manager: folder windows and the
/// desktop's two host windows.
pub const FILE_MANAGER_CLASSES: [&str; 4] = ["CabinetWClass", "ExploreWClass", "Progman", "WorkerW"];

/// Focused classes that take text input. Any class containing `Edit`
/// also counts, which catches embedded and versioned variants.
pub const TEXT_INPUT_CLASSES: [&str; 5] =
    ["Edit", "RichEdit", "RichEdit20A", "RichEdit20W", "RICHEDIT50W"];

/// Trigger gate errors.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("global key hooks are only supported on Windows")]
    Unsupported,
    #[error("hook install failed: {0}")]
    Install(String),
    #[error("hook thread: {0}")]
    Thread(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whether a foreground window class belongs to the file manager.
pub fn is_file_manager_class(class: &str) -> bool {
    FILE_MANAGER_CLASSES.contains(&class)
}

/// Whether a focused control class takes text input.
pub fn is_text_input_class(class: &str) -> bool {
    TEXT_INPUT_CLASSES
        .iter()
        .any(|known| class.eq_ignore_ascii_case(known))
        || class.contains("Edit")
}

/// Work run when a trigger passes every guard.
pub trait TriggerHandler {
    type Outcome;

    fn on_trigger(&self, window: WindowHandle) -> Self::Outcome;
}

impl<F, O> TriggerHandler for F
where
    F: Fn(WindowHandle) -> O,
{
    type Outcome = O;

    fn on_trigger(&self, window: WindowHandle) -> O {
        self(window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    PreviewInFlight,
}

/// Which guard turned a press away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoForegroundWindow,
    NotFileManager,
    TextInputFocused,
}

/// Result of offering one key press to the gate.
#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision<O> {
    /// Guard A or B rejected the press.
    Ignored(IgnoreReason),
    /// Guard C: a trigger was already in flight.
    Dropped,
    /// The handler ran and produced this outcome.
    Fired(O),
}

/// Guarded dispatch from key presses to a [`TriggerHandler`].
pub struct TriggerGate<D, H> {
    desktop: D,
    handler: H,
    in_flight: AtomicBool,
}

impl<D: DesktopProbe, H: TriggerHandler> TriggerGate<D, H> {
    pub fn new(desktop: D, handler: H) -> Self {
        Self {
            desktop,
            handler,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> GateState {
        if self.in_flight.load(Ordering::Acquire) {
            GateState::PreviewInFlight
        } else {
            GateState::Idle
        }
    }

    /// Offer one trigger-key press to the gate.
    ///
    /// Runs the handler synchronously when all guards pass. The gate is
    /// back to [`GateState::Idle`] when this returns, including when the
    /// handler unwinds.
    pub fn on_key_down(&self) -> GateDecision<H::Outcome> {
        let Some(window) = self.desktop.foreground_window() else {
            return GateDecision::Ignored(IgnoreReason::NoForegroundWindow);
        };

        let class = self.desktop.class_name(window).unwrap_or_default();
        if !is_file_manager_class(&class) {
            return GateDecision::Ignored(IgnoreReason::NotFileManager);
        }

        if let Some(focus) = self.desktop.focused_control(window)
            && let Some(focus_class) = self.desktop.class_name(focus)
            && is_text_input_class(&focus_class)
        {
            return GateDecision::Ignored(IgnoreReason::TextInputFocused);
        }

        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            tracing::trace!(state = ?self.state(), "in-flight flag held");
            return GateDecision::Dropped;
        };

        tracing::debug!(window = window.0, %class, "trigger accepted");
        GateDecision::Fired(self.handler.on_trigger(window))
    }
}

/// Holds the in-flight flag; releases it on drop.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Log a gate decision at the level it deserves.
pub fn log_decision<O: fmt::Debug>(decision: &GateDecision<O>) {
    match decision {
        GateDecision::Ignored(reason) => tracing::trace!(?reason, "trigger ignored"),
        GateDecision::Dropped => tracing::debug!("trigger dropped, preview already in flight"),
        GateDecision::Fired(outcome) => tracing::debug!(?outcome, "trigger handled"),
    }
}

/// Run the trigger gate.
///
/// Installs the global hook on a dedicated thread, then waits for the
/// exit signal or Ctrl+C. The hook is removed before this returns.
pub async fn run<H>(key: TriggerKey, handler: H, exit: ExitSignal) -> Result<(), HookError>
where
    H: TriggerHandler + Send + 'static,
    H::Outcome: fmt::Debug,
{
    #[cfg(windows)]
    {
        windows::run(key, handler, exit).await
    }
    #[cfg(not(windows))]
    {
        let _ = (key, handler, exit);
        Err(HookError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    const EXPLORER: WindowHandle = WindowHandle(0x100);
    const LIST_VIEW: WindowHandle = WindowHandle(0x101);
    const RENAME_BOX: WindowHandle = WindowHandle(0x102);
    const BROWSER: WindowHandle = WindowHandle(0x200);

    /// Scripted desktop: a foreground window, its focus, and class names.
    struct FakeDesktop {
        foreground: Option<WindowHandle>,
        focus: Option<WindowHandle>,
        classes: HashMap<isize, &'static str>,
    }

    impl FakeDesktop {
        fn new(foreground: Option<WindowHandle>, focus: Option<WindowHandle>) -> Self {
            let classes = HashMap::from([
                (EXPLORER.0, "CabinetWClass"),
                (LIST_VIEW.0, "DirectUIHWND"),
                (RENAME_BOX.0, "Edit"),
                (BROWSER.0, "Chrome_WidgetWin_1"),
            ]);
            Self {
                foreground,
                focus,
                classes,
            }
        }

        fn with_class(mut self, window: WindowHandle, class: &'static str) -> Self {
            self.classes.insert(window.0, class);
            self
        }
    }

    impl DesktopProbe for FakeDesktop {
        fn foreground_window(&self) -> Option<WindowHandle> {
            self.foreground
        }

        fn class_name(&self, window: WindowHandle) -> Option<String> {
            self.classes.get(&window.0).map(|c| c.to_string())
        }

        fn focused_control(&self, _window: WindowHandle) -> Option<WindowHandle> {
            self.focus
        }
    }

    fn counting() -> (impl Fn(WindowHandle) -> WindowHandle, std::sync::Arc<AtomicUsize>) {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&calls);
        let handler = move |window| {
            counter.fetch_add(1, Ordering::SeqCst);
            window
        };
        (handler, calls)
    }

    #[test]
    fn fires_in_file_manager() {
        let (handler, calls) = counting();
        let gate = TriggerGate::new(FakeDesktop::new(Some(EXPLORER), Some(LIST_VIEW)), handler);
        assert_eq!(gate.on_key_down(), GateDecision::Fired(EXPLORER));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fires_on_desktop_classes() {
        for class in ["Progman", "WorkerW", "ExploreWClass"] {
            let (handler, calls) = counting();
            let desktop = FakeDesktop::new(Some(EXPLORER), None).with_class(EXPLORER, class);
            let gate = TriggerGate::new(desktop, handler);
            assert_eq!(gate.on_key_down(), GateDecision::Fired(EXPLORER), "{class}");
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn other_applications_are_ignored() {
        let (handler, calls) = counting();
        let gate = TriggerGate::new(FakeDesktop::new(Some(BROWSER), None), handler);
        assert_eq!(
            gate.on_key_down(),
            GateDecision::Ignored(IgnoreReason::NotFileManager)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_foreground_is_ignored() {
        let (handler, calls) = counting();
        let gate = TriggerGate::new(FakeDesktop::new(None, None), handler);
        assert_eq!(
            gate.on_key_down(),
            GateDecision::Ignored(IgnoreReason::NoForegroundWindow)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unnamed_foreground_class_is_ignored() {
        let (handler, calls) = counting();
        let gate = TriggerGate::new(
            FakeDesktop::new(Some(WindowHandle(0x999)), None),
            handler,
        );
        assert_eq!(
            gate.on_key_down(),
            GateDecision::Ignored(IgnoreReason::NotFileManager)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn text_input_focus_is_ignored() {
        let (handler, calls) = counting();
        let gate = TriggerGate::new(FakeDesktop::new(Some(EXPLORER), Some(RENAME_BOX)), handler);
        assert_eq!(
            gate.on_key_down(),
            GateDecision::Ignored(IgnoreReason::TextInputFocused)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn embedded_edit_variants_are_ignored() {
        for class in ["RichEdit20W", "RICHEDIT50W", "SearchEditBox", "TEditControl"] {
            let (handler, calls) = counting();
            let desktop =
                FakeDesktop::new(Some(EXPLORER), Some(RENAME_BOX)).with_class(RENAME_BOX, class);
            let gate = TriggerGate::new(desktop, handler);
            assert_eq!(
                gate.on_key_down(),
                GateDecision::Ignored(IgnoreReason::TextInputFocused),
                "{class}"
            );
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn class_predicates() {
        assert!(is_file_manager_class("CabinetWClass"));
        assert!(!is_file_manager_class("cabinetwclass"));
        assert!(!is_file_manager_class("Notepad"));
        assert!(is_text_input_class("Edit"));
        assert!(is_text_input_class("RichEdit"));
        assert!(is_text_input_class("richedit20a"));
        assert!(!is_text_input_class("DirectUIHWND"));
        assert!(!is_text_input_class("SysListView32"));
    }

    #[test]
    fn press_during_flight_is_dropped() {
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let calls = AtomicUsize::new(0);
        let release_rx = std::sync::Mutex::new(release_rx);

        let handler = |window: WindowHandle| {
            calls.fetch_add(1, Ordering::SeqCst);
            entered_tx.send(()).unwrap();
            release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .unwrap();
            window
        };
        let gate = TriggerGate::new(FakeDesktop::new(Some(EXPLORER), None), handler);

        std::thread::scope(|s| {
            let first = s.spawn(|| gate.on_key_down());

            entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(gate.state(), GateState::PreviewInFlight);
            assert_eq!(gate.on_key_down(), GateDecision::Dropped);
            assert_eq!(gate.on_key_down(), GateDecision::Dropped);

            release_tx.send(()).unwrap();
            assert_eq!(first.join().unwrap(), GateDecision::Fired(EXPLORER));
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn state_returns_to_idle_after_each_trigger() {
        let (handler, calls) = counting();
        let gate = TriggerGate::new(FakeDesktop::new(Some(EXPLORER), None), handler);
        assert_eq!(gate.state(), GateState::Idle);
        gate.on_key_down();
        assert_eq!(gate.state(), GateState::Idle);
        gate.on_key_down();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn state_returns_to_idle_after_unwind() {
        let handler = |_: WindowHandle| -> () { panic!("handler failed") };
        let gate = TriggerGate::new(FakeDesktop::new(Some(EXPLORER), None), handler);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| gate.on_key_down()));
        assert!(result.is_err());
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn run_is_unsupported_off_windows() {
        let result = run(TriggerKey::default(), |_: WindowHandle| (), ExitSignal::new()).await;
        assert!(matches!(result, Err(HookError::Unsupported)));
    }
}
