//! Win32 desktop adapter — foreground window, class names, focus.

use std::ffi::c_void;

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{
    GUITHREADINFO, GetClassNameW, GetForegroundWindow, GetGUIThreadInfo,
    GetWindowThreadProcessId,
};

use super::{DesktopProbe, WindowHandle};

/// Live desktop backed by `user32`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Desktop;

impl DesktopProbe for Win32Desktop {
    fn foreground_window(&self) -> Option<WindowHandle> {
        let hwnd = unsafe { GetForegroundWindow() };
        (!hwnd.is_invalid()).then(|| handle(hwnd))
    }

    fn class_name(&self, window: WindowHandle) -> Option<String> {
        class_name(hwnd(window))
    }

    /// `GetFocus` only answers for the calling thread's queue, so the
    /// focus is read from the foreground window's GUI thread instead.
    fn focused_control(&self, window: WindowHandle) -> Option<WindowHandle> {
        let thread_id = unsafe { GetWindowThreadProcessId(hwnd(window), None) };
        if thread_id == 0 {
            return None;
        }
        let mut info = GUITHREADINFO {
            cbSize: std::mem::size_of::<GUITHREADINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetGUIThreadInfo(thread_id, &mut info) }.ok()?;
        (!info.hwndFocus.is_invalid()).then(|| handle(info.hwndFocus))
    }
}

/// Convert a portable handle back to an `HWND`.
pub fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

/// Convert an `HWND` into a portable handle.
pub fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

/// Registered class name of a window, `None` if the call fails.
pub fn class_name(hwnd: HWND) -> Option<String> {
    let mut buf = [0u16; 256];
    let len = unsafe { GetClassNameW(hwnd, &mut buf) };
    if len <= 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&buf[..len as usize]))
}
