//! Desktop window queries — the seam between the trigger gate and the OS.
//!
//! The gate and the resolver only ever see [`WindowHandle`] values and
//! class-name strings. The Win32 adapter lives in `windows.rs`; tests
//! substitute a scripted [`DesktopProbe`].

#[cfg(windows)]
pub mod windows;

/// An opaque top-level or child window handle.
///
/// Stored as an integer so it can cross threads; platform adapters
/// convert back to their native handle type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// Read-only window queries needed by the trigger gate.
pub trait DesktopProbe {
    /// The window currently receiving user input, if any.
    fn foreground_window(&self) -> Option<WindowHandle>;

    /// The registered window class of `window`.
    fn class_name(&self, window: WindowHandle) -> Option<String>;

    /// The control holding keyboard focus inside `window`'s GUI thread.
    fn focused_control(&self, window: WindowHandle) -> Option<WindowHandle>;
}
