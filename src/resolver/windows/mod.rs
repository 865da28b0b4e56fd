//! Windows selection strategies — UI Automation and the shell view.
//!
//! Both strategies create their COM objects per call on the calling
//! thread, which must have entered an apartment via [`ComApartment`].

mod automation;
mod shell_view;
mod shell_windows;

pub use automation::AutomationStrategy;
pub use shell_view::ShellViewStrategy;

use windows::Win32::System::Com::{COINIT_APARTMENTTHREADED, CoInitializeEx, CoUninitialize};

use super::StrategyError;

impl From<windows::core::Error> for StrategyError {
    fn from(e: windows::core::Error) -> Self {
        StrategyError::Platform(format!("{e} (0x{:08X})", e.code().0))
    }
}

/// COM apartment membership for the current thread.
///
/// Entered once by the hook thread before any strategy runs; leaving is
/// tied to drop so an early return cannot skip `CoUninitialize`.
pub struct ComApartment {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComApartment {
    /// Enter a single-threaded apartment.
    pub fn enter() -> windows::core::Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok()?;
        Ok(Self {
            _not_send: std::marker::PhantomData,
        })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}
