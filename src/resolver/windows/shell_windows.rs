//! Open shell windows — matching a top-level window to its browser.
//!
//! The object model differs across shell versions, so the browser is
//! looked up several ways: the desktop has its own entry point, folder
//! windows are found by enumerating `ShellWindows` and comparing window
//! handles, and the `IShellBrowser` itself is reached either directly
//! through the top-level browser service or via the intermediate
//! provider that service returns.

use std::path::PathBuf;

use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::{
    CLSCTX_ALL, CoCreateInstance, IDispatch, IServiceProvider,
};
use windows::Win32::System::Variant::VARIANT;
use windows::Win32::UI::Shell::{
    CSIDL_DESKTOP, IShellBrowser, IShellWindows, IWebBrowser2, SWC_DESKTOP,
    SWFO_NEEDDISPATCH, ShellWindows,
};
use windows::core::{GUID, Interface};

use crate::resolver::StrategyError;
use crate::resolver::location::location_to_path;

/// `SID_STopLevelBrowser`.
const SID_TOP_LEVEL_BROWSER: GUID = GUID::from_u128(0x4c96be40_915c_11cf_99d3_00aa004ae837);

/// Window classes that belong to the desktop rather than a folder window.
const DESKTOP_CLASSES: [&str; 2] = ["Progman", "WorkerW"];

fn shell_windows() -> Result<IShellWindows, StrategyError> {
    unsafe { CoCreateInstance(&ShellWindows, None, CLSCTX_ALL) }
        .map_err(|e| StrategyError::Unavailable(format!("ShellWindows: {e}")))
}

/// Find the shell window whose top-level handle is `hwnd`.
fn find_folder_window(windows: &IShellWindows, hwnd: HWND) -> Result<IDispatch, StrategyError> {
    let count = unsafe { windows.Count() }?;
    for index in 0..count {
        let Ok(dispatch) = (unsafe { windows.Item(&VARIANT::from(index)) }) else {
            continue;
        };
        let Ok(browser) = dispatch.cast::<IWebBrowser2>() else {
            continue;
        };
        match unsafe { browser.HWND() } {
            Ok(handle) if handle.0 == hwnd.0 as isize => return Ok(dispatch),
            _ => continue,
        }
    }
    Err(StrategyError::Unavailable(format!(
        "no shell window among {count} matches 0x{:X}",
        hwnd.0 as usize
    )))
}

/// The desktop's automation object.
fn desktop_window(windows: &IShellWindows) -> Result<IDispatch, StrategyError> {
    let location = VARIANT::from(CSIDL_DESKTOP as i32);
    let root = VARIANT::default();
    let mut handle = 0i32;
    let dispatch = unsafe {
        windows.FindWindowSW(&location, &root, SWC_DESKTOP, &mut handle, SWFO_NEEDDISPATCH)
    }?;
    Ok(dispatch)
}

/// Current folder shown by a folder window, as a filesystem path.
pub fn current_folder(hwnd: HWND) -> Result<PathBuf, StrategyError> {
    let windows = shell_windows()?;
    let dispatch = find_folder_window(&windows, hwnd)?;
    let browser: IWebBrowser2 = dispatch.cast()?;
    let url = unsafe { browser.LocationURL() }?.to_string();
    location_to_path(&url)
        .map(PathBuf::from)
        .ok_or_else(|| StrategyError::Unavailable(format!("location {url:?} is not a folder")))
}

/// Resolve the `IShellBrowser` behind a top-level window.
pub fn shell_browser(hwnd: HWND, class: &str) -> Result<IShellBrowser, StrategyError> {
    let windows = shell_windows()?;
    let dispatch = if DESKTOP_CLASSES.contains(&class) {
        desktop_window(&windows)?
    } else {
        find_folder_window(&windows, hwnd)?
    };
    browser_from_dispatch(&dispatch)
}

fn browser_from_dispatch(dispatch: &IDispatch) -> Result<IShellBrowser, StrategyError> {
    let provider: IServiceProvider = dispatch.cast()?;

    match unsafe { provider.QueryService::<IShellBrowser>(&SID_TOP_LEVEL_BROWSER) } {
        Ok(browser) => return Ok(browser),
        Err(e) => tracing::debug!(error = %e, "direct browser query failed, trying provider"),
    }

    let intermediate: IServiceProvider =
        unsafe { provider.QueryService(&SID_TOP_LEVEL_BROWSER) }?;
    let browser = unsafe { intermediate.QueryService::<IShellBrowser>(&IShellBrowser::IID) }?;
    Ok(browser)
}
