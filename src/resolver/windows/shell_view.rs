//! Shell view strategy — the active folder view's own selection.
//!
//! Authoritative for both folder windows and the desktop. Prefers the
//! typed item-array query and falls back to the dropped-file list of the
//! selection data object when the view does not implement it.

use std::path::PathBuf;

use windows::Win32::Foundation::FALSE;
use windows::Win32::System::Com::{
    CoTaskMemFree, DVASPECT_CONTENT, FORMATETC, IDataObject, TYMED_HGLOBAL,
};
use windows::Win32::System::Ole::{CF_HDROP, ReleaseStgMedium};
use windows::Win32::UI::Shell::{
    DragQueryFileW, HDROP, IFolderView2, IShellView, SIGDN_FILESYSPATH, SVGIO_SELECTION,
};
use windows::core::Interface;

use super::shell_windows::shell_browser;
use crate::desktop::WindowHandle;
use crate::desktop::windows::{class_name, hwnd};
use crate::resolver::{SelectionStrategy, StrategyError};

/// Reads the selection from the window's active `IShellView`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellViewStrategy;

impl SelectionStrategy for ShellViewStrategy {
    fn name(&self) -> &'static str {
        "shell-view"
    }

    fn candidate(&self, window: WindowHandle) -> Result<PathBuf, StrategyError> {
        let hwnd = hwnd(window);
        let class = class_name(hwnd).unwrap_or_default();
        let browser = shell_browser(hwnd, &class)?;
        let view = unsafe { browser.QueryActiveShellView() }?;

        match typed_selection(&view) {
            Ok(path) => Ok(path),
            Err(StrategyError::NothingSelected) => Err(StrategyError::NothingSelected),
            Err(e) => {
                tracing::debug!(error = %e, "typed selection failed, trying data object");
                data_object_selection(&view)
            }
        }
    }
}

/// First selected item's filesystem path through `IFolderView2`.
fn typed_selection(view: &IShellView) -> Result<PathBuf, StrategyError> {
    let folder_view: IFolderView2 = view.cast()?;
    let items = unsafe { folder_view.GetSelection(FALSE) }?;
    if unsafe { items.GetCount() }? == 0 {
        return Err(StrategyError::NothingSelected);
    }
    let item = unsafe { items.GetItemAt(0) }?;

    let raw = unsafe { item.GetDisplayName(SIGDN_FILESYSPATH) }?;
    let name = unsafe { raw.to_string() };
    unsafe { CoTaskMemFree(Some(raw.0 as *const _)) };

    let name = name.map_err(|_| StrategyError::NoPath)?;
    if name.is_empty() {
        return Err(StrategyError::NoPath);
    }
    Ok(PathBuf::from(name))
}

/// First entry of the selection's `CF_HDROP` file list.
fn data_object_selection(view: &IShellView) -> Result<PathBuf, StrategyError> {
    let data: IDataObject = unsafe { view.GetItemObject(SVGIO_SELECTION.0 as u32) }?;

    let format = FORMATETC {
        cfFormat: CF_HDROP.0,
        ptd: std::ptr::null_mut(),
        dwAspect: DVASPECT_CONTENT.0,
        lindex: -1,
        tymed: TYMED_HGLOBAL.0 as u32,
    };
    let mut medium = unsafe { data.GetData(&format) }?;

    let hdrop = HDROP(unsafe { medium.u.hGlobal.0 });
    let count = unsafe { DragQueryFileW(hdrop, u32::MAX, None) };
    let path = if count == 0 {
        Err(StrategyError::NothingSelected)
    } else {
        let len = unsafe { DragQueryFileW(hdrop, 0, None) } as usize;
        let mut buf = vec![0u16; len + 1];
        let copied = unsafe { DragQueryFileW(hdrop, 0, Some(&mut buf)) } as usize;
        match String::from_utf16(&buf[..copied]) {
            Ok(name) if !name.is_empty() => Ok(PathBuf::from(name)),
            _ => Err(StrategyError::NoPath),
        }
    };

    unsafe { ReleaseStgMedium(&mut medium) };
    path
}
