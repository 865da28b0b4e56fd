//! UI Automation strategy — focused or selected list item to path.
//!
//! Best-effort: the element layout inside the file manager changes
//! between releases, so every miss falls through to the shell view.

use std::cell::OnceCell;
use std::path::PathBuf;

use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::{CLSCTX_INPROC_SERVER, CoCreateInstance};
use windows::Win32::System::Variant::VARIANT;
use windows::Win32::UI::Accessibility::{
    CUIAutomation, IUIAutomation, IUIAutomationElement, IUIAutomationValuePattern,
    TreeScope_Descendants, UIA_SelectionItemIsSelectedPropertyId, UIA_ValuePatternId,
};
use windows::Win32::UI::WindowsAndMessaging::GetWindowThreadProcessId;
use windows::core::Interface;

use super::shell_windows;
use crate::desktop::WindowHandle;
use crate::desktop::windows::hwnd;
use crate::resolver::location::{join_display_name, looks_absolute};
use crate::resolver::{SelectionStrategy, StrategyError};

/// Finds one candidate element below the window's root element.
type Finder = fn(&IUIAutomation, &IUIAutomationElement, HWND) -> Result<IUIAutomationElement, StrategyError>;

/// Reads the focused or first selected item through UI Automation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutomationStrategy;

impl SelectionStrategy for AutomationStrategy {
    fn name(&self) -> &'static str {
        "automation"
    }

    fn candidate(&self, window: WindowHandle) -> Result<PathBuf, StrategyError> {
        let hwnd = hwnd(window);
        let automation: IUIAutomation =
            unsafe { CoCreateInstance(&CUIAutomation, None, CLSCTX_INPROC_SERVER) }?;
        let root = unsafe { automation.ElementFromHandle(hwnd) }?;

        // Folder lookup is shared by both candidates and only done on demand.
        let folder = OnceCell::new();

        let candidates: [(&str, Finder); 2] = [
            ("focused", focused_element),
            ("selected", selected_descendant),
        ];

        for (source, find) in candidates {
            let element = match find(&automation, &root, hwnd) {
                Ok(element) => element,
                Err(e) => {
                    tracing::debug!(source, error = %e, "no automation candidate");
                    continue;
                }
            };
            match element_path(&element, hwnd, &folder) {
                Ok(path) => return Ok(path),
                Err(e) => tracing::debug!(source, error = %e, "automation candidate unusable"),
            }
        }

        Err(StrategyError::NothingSelected)
    }
}

/// The element with keyboard focus, if it belongs to the window's process.
fn focused_element(
    automation: &IUIAutomation,
    _root: &IUIAutomationElement,
    hwnd: HWND,
) -> Result<IUIAutomationElement, StrategyError> {
    let element = unsafe { automation.GetFocusedElement() }?;

    let mut window_pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut window_pid)) };
    let element_pid = unsafe { element.CurrentProcessId() }?;
    if element_pid as u32 != window_pid {
        return Err(StrategyError::Unavailable(
            "focused element belongs to another process".into(),
        ));
    }
    Ok(element)
}

/// First descendant whose selection-item state is "selected".
fn selected_descendant(
    automation: &IUIAutomation,
    root: &IUIAutomationElement,
    _hwnd: HWND,
) -> Result<IUIAutomationElement, StrategyError> {
    let condition = unsafe {
        automation.CreatePropertyCondition(
            UIA_SelectionItemIsSelectedPropertyId,
            &VARIANT::from(true),
        )
    }?;
    unsafe { root.FindFirst(TreeScope_Descendants, &condition) }
        .map_err(|_| StrategyError::NothingSelected)
}

/// Extract a filesystem path from a candidate element.
///
/// A value that already is an existing absolute path wins; otherwise the
/// display name is joined onto the window's current folder.
fn element_path(
    element: &IUIAutomationElement,
    hwnd: HWND,
    folder: &OnceCell<Result<PathBuf, StrategyError>>,
) -> Result<PathBuf, StrategyError> {
    if let Some(value) = value_of(element)
        && looks_absolute(&value)
    {
        let path = PathBuf::from(value.trim());
        if path.exists() {
            return Ok(path);
        }
    }

    let name = unsafe { element.CurrentName() }?.to_string();
    if name.trim().is_empty() {
        return Err(StrategyError::NoPath);
    }

    let folder = folder
        .get_or_init(|| shell_windows::current_folder(hwnd))
        .clone()?;
    join_display_name(&folder, &name).ok_or_else(|| StrategyError::Missing(folder.join(&name)))
}

fn value_of(element: &IUIAutomationElement) -> Option<String> {
    let pattern = unsafe { element.GetCurrentPattern(UIA_ValuePatternId) }.ok()?;
    let value = pattern.cast::<IUIAutomationValuePattern>().ok()?;
    let text = unsafe { value.CurrentValue() }.ok()?.to_string();
    (!text.is_empty()).then_some(text)
}
