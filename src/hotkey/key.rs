//! Trigger key — "Space" → virtual-key code, plus auto-repeat filtering.
//!
//! The trigger is a single bare key. Modifiers are not part of the
//! binding: the file manager itself gives modified presses their own
//! meaning, and the guards already restrict where the key fires.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

/// `VK_SPACE`.
const VK_SPACE: u32 = 0x20;
/// `VK_RETURN`.
const VK_RETURN: u32 = 0x0D;
/// `VK_F1`; F2..F12 follow contiguously.
const VK_F1: u32 = 0x70;

/// A key name that does not map to a virtual-key code.
#[derive(Debug, thiserror::Error)]
#[error("unknown trigger key: {0:?} (expected Space, Enter, F1-F12, a letter or a digit)")]
pub struct UnknownKey(pub String);

/// A parsed trigger key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerKey {
    /// Platform virtual-key code.
    code: u32,
    /// Original user-provided name, for logging.
    raw: String,
}

impl TriggerKey {
    pub fn code(&self) -> u32 {
        self.code
    }
}

impl Default for TriggerKey {
    fn default() -> Self {
        Self {
            code: VK_SPACE,
            raw: "Space".into(),
        }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TriggerKey {
    type Err = UnknownKey;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let trimmed = name.trim();
        let code = key_code(trimmed).ok_or_else(|| UnknownKey(name.to_string()))?;
        Ok(Self {
            code,
            raw: trimmed.to_string(),
        })
    }
}

/// Map a key name to its virtual-key code.
///
/// Letters and digits use their upper-case ASCII value, which is how the
/// virtual-key table numbers them.
fn key_code(name: &str) -> Option<u32> {
    if name.len() == 1 {
        let ch = name.chars().next()?;
        if ch.is_ascii_alphanumeric() {
            return Some(ch.to_ascii_uppercase() as u32);
        }
    }

    if let Some(rest) = name.strip_prefix('F').or_else(|| name.strip_prefix('f'))
        && let Ok(n) = rest.parse::<u32>()
        && (1..=12).contains(&n)
    {
        return Some(VK_F1 + n - 1);
    }

    match name.to_ascii_lowercase().as_str() {
        "space" => Some(VK_SPACE),
        "enter" | "return" => Some(VK_RETURN),
        _ => None,
    }
}

/// Suppresses auto-repeat: holding the key produces a stream of
/// key-down events but only the first one passes until a key-up re-arms.
#[derive(Debug)]
pub struct RepeatFilter {
    armed: Cell<bool>,
}

impl Default for RepeatFilter {
    fn default() -> Self {
        Self {
            armed: Cell::new(true),
        }
    }
}

impl RepeatFilter {
    /// Record a key-down; `true` if it is a fresh press.
    pub fn key_down(&self) -> bool {
        self.armed.replace(false)
    }

    /// Record a key-up, re-arming the filter.
    pub fn key_up(&self) {
        self.armed.set(true);
    }
}
