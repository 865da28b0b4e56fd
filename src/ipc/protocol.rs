//! Wire record exchanged with the preview receiver.
//!
//! One JSON object per connection, no length prefix and no trailing
//! newline: `{"path":"...","extension":"...","size":N}`. The field order
//! is fixed and there are no optional fields.

use serde::{Deserialize, Serialize};

use crate::probe::SelectedFile;

/// Well-known channel name shared by sender and receiver.
pub const CHANNEL_NAME: &str = "peek-preview";

/// Upper bound on a record the listener will buffer (64 KiB).
///
/// A path is at most 32767 UTF-16 units on Windows; escaping can at most
/// double the byte count, so this leaves ample headroom.
pub const MAX_RECORD_SIZE: usize = 64 * 1024;

/// A preview request as seen on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviewRequest {
    pub path: String,
    pub extension: String,
    pub size: u64,
}

impl From<&SelectedFile> for PreviewRequest {
    fn from(file: &SelectedFile) -> Self {
        Self {
            path: file.path.to_string_lossy().into_owned(),
            extension: file.extension.clone(),
            size: file.size,
        }
    }
}
