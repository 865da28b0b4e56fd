//! Receiver discovery and launch.
//!
//! The receiver executable is found by existence checks over an ordered
//! candidate list relative to our own executable: an explicit override,
//! installed layouts, then development build outputs. The first existing
//! candidate is launched; if none exists the first candidate is tried
//! anyway and a failed spawn is left to the connect retries.

use std::env::consts::EXE_SUFFIX;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Receiver binary name.
pub const RECEIVER_NAME: &str = "peek-viewer";
/// Alternate receiver binary name used by packaged builds.
pub const RECEIVER_ALT_NAME: &str = "PeekViewer";

/// Receiver launch errors.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to start receiver {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Starts the receiver process.
pub trait Launcher {
    fn launch(&self, path: &Path) -> Result<(), LaunchError>;
}

/// Launches the receiver as a detached child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, path: &Path) -> Result<(), LaunchError> {
        let mut command = Command::new(path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), pid = child.id(), "receiver launched");
        Ok(())
    }
}

/// Ordered receiver candidate list.
#[derive(Debug, Clone)]
pub struct ReceiverLocator {
    override_path: Option<PathBuf>,
    base_dir: PathBuf,
}

impl ReceiverLocator {
    pub fn new(override_path: Option<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            override_path,
            base_dir: base_dir.into(),
        }
    }

    /// Locator rooted at the directory of the running executable.
    pub fn from_current_exe(override_path: Option<PathBuf>) -> Self {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(override_path, base_dir)
    }

    /// All candidates in priority order. Never empty.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let rid = runtime_identifier();
        let primary = format!("{RECEIVER_NAME}{EXE_SUFFIX}");
        let alternate = format!("{RECEIVER_ALT_NAME}{EXE_SUFFIX}");
        let base = &self.base_dir;
        let workspace = base.join("..").join("..").join("viewer");

        let mut candidates = Vec::with_capacity(9);
        candidates.extend(self.override_path.clone());
        candidates.push(base.join(&primary));
        candidates.push(base.join(&rid).join(&primary));
        candidates.push(base.join(&alternate));
        candidates.push(base.join(&rid).join(&alternate));
        for profile in ["release", "debug"] {
            candidates.push(workspace.join("target").join(profile).join(&primary));
        }
        for profile in ["Release", "Debug"] {
            candidates.push(workspace.join("bin").join(profile).join(&rid).join(&alternate));
        }
        candidates
    }

    /// The first existing candidate, else the first candidate. The flag
    /// is `true` only when the returned path exists.
    pub fn locate(&self) -> (PathBuf, bool) {
        let candidates = self.candidates();
        match candidates.iter().find(|path| path.is_file()) {
            Some(found) => (found.clone(), true),
            None => {
                tracing::debug!(
                    tried = candidates.len(),
                    "no receiver candidate exists, using first"
                );
                (candidates.into_iter().next().unwrap_or_default(), false)
            }
        }
    }
}

/// Platform/architecture folder name used by packaged layouts, e.g.
/// `win-x64` or `linux-arm64`.
pub fn runtime_identifier() -> String {
    let os = match std::env::consts::OS {
        "windows" => "win",
        "macos" => "osx",
        other => other,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };
    format!("{os}-{arch}")
}
