//! Selection resolver — ordered fallback chain over platform strategies.
//!
//! Each strategy turns the foreground window into a candidate path or a
//! soft failure. The driver tries them left to right, applies the
//! files-only policy, and stops at the first accepted file. Exhausting
//! the chain yields `None`; callers never see why a strategy failed.

pub mod location;
#[cfg(windows)]
pub mod windows;

use std::path::PathBuf;

use crate::desktop::WindowHandle;
use crate::probe::{self, SelectedFile};

/// Why a strategy produced no usable path.
///
/// Every variant is a soft failure: the driver logs it and moves on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StrategyError {
    /// A required interface or object could not be obtained.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The view reports an empty selection.
    #[error("nothing selected")]
    NothingSelected,

    /// A candidate element carried no usable name or value.
    #[error("element has no usable path")]
    NoPath,

    /// An automation or COM call failed.
    #[error("platform call failed: {0}")]
    Platform(String),

    /// The candidate path does not exist on disk.
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),

    /// The candidate path is a folder; only files are previewed.
    #[error("{} is a directory", .0.display())]
    Directory(PathBuf),
}

/// One way of asking the file manager for its selection.
pub trait SelectionStrategy {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produce the path of the primary selected entry in `window`.
    fn candidate(&self, window: WindowHandle) -> Result<PathBuf, StrategyError>;
}

/// Ordered strategy chain.
pub struct SelectionResolver {
    strategies: Vec<Box<dyn SelectionStrategy + Send + Sync>>,
}

impl SelectionResolver {
    pub fn new(strategies: Vec<Box<dyn SelectionStrategy + Send + Sync>>) -> Self {
        Self { strategies }
    }

    /// The chain for the current platform.
    ///
    /// On Windows: UI Automation first (skipped when `accessibility` is
    /// false), then the shell view. Elsewhere the chain is empty and every
    /// resolution yields `None`.
    pub fn for_platform(accessibility: bool) -> Self {
        #[cfg(windows)]
        {
            let mut strategies: Vec<Box<dyn SelectionStrategy + Send + Sync>> = Vec::new();
            if accessibility {
                strategies.push(Box::new(windows::AutomationStrategy));
            }
            strategies.push(Box::new(windows::ShellViewStrategy));
            Self::new(strategies)
        }
        #[cfg(not(windows))]
        {
            let _ = accessibility;
            Self::new(Vec::new())
        }
    }

    /// Names of the configured strategies, in priority order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve the selected file in `window`, or `None`.
    pub fn resolve(&self, window: WindowHandle) -> Option<SelectedFile> {
        for strategy in &self.strategies {
            match strategy.candidate(window).and_then(accept) {
                Ok(file) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        path = %file.path.display(),
                        "selection resolved"
                    );
                    return Some(file);
                }
                Err(e) => {
                    tracing::debug!(strategy = strategy.name(), error = %e, "strategy fell through");
                }
            }
        }
        None
    }
}

/// Files-only policy applied to every strategy's candidate.
fn accept(path: PathBuf) -> Result<SelectedFile, StrategyError> {
    if probe::is_directory(&path) {
        return Err(StrategyError::Directory(path));
    }
    SelectedFile::probe(&path).ok_or(StrategyError::Missing(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Strategy returning a fixed result and counting calls.
    struct Fixed {
        name: &'static str,
        result: Result<PathBuf, StrategyError>,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn boxed(
            name: &'static str,
            result: Result<PathBuf, StrategyError>,
        ) -> (Box<dyn SelectionStrategy + Send + Sync>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                name,
                result,
                calls: Arc::clone(&calls),
            };
            (Box::new(strategy), calls)
        }
    }

    impl SelectionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn candidate(&self, _window: WindowHandle) -> Result<PathBuf, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    const WINDOW: WindowHandle = WindowHandle(0x1234);

    #[test]
    fn first_success_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        std::fs::write(&first, b"1").unwrap();
        std::fs::write(&second, b"22").unwrap();

        let (a, a_calls) = Fixed::boxed("a", Ok(first.clone()));
        let (b, b_calls) = Fixed::boxed("b", Ok(second));
        let resolver = SelectionResolver::new(vec![a, b]);

        let file = resolver.resolve(WINDOW).unwrap();
        assert_eq!(file.path, first);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn soft_failure_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let (a, _) = Fixed::boxed("a", Err(StrategyError::Platform("0x80004005".into())));
        let (b, _) = Fixed::boxed("b", Ok(file.clone()));
        let resolver = SelectionResolver::new(vec![a, b]);

        let resolved = resolver.resolve(WINDOW).unwrap();
        assert_eq!(resolved.path, file);
        assert_eq!(resolved.extension, ".pdf");
        assert_eq!(resolved.size, 4);
    }

    #[test]
    fn exhausted_chain_yields_none() {
        let (a, _) = Fixed::boxed("a", Err(StrategyError::NothingSelected));
        let (b, _) = Fixed::boxed("b", Err(StrategyError::Unavailable("no view".into())));
        let resolver = SelectionResolver::new(vec![a, b]);
        assert!(resolver.resolve(WINDOW).is_none());
    }

    #[test]
    fn directories_are_never_returned() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Photos");
        std::fs::create_dir(&folder).unwrap();

        let (a, _) = Fixed::boxed("a", Ok(folder.clone()));
        let (b, b_calls) = Fixed::boxed("b", Ok(folder));
        let resolver = SelectionResolver::new(vec![a, b]);

        assert!(resolver.resolve(WINDOW).is_none());
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn directory_from_first_strategy_falls_through_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();

        let (a, _) = Fixed::boxed("a", Ok(dir.path().to_path_buf()));
        let (b, _) = Fixed::boxed("b", Ok(file.clone()));
        let resolver = SelectionResolver::new(vec![a, b]);

        assert_eq!(resolver.resolve(WINDOW).unwrap().path, file);
    }

    #[test]
    fn missing_candidate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = Fixed::boxed("a", Ok(dir.path().join("vanished.txt")));
        let resolver = SelectionResolver::new(vec![a]);
        assert!(resolver.resolve(WINDOW).is_none());
    }

    #[test]
    fn accept_reports_reason() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            accept(dir.path().to_path_buf()),
            Err(StrategyError::Directory(_))
        ));
        assert!(matches!(
            accept(dir.path().join("nope")),
            Err(StrategyError::Missing(_))
        ));
    }

    #[test]
    fn empty_chain_resolves_nothing() {
        let resolver = SelectionResolver::new(Vec::new());
        assert!(resolver.strategy_names().is_empty());
        assert!(resolver.resolve(WINDOW).is_none());
    }

    #[cfg(not(windows))]
    #[test]
    fn platform_chain_is_empty_off_windows() {
        assert!(SelectionResolver::for_platform(true).strategy_names().is_empty());
    }
}
