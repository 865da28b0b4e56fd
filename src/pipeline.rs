//! Preview pipeline — the handler the trigger gate runs.
//!
//! Resolves the selection on the calling (hook) thread, then drives the
//! async delivery to completion on the process runtime. Failures are
//! reported in the returned [`TriggerReport`] and never propagate into
//! the hook.

use std::path::PathBuf;

use tokio::runtime::Handle;

use crate::delivery::channel::{Connector, PlatformConnector};
use crate::delivery::launcher::{Launcher, ProcessLauncher};
use crate::delivery::{DeliveryError, DeliverySupervisor};
use crate::desktop::WindowHandle;
use crate::hotkey::TriggerHandler;
use crate::ipc::codec;
use crate::probe::SelectedFile;
use crate::resolver::SelectionResolver;

/// What one trigger achieved.
#[derive(Debug)]
pub enum TriggerReport {
    Delivered { path: PathBuf, bytes: usize },
    NoSelection,
    DeliveryFailed(DeliveryError),
}

/// Resolver plus supervisor, bound to a runtime.
pub struct PreviewPipeline<C = PlatformConnector, L = ProcessLauncher> {
    resolver: SelectionResolver,
    supervisor: DeliverySupervisor<C, L>,
    runtime: Handle,
}

impl<C: Connector, L: Launcher> PreviewPipeline<C, L> {
    pub fn new(
        resolver: SelectionResolver,
        supervisor: DeliverySupervisor<C, L>,
        runtime: Handle,
    ) -> Self {
        Self {
            resolver,
            supervisor,
            runtime,
        }
    }

    /// Deliver an already-probed file, bypassing resolution.
    pub async fn send_file(&self, file: &SelectedFile) -> Result<usize, DeliveryError> {
        self.supervisor.deliver_record(&codec::encode(file)).await
    }

    /// Resolve and deliver. Blocks the calling thread; must not be called
    /// from inside the runtime.
    pub fn preview(&self, window: WindowHandle) -> TriggerReport {
        let Some(file) = self.resolver.resolve(window) else {
            tracing::debug!(window = window.0, "no file selected");
            return TriggerReport::NoSelection;
        };

        match self.runtime.block_on(self.send_file(&file)) {
            Ok(bytes) => TriggerReport::Delivered {
                path: file.path,
                bytes,
            },
            Err(e) => {
                tracing::warn!(path = %file.path.display(), error = %e, "preview failed");
                eprintln!("error: {e}");
                TriggerReport::DeliveryFailed(e)
            }
        }
    }
}

impl<C: Connector, L: Launcher> TriggerHandler for PreviewPipeline<C, L> {
    type Outcome = TriggerReport;

    fn on_trigger(&self, window: WindowHandle) -> TriggerReport {
        self.preview(window)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::net::UnixListener;
    use tokio_util::codec::FramedRead;

    use crate::delivery::DeliveryConfig;
    use crate::delivery::channel::UnixSocketConnector;
    use crate::delivery::launcher::{LaunchError, RECEIVER_NAME, ReceiverLocator};
    use crate::desktop::DesktopProbe;
    use crate::hotkey::{GateDecision, GateState, TriggerGate};
    use crate::ipc::codec::RecordCodec;
    use crate::resolver::{SelectionStrategy, StrategyError};

    const EXPLORER: WindowHandle = WindowHandle(0x10);

    struct ExplorerDesktop;

    impl DesktopProbe for ExplorerDesktop {
        fn foreground_window(&self) -> Option<WindowHandle> {
            Some(EXPLORER)
        }

        fn class_name(&self, _window: WindowHandle) -> Option<String> {
            Some("CabinetWClass".into())
        }

        fn focused_control(&self, _window: WindowHandle) -> Option<WindowHandle> {
            None
        }
    }

    struct Fixed(PathBuf);

    impl SelectionStrategy for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn candidate(&self, _window: WindowHandle) -> Result<PathBuf, StrategyError> {
            Ok(self.0.clone())
        }
    }

    struct NoLaunch;

    impl Launcher for NoLaunch {
        fn launch(&self, path: &Path) -> Result<(), LaunchError> {
            Err(LaunchError::Spawn {
                path: path.to_path_buf(),
                source: std::io::Error::other("launch disabled in tests"),
            })
        }
    }

    fn pipeline(
        resolver: SelectionResolver,
        socket: &Path,
        base: &Path,
        runtime: Handle,
    ) -> PreviewPipeline<UnixSocketConnector, NoLaunch> {
        let config = DeliveryConfig {
            settle_delay: Duration::from_millis(1),
            absent_backoff: Duration::from_millis(1),
            ..DeliveryConfig::default()
        };
        let supervisor = DeliverySupervisor::new(
            UnixSocketConnector::new(socket),
            NoLaunch,
            ReceiverLocator::new(None, base),
            config,
        );
        PreviewPipeline::new(resolver, supervisor, runtime)
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn key_press_reaches_receiver() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Report.PDF");
        std::fs::write(&file, b"%PDF-1.7").unwrap();
        let socket = dir.path().join("peek.sock");

        let listener = rt.block_on(async { UnixListener::bind(&socket) }).unwrap();
        let receiver = rt.spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            FramedRead::new(stream, RecordCodec::new())
                .next()
                .await
                .unwrap()
                .unwrap()
        });

        let resolver = SelectionResolver::new(vec![Box::new(Fixed(file.clone()))]);
        let gate = TriggerGate::new(
            ExplorerDesktop,
            pipeline(resolver, &socket, dir.path(), rt.handle().clone()),
        );

        let decision = gate.on_key_down();
        assert!(matches!(
            decision,
            GateDecision::Fired(TriggerReport::Delivered { ref path, .. }) if *path == file
        ));
        assert_eq!(gate.state(), GateState::Idle);

        let received = rt.block_on(receiver).unwrap();
        assert_eq!(received.path, file.to_string_lossy());
        assert_eq!(received.extension, ".pdf");
        assert_eq!(received.size, 8);
    }

    #[test]
    fn folder_selection_sends_nothing() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("peek.sock");

        let resolver = SelectionResolver::new(vec![Box::new(Fixed(dir.path().to_path_buf()))]);
        let pipeline = pipeline(resolver, &socket, dir.path(), rt.handle().clone());

        assert!(matches!(pipeline.preview(EXPLORER), TriggerReport::NoSelection));
    }

    #[test]
    fn absent_receiver_reports_exhausted_retries() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();

        let resolver = SelectionResolver::new(vec![Box::new(Fixed(file))]);
        let pipeline = pipeline(
            resolver,
            &dir.path().join("absent.sock"),
            dir.path(),
            rt.handle().clone(),
        );

        assert!(matches!(
            pipeline.preview(EXPLORER),
            TriggerReport::DeliveryFailed(DeliveryError::RetriesExhausted { .. })
        ));
    }

    #[test]
    fn installed_receiver_that_fails_to_start_reports_launch() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"a").unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).unwrap();
        std::fs::write(bin.join(RECEIVER_NAME), b"").unwrap();

        let resolver = SelectionResolver::new(vec![Box::new(Fixed(file))]);
        let pipeline = pipeline(resolver, &dir.path().join("absent.sock"), &bin, rt.handle().clone());

        assert!(matches!(
            pipeline.preview(EXPLORER),
            TriggerReport::DeliveryFailed(DeliveryError::Launch(_))
        ));
    }
}
