//! Diagnostic receiver — accepts preview records and prints them.
//!
//! Stands in for the rendering process during development: binds the
//! channel, reads exactly one record per connection, and prints each
//! decoded request on stdout.

use std::io;
use std::path::PathBuf;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use crate::delivery::channel::ChannelError;
use crate::ipc::codec::{CodecError, RecordCodec};
use crate::ipc::protocol::PreviewRequest;
use crate::lifecycle::ExitSignal;

/// Listener errors.
#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("receiver already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed { path: PathBuf, source: io::Error },
    #[error("failed to bind {path}: {source}")]
    BindFailed { path: PathBuf, source: io::Error },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Read the single record a connection carries.
///
/// `Ok(None)` when the sender closed without writing anything.
pub async fn read_record<S: AsyncRead + Unpin>(
    stream: S,
) -> Result<Option<PreviewRequest>, CodecError> {
    FramedRead::new(stream, RecordCodec::new())
        .next()
        .await
        .transpose()
}

/// Run the listener on `channel` until exit or Ctrl+C.
pub async fn run(channel: &str, exit: ExitSignal) -> Result<(), ListenError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<PreviewRequest>();

    let printer = tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            println!(
                "{}\t{}\t{} bytes",
                request.path,
                if request.extension.is_empty() { "-" } else { request.extension.as_str() },
                request.size
            );
        }
    });

    let stop = exit.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, shutting down");
        }
        stop.trigger();
    });

    let result = platform::serve(channel, exit, tx).await;
    ctrl_c.abort();
    let _ = printer.await;
    result
}

/// Log and forward one connection's record.
async fn handle_connection<S: AsyncRead + Unpin>(
    stream: S,
    records: mpsc::UnboundedSender<PreviewRequest>,
) {
    match read_record(stream).await {
        Ok(Some(request)) => {
            tracing::info!(path = %request.path, size = request.size, "record received");
            let _ = records.send(request);
        }
        Ok(None) => tracing::debug!("connection closed without a record"),
        Err(e) => tracing::warn!(error = %e, "malformed record"),
    }
}

#[cfg(unix)]
pub use platform::{bind_socket, serve_listener};

#[cfg(unix)]
mod platform {
    use std::path::Path;

    use tokio::net::{UnixListener, UnixStream};

    use super::*;
    use crate::delivery::channel::socket_path;

    pub async fn serve(
        channel: &str,
        exit: ExitSignal,
        records: mpsc::UnboundedSender<PreviewRequest>,
    ) -> Result<(), ListenError> {
        let path = socket_path(channel)?;
        let listener = bind_socket(&path).await?;
        tracing::info!(path = %path.display(), "listening for preview records");
        eprintln!("listening on {}", path.display());

        serve_listener(listener, exit, records).await;

        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(error = %e, path = %path.display(), "failed to remove socket");
        }
        Ok(())
    }

    /// Accept connections until exit, one task per connection.
    pub async fn serve_listener(
        listener: UnixListener,
        exit: ExitSignal,
        records: mpsc::UnboundedSender<PreviewRequest>,
    ) {
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, _)) => {
                        tokio::spawn(handle_connection(stream, records.clone()));
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                _ = exit.triggered() => break,
            }
        }
    }

    /// Create the socket directory (mode 0700) and bind, replacing a
    /// stale socket left by a receiver that did not shut down cleanly.
    pub async fn bind_socket(path: &Path) -> Result<UnixListener, ListenError> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ListenError::MkdirFailed {
                path: parent.to_path_buf(),
                source,
            })?;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).map_err(
                |source| ListenError::MkdirFailed {
                    path: parent.to_path_buf(),
                    source,
                },
            )?;
        }

        let bind = |path: &Path| {
            UnixListener::bind(path).map_err(|source| ListenError::BindFailed {
                path: path.to_path_buf(),
                source,
            })
        };

        match UnixListener::bind(path) {
            Ok(listener) => Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if UnixStream::connect(path).await.is_ok() {
                    return Err(ListenError::AlreadyRunning(path.to_path_buf()));
                }
                tracing::info!(path = %path.display(), "removing stale socket");
                std::fs::remove_file(path).map_err(|source| ListenError::BindFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
                bind(path)
            }
            Err(source) => Err(ListenError::BindFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(windows)]
mod platform {
    use tokio::net::windows::named_pipe::ServerOptions;

    use super::*;
    use crate::delivery::channel::pipe_path;

    pub async fn serve(
        channel: &str,
        exit: ExitSignal,
        records: mpsc::UnboundedSender<PreviewRequest>,
    ) -> Result<(), ListenError> {
        let path = pipe_path(channel);
        let mut server = ServerOptions::new()
            .first_pipe_instance(true)
            .access_outbound(false)
            .create(&path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::PermissionDenied => ListenError::AlreadyRunning(PathBuf::from(&path)),
                _ => ListenError::BindFailed {
                    path: PathBuf::from(&path),
                    source,
                },
            })?;
        tracing::info!(%path, "listening for preview records");
        eprintln!("listening on {path}");

        loop {
            tokio::select! {
                connected = server.connect() => {
                    if let Err(e) = connected {
                        tracing::warn!(error = %e, "pipe connect failed");
                        continue;
                    }
                    let client = server;
                    server = ServerOptions::new().access_outbound(false).create(&path)?;
                    tokio::spawn(handle_connection(client, records.clone()));
                }
                _ = exit.triggered() => break,
            }
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::delivery::channel::UnixSocketConnector;
    use crate::delivery::launcher::{ProcessLauncher, ReceiverLocator};
    use crate::delivery::{DeliveryConfig, DeliverySupervisor};

    #[tokio::test]
    async fn read_record_from_stream() {
        let (mut client, server) = tokio::io::duplex(256);
        tokio::io::AsyncWriteExt::write_all(
            &mut client,
            br#"{"path":"/tmp/a b.txt","extension":".txt","size":5}"#,
        )
        .await
        .unwrap();
        drop(client);

        let request = read_record(server).await.unwrap().unwrap();
        assert_eq!(request.path, "/tmp/a b.txt");
        assert_eq!(request.size, 5);
    }

    #[tokio::test]
    async fn empty_connection_has_no_record() {
        let (client, server) = tokio::io::duplex(16);
        drop(client);
        assert!(read_record(server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_record_is_an_error() {
        let (mut client, server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, b"{\"path\":")
            .await
            .unwrap();
        drop(client);
        assert!(matches!(
            read_record(server).await,
            Err(CodecError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn supervisor_delivers_to_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peek").join("peek-preview.sock");
        let listener = bind_socket(&path).await.unwrap();

        let exit = ExitSignal::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(serve_listener(listener, exit.clone(), tx));

        let supervisor = DeliverySupervisor::new(
            UnixSocketConnector::new(&path),
            ProcessLauncher,
            ReceiverLocator::new(None, dir.path()),
            DeliveryConfig::default(),
        );
        assert!(supervisor.probe().await);

        let request = PreviewRequest {
            path: "/srv/share/\"quoted\" name.md".into(),
            extension: ".md".into(),
            size: 1024,
        };
        supervisor.deliver(&request).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, request);

        exit.trigger();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());

        assert!(bind_socket(&path).await.is_ok());
    }

    #[tokio::test]
    async fn live_socket_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.sock");
        let _first = bind_socket(&path).await.unwrap();

        assert!(matches!(
            bind_socket(&path).await,
            Err(ListenError::AlreadyRunning(_))
        ));
    }
}
