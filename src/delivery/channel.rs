//! Point-to-point channel — named pipe on Windows, Unix socket elsewhere.
//!
//! A [`Connector`] opens one exclusive [`ChannelSession`] per request and
//! classifies open failures into "nobody listening" and "listener busy",
//! which drive different recovery in the supervisor.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

/// Why a channel could not be opened.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// No endpoint with this name exists.
    #[error("endpoint not found")]
    NotFound,
    /// The endpoint exists but has no free instance.
    #[error("endpoint busy")]
    Busy,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel naming errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
}

/// One open connection to the receiver.
#[allow(async_fn_in_trait)]
pub trait ChannelSession {
    /// Issue exactly one write call; returns the byte count it accepted.
    async fn write_record(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

/// Opens sessions to a named endpoint.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Session: ChannelSession;

    async fn open(&self) -> Result<Self::Session, OpenError>;

    /// Wait up to `timeout` for a busy endpoint to free an instance.
    /// `false` if the wait timed out or the endpoint vanished.
    async fn wait_until_free(&self, timeout: Duration) -> bool;

    /// Endpoint address, for logs and messages.
    fn describe(&self) -> String;
}

#[cfg(unix)]
pub type PlatformConnector = UnixSocketConnector;
#[cfg(windows)]
pub type PlatformConnector = NamedPipeConnector;

/// Socket path for a channel name: `$XDG_RUNTIME_DIR/peek/<name>.sock`.
#[cfg(unix)]
pub fn socket_path(name: &str) -> Result<PathBuf, ChannelError> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").map_err(|_| ChannelError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir)
        .join("peek")
        .join(format!("{name}.sock")))
}

/// Pipe path for a channel name: `\\.\pipe\<name>`.
#[cfg(windows)]
pub fn pipe_path(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

#[cfg(unix)]
pub use unix::UnixSocketConnector;
#[cfg(windows)]
pub use pipe::NamedPipeConnector;

#[cfg(unix)]
mod unix {
    use super::*;
    use nix::errno::Errno;
    use tokio::net::UnixStream;

    /// Connector for a Unix domain socket.
    #[derive(Debug, Clone)]
    pub struct UnixSocketConnector {
        path: PathBuf,
    }

    impl UnixSocketConnector {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        pub fn for_channel(name: &str) -> Result<Self, ChannelError> {
            Ok(Self::new(socket_path(name)?))
        }
    }

    impl ChannelSession for UnixStream {
        async fn write_record(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.write(bytes).await
        }
    }

    impl Connector for UnixSocketConnector {
        type Session = UnixStream;

        async fn open(&self) -> Result<UnixStream, OpenError> {
            UnixStream::connect(&self.path).await.map_err(classify)
        }

        /// Sockets cannot be waited on; pause and let the next open decide.
        async fn wait_until_free(&self, timeout: Duration) -> bool {
            tokio::time::sleep(timeout).await;
            true
        }

        fn describe(&self) -> String {
            self.path.display().to_string()
        }
    }

    /// A missing socket file and a socket file with no listener both mean
    /// the receiver is not running.
    fn classify(e: io::Error) -> OpenError {
        match e.raw_os_error().map(Errno::from_raw) {
            Some(Errno::ENOENT | Errno::ECONNREFUSED) => OpenError::NotFound,
            Some(Errno::EAGAIN) => OpenError::Busy,
            _ => OpenError::Io(e),
        }
    }

}

#[cfg(windows)]
mod pipe {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};
    use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_PIPE_BUSY};
    use windows::Win32::System::Pipes::WaitNamedPipeW;
    use windows::core::HSTRING;

    /// Connector for a local named pipe.
    #[derive(Debug, Clone)]
    pub struct NamedPipeConnector {
        path: String,
    }

    impl NamedPipeConnector {
        pub fn new(path: impl Into<String>) -> Self {
            Self { path: path.into() }
        }

        pub fn for_channel(name: &str) -> Result<Self, ChannelError> {
            Ok(Self::new(pipe_path(name)))
        }
    }

    impl ChannelSession for NamedPipeClient {
        async fn write_record(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.write(bytes).await
        }
    }

    impl Connector for NamedPipeConnector {
        type Session = NamedPipeClient;

        /// Write access only; records flow one way.
        async fn open(&self) -> Result<NamedPipeClient, OpenError> {
            ClientOptions::new()
                .read(false)
                .write(true)
                .open(&self.path)
                .map_err(classify)
        }

        async fn wait_until_free(&self, timeout: Duration) -> bool {
            let path = self.path.clone();
            let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
            let waited = tokio::task::spawn_blocking(move || unsafe {
                WaitNamedPipeW(&HSTRING::from(path.as_str()), millis)
            })
            .await;
            match waited {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "pipe wait failed");
                    false
                }
                Err(e) => {
                    tracing::debug!(error = %e, "pipe wait task failed");
                    false
                }
            }
        }

        fn describe(&self) -> String {
            self.path.clone()
        }
    }

    fn classify(e: io::Error) -> OpenError {
        match e.raw_os_error() {
            Some(code) if code == ERROR_FILE_NOT_FOUND.0 as i32 => OpenError::NotFound,
            Some(code) if code == ERROR_PIPE_BUSY.0 as i32 => OpenError::Busy,
            _ => OpenError::Io(e),
        }
    }
}
