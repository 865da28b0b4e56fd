//! Delivery supervisor — receiver liveness, launch, connect, single write.
//!
//! One [`DeliverySupervisor::deliver`] call moves through
//! [`SupervisorState`]s: a probe open either succeeds (the session is
//! used directly) or finds the endpoint absent, in which case the
//! receiver is located and launched and the channel is opened with a
//! bounded retry. The encoded record is written in one call and the
//! session is closed whatever the outcome.

pub mod channel;
pub mod launcher;

use std::io;
use std::time::Duration;

use channel::{ChannelSession, Connector, OpenError};
use launcher::{LaunchError, Launcher, ReceiverLocator};

use crate::ipc::codec;
use crate::ipc::protocol::PreviewRequest;

/// Retry and wait bounds for one delivery.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Open attempts after the probe.
    pub connect_attempts: u32,
    /// Longest wait for a busy endpoint to free an instance.
    pub busy_timeout: Duration,
    /// Pause after launching the receiver before the first open.
    pub settle_delay: Duration,
    /// Pause between opens while a launched receiver is still starting.
    pub absent_backoff: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            busy_timeout: Duration::from_millis(1000),
            settle_delay: Duration::from_millis(500),
            absent_backoff: Duration::from_millis(100),
        }
    }
}

/// Terminal delivery failures. None of them is retried on later triggers.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("receiver unavailable: {0}")]
    Open(#[source] OpenError),
    #[error("receiver stayed busy for {0:?}")]
    BusyTimeout(Duration),
    #[error("no connection after {attempts} attempts (last: {last})")]
    RetriesExhausted { attempts: u32, last: OpenError },
    #[error("partial write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Progress of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Unknown,
    ProbablyAbsent,
    Launching,
    Connecting,
    Connected,
}

fn advance(state: &mut SupervisorState, next: SupervisorState) {
    tracing::debug!(from = ?*state, to = ?next, "delivery state");
    *state = next;
}

/// Ensures the receiver is running and hands it one record per call.
pub struct DeliverySupervisor<C, L> {
    connector: C,
    launcher: L,
    locator: ReceiverLocator,
    config: DeliveryConfig,
}

impl<C: Connector, L: Launcher> DeliverySupervisor<C, L> {
    pub fn new(connector: C, launcher: L, locator: ReceiverLocator, config: DeliveryConfig) -> Self {
        Self {
            connector,
            launcher,
            locator,
            config,
        }
    }

    pub fn endpoint(&self) -> String {
        self.connector.describe()
    }

    pub fn locator(&self) -> &ReceiverLocator {
        &self.locator
    }

    /// Whether a receiver currently accepts connections.
    ///
    /// Opens and immediately closes a session; never launches.
    pub async fn probe(&self) -> bool {
        match self.connector.open().await {
            Ok(session) => {
                drop(session);
                true
            }
            Err(e) => {
                tracing::debug!(endpoint = %self.connector.describe(), error = %e, "probe failed");
                false
            }
        }
    }

    /// Deliver one request. Returns the number of bytes written.
    pub async fn deliver(&self, request: &PreviewRequest) -> Result<usize, DeliveryError> {
        self.deliver_record(&codec::encode_request(request)).await
    }

    /// Deliver an already-encoded record.
    pub async fn deliver_record(&self, record: &[u8]) -> Result<usize, DeliveryError> {
        let mut session = self.open_session().await?;
        let result = write_once(&mut session, record).await;
        drop(session);

        if let Ok(written) = &result {
            tracing::info!(endpoint = %self.connector.describe(), bytes = written, "preview record delivered");
        }
        result
    }

    async fn open_session(&self) -> Result<C::Session, DeliveryError> {
        let mut state = SupervisorState::Unknown;

        let launched = match self.connector.open().await {
            Ok(session) => {
                advance(&mut state, SupervisorState::Connected);
                return Ok(session);
            }
            Err(OpenError::NotFound) => {
                advance(&mut state, SupervisorState::ProbablyAbsent);
                let (path, exists) = self.locator.locate();
                advance(&mut state, SupervisorState::Launching);
                match self.launcher.launch(&path) {
                    Ok(()) => {}
                    // Fallback candidate that is not on disk: let the
                    // connect attempts report the failure.
                    Err(e) if !exists => tracing::debug!(error = %e, "best-effort launch failed"),
                    Err(e) => return Err(e.into()),
                }
                tokio::time::sleep(self.config.settle_delay).await;
                true
            }
            Err(OpenError::Busy) => {
                if !self.connector.wait_until_free(self.config.busy_timeout).await {
                    return Err(DeliveryError::BusyTimeout(self.config.busy_timeout));
                }
                false
            }
            Err(e) => return Err(DeliveryError::Open(e)),
        };

        advance(&mut state, SupervisorState::Connecting);
        let attempts = self.config.connect_attempts;
        let mut last = OpenError::NotFound;

        for attempt in 1..=attempts {
            match self.connector.open().await {
                Ok(session) => {
                    advance(&mut state, SupervisorState::Connected);
                    return Ok(session);
                }
                Err(OpenError::Busy) => {
                    tracing::debug!(attempt, "endpoint busy");
                    if !self.connector.wait_until_free(self.config.busy_timeout).await {
                        return Err(DeliveryError::BusyTimeout(self.config.busy_timeout));
                    }
                    last = OpenError::Busy;
                }
                Err(OpenError::NotFound) if launched => {
                    tracing::debug!(attempt, "receiver still starting");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.absent_backoff).await;
                    }
                    last = OpenError::NotFound;
                }
                Err(e) => return Err(DeliveryError::Open(e)),
            }
        }

        Err(DeliveryError::RetriesExhausted { attempts, last })
    }
}

/// One write call; anything short of the whole record is a failure.
async fn write_once<S: ChannelSession>(session: &mut S, record: &[u8]) -> Result<usize, DeliveryError> {
    let written = session
        .write_record(record)
        .await
        .map_err(DeliveryError::Write)?;
    if written != record.len() {
        return Err(DeliveryError::PartialWrite {
            written,
            expected: record.len(),
        });
    }
    Ok(written)
}
