//! Runtime configuration — receiver endpoint and delivery bounds.
//!
//! CLI flags are mapped into these plain structs in `main.rs`; every
//! field has a default matching the receiver's expectations.

use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::channel::{ChannelError, PlatformConnector};
use crate::delivery::launcher::{ProcessLauncher, ReceiverLocator};
use crate::delivery::{DeliveryConfig, DeliverySupervisor};
use crate::ipc::protocol::CHANNEL_NAME;

/// Where the receiver listens and how to start it.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Channel name, without platform prefix or suffix.
    pub channel: String,
    /// Explicit receiver executable, tried before the built-in layout.
    pub viewer: Option<PathBuf>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            channel: CHANNEL_NAME.into(),
            viewer: None,
        }
    }
}

impl ReceiverConfig {
    pub fn connector(&self) -> Result<PlatformConnector, ChannelError> {
        PlatformConnector::for_channel(&self.channel)
    }

    pub fn locator(&self) -> ReceiverLocator {
        ReceiverLocator::from_current_exe(self.viewer.clone())
    }

    /// Supervisor for the platform channel and process launcher.
    pub fn supervisor(
        &self,
        delivery: DeliveryConfig,
    ) -> Result<DeliverySupervisor<PlatformConnector, ProcessLauncher>, ChannelError> {
        Ok(DeliverySupervisor::new(
            self.connector()?,
            ProcessLauncher,
            self.locator(),
            delivery,
        ))
    }
}

/// Build a [`DeliveryConfig`] from millisecond values.
pub fn delivery_config(
    connect_attempts: u32,
    busy_timeout_ms: u64,
    settle_ms: u64,
    backoff_ms: u64,
) -> DeliveryConfig {
    DeliveryConfig {
        connect_attempts: connect_attempts.max(1),
        busy_timeout: Duration::from_millis(busy_timeout_ms),
        settle_delay: Duration::from_millis(settle_ms),
        absent_backoff: Duration::from_millis(backoff_ms),
    }
}
