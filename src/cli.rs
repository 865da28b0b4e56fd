use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{self, ReceiverConfig};
use crate::delivery::DeliveryConfig;
use crate::hotkey::TriggerKey;
use crate::ipc::protocol::CHANNEL_NAME;

#[derive(Parser)]
#[command(name = "peekd", about = "Quick-preview trigger for the file manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install the key hook and send previews until exit
    Run {
        /// Trigger key: Space, Enter, F1-F12, a letter or a digit
        #[arg(long, default_value = "Space")]
        key: TriggerKey,

        /// Skip the UI Automation strategy and use the shell view only
        #[arg(long)]
        no_accessibility: bool,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Send a preview request for a file, bypassing the key hook
    Send {
        /// File to preview
        path: PathBuf,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Report whether a receiver is listening
    Probe {
        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Act as a receiver and print incoming requests
    Listen {
        /// Channel name
        #[arg(long, default_value = CHANNEL_NAME)]
        channel: String,
    },
}

/// Receiver endpoint and delivery bounds shared by sending commands.
#[derive(Args)]
pub struct DeliveryArgs {
    /// Channel name
    #[arg(long, default_value = CHANNEL_NAME)]
    pub channel: String,

    /// Receiver executable to launch when none is running
    #[arg(long)]
    pub viewer: Option<PathBuf>,

    /// Connection attempts after launching the receiver
    #[arg(long, default_value_t = 5)]
    pub connect_attempts: u32,

    /// Longest wait for a busy receiver, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub busy_timeout_ms: u64,

    /// Pause after launching the receiver, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub settle_ms: u64,

    /// Pause between attempts while the receiver starts, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub backoff_ms: u64,
}

impl DeliveryArgs {
    pub fn receiver(&self) -> ReceiverConfig {
        ReceiverConfig {
            channel: self.channel.clone(),
            viewer: self.viewer.clone(),
        }
    }

    pub fn delivery(&self) -> DeliveryConfig {
        config::delivery_config(
            self.connect_attempts,
            self.busy_timeout_ms,
            self.settle_ms,
            self.backoff_ms,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["peekd", "run"]).unwrap();
        let Command::Run {
            key,
            no_accessibility,
            delivery,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(key, TriggerKey::default());
        assert!(!no_accessibility);
        assert_eq!(delivery.receiver().channel, "peek-preview");
        assert_eq!(delivery.delivery().connect_attempts, 5);
    }

    #[test]
    fn run_with_custom_key_and_bounds() {
        let cli = Cli::try_parse_from([
            "peekd",
            "run",
            "--key",
            "F3",
            "--no-accessibility",
            "--connect-attempts",
            "2",
            "--settle-ms",
            "0",
        ])
        .unwrap();
        let Command::Run {
            key,
            no_accessibility,
            delivery,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(key.code(), 0x72);
        assert!(no_accessibility);
        assert_eq!(delivery.delivery().connect_attempts, 2);
        assert!(delivery.delivery().settle_delay.is_zero());
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(Cli::try_parse_from(["peekd", "run", "--key", "Hyper"]).is_err());
    }

    #[test]
    fn send_requires_path() {
        assert!(Cli::try_parse_from(["peekd", "send"]).is_err());
        let cli = Cli::try_parse_from(["peekd", "send", "notes.txt", "--viewer", "v"]).unwrap();
        let Command::Send { path, delivery } = cli.command else {
            panic!("expected send");
        };
        assert_eq!(path, PathBuf::from("notes.txt"));
        assert_eq!(delivery.receiver().viewer, Some(PathBuf::from("v")));
    }
}
