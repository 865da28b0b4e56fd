mod cli;
mod config;
mod delivery;
mod desktop;
mod hotkey;
mod ipc;
mod lifecycle;
mod listen;
mod pipeline;
mod probe;
mod resolver;

use std::path::PathBuf;

use clap::Parser;
use cli::{Cli, Command, DeliveryArgs};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::delivery::DeliveryError;
use crate::delivery::channel::ChannelError;
use crate::hotkey::{HookError, TriggerKey};
use crate::ipc::protocol::PreviewRequest;
use crate::lifecycle::ExitSignal;
use crate::pipeline::PreviewPipeline;
use crate::probe::SelectedFile;
use crate::resolver::SelectionResolver;

/// Errors surfaced by a subcommand.
#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("{} is not a file", .0.display())]
    NotAFile(PathBuf),
    #[error("no receiver is listening at {0}")]
    NoReceiver(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            key,
            no_accessibility,
            delivery,
        } => {
            if let Err(e) = run_trigger(key, !no_accessibility, &delivery).await {
                tracing::error!(error = %e, "run failed");
                eprintln!("peekd run: {e}");
                std::process::exit(1);
            }
        }
        Command::Send { path, delivery } => match send(&path, &delivery).await {
            Ok(bytes) => eprintln!("sent {} ({bytes} bytes)", path.display()),
            Err(e) => {
                tracing::error!(error = %e, "send failed");
                eprintln!("peekd send: {e}");
                std::process::exit(1);
            }
        },
        Command::Probe { delivery } => match probe_receiver(&delivery).await {
            Ok(endpoint) => eprintln!("receiver is listening at {endpoint}"),
            Err(e) => {
                eprintln!("peekd probe: {e}");
                std::process::exit(1);
            }
        },
        Command::Listen { channel } => {
            if let Err(e) = listen::run(&channel, ExitSignal::new()).await {
                tracing::error!(error = %e, "listen failed");
                eprintln!("peekd listen: {e}");
                std::process::exit(1);
            }
        }
    }
}

async fn run_trigger(
    key: TriggerKey,
    accessibility: bool,
    args: &DeliveryArgs,
) -> Result<(), CommandError> {
    let supervisor = args.receiver().supervisor(args.delivery())?;
    let resolver = SelectionResolver::for_platform(accessibility);
    tracing::info!(
        %key,
        strategies = ?resolver.strategy_names(),
        endpoint = %supervisor.endpoint(),
        "starting trigger gate"
    );

    let exit = ExitSignal::new();
    let pipeline = PreviewPipeline::new(resolver, supervisor, tokio::runtime::Handle::current());

    #[cfg(windows)]
    let host = lifecycle::ConsoleHost;
    #[cfg(not(windows))]
    let host = lifecycle::DetachedHost;

    // Blocking stdin reader; left detached, it ends with the process.
    let (commands_tx, commands_rx) = mpsc::channel(8);
    std::thread::Builder::new()
        .name("shell-input".into())
        .spawn(move || lifecycle::read_commands(std::io::stdin().lock(), commands_tx))
        .map_err(HookError::Io)?;
    let commands = tokio::spawn(lifecycle::serve_commands(commands_rx, host, exit.clone()));
    let watcher = tokio::spawn(lifecycle::watch_minimized(
        host,
        exit.clone(),
        lifecycle::MINIMIZE_POLL,
    ));

    let result = hotkey::run(key, pipeline, exit.clone()).await;
    tracing::info!(exit_requested = exit.is_triggered(), "trigger gate stopped");

    exit.trigger();
    let _ = commands.await;
    let _ = watcher.await;
    Ok(result?)
}

async fn send(path: &std::path::Path, args: &DeliveryArgs) -> Result<usize, CommandError> {
    let file = SelectedFile::probe(path).ok_or_else(|| CommandError::NotAFile(path.to_path_buf()))?;
    let supervisor = args.receiver().supervisor(args.delivery())?;
    Ok(supervisor.deliver(&PreviewRequest::from(&file)).await?)
}

async fn probe_receiver(args: &DeliveryArgs) -> Result<String, CommandError> {
    let supervisor = args.receiver().supervisor(args.delivery())?;
    let endpoint = supervisor.endpoint();
    if supervisor.probe().await {
        Ok(endpoint)
    } else {
        Err(CommandError::NoReceiver(endpoint))
    }
}
