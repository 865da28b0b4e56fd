//! Process lifecycle — exit signal and status-shell commands.
//!
//! The status shell (tray icon, menu) is an external collaborator. The
//! core only exposes an [`ExitSignal`] it can trip, accepts the two
//! [`ShellCommand`]s it sends, and keeps the host console hidden while
//! it is minimised.

use std::io::BufRead;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Interval between host minimisation checks.
pub const MINIMIZE_POLL: Duration = Duration::from_millis(500);

/// Process-wide request to stop.
///
/// Cloning shares the signal. Triggering is idempotent.
#[derive(Debug, Clone, Default)]
pub struct ExitSignal {
    token: CancellationToken,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }
}

/// Commands the status shell sends to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    /// Bring the host window back.
    Restore,
    /// Uninstall the hook and exit.
    Exit,
}

impl FromStr for ShellCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "restore" | "show" => Ok(Self::Restore),
            "exit" | "quit" => Ok(Self::Exit),
            other => Err(format!("unknown shell command: {other:?}")),
        }
    }
}

/// Forward line-based commands from the status shell, one per line on
/// `input`, until the input ends or the receiver is gone.
///
/// Blocking; run it on a dedicated thread.
pub fn read_commands<R: BufRead>(input: R, commands: mpsc::Sender<ShellCommand>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "shell input closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ShellCommand>() {
            Ok(command) => {
                if commands.blocking_send(command).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "ignoring shell input"),
        }
    }
}

/// The window hosting the process (a console on Windows).
pub trait HostWindow {
    fn is_minimized(&self) -> bool;
    fn hide(&self);
    fn restore(&self);
}

/// Apply one shell command.
pub fn dispatch(command: ShellCommand, host: &impl HostWindow, exit: &ExitSignal) {
    tracing::debug!(?command, "shell command");
    match command {
        ShellCommand::Restore => host.restore(),
        ShellCommand::Exit => exit.trigger(),
    }
}

/// Apply shell commands until the channel closes or exit is requested.
pub async fn serve_commands(
    mut commands: mpsc::Receiver<ShellCommand>,
    host: impl HostWindow,
    exit: ExitSignal,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => dispatch(command, &host, &exit),
                None => break,
            },
            _ = exit.triggered() => break,
        }
    }
}

/// Hide the host whenever it is minimised, polling every `interval`.
pub async fn watch_minimized(host: impl HostWindow, exit: ExitSignal, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if host.is_minimized() {
                    tracing::debug!("host minimised, hiding");
                    host.hide();
                }
            }
            _ = exit.triggered() => break,
        }
    }
}

/// The process console window.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHost;

#[cfg(windows)]
impl ConsoleHost {
    fn window() -> Option<windows::Win32::Foundation::HWND> {
        let hwnd = unsafe { windows::Win32::System::Console::GetConsoleWindow() };
        (!hwnd.is_invalid()).then_some(hwnd)
    }
}

#[cfg(windows)]
impl HostWindow for ConsoleHost {
    fn is_minimized(&self) -> bool {
        use windows::Win32::UI::WindowsAndMessaging::IsIconic;
        Self::window().is_some_and(|hwnd| unsafe { IsIconic(hwnd) }.as_bool())
    }

    fn hide(&self) {
        use windows::Win32::UI::WindowsAndMessaging::{SW_HIDE, ShowWindow};
        if let Some(hwnd) = Self::window() {
            let _ = unsafe { ShowWindow(hwnd, SW_HIDE) };
        }
    }

    fn restore(&self) {
        use windows::Win32::UI::WindowsAndMessaging::{SW_RESTORE, SetForegroundWindow, ShowWindow};
        if let Some(hwnd) = Self::window() {
            let _ = unsafe { ShowWindow(hwnd, SW_RESTORE) };
            let _ = unsafe { SetForegroundWindow(hwnd) };
        }
    }
}

/// Host with no window to manage.
#[cfg(not(windows))]
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

#[cfg(not(windows))]
impl HostWindow for DetachedHost {
    fn is_minimized(&self) -> bool {
        false
    }

    fn hide(&self) {}

    fn restore(&self) {}
}
