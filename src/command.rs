//! Operator commands: `pause`, `resume` and `stop` typed on stdin, plus the
//! shutdown signals.
use std::io::BufRead;
use std::str::FromStr;
use std::thread;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::scanner::control::Control;

/// A control command, parsed from one line of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop generating and drop whatever is queued.
    Pause,
    /// Continue after a pause.
    Resume,
    /// Finish the probes in flight and shut down.
    Stop,
}

/// A line that is not a [`Command`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command '{0}', expected pause, resume or stop")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            _ => Err(UnknownCommand(s.trim().to_owned())),
        }
    }
}

impl Command {
    /// Applies the command to `control`. Returns whether the state changed.
    pub fn apply(self, control: &Control) -> bool {
        let changed = match self {
            Self::Pause => control.pause(),
            Self::Resume => control.resume(),
            Self::Stop => control.stop(),
        };

        match (self, changed) {
            (Self::Pause, true) => info!("Paused."),
            (Self::Resume, true) => info!("Resumed."),
            (Self::Stop, true) => info!("Stopping..."),
            (command, false) => debug!("{command:?} ignored in state {:?}", control.state()),
        }
        changed
    }
}

/// Reads lines from `reader` on a dedicated thread.
///
/// A blocking read cannot be cancelled, and a tokio blocking task would hold
/// up runtime shutdown until the next line arrives, so the thread is left
/// detached. It exits on end of input or once the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(8);
    thread::spawn(move || {
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if sender.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Error reading command: {e}");
                    break;
                }
            }
        }
    });
    receiver
}

/// Applies every command read from `lines` until the scan stops or the
/// input ends. Blank lines are skipped; anything else unknown is logged.
pub async fn listen(mut lines: mpsc::Receiver<String>, control: Control) {
    loop {
        let line = tokio::select! {
            () = control.stopped() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                command.apply(&control);
            }
            Err(e) => warn!("{e}"),
        }
    }
}

/// Stops the scan on SIGINT, or SIGTERM on unix.
pub async fn stop_on_signal(control: Control) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = control.stopped() => return,
        () = interrupt => {},
        () = terminate => {},
    }

    info!("Received shutdown signal. Stopping...");
    control.stop();
}
