//! Sharing a result summary.
//!
//! The preferred target is a native share command that receives the text on
//! stdin. When it is missing, fails or hangs, the text goes to the terminal
//! clipboard through an OSC 52 escape sequence, and a short-lived "copied"
//! flag confirms it.

use crate::errors::SpeedTestError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::BoxFuture;
use log::{debug, warn};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::{timeout, Instant};

/// How long the "copied" confirmation stays visible.
pub const COPIED_DURATION: Duration = Duration::from_secs(2);

/// How long a share command may take before it is killed.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a summary can be sent.
pub trait ShareTarget: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn share<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), SpeedTestError>>;
}

/// Which target ended up delivering the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    /// The native share command accepted it.
    Shared,
    /// It was copied to the clipboard.
    Copied,
}

/// A native share program fed through stdin, e.g. `wl-copy` or `pbcopy`.
#[derive(Debug, Clone)]
pub struct CommandShare {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandShare {
    /// Split a command line on whitespace; `None` when it is empty.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;

        Some(Self {
            program,
            args: parts.collect(),
            timeout: COMMAND_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve(&self) -> Option<PathBuf> {
        let program = PathBuf::from(&self.program);
        if program.components().count() > 1 {
            return program.is_file().then_some(program);
        }

        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }
}

impl ShareTarget for CommandShare {
    fn name(&self) -> &str {
        &self.program
    }

    fn is_available(&self) -> bool {
        self.resolve().is_some()
    }

    fn share<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), SpeedTestError>> {
        Box::pin(self.run(text))
    }
}

impl CommandShare {
    async fn run(&self, text: &str) -> Result<(), SpeedTestError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpeedTestError::share(format!(
                    "cannot start {}: {}",
                    self.program, e
                ))
            })?;

        let outcome = match timeout(self.timeout, deliver(&mut child, text))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no exit within {:?}", self.timeout),
            )),
        };

        match outcome {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(SpeedTestError::share(format!(
                "{} exited with {}",
                self.program, status
            ))),
            Err(e) => {
                // Kill and reap so no zombie is left behind
                if let Err(kill_error) = child.kill().await {
                    debug!("Could not kill {}: {}", self.program, kill_error);
                }
                Err(SpeedTestError::share(format!(
                    "{} failed: {}",
                    self.program, e
                )))
            }
        }
    }
}

/// Write `text` to the child's stdin, close it and wait for the exit.
async fn deliver(child: &mut Child, text: &str) -> io::Result<ExitStatus> {
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    child.wait().await
}

/// OSC 52 sequence asking the terminal to put `text` on the clipboard.
pub fn osc52_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", STANDARD.encode(text))
}

/// Terminal clipboard through OSC 52, written to any byte sink.
pub struct ClipboardShare<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> ClipboardShare<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self, text: &str) -> Result<(), SpeedTestError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| SpeedTestError::share("clipboard writer poisoned"))?;

        out.write_all(osc52_sequence(text).as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| {
                SpeedTestError::share(format!(
                    "cannot write to terminal: {}",
                    e
                ))
            })
    }
}

impl ClipboardShare<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ShareTarget for ClipboardShare<W> {
    fn name(&self) -> &str {
        "clipboard"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn share<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), SpeedTestError>> {
        Box::pin(async move { self.write(text) })
    }
}

/// Picks a target at share time: the preferred one if it is available and
/// succeeds, the fallback otherwise.
pub struct Sharer {
    preferred: Option<Box<dyn ShareTarget>>,
    fallback: Box<dyn ShareTarget>,
}

impl Sharer {
    pub fn new(
        preferred: Option<Box<dyn ShareTarget>>,
        fallback: Box<dyn ShareTarget>,
    ) -> Self {
        Self { preferred, fallback }
    }

    pub async fn share(
        &self,
        text: &str,
    ) -> Result<ShareOutcome, SpeedTestError> {
        if let Some(preferred) = &self.preferred {
            if preferred.is_available() {
                match preferred.share(text).await {
                    Ok(()) => {
                        debug!("Shared via {}", preferred.name());
                        return Ok(ShareOutcome::Shared);
                    }
                    Err(e) => warn!(
                        "{} failed, falling back to {}: {}",
                        preferred.name(),
                        self.fallback.name(),
                        e.message
                    ),
                }
            } else {
                debug!("{} is not available", preferred.name());
            }
        }

        self.fallback.share(text).await?;
        debug!("Copied via {}", self.fallback.name());

        Ok(ShareOutcome::Copied)
    }
}

impl Default for Sharer {
    fn default() -> Self {
        Self::new(None, Box::new(ClipboardShare::stdout()))
    }
}

/// The "copied" confirmation, true for [`COPIED_DURATION`] after a copy.
#[derive(Debug, Default)]
pub struct CopiedFlag {
    until: Mutex<Option<Instant>>,
}

impl CopiedFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Instant) {
        if let Ok(mut until) = self.until.lock() {
            *until = Some(now + COPIED_DURATION);
        }
    }

    pub fn is_set(&self, now: Instant) -> bool {
        self.until
            .lock()
            .map(|until| until.is_some_and(|until| now < until))
            .unwrap_or(false)
    }
}
