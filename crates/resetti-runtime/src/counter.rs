//! Persistent reset counter.
//!
//! The count lives in a small text file holding a decimal number. Writes
//! are rate limited while running; the final flush on shutdown always
//! writes.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Minimum time between two writes while running.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct CounterFile {
    path: PathBuf,
    count: u64,
    last_write: Option<Instant>,
}

impl CounterFile {
    /// Load the count from `path`. A missing or empty file counts as 0.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let text = text.trim();
        let count = if text.is_empty() {
            0
        } else {
            text.parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("reset count is not a number: {text:?}"),
                )
            })?
        };
        Ok(Self {
            path,
            count,
            last_write: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Count one reset. Returns whether the file was rewritten.
    pub fn increment(&mut self, now: Instant) -> io::Result<bool> {
        self.count += 1;
        let due = self
            .last_write
            .is_none_or(|last| now.saturating_duration_since(last) >= FLUSH_INTERVAL);
        if !due {
            return Ok(false);
        }
        self.write()?;
        self.last_write = Some(now);
        Ok(true)
    }

    /// Write the current count regardless of timing.
    pub fn flush(&mut self) -> io::Result<()> {
        self.write()?;
        self.last_write = Some(Instant::now());
        Ok(())
    }

    fn write(&self) -> io::Result<()> {
        std::fs::write(&self.path, self.count.to_string())
    }
}

/// Non-blocking increment handle. A disabled handle drops increments.
#[derive(Debug, Clone, Default)]
pub struct CounterHandle {
    tx: Option<mpsc::Sender<()>>,
}

impl CounterHandle {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(()) {
            tracing::warn!(error = %e, "reset count increment dropped");
        }
    }
}

/// Move `file` into a background task. The task drains pending increments
/// and flushes on cancellation, returning the final count.
pub fn spawn(
    file: CounterFile,
    cancel: CancellationToken,
) -> (CounterHandle, JoinHandle<io::Result<u64>>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let task = tokio::spawn(run(file, rx, cancel));
    (CounterHandle { tx: Some(tx) }, task)
}

async fn run(
    mut file: CounterFile,
    mut rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
) -> io::Result<u64> {
    loop {
        tokio::select! {
            msg = rx.recv() => {
                if msg.is_none() {
                    break;
                }
                bump(&mut file);
            }
            _ = cancel.cancelled() => {
                while rx.try_recv().is_ok() {
                    bump(&mut file);
                }
                break;
            }
        }
    }
    file.flush()?;
    tracing::info!(count = file.count(), path = %file.path().display(), "reset count saved");
    Ok(file.count())
}

fn bump(file: &mut CounterFile) {
    if let Err(e) = file.increment(Instant::now()) {
        tracing::warn!(error = %e, path = %file.path().display(), "failed to write reset count");
    }
}
