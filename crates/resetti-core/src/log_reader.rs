//! Incremental log-tail reader.
//!
//! Tracks a cursor into an append-only game log, buffers partial lines,
//! and turns the complete lines written since the last call into a raw
//! phase signal. Matching is substring-based and case-insensitive.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Lines containing this marker are player chat and never drive state.
const CHAT_MARKER: &str = "[chat]";

const GENERATING_MARKERS: [&str; 2] = ["resetting a random seed", "leaving world generation"];
const PREVIEW_MARKER: &str = "starting preview at";
const WORLD_MARKER: &str = "saving and pausing game";
const DIRT_MARKER: &str = "stopping singleplayer server";
const PROGRESS_MARKER: &str = "preparing spawn area: ";

/// Phase signal parsed from the log, before registry policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawPhase {
    Generating,
    Preview,
    /// A world finished loading and paused. Resolves to `Idle` or `Ingame`
    /// depending on whether the instance is the active one.
    World,
    Dirt,
}

/// Everything a batch of log lines said about the instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawUpdate {
    /// Last phase marker in the batch, if any.
    pub phase: Option<RawPhase>,
    /// Last known generation progress in the batch, if any.
    pub progress: Option<u8>,
}

impl RawUpdate {
    /// `false` means the batch carried no new information, not that the
    /// instance is unchanged.
    pub fn was_updated(&self) -> bool {
        self.phase.is_some() || self.progress.is_some()
    }
}

/// Tail reader for one instance log.
#[derive(Debug)]
pub struct StateReader {
    path: PathBuf,
    reader: BufReader<File>,
    /// Bytes of an unterminated line from the previous read.
    incomplete: Vec<u8>,
}

impl StateReader {
    /// Open a log and position the cursor at its end, skipping history.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            incomplete: Vec::new(),
        })
    }

    /// Open a log and read it from the beginning.
    pub fn from_start(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            incomplete: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume every complete line appended since the last call.
    ///
    /// Never waits for a partial line; it stays buffered for the next call.
    pub fn process(&mut self) -> io::Result<RawUpdate> {
        let mut update = RawUpdate::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = self.reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                self.incomplete.extend_from_slice(&buf);
                break;
            }
            let mut line = std::mem::take(&mut self.incomplete);
            line.extend_from_slice(&buf[..buf.len() - 1]);
            apply_line(&String::from_utf8_lossy(&line), &mut update);
        }
        Ok(update)
    }
}

/// Fold a single log line into the batch result.
fn apply_line(line: &str, update: &mut RawUpdate) {
    let line = line.to_ascii_lowercase();
    if line.contains(CHAT_MARKER) {
        return;
    }
    if GENERATING_MARKERS.iter().any(|m| line.contains(m)) {
        update.phase = Some(RawPhase::Generating);
        update.progress = Some(0);
    } else if line.contains(PREVIEW_MARKER) {
        update.phase = Some(RawPhase::Preview);
    } else if line.contains(WORLD_MARKER) {
        update.phase = Some(RawPhase::World);
    } else if line.contains(DIRT_MARKER) {
        update.phase = Some(RawPhase::Dirt);
    } else if let Some(progress) = parse_progress(&line) {
        update.progress = Some(progress);
    }
}

/// Parse `preparing spawn area: 42%`.
fn parse_progress(line: &str) -> Option<u8> {
    let start = line.find(PROGRESS_MARKER)? + PROGRESS_MARKER.len();
    let rest = &line[start..];
    let digits: &str = rest
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|d| !d.is_empty())?;
    digits.parse::<u8>().ok().map(|p| p.min(100))
}
