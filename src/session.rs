//! Read progress and recent history for one tracked file.

use crate::accumulator::{Accumulated, consume};
use crate::config::TailOptions;
use crate::error::Result;
use crate::scanner::scan;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Tailing state of a single file.
///
/// Exactly one task owns a session, so the offset, backlog and pending
/// fragment never see concurrent updates.
#[derive(Debug)]
pub struct TailSession {
    path: PathBuf,
    backlog_size: usize,
    chunk_size: usize,
    offset: u64,
    backlog: VecDeque<String>,
    pending: Vec<u8>,
}

impl TailSession {
    /// Fails with `InvalidConfig` for a zero backlog or chunk size.
    pub fn new<P: AsRef<Path>>(path: P, options: &TailOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            backlog_size: options.backlog_size,
            chunk_size: options.chunk_size,
            offset: 0,
            backlog: VecDeque::with_capacity(options.backlog_size),
            pending: Vec::new(),
        })
    }

    /// Seeds the backlog and offset from the current file content.
    ///
    /// On failure the session is left untouched.
    pub async fn initialize(&mut self) -> Result<()> {
        let scanned = scan(&self.path, self.backlog_size, self.chunk_size).await?;

        self.backlog = scanned.lines.into();
        self.offset = scanned.offset;
        self.pending = scanned.pending;
        Ok(())
    }

    /// Reads `[offset, current_size)` and returns the lines it completes.
    ///
    /// A size equal to the offset is a spurious notification and reads
    /// nothing. A read failure leaves the offset and pending fragment as they
    /// were, so the same range is retried on the next call.
    pub async fn apply_append(&mut self, current_size: u64) -> Result<Vec<String>> {
        if current_size <= self.offset {
            return Ok(Vec::new());
        }

        let delta = read_delta(&self.path, self.offset, current_size - self.offset).await?;
        let Accumulated { lines, pending } = consume(&self.pending, &delta);

        self.pending = pending;
        self.offset += delta.len() as u64;
        self.push_lines(&lines);

        Ok(lines)
    }

    /// Rebuilds the session from a file that shrank to `new_size`, or whose
    /// continuity is otherwise lost.
    ///
    /// The pending fragment is discarded. Returns the new backlog, to be
    /// published as a reset rather than a batch.
    pub async fn apply_truncation(&mut self, new_size: u64) -> Result<Vec<String>> {
        tracing::info!(
            path = %self.path.display(),
            previous = self.offset,
            size = new_size,
            "Rescanning file"
        );

        self.initialize().await?;
        Ok(self.snapshot())
    }

    /// The current backlog, oldest line first.
    pub fn snapshot(&self) -> Vec<String> {
        self.backlog.iter().cloned().collect()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending_fragment(&self) -> &[u8] {
        &self.pending
    }

    fn push_lines(&mut self, lines: &[String]) {
        for line in lines {
            self.backlog.push_back(line.clone());
            while self.backlog.len() > self.backlog_size {
                self.backlog.pop_front();
            }
        }
    }
}

/// Reads up to `len` bytes from `start`; fewer if the file shrank meanwhile.
async fn read_delta(path: &Path, start: u64, len: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(start)).await?;

    let mut delta = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut delta).await?;
    Ok(delta)
}
