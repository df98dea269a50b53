//! Backward chunked scanning that seeds a session's backlog.

use crate::accumulator::{LINE_TERMINATOR, split_lines};
use crate::error::{Error, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Files no larger than this many chunks are read in one pass.
const WHOLE_FILE_CHUNKS: u64 = 4;

/// The last complete lines of a file and the size they were taken at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// At most `max_lines` complete lines, in file order.
    pub lines: Vec<String>,
    /// File size at scan time, including any unterminated tail.
    pub offset: u64,
    /// The unterminated tail itself, to be completed by later appends.
    pub pending: Vec<u8>,
}

/// Reads the last `max_lines` complete lines of `file_path`.
///
/// Small files are read whole. Larger ones are read backward in windows of
/// `chunk_size` bytes until enough line terminators have been seen or the
/// start of the file is reached. An unterminated final line is left out of
/// the lines but still counted in the returned offset and handed back as
/// `pending`.
pub async fn scan(file_path: &Path, max_lines: usize, chunk_size: usize) -> Result<ScanResult> {
    let mut file = File::open(file_path)
        .await
        .map_err(|e| Error::at_start(file_path, e))?;
    let size = file.metadata().await?.len();

    if size == 0 {
        return Ok(ScanResult::default());
    }

    let chunk = chunk_size.max(1) as u64;
    let read_whole = size <= chunk.saturating_mul(WHOLE_FILE_CHUNKS);

    // Windows are collected last-to-first and joined once at the end.
    let mut windows = Vec::new();
    let mut terminators = 0usize;
    let mut start = size;

    loop {
        let end = start;
        start = if read_whole {
            0
        } else {
            end.saturating_sub(chunk)
        };

        let window = read_range(&mut file, start, end - start).await?;
        terminators += window.iter().filter(|b| **b == LINE_TERMINATOR).count();
        windows.push(window);

        // The segment ahead of the first terminator is only known to be a
        // whole line once the start of the file has been read.
        if start == 0 || terminators > max_lines {
            break;
        }
    }

    let buffer: Vec<u8> = windows.into_iter().rev().flatten().collect();

    tracing::debug!(
        path = %file_path.display(),
        size,
        scanned = buffer.len(),
        "Backlog scan complete"
    );

    let pending = match buffer.iter().rposition(|b| *b == LINE_TERMINATOR) {
        Some(last) => buffer[last + 1..].to_vec(),
        None => buffer.clone(),
    };

    Ok(ScanResult {
        lines: last_complete_lines(&buffer, max_lines),
        offset: size,
        pending,
    })
}

/// Reads exactly `len` bytes starting at `start`.
async fn read_range(file: &mut File, start: u64, len: u64) -> Result<Vec<u8>> {
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

/// Returns the last `max_lines` terminated lines of `buffer`.
fn last_complete_lines(buffer: &[u8], max_lines: usize) -> Vec<String> {
    let Some(last) = buffer.iter().rposition(|b| *b == LINE_TERMINATOR) else {
        return Vec::new();
    };

    let mut lines = split_lines(&buffer[..last]);
    let excess = lines.len().saturating_sub(max_lines);
    lines.drain(..excess);
    lines
}
