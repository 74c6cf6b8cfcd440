//! Splits a multiplexed output stream into stdout and stderr.
//!
//! Chunks are fed in arrival order. Each completed frame's payload is
//! appended to its channel buffer and to a combined transcript. Bytes are
//! decoded as UTF-8 only when the stream is finished, so a character split
//! across two frames survives intact.
//!
//! Each buffer keeps at most `limit` bytes. Later payload bytes are dropped
//! and counted in [`DemuxOutput::overflow`]; frames are still decoded.

use crate::execution::ExecutionResult;
use crate::frame::{Frame, FrameDecoder, StreamKind};

/// Default per-buffer capture limit: 16 MiB.
pub const DEFAULT_OUTPUT_LIMIT: usize = 16 * 1024 * 1024;

/// Accumulates demultiplexed output for one exec.
#[derive(Debug)]
pub struct Demultiplexer {
    decoder: FrameDecoder,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    transcript: Vec<u8>,
    limit: usize,
    frames: usize,
    skipped: usize,
    overflow: usize,
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_OUTPUT_LIMIT)
    }
}

/// Everything captured from one finished stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DemuxOutput {
    /// The caller-facing result.
    pub result: ExecutionResult,
    /// stdout and stderr interleaved in arrival order. Diagnostic only.
    pub transcript: String,
    /// Frames decoded, including skipped ones.
    pub frames: usize,
    /// Frames dropped because their tag was not stdout or stderr.
    pub skipped: usize,
    /// Bytes of a truncated trailing frame, discarded.
    pub truncated: usize,
    /// stdout and stderr bytes dropped because their buffer was full.
    pub overflow: usize,
}

impl Demultiplexer {
    /// Creates an empty demultiplexer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty demultiplexer keeping at most `limit` bytes in each
    /// of stdout, stderr and the transcript.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            transcript: Vec::new(),
            limit,
            frames: 0,
            skipped: 0,
            overflow: 0,
        }
    }

    /// Feeds one chunk and returns the frames it completed.
    ///
    /// Frames with an unknown tag are returned but do not reach either
    /// channel or the transcript.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let frames = self.decoder.feed(chunk);
        for frame in &frames {
            self.frames += 1;
            let channel = match frame.kind {
                StreamKind::Stdout => &mut self.stdout,
                StreamKind::Stderr => &mut self.stderr,
                StreamKind::Unknown(_) => {
                    self.skipped += 1;
                    continue;
                }
            };
            self.overflow += append_capped(channel, &frame.payload, self.limit);
            append_capped(&mut self.transcript, &frame.payload, self.limit);
        }
        frames
    }

    /// Raw stdout bytes captured so far.
    #[must_use]
    pub fn stdout_bytes(&self) -> &[u8] {
        &self.stdout
    }

    /// Raw stderr bytes captured so far.
    #[must_use]
    pub fn stderr_bytes(&self) -> &[u8] {
        &self.stderr
    }

    /// Finalizes the stream with the exit code fetched after it ended.
    #[must_use]
    pub fn finish(self, exit_code: Option<i64>) -> DemuxOutput {
        let stdout = String::from_utf8_lossy(&self.stdout);
        let stderr = String::from_utf8_lossy(&self.stderr);
        DemuxOutput {
            result: ExecutionResult::new(&stdout, &stderr, exit_code),
            transcript: String::from_utf8_lossy(&self.transcript).into_owned(),
            frames: self.frames,
            skipped: self.skipped,
            truncated: self.decoder.into_remaining().len(),
            overflow: self.overflow,
        }
    }
}

/// Appends as much of `payload` as fits under `limit`, returning the number
/// of bytes dropped.
fn append_capped(buffer: &mut Vec<u8>, payload: &[u8], limit: usize) -> usize {
    let room = limit.saturating_sub(buffer.len());
    let kept = payload.len().min(room);
    buffer.extend_from_slice(&payload[..kept]);
    payload.len() - kept
}
