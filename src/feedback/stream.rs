//! Incremental reader for the newline-delimited JSON feedback stream.
//!
//! Bytes are split on `\n` before any UTF-8 decoding, so a multi-byte star
//! glyph cut across two network reads is reassembled intact. A trailing
//! partial line stays buffered until the next read completes it.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use crate::error::FeedbackError;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRecord {
    Chunk { content: String },
    Complete { summary: String },
    Error { error: String },
}

/// Holds the one partial line carried between reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator, if one is buffered.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let newline = self.pending.iter().position(|byte| *byte == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(self) -> Option<Vec<u8>> {
        if self.pending.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(self.pending)
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }
}

/// Folds stream records into the final summary text.
#[derive(Debug, Default)]
pub struct SummaryAssembler {
    accumulated: String,
    records: usize,
}

impl SummaryAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one line. Returns the authoritative summary once a
    /// `complete` record arrives.
    pub fn apply_line(&mut self, line: &[u8]) -> Result<Option<String>, FeedbackError> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let record: StreamRecord = serde_json::from_slice(line)
            .map_err(|err| FeedbackError::Protocol(err.to_string()))?;
        self.records += 1;

        match record {
            StreamRecord::Chunk { content } => {
                self.accumulated.push_str(&content);
                Ok(None)
            }
            StreamRecord::Complete { summary } => {
                if summary.trim().is_empty() {
                    Err(FeedbackError::Empty)
                } else {
                    Ok(Some(summary))
                }
            }
            StreamRecord::Error { error } => Err(FeedbackError::Upstream(error)),
        }
    }

    /// Resolves a stream that ended without a `complete` record.
    pub fn finish(self) -> Result<String, FeedbackError> {
        if self.accumulated.trim().is_empty() {
            Err(FeedbackError::Empty)
        } else {
            Ok(self.accumulated)
        }
    }

    pub fn records_seen(&self) -> usize {
        self.records
    }
}

/// Reads a response body to completion and returns the summary text.
///
/// Stops at the first `complete` or `error` record; anything after it is
/// left unread.
pub async fn read_summary<S, B, E>(body: S) -> Result<String, FeedbackError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut lines = LineBuffer::new();
    let mut assembler = SummaryAssembler::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| {
            log_warn!("feedback stream aborted mid-read: {err}");
            FeedbackError::Transport(err.to_string())
        })?;
        lines.push(chunk.as_ref());

        while let Some(line) = lines.next_line() {
            if let Some(summary) = assembler.apply_line(&line)? {
                log_debug!(
                    "feedback stream complete after {} records ({} chars)",
                    assembler.records_seen(),
                    summary.len()
                );
                return Ok(summary);
            }
        }
    }

    if let Some(tail) = lines.finish() {
        if let Some(summary) = assembler.apply_line(&tail)? {
            return Ok(summary);
        }
    }

    log_debug!(
        "feedback stream ended without complete record after {} records",
        assembler.records_seen()
    );
    assembler.finish()
}
