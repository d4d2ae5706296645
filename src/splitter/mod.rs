//! Incremental line reassembly.
//!
//! Chunks arrive with arbitrary boundaries; the splitter keeps the
//! unterminated suffix between calls and emits every complete line whose
//! text matches the configured filter. Lines are forwarded as the original
//! bytes, never as the decoded text used for matching.

pub mod queue;

use crate::error::{PipelineError, Result};
use crate::filter::Filter;
use memchr::memchr2_iter;
use std::sync::Arc;

pub use queue::{SplitterEvent, SplitterQueue};

/// Synchronous line splitter with wildcard filtering.
pub struct LineSplitter {
    filter: Arc<dyn Filter>,
    /// Bytes received since the last line boundary
    tail: Vec<u8>,
    /// Previous chunk ended with CR; a leading LF in the next chunk belongs to it
    pending_cr: bool,
    /// Total bytes received over the stream's lifetime
    bytes_seen: u64,
    finished: bool,
}

impl LineSplitter {
    pub fn new(filter: Arc<dyn Filter>) -> Self {
        Self {
            filter,
            tail: Vec::new(),
            pending_cr: false,
            bytes_seen: 0,
            finished: false,
        }
    }

    /// Feed the next chunk of the stream.
    ///
    /// `emit` receives every complete line that matches the filter, in stream order.
    pub fn process<F>(&mut self, chunk: &[u8], emit: &mut F) -> Result<()>
    where
        F: FnMut(Vec<u8>),
    {
        if self.finished {
            return Err(PipelineError::invalid_state("process", "stream finished"));
        }
        self.bytes_seen += chunk.len() as u64;

        let mut data = chunk;
        if self.pending_cr && !data.is_empty() {
            self.pending_cr = false;
            if data[0] == b'\n' {
                data = &data[1..];
            }
        }

        let mut start = 0usize;
        for pos in memchr2_iter(b'\n', b'\r', data) {
            // LF already consumed as the second half of a CRLF
            if pos < start {
                continue;
            }
            self.complete_line(&data[start..pos], emit);
            start = pos + 1;

            if data[pos] == b'\r' {
                match data.get(pos + 1) {
                    Some(b'\n') => start = pos + 2,
                    Some(_) => {}
                    None => self.pending_cr = true,
                }
            }
        }

        self.tail.extend_from_slice(&data[start..]);
        Ok(())
    }

    /// Flush the pending tail as the final line and close the splitter.
    ///
    /// A stream that never delivered a single byte produces no final line.
    pub fn finish<F>(&mut self, emit: &mut F) -> Result<()>
    where
        F: FnMut(Vec<u8>),
    {
        if self.finished {
            return Err(PipelineError::invalid_state("finish", "stream finished"));
        }
        self.finished = true;
        self.pending_cr = false;

        let tail = std::mem::take(&mut self.tail);
        if self.bytes_seen > 0 {
            self.process_line(tail, emit);
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Length of the unterminated suffix currently buffered.
    pub fn pending_len(&self) -> usize {
        self.tail.len()
    }

    fn complete_line<F>(&mut self, segment: &[u8], emit: &mut F)
    where
        F: FnMut(Vec<u8>),
    {
        let mut line = std::mem::take(&mut self.tail);
        line.extend_from_slice(segment);
        self.process_line(line, emit);
    }

    fn process_line<F>(&self, line: Vec<u8>, emit: &mut F)
    where
        F: FnMut(Vec<u8>),
    {
        let text = String::from_utf8_lossy(&line);
        if self.filter.matches(&text) {
            emit(line);
        }
    }
}
