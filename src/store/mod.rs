//! Durable, paginated log of matched lines.
//!
//! Records are written as raw bytes followed by a single LF. An in-memory
//! offset index maps record number to the byte offset where the record
//! starts, and pages are re-read from disk on demand through independent
//! read handles so the full result set never has to sit in memory.

pub mod paged;

use crate::error::{PipelineError, Result};
use encoding_rs::Encoding;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub use paged::PagedLogStore;

/// Number of records per page
pub const PAGE_SIZE: usize = 100;

/// Bytes read per record when loading a page. Longer records are truncated.
pub const READ_WINDOW: usize = 200;

/// Default legacy encoding used to decode persisted records
pub fn default_encoding() -> &'static Encoding {
    encoding_rs::WINDOWS_1251
}

/// One loaded page of decoded records
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Zero-based page number
    pub index: usize,
    /// Successfully decoded lines, in record order
    pub lines: Vec<String>,
    /// Records in the window that could not be read or decoded
    pub skipped: usize,
}

/// Synchronous store core. Not thread-safe on its own; see [`PagedLogStore`].
pub struct LogStore {
    path: PathBuf,
    writer: Option<File>,
    /// Byte offset of every record, in write order
    offsets: Vec<u64>,
    /// Index of the next page to load
    page_cursor: usize,
    encoding: &'static Encoding,
}

impl LogStore {
    /// Create or truncate the durable target at `path`.
    pub fn open<P: AsRef<Path>>(path: P, encoding: &'static Encoding) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = create_target(&path)?;
        info!(path = %path.display(), encoding = encoding.name(), "results log opened");

        Ok(Self {
            path,
            writer: Some(writer),
            offsets: Vec::new(),
            page_cursor: 0,
            encoding,
        })
    }

    /// Append one record and return the offset it was written at.
    ///
    /// The offset is recorded in the index only after the write succeeded.
    pub fn append(&mut self, line: &[u8]) -> Result<u64> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PipelineError::invalid_state("append", "results log was closed"))?;

        let offset = writer
            .stream_position()
            .map_err(|e| PipelineError::io("failed to query results log position", e))?;

        let mut record = Vec::with_capacity(line.len() + 1);
        record.extend_from_slice(line);
        record.push(b'\n');
        writer
            .write_all(&record)
            .map_err(|e| PipelineError::io("failed to write results log", e))?;

        self.offsets.push(offset);
        Ok(offset)
    }

    /// Load the next window of up to [`PAGE_SIZE`] records.
    ///
    /// Returns `None` without moving the cursor when every record has
    /// already been paged in.
    pub fn load_next_page(&mut self) -> Option<Page> {
        let start = self.page_cursor.saturating_mul(PAGE_SIZE);
        let end = start.saturating_add(PAGE_SIZE).min(self.offsets.len());
        if start >= end {
            return None;
        }

        let mut page = Page {
            index: self.page_cursor,
            lines: Vec::with_capacity(end - start),
            skipped: 0,
        };

        for &offset in &self.offsets[start..end] {
            match self.read_record(offset) {
                Ok(line) => page.lines.push(line),
                Err(e) => {
                    warn!(offset, error = %e, "skipping unreadable record");
                    page.skipped += 1;
                }
            }
        }

        self.page_cursor += 1;
        debug!(
            page = page.index,
            lines = page.lines.len(),
            skipped = page.skipped,
            "page loaded"
        );
        Some(page)
    }

    /// Forget every record and start over on a freshly truncated target.
    pub fn reset(&mut self) -> Result<()> {
        self.offsets.clear();
        self.page_cursor = 0;
        self.writer = None;
        self.writer = Some(create_target(&self.path)?);
        info!(path = %self.path.display(), "results log reset");
        Ok(())
    }

    /// Release the write handle. Later appends fail.
    pub fn close(&mut self) {
        if self.writer.take().is_some() {
            info!(path = %self.path.display(), records = self.offsets.len(), "results log closed");
        }
    }

    /// Flush written records to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .sync_data()
                .map_err(|e| PipelineError::io("failed to sync results log", e)),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn page_cursor(&self) -> usize {
        self.page_cursor
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read one record through an independent handle.
    ///
    /// At most [`READ_WINDOW`] bytes are read; the record ends at the first
    /// LF in that window, or at the window's end when there is none.
    fn read_record(&self, offset: u64) -> Result<String> {
        let mut file = File::open(&self.path)
            .map_err(|e| PipelineError::io("failed to open results log for reading", e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| PipelineError::io("failed to seek results log", e))?;

        let mut window = Vec::with_capacity(READ_WINDOW);
        file.take(READ_WINDOW as u64)
            .read_to_end(&mut window)
            .map_err(|e| PipelineError::io("failed to read results log", e))?;

        if let Some(newline) = memchr::memchr(b'\n', &window) {
            window.truncate(newline);
        }

        self.encoding
            .decode_without_bom_handling_and_without_replacement(&window)
            .map(|text| text.into_owned())
            .ok_or(PipelineError::Decode { offset })
    }
}

fn create_target(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            PipelineError::io(format!("failed to create {}", parent.display()), e)
        })?;
    }
    File::create(path)
        .map_err(|e| PipelineError::io(format!("failed to open {}", path.display()), e))
}
