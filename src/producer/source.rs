//! Byte sources a [`StreamProducer`](super::StreamProducer) can pump.

use crate::error::{PipelineError, Result};
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// An opened byte stream plus the size the source advertised for it.
pub struct Opened {
    pub reader: Box<dyn Read + Send>,
    /// Advertised total size in bytes, if known
    pub total: Option<u64>,
}

/// Something that can be opened into a readable byte stream.
///
/// `open` runs on the producer thread, so it may block.
pub trait ChunkSource: Send + 'static {
    fn open(self) -> Result<Opened>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Source backed by any reader (files, in-memory buffers, pipes).
pub struct ReaderSource<R> {
    reader: R,
    total: Option<u64>,
}

impl<R: Read + Send + 'static> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            total: None,
        }
    }

    /// Advertise a total size so progress can be computed.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }
}

impl ReaderSource<std::io::Cursor<Vec<u8>>> {
    /// In-memory source that advertises its exact length.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let total = bytes.len() as u64;
        Self::new(std::io::Cursor::new(bytes)).with_total(total)
    }
}

impl<R: Read + Send + 'static> ChunkSource for ReaderSource<R> {
    fn open(self) -> Result<Opened> {
        Ok(Opened {
            reader: Box::new(self.reader),
            total: self.total,
        })
    }

    fn describe(&self) -> String {
        "reader".to_string()
    }
}

/// HTTP(S) GET source.
///
/// A non-success status is reported as a transport error before any data
/// is delivered. `Content-Length`, when present, is the advertised total.
/// A body read that stalls longer than the read timeout fails the stream.
pub struct HttpSource {
    url: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl ChunkSource for HttpSource {
    fn open(self) -> Result<Opened> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.connect_timeout)
            // The blocking client applies this per body read, not to the whole download
            .timeout(self.read_timeout)
            .build()?;

        let response = client.get(&self.url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::transport(format!(
                "{} responded with {}",
                self.url, status
            )));
        }

        let total = response.content_length();
        debug!(url = %self.url, ?total, "http stream opened");

        Ok(Opened {
            reader: Box::new(response),
            total,
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
