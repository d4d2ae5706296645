//! Incremental byte-stream producer.
//!
//! A producer pumps a [`ChunkSource`] on a background thread and delivers an
//! ordered event protocol over a channel: `Progress`/`Data` pairs, then
//! exactly one `Finished` or `Failed`. Cancellation is cooperative; once
//! [`StreamHandle::cancel`] returns, no further event is observable.
//!
//! A read already in progress cannot be interrupted. The source is dropped
//! as soon as that read returns; [`HttpSource`] bounds the wait with its
//! read timeout.

pub mod cancel;
pub mod source;

use crate::error::{PipelineError, Result};
use cancel::CancelToken;
use source::ChunkSource;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use source::{HttpSource, Opened, ReaderSource};

/// Default read size for a single chunk
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// How often a blocked [`StreamHandle::recv`] rechecks for cancellation
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Event delivered by a running producer
#[derive(Debug)]
pub enum StreamEvent {
    /// Fraction of the advertised total received so far (0 when unknown)
    Progress(f32),
    Data(Vec<u8>),
    Finished,
    Failed(PipelineError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finished | StreamEvent::Failed(_))
    }
}

/// State shared between the pump thread and every cancel handle.
///
/// `gate` serializes delivery against cancellation: the pump checks the
/// token and sends while holding it, and `cancel` flips the token while
/// holding it, so nothing is sent after `cancel` returns.
struct Shared {
    gate: Mutex<()>,
    token: CancelToken,
    terminal_sent: AtomicBool,
}

impl Shared {
    fn deliver(&self, tx: &Sender<StreamEvent>, event: StreamEvent) -> bool {
        let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if self.token.is_cancelled() {
            return false;
        }
        let terminal = event.is_terminal();
        if tx.send(event).is_err() {
            return false;
        }
        if terminal {
            self.terminal_sent.store(true, Ordering::SeqCst);
        }
        true
    }

    /// Returns `true` if this call actually cancelled a live stream.
    fn cancel(&self) -> bool {
        let _guard = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        if self.terminal_sent.load(Ordering::SeqCst) {
            return false;
        }
        self.token.cancel()
    }
}

/// Starts producers.
pub struct StreamProducer;

impl StreamProducer {
    /// Open `source` on a background thread and start delivering events.
    pub fn start<S: ChunkSource>(source: S, chunk_size: usize) -> Result<StreamHandle> {
        let (tx, rx) = channel();
        let shared = Arc::new(Shared {
            gate: Mutex::new(()),
            token: CancelToken::new(),
            terminal_sent: AtomicBool::new(false),
        });
        let pump_shared = Arc::clone(&shared);
        let chunk_size = chunk_size.max(1);

        thread::Builder::new()
            .name("siftlog-producer".to_string())
            .spawn(move || pump(source, chunk_size, &pump_shared, &tx))
            .map_err(|e| PipelineError::io("failed to spawn producer thread", e))?;

        Ok(StreamHandle {
            events: rx,
            shared,
            terminal_seen: false,
        })
    }
}

fn pump<S: ChunkSource>(source: S, chunk_size: usize, shared: &Shared, tx: &Sender<StreamEvent>) {
    let label = source.describe();
    info!(source = %label, "stream started");

    let Opened { mut reader, total } = match source.open() {
        Ok(opened) => opened,
        Err(e) => {
            warn!(source = %label, error = %e, "stream failed to open");
            shared.deliver(tx, StreamEvent::Failed(e));
            return;
        }
    };

    let mut buf = vec![0u8; chunk_size];
    let mut received = 0u64;

    loop {
        if shared.token.is_cancelled() {
            debug!(source = %label, received, "stream cancelled");
            return;
        }

        match reader.read(&mut buf) {
            Ok(_) if shared.token.is_cancelled() => {
                debug!(source = %label, received, "stream cancelled during read, releasing source");
                return;
            }
            Ok(0) => {
                info!(source = %label, received, "stream finished");
                shared.deliver(tx, StreamEvent::Finished);
                return;
            }
            Ok(n) => {
                received += n as u64;
                let progress = progress_fraction(received, total);
                if !shared.deliver(tx, StreamEvent::Progress(progress))
                    || !shared.deliver(tx, StreamEvent::Data(buf[..n].to_vec()))
                {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(source = %label, received, error = %e, "stream failed");
                shared.deliver(tx, StreamEvent::Failed(PipelineError::transport(e.to_string())));
                return;
            }
        }
    }
}

/// Received bytes over the advertised total, clamped to `[0, 1]`.
fn progress_fraction(received: u64, total: Option<u64>) -> f32 {
    match total {
        Some(total) if total > 0 => (received as f64 / total as f64).min(1.0) as f32,
        _ => 0.0,
    }
}

/// Consumer end of a running producer.
pub struct StreamHandle {
    events: Receiver<StreamEvent>,
    shared: Arc<Shared>,
    terminal_seen: bool,
}

impl StreamHandle {
    /// Block for the next event. `None` once the terminal event was
    /// consumed or the stream was cancelled.
    ///
    /// A cancel from another thread wakes a blocked call within
    /// a short poll interval, even while the source is stalled.
    pub fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            if self.is_closed() {
                return None;
            }
            match self.events.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(event) => return self.accept(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        if self.is_closed() {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => self.accept(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Stop delivery. No-op after the terminal event was produced.
    pub fn cancel(&self) {
        self.canceller().cancel();
        // Release chunks that were queued but will never be observed
        if self.shared.token.is_cancelled() {
            while self.events.try_recv().is_ok() {}
        }
    }

    /// A cloneable handle that can cancel this stream from another thread.
    pub fn canceller(&self) -> StreamCanceller {
        StreamCanceller {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    fn is_closed(&self) -> bool {
        self.terminal_seen || self.shared.token.is_cancelled()
    }

    fn accept(&mut self, event: StreamEvent) -> Option<StreamEvent> {
        // Events queued before a concurrent cancel are dropped
        if self.shared.token.is_cancelled() {
            return None;
        }
        if event.is_terminal() {
            self.terminal_seen = true;
        }
        Some(event)
    }
}

impl Iterator for StreamHandle {
    type Item = StreamEvent;

    fn next(&mut self) -> Option<StreamEvent> {
        self.recv()
    }
}

/// Cancels a stream from any thread.
#[derive(Clone)]
pub struct StreamCanceller {
    shared: Arc<Shared>,
}

impl StreamCanceller {
    pub fn cancel(&self) {
        if self.shared.cancel() {
            info!("stream cancel requested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    /// Reader that blocks forever after its payload until released
    struct StallingReader {
        payload: Option<Vec<u8>>,
        release: Receiver<()>,
    }

    impl Read for StallingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(payload) = self.payload.take() {
                buf[..payload.len()].copy_from_slice(&payload);
                return Ok(payload.len());
            }
            let _ = self.release.recv();
            Ok(0)
        }
    }

    /// Reader that fails after its payload
    struct FailingReader(Option<Vec<u8>>);

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.take() {
                Some(payload) => {
                    buf[..payload.len()].copy_from_slice(&payload);
                    Ok(payload.len())
                }
                None => Err(std::io::Error::new(
                    ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )),
            }
        }
    }

    fn drain(handle: StreamHandle) -> Vec<StreamEvent> {
        handle.collect()
    }

    #[test]
    fn test_event_protocol_order() {
        let source = ReaderSource::from_bytes("abcdefghij");
        let events = drain(StreamProducer::start(source, 4).unwrap());

        let data: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Data(chunk) => Some(chunk.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(data, b"abcdefghij");

        // Progress precedes each chunk
        assert!(matches!(events[0], StreamEvent::Progress(_)));
        assert!(matches!(events[1], StreamEvent::Data(_)));

        // Exactly one terminal event, last
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(events.last(), Some(StreamEvent::Finished)));
    }

    #[test]
    fn test_progress_is_monotonic_and_reaches_one() {
        let source = ReaderSource::from_bytes(vec![b'x'; 1000]);
        let progress: Vec<f32> = drain(StreamProducer::start(source, 64).unwrap())
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect();

        assert_eq!(progress.len(), 16);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(*progress.last().unwrap(), 1.0);
    }

    #[test]
    fn test_progress_unknown_total_is_zero() {
        let source = ReaderSource::new(Cursor::new(b"abc".to_vec()));
        let events = drain(StreamProducer::start(source, 2).unwrap());
        assert!(events.iter().all(|e| match e {
            StreamEvent::Progress(p) => *p == 0.0,
            _ => true,
        }));
    }

    #[test]
    fn test_progress_clamped_when_total_understated() {
        assert_eq!(progress_fraction(150, Some(100)), 1.0);
        assert_eq!(progress_fraction(50, Some(100)), 0.5);
        assert_eq!(progress_fraction(50, Some(0)), 0.0);
        assert_eq!(progress_fraction(50, None), 0.0);
    }

    #[test]
    fn test_empty_source_finishes_without_data() {
        let events = drain(StreamProducer::start(ReaderSource::from_bytes(""), 16).unwrap());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Finished));
    }

    #[test]
    fn test_read_error_is_terminal_failure() {
        let source = ReaderSource::new(FailingReader(Some(b"partial".to_vec())));
        let events = drain(StreamProducer::start(source, 16).unwrap());

        assert!(matches!(events[1], StreamEvent::Data(ref d) if d == b"partial"));
        match events.last() {
            Some(StreamEvent::Failed(PipelineError::Transport { message })) => {
                assert!(message.contains("reset"));
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::Finished)));
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let (release_tx, release_rx) = channel();
        let source = ReaderSource::new(StallingReader {
            payload: Some(b"first chunk".to_vec()),
            release: release_rx,
        });
        let mut handle = StreamProducer::start(source, 64).unwrap();

        assert!(matches!(handle.recv(), Some(StreamEvent::Progress(_))));
        assert!(matches!(handle.recv(), Some(StreamEvent::Data(_))));

        handle.cancel();
        assert!(handle.is_cancelled());

        // Unblock the reader: it would now report end of stream
        release_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(handle.try_recv().is_none());
        assert!(handle.recv().is_none());
    }

    #[test]
    fn test_cancel_after_finish_is_noop() {
        let mut handle = StreamProducer::start(ReaderSource::from_bytes("ab"), 16).unwrap();

        // Wait until the producer has delivered its terminal event
        let mut events = Vec::new();
        while let Some(event) = handle.recv() {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }

        handle.cancel();
        handle.cancel();
        assert!(!handle.is_cancelled());
        assert!(matches!(events.last(), Some(StreamEvent::Finished)));
        assert!(handle.recv().is_none());
    }

    #[test]
    fn test_canceller_works_across_threads() {
        let (_release_tx, release_rx) = channel();
        let source = ReaderSource::new(StallingReader {
            payload: None,
            release: release_rx,
        });
        let handle = StreamProducer::start(source, 64).unwrap();
        let canceller = handle.canceller();

        thread::spawn(move || canceller.cancel()).join().unwrap();
        assert!(handle.is_cancelled());
    }

    /// Stalling reader that records when it is dropped
    struct TrackedReader {
        inner: StallingReader,
        dropped: Arc<AtomicBool>,
    }

    impl Read for TrackedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Drop for TrackedReader {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < limit {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_cancel_wakes_blocked_recv() {
        let (_release_tx, release_rx) = channel();
        let source = ReaderSource::new(StallingReader {
            payload: None,
            release: release_rx,
        });
        let mut handle = StreamProducer::start(source, 64).unwrap();
        let canceller = handle.canceller();

        let consumer = thread::spawn(move || handle.recv().is_none());
        thread::sleep(Duration::from_millis(100));

        let start = std::time::Instant::now();
        canceller.cancel();
        assert!(consumer.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_source_dropped_once_stalled_read_returns() {
        let (release_tx, release_rx) = channel();
        let dropped = Arc::new(AtomicBool::new(false));
        let source = ReaderSource::new(TrackedReader {
            inner: StallingReader {
                payload: Some(b"chunk".to_vec()),
                release: release_rx,
            },
            dropped: Arc::clone(&dropped),
        });
        let mut handle = StreamProducer::start(source, 64).unwrap();
        assert!(matches!(handle.recv(), Some(StreamEvent::Progress(_))));
        assert!(matches!(handle.recv(), Some(StreamEvent::Data(_))));

        handle.cancel();
        release_tx.send(()).unwrap();

        assert!(wait_until(Duration::from_secs(2), || dropped.load(Ordering::SeqCst)));
        assert!(handle.recv().is_none());
    }
}
