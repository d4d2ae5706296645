//! Wires producer, splitter and store together.
//!
//! Stream events feed the splitter queue; matched lines are appended to
//! the store; when the splitter reports the end of the stream the first
//! page is loaded. Progress and outcomes are reported to a single observer
//! channel. The pipeline never holds on to anything belonging to the
//! observer beyond sending it a message.

use crate::error::{PipelineError, Result};
use crate::filter::Filter;
use crate::producer::source::ChunkSource;
use crate::producer::{StreamCanceller, StreamEvent, StreamHandle, StreamProducer};
use crate::splitter::{SplitterEvent, SplitterQueue};
use crate::store::PagedLogStore;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Notification sent to the pipeline observer
#[derive(Debug)]
pub enum PipelineEvent {
    /// Download progress in `[0, 1]`, 0 when the total size is unknown
    Progress(f32),
    /// A matched line could not be persisted
    WriteFailed(PipelineError),
    /// Every line was matched and persisted and the first page is loaded
    Finished { matched: usize },
    /// The stream failed; the splitter is left unflushed
    Failed(PipelineError),
    /// The stream was cancelled; the splitter is left unflushed
    Cancelled,
}

/// A running download-filter-persist pipeline.
pub struct Pipeline {
    canceller: StreamCanceller,
    splitter: Arc<SplitterQueue>,
}

impl Pipeline {
    pub fn start<S: ChunkSource>(
        source: S,
        filter: Arc<dyn Filter>,
        store: Arc<PagedLogStore>,
        chunk_size: usize,
        observer: Sender<PipelineEvent>,
    ) -> Result<Self> {
        info!(filter = %filter.description(), "pipeline starting");

        let (split_tx, split_rx) = channel();
        let splitter = Arc::new(SplitterQueue::spawn(filter, split_tx)?);

        let forward_observer = observer.clone();
        thread::Builder::new()
            .name("siftlog-forward".to_string())
            .spawn(move || forward_matches(split_rx, &store, &forward_observer))
            .map_err(|e| PipelineError::io("failed to spawn forwarding thread", e))?;

        let handle = StreamProducer::start(source, chunk_size)?;
        let canceller = handle.canceller();
        let pump_splitter = Arc::clone(&splitter);
        thread::Builder::new()
            .name("siftlog-pipeline".to_string())
            .spawn(move || pump_stream(handle, &pump_splitter, &observer))
            .map_err(|e| PipelineError::io("failed to spawn pipeline thread", e))?;

        Ok(Self {
            canceller,
            splitter,
        })
    }

    /// Stop the download. Buffered partial lines stay pending until [`finish`](Self::finish).
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Flush the splitter after a failure or cancellation.
    ///
    /// Fails with `InvalidState` if the splitter was already finished.
    pub fn finish(&self) -> Result<()> {
        self.splitter.finish()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

fn pump_stream(mut handle: StreamHandle, splitter: &SplitterQueue, observer: &Sender<PipelineEvent>) {
    while let Some(event) = handle.recv() {
        match event {
            StreamEvent::Progress(progress) => {
                let _ = observer.send(PipelineEvent::Progress(progress));
            }
            StreamEvent::Data(chunk) => {
                if let Err(e) = splitter.process(chunk) {
                    warn!(error = %e, "splitter refused chunk, cancelling stream");
                    handle.cancel();
                    let _ = observer.send(PipelineEvent::Failed(e));
                    return;
                }
            }
            StreamEvent::Finished => {
                if let Err(e) = splitter.finish() {
                    let _ = observer.send(PipelineEvent::Failed(e));
                }
                return;
            }
            StreamEvent::Failed(e) => {
                let _ = observer.send(PipelineEvent::Failed(e));
                return;
            }
        }
    }

    if handle.is_cancelled() {
        debug!("pipeline stream cancelled");
        let _ = observer.send(PipelineEvent::Cancelled);
    }
}

fn forward_matches(
    events: Receiver<SplitterEvent>,
    store: &PagedLogStore,
    observer: &Sender<PipelineEvent>,
) {
    let mut matched = 0usize;
    for event in events {
        match event {
            SplitterEvent::Matched(line) => {
                matched += 1;
                let observer = observer.clone();
                store.append(line, move |result| {
                    if let Err(e) = result {
                        let _ = observer.send(PipelineEvent::WriteFailed(e));
                    }
                });
            }
            SplitterEvent::Finished => {
                // Waits for every queued append and the first page
                if let Err(e) = store.load_next_page(|_| {}).and_then(|()| store.sync()) {
                    let _ = observer.send(PipelineEvent::WriteFailed(e));
                }
                info!(matched, "pipeline finished");
                let _ = observer.send(PipelineEvent::Finished { matched });
            }
        }
    }
}
