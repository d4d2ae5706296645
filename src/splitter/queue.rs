use super::LineSplitter;
use crate::error::{PipelineError, Result};
use crate::filter::Filter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Notifications delivered to the consumer of a splitter queue
#[derive(Debug)]
pub enum SplitterEvent {
    /// A line matched the filter (original bytes, no boundary bytes)
    Matched(Vec<u8>),
    /// No more lines will follow
    Finished,
}

enum Command {
    Chunk(Vec<u8>),
    Finish,
}

/// Serialized work queue around a [`LineSplitter`].
///
/// `process` and `finish` return immediately; the splitter runs on its own
/// thread and handles commands strictly in submission order. Results are
/// delivered on the event channel handed to [`SplitterQueue::spawn`].
pub struct SplitterQueue {
    commands: Option<Sender<Command>>,
    finish_requested: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SplitterQueue {
    pub fn spawn(filter: Arc<dyn Filter>, events: Sender<SplitterEvent>) -> Result<Self> {
        let (tx, rx) = channel::<Command>();

        let worker = thread::Builder::new()
            .name("siftlog-splitter".to_string())
            .spawn(move || {
                let mut splitter = LineSplitter::new(filter);
                let mut emit = |line: Vec<u8>| {
                    let _ = events.send(SplitterEvent::Matched(line));
                };

                for command in rx {
                    let result = match command {
                        Command::Chunk(chunk) => splitter.process(&chunk, &mut emit),
                        Command::Finish => splitter.finish(&mut emit).map(|()| {
                            debug!(bytes = splitter.bytes_seen(), "splitter finished");
                            let _ = events.send(SplitterEvent::Finished);
                        }),
                    };
                    if let Err(e) = result {
                        warn!(error = %e, "splitter rejected command");
                    }
                }
            })
            .map_err(|e| PipelineError::io("failed to spawn splitter thread", e))?;

        Ok(Self {
            commands: Some(tx),
            finish_requested: Arc::new(AtomicBool::new(false)),
            worker: Some(worker),
        })
    }

    /// Queue the next chunk of the stream.
    pub fn process(&self, chunk: Vec<u8>) -> Result<()> {
        if self.finish_requested.load(Ordering::SeqCst) {
            return Err(PipelineError::invalid_state("process", "stream finished"));
        }
        self.submit(Command::Chunk(chunk))
    }

    /// Queue the final flush. The consumer receives [`SplitterEvent::Finished`]
    /// once every previously queued chunk has been handled.
    pub fn finish(&self) -> Result<()> {
        if self.finish_requested.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::invalid_state("finish", "stream finished"));
        }
        self.submit(Command::Finish)
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .and_then(|tx| tx.send(command).ok())
            .ok_or_else(|| PipelineError::invalid_state("submit work", "splitter stopped"))
    }
}

impl Drop for SplitterQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::wildcard::WildcardFilter;
    use std::sync::mpsc::Receiver;
    use std::time::Duration;

    fn queue(pattern: &str) -> (SplitterQueue, Receiver<SplitterEvent>) {
        let (tx, rx) = channel();
        let q = SplitterQueue::spawn(Arc::new(WildcardFilter::new(pattern)), tx).unwrap();
        (q, rx)
    }

    fn collect_until_finished(rx: &Receiver<SplitterEvent>) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).expect("splitter stalled") {
                SplitterEvent::Matched(line) => lines.push(line),
                SplitterEvent::Finished => return lines,
            }
        }
    }

    #[test]
    fn test_lines_arrive_in_stream_order() {
        let (q, rx) = queue("line *");
        for i in 0..50 {
            q.process(format!("line {}\n", i).into_bytes()).unwrap();
        }
        q.process(b"skip me\nline tail".to_vec()).unwrap();
        q.finish().unwrap();

        let lines = collect_until_finished(&rx);
        assert_eq!(lines.len(), 51);
        assert_eq!(lines[0], b"line 0");
        assert_eq!(lines[49], b"line 49");
        assert_eq!(lines[50], b"line tail");
    }

    #[test]
    fn test_finished_is_delivered_once() {
        let (q, rx) = queue("*");
        q.process(b"a\nb".to_vec()).unwrap();
        q.finish().unwrap();
        assert!(q.finish().is_err());

        let lines = collect_until_finished(&rx);
        assert_eq!(lines, vec![b"a".to_vec(), b"b".to_vec()]);

        drop(q);
        // Worker has exited; nothing else was emitted
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_process_after_finish_is_reported() {
        let (q, _rx) = queue("*");
        q.finish().unwrap();
        let err = q.process(b"late".to_vec()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidState {
                operation: "process",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_stream_finishes_without_lines() {
        let (q, rx) = queue("*");
        q.finish().unwrap();
        assert!(collect_until_finished(&rx).is_empty());
    }
}
