use super::{LogStore, Page};
use crate::error::{PipelineError, Result};
use encoding_rs::Encoding;
use std::path::Path;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::warn;

type AppendDone = Box<dyn FnOnce(Result<u64>) + Send>;
type PageDone = Box<dyn FnOnce(&Page) + Send>;

enum Command {
    Append { line: Vec<u8>, done: AppendDone },
    LoadPage { done: PageDone },
    Reset { reply: Sender<Result<()>> },
    Sync { reply: Sender<Result<()>> },
    Close { reply: Sender<()> },
}

/// [`LogStore`] behind a single serialized work queue.
///
/// Appends, page loads, resets and closes run on one worker thread in
/// submission order. Appends and page loads complete through callbacks
/// invoked on that worker; `reset`, `sync` and `close` wait for their turn
/// in the queue and return the outcome directly.
pub struct PagedLogStore {
    commands: Option<Sender<Command>>,
    displayed: Arc<Mutex<Vec<String>>>,
    worker: Option<JoinHandle<()>>,
}

impl PagedLogStore {
    /// Create or truncate the results log at `path` and start the worker.
    pub fn open<P: AsRef<Path>>(path: P, encoding: &'static Encoding) -> Result<Self> {
        let store = LogStore::open(path, encoding)?;
        let displayed = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = channel::<Command>();
        let worker_displayed = Arc::clone(&displayed);

        let worker = thread::Builder::new()
            .name("siftlog-store".to_string())
            .spawn(move || {
                let mut store = store;
                for command in rx {
                    run_command(&mut store, &worker_displayed, command);
                }
                store.close();
            })
            .map_err(|e| PipelineError::io("failed to spawn store thread", e))?;

        Ok(Self {
            commands: Some(tx),
            displayed,
            worker: Some(worker),
        })
    }

    /// Queue a record for writing. `on_done` receives its offset or the write error.
    pub fn append<F>(&self, line: Vec<u8>, on_done: F)
    where
        F: FnOnce(Result<u64>) + Send + 'static,
    {
        let command = Command::Append {
            line,
            done: Box::new(on_done),
        };
        if let Err(Command::Append { done, .. }) = self.submit(command) {
            done(Err(stopped("append")));
        }
    }

    /// Queue loading of the next page.
    ///
    /// The page is appended to [`displayed_lines`](Self::displayed_lines)
    /// before `on_done` runs. When every record is already displayed this is
    /// a no-op and `on_done` is never invoked.
    ///
    /// Fails with `InvalidState` when the worker has stopped, so a dropped
    /// request is not mistaken for the no-op case.
    pub fn load_next_page<F>(&self, on_done: F) -> Result<()>
    where
        F: FnOnce(&Page) + Send + 'static,
    {
        let command = Command::LoadPage {
            done: Box::new(on_done),
        };
        if self.submit(command).is_err() {
            warn!("page load dropped, store worker stopped");
            return Err(stopped("load page"));
        }
        Ok(())
    }

    /// Clear displayed lines, the offset index and the page cursor, and
    /// truncate the results log. Runs after everything queued before it.
    pub fn reset(&self) -> Result<()> {
        let (reply, rx) = channel();
        self.submit(Command::Reset { reply })
            .map_err(|_| stopped("reset"))?;
        rx.recv().map_err(|_| stopped("reset"))?
    }

    /// Wait until queued work is done and flush the results log to disk.
    pub fn sync(&self) -> Result<()> {
        let (reply, rx) = channel();
        self.submit(Command::Sync { reply })
            .map_err(|_| stopped("sync"))?;
        rx.recv().map_err(|_| stopped("sync"))?
    }

    /// Release the write handle once queued work is done. Later appends fail.
    pub fn close(&self) {
        let (reply, rx) = channel();
        if self.submit(Command::Close { reply }).is_ok() {
            let _ = rx.recv();
        }
    }

    /// Snapshot of every line paged in since the last reset.
    pub fn displayed_lines(&self) -> Vec<String> {
        lock(&self.displayed).clone()
    }

    pub fn displayed_len(&self) -> usize {
        lock(&self.displayed).len()
    }

    fn submit(&self, command: Command) -> std::result::Result<(), Command> {
        match self.commands.as_ref() {
            Some(tx) => tx.send(command).map_err(|e| e.0),
            None => Err(command),
        }
    }
}

impl Drop for PagedLogStore {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_command(store: &mut LogStore, displayed: &Mutex<Vec<String>>, command: Command) {
    match command {
        Command::Append { line, done } => {
            let result = store.append(&line);
            if let Err(ref e) = result {
                warn!(error = %e, "append failed");
            }
            done(result);
        }
        Command::LoadPage { done } => {
            if let Some(page) = store.load_next_page() {
                lock(displayed).extend(page.lines.iter().cloned());
                done(&page);
            }
        }
        Command::Reset { reply } => {
            lock(displayed).clear();
            let _ = reply.send(store.reset());
        }
        Command::Sync { reply } => {
            let _ = reply.send(store.sync());
        }
        Command::Close { reply } => {
            store.close();
            let _ = reply.send(());
        }
    }
}

fn lock(displayed: &Mutex<Vec<String>>) -> MutexGuard<'_, Vec<String>> {
    displayed.lock().unwrap_or_else(|e| e.into_inner())
}

fn stopped(operation: &'static str) -> PipelineError {
    PipelineError::invalid_state(operation, "store worker stopped")
}
