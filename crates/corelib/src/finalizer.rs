//! Finalization queue.
//!
//! A single background worker drains remote ids whose proxies became
//! unreachable and releases them on the engine. Release failures are logged
//! and skipped; the worker only stops on shutdown.

use crate::dispatcher::Dispatcher;
use crate::handle::RemoteId;
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

enum Notice {
    Unreachable(RemoteId),
    Shutdown,
}

/// Sending side of the queue, handed to the registry.
#[derive(Clone)]
pub(crate) struct FinalizationQueue {
    tx: Sender<Notice>,
}

impl FinalizationQueue {
    pub(crate) fn push(&self, remote_id: RemoteId) {
        if self.tx.send(Notice::Unreachable(remote_id)).is_err() {
            trace!(%remote_id, "finalizer gone, drop notice discarded");
        }
    }
}

/// The drain worker.
pub(crate) struct Finalizer {
    queue: FinalizationQueue,
    worker: Option<JoinHandle<()>>,
}

impl Finalizer {
    /// Start the worker releasing ids through `dispatcher`.
    pub(crate) fn start(dispatcher: Arc<Dispatcher>) -> Self {
        let (tx, rx) = channel::unbounded();
        let worker = thread::Builder::new()
            .name("umi-finalizer".into())
            .spawn(move || drain(rx, dispatcher));
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "cannot start finalizer, remote objects will leak");
                None
            }
        };
        Self {
            queue: FinalizationQueue { tx },
            worker,
        }
    }

    pub(crate) fn queue(&self) -> FinalizationQueue {
        self.queue.clone()
    }

    /// Push the sentinel and wait for the worker to exit.
    pub(crate) fn shutdown(mut self) {
        let _ = self.queue.tx.send(Notice::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("finalizer worker panicked");
            }
        }
    }
}

fn drain(rx: Receiver<Notice>, dispatcher: Arc<Dispatcher>) {
    for notice in rx.iter() {
        let remote_id = match notice {
            Notice::Shutdown => break,
            Notice::Unreachable(remote_id) => remote_id,
        };
        if dispatcher.is_closed() {
            trace!(%remote_id, "session closed, release skipped");
            continue;
        }
        match dispatcher.release(remote_id) {
            Ok(()) => {
                trace!(%remote_id, "remote object released");
                metrics::counter!("umi.bridge.released").increment(1);
            }
            Err(e) => warn!(%remote_id, error = %e, "failed to release remote object"),
        }
    }
    debug!("finalizer stopped");
}
