//! Elastic worker pool with parallel map and group-by helpers.
//!
//! Workers are spawned on demand up to `max_workers` and exit after
//! `keep_alive_ms` without work. [`WorkerPool::execute`] is fire-and-forget,
//! which lets callers stop waiting early while submitted jobs finish in the
//! background. [`WorkerPool::map`] and [`WorkerPool::group_by`] block until
//! every item has been processed.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Thread name prefix.
    pub name: String,
    pub max_workers: usize,
    /// Idle time before a worker exits.
    pub keep_alive_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "umi-pool".to_string(),
            max_workers: 64,
            keep_alive_ms: 30_000,
        }
    }
}

struct Shared {
    jobs: Receiver<Job>,
    live: AtomicUsize,
    idle: AtomicUsize,
    /// Jobs sent but not yet picked up by a worker.
    queued: AtomicUsize,
    spawned: AtomicUsize,
    config: PoolConfig,
}

impl Shared {
    /// Reserve a worker slot if the pool is below its limit.
    fn reserve(&self) -> bool {
        let max = self.config.max_workers.max(1);
        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live >= max {
                return false;
            }
            match self
                .live
                .compare_exchange(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(current) => live = current,
            }
        }
    }
}

/// Cloneable handle to a shared pool.
#[derive(Clone)]
pub struct WorkerPool {
    submit: Sender<Job>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        let (submit, jobs) = channel::unbounded();
        Self {
            submit,
            shared: Arc::new(Shared {
                jobs,
                live: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
                config,
            }),
        }
    }

    /// Workers currently alive.
    pub fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Queue `job` and make sure someone will run it.
    ///
    /// A new worker starts whenever queued jobs outnumber idle workers, so a
    /// burst fans out up to `max_workers` even when some workers are warm.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let queued = self.shared.queued.fetch_add(1, Ordering::AcqRel) + 1;
        if self.submit.send(Box::new(job)).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        if queued > self.shared.idle.load(Ordering::Acquire) && self.shared.reserve() {
            self.spawn_worker();
        }
    }

    /// Apply `f` to every item in parallel and collect results in input order.
    ///
    /// A slot is `None` if its job panicked.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<Option<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let count = items.len();
        let f = Arc::new(f);
        let (done, results) = channel::unbounded();
        for (index, item) in items.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let done = done.clone();
            self.execute(move || {
                let _ = done.send((index, f(item)));
            });
        }
        drop(done);

        let mut out: Vec<Option<R>> = (0..count).map(|_| None).collect();
        // ends early only when every remaining job panicked
        for (index, value) in results.iter().take(count) {
            out[index] = Some(value);
        }
        out
    }

    /// Group items by a key computed in parallel. Group order follows input order.
    pub fn group_by<T, K, F>(&self, items: Vec<T>, key: F) -> HashMap<K, Vec<T>>
    where
        T: Send + 'static,
        K: Eq + Hash + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let keyed = self.map(items, move |item| (key(&item), item));
        let mut groups: HashMap<K, Vec<T>> = HashMap::new();
        for (k, item) in keyed.into_iter().flatten() {
            groups.entry(k).or_default().push(item);
        }
        groups
    }

    fn spawn_worker(&self) {
        let shared = Arc::clone(&self.shared);
        let n = shared.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{n}", shared.config.name);
        let spawned = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(shared));
        if let Err(e) = spawned {
            self.shared.live.fetch_sub(1, Ordering::AcqRel);
            warn!(error = %e, "cannot start pool worker");
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let keep_alive = Duration::from_millis(shared.config.keep_alive_ms);
    loop {
        shared.idle.fetch_add(1, Ordering::AcqRel);
        let next = shared.jobs.recv_timeout(keep_alive);
        shared.idle.fetch_sub(1, Ordering::AcqRel);
        match next {
            Ok(job) => {
                shared.queued.fetch_sub(1, Ordering::AcqRel);
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!("pool job panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                shared.live.fetch_sub(1, Ordering::AcqRel);
                // a job may have been queued while we were leaving
                if shared.jobs.is_empty() || !shared.reserve() {
                    trace!("idle worker exiting");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                shared.live.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}
