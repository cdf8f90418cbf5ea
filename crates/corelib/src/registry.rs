//! Reference registry.
//!
//! Caches one live proxy per remote id so that every call returning the same
//! remote object yields the same local instance while that instance is
//! reachable.
//!
//! # Invariants
//!
//! - Lookup, creation and insertion happen under one mutex.
//! - The cache holds weak entries only; it never keeps a proxy alive.
//! - An unreachable notice releases the remote object only if the cache
//!   entry still belongs to the dropped instance. A notice from an instance
//!   that was already superseded by a newer proxy for the same id is
//!   ignored, so each remote lifetime is released at most once.
//! - Notices arriving after the session closed are discarded.

use crate::finalizer::FinalizationQueue;
use crate::handle::{RemoteHandle, RemoteId};
use crate::proxy::{Proxy, ProxyInner};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

pub(crate) struct Registry {
    cache: Mutex<HashMap<RemoteId, Weak<ProxyInner>>>,
    queue: FinalizationQueue,
    closed: Arc<AtomicBool>,
}

impl Registry {
    pub(crate) fn new(queue: FinalizationQueue, closed: Arc<AtomicBool>) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            queue,
            closed,
        }
    }

    /// Return the live proxy for `handle`, or create and cache one with `build`.
    pub(crate) fn register<F>(&self, handle: RemoteHandle, build: F) -> Proxy
    where
        F: FnOnce(RemoteHandle) -> Proxy,
    {
        let mut cache = self.cache.lock();
        let remote_id = handle.remote_id;
        if let Some(live) = cache.get(&remote_id).and_then(|weak| weak.upgrade()) {
            return Proxy::from_inner(live);
        }
        trace!(%remote_id, class = %handle.type_name, "new proxy");
        let proxy = build(handle);
        cache.insert(remote_id, proxy.downgrade());
        proxy
    }

    /// Live cached proxy for `remote_id`, without any remote call.
    pub(crate) fn find(&self, remote_id: RemoteId) -> Option<Proxy> {
        self.cache
            .lock()
            .get(&remote_id)
            .and_then(|weak| weak.upgrade())
            .map(Proxy::from_inner)
    }

    /// Number of cache entries whose proxy is still reachable.
    pub(crate) fn live_count(&self) -> usize {
        self.cache
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Called from the proxy's `Drop`; `instance` identifies the dropped proxy.
    pub(crate) fn notify_unreachable(&self, remote_id: RemoteId, instance: *const ProxyInner) {
        {
            let mut cache = self.cache.lock();
            let owned = cache
                .get(&remote_id)
                .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), instance));
            if !owned {
                trace!(%remote_id, "superseded proxy dropped");
                return;
            }
            cache.remove(&remote_id);
        }
        if self.closed.load(Ordering::Acquire) {
            trace!(%remote_id, "session closed, drop notice discarded");
            return;
        }
        self.queue.push(remote_id);
    }
}
