//! In-process transport.
//!
//! Serves requests with a handler closure instead of a child process and
//! records every call, which makes it the transport of choice for tests and
//! for embedding a native engine.

use crate::error::Fault;
use crate::transport::Transport;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};

type Handler = dyn Fn(&str, &[Value]) -> Result<Value, Fault> + Send + Sync;

/// One request observed by a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub command: String,
    pub args: Vec<Value>,
}

/// Transport answering through a closure.
pub struct MemoryTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<RecordedCall>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Snapshot of every call served so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of served calls for `command`.
    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.command == command)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for MemoryTransport {
    fn call(&self, command: &str, args: Vec<Value>) -> Result<Value, Fault> {
        if self.is_closed() {
            return Err(Fault::Closed("memory transport closed".into()));
        }
        self.calls.lock().push(RecordedCall {
            command: command.to_string(),
            args: args.clone(),
        });
        (self.handler)(command, &args)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
