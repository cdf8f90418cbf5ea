//! Call dispatcher.
//!
//! Turns one command into one synchronous round trip over the transport and
//! maps faults onto [`BridgeError`]. The dispatcher holds no per-call state;
//! concurrent callers only share the transport.
//!
//! A transport failure (engine exit, broken pipe) closes the dispatcher for
//! good: every later call fails with [`BridgeError::SessionClosed`] without
//! touching the transport.

use crate::error::{BridgeError, Result};
use crate::handle::RemoteId;
use serde_json::{json, Value as Json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};
use umi_wire::Transport;

/// Engine command releasing remote objects.
pub const RELEASE_COMMAND: &str = "drop_objects";

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    closed: Arc<AtomicBool>,
    trace: AtomicBool,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            closed: Arc::new(AtomicBool::new(false)),
            trace: AtomicBool::new(false),
        }
    }

    /// Perform `command(args)` and block until the engine answers.
    pub fn call(&self, command: &str, args: Vec<Json>) -> Result<Json> {
        if self.is_closed() {
            return Err(BridgeError::SessionClosed);
        }
        metrics::counter!("umi.bridge.calls").increment(1);
        let traced = self.trace.load(Ordering::Relaxed);
        if traced {
            debug!(">> {command}({args:?})");
        } else {
            trace!(command, "bridge call");
        }

        match self.transport.call(command, args) {
            Ok(result) => {
                if traced {
                    debug!("<< {result}");
                }
                Ok(result)
            }
            Err(fault) => {
                let err = BridgeError::from(fault);
                if err.is_fatal() && !self.closed.swap(true, Ordering::AcqRel) {
                    error!(command, "transport failed, bridge session closed");
                }
                if traced {
                    debug!("<< error {err}");
                }
                Err(err)
            }
        }
    }

    /// Ask the engine to drop one object.
    pub fn release(&self, remote_id: RemoteId) -> Result<()> {
        self.call(RELEASE_COMMAND, vec![json!(remote_id.0)])
            .map(|_| ())
    }

    /// Close the transport. Returns false if already closed.
    pub fn close(&self) -> bool {
        let was_open = !self.closed.swap(true, Ordering::AcqRel);
        self.transport.close();
        was_open
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shared closed flag, observed by the registry.
    pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    /// Set trace mode, returning the previous state.
    pub fn set_trace(&self, on: bool) -> bool {
        self.trace.swap(on, Ordering::Relaxed)
    }
}
