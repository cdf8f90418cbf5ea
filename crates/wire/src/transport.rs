//! The transport contract used by the call dispatcher.

use crate::error::Fault;
use serde_json::Value;

/// A framed, bidirectional request/response stream to the engine.
///
/// Implementations must allow concurrent `call`s from different threads;
/// each call blocks its caller until the matching response arrives or the
/// channel fails.
pub trait Transport: Send + Sync {
    /// Perform one round trip: send `command(args)` and wait for its result.
    fn call(&self, command: &str, args: Vec<Value>) -> Result<Value, Fault>;

    /// Close the channel. Pending and later calls fail with [`Fault::Closed`].
    fn close(&self);
}
