//! Error types for the transport layer.

use thiserror::Error;

/// Outcome of a single failed round trip.
///
/// `Remote` means the engine answered with an exception; the other variants
/// mean the channel itself is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The engine raised an exception while serving the request.
    #[error("remote {class}: {message}")]
    Remote { class: String, message: String },
    /// The channel was closed, locally or by the peer.
    #[error("channel closed: {0}")]
    Closed(String),
    /// Reading or writing the underlying stream failed.
    #[error("i/o failure: {0}")]
    Io(String),
}

impl Fault {
    /// True when the fault came from the engine rather than the channel.
    pub fn is_remote(&self) -> bool {
        matches!(self, Fault::Remote { .. })
    }
}

/// Errors raised while setting up a transport.
#[derive(Debug, Error)]
pub enum WireError {
    /// The engine process could not be started.
    #[error("failed to spawn engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The child was started without one of its stdio pipes.
    #[error("engine process is missing its {0} pipe")]
    MissingPipe(&'static str),
}
