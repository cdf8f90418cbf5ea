//! Error types for the bridge.

use thiserror::Error;
use umi_wire::Fault;

/// Result type alias for the bridge.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Remote class name the engine reports for a missing method.
pub const NO_SUCH_METHOD_CLASS: &str = "NoSuchMethodException";

/// Errors that can occur while talking to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The session is closed or its transport failed; no further calls are possible.
    #[error("bridge session is closed")]
    SessionClosed,
    /// The remote object has no such method.
    #[error("no such remote method: {message}")]
    NoSuchMethod { message: String },
    /// The engine raised an exception.
    #[error("remote fault {class}: {message}")]
    RemoteFault { class: String, message: String },
    /// A handle from another session was passed as an argument.
    #[error("objects can't be interchanged between different bridge sessions")]
    Interchange,
    /// Two adapters claim the same remote class.
    #[error("adapter for {0} is already registered")]
    DuplicateAdapter(String),
    /// A typed adapter refused to wrap a handle.
    #[error("cannot adapt {class}: {reason}")]
    Adapter { class: String, reason: String },
    /// A wire value could not be translated.
    #[error("codec error: {0}")]
    Codec(String),
    /// The engine is not the expected system.
    #[error("unsupported system: {0}")]
    UnsupportedSystem(String),
    /// The engine version is not supported.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
    /// The engine process could not be started.
    #[error("cannot start engine: {0}")]
    Spawn(String),
}

impl BridgeError {
    /// True for every error raised by the engine itself, including
    /// [`BridgeError::NoSuchMethod`].
    pub fn is_remote_fault(&self) -> bool {
        matches!(
            self,
            BridgeError::RemoteFault { .. } | BridgeError::NoSuchMethod { .. }
        )
    }

    /// Remote exception class, when the engine raised one.
    pub fn remote_class(&self) -> Option<&str> {
        match self {
            BridgeError::RemoteFault { class, .. } => Some(class),
            BridgeError::NoSuchMethod { .. } => Some(NO_SUCH_METHOD_CLASS),
            _ => None,
        }
    }

    /// True when the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::SessionClosed)
    }
}

impl From<Fault> for BridgeError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Remote { class, message } if class == NO_SUCH_METHOD_CLASS => {
                BridgeError::NoSuchMethod { message }
            }
            Fault::Remote { class, message } => BridgeError::RemoteFault { class, message },
            Fault::Closed(_) | Fault::Io(_) => BridgeError::SessionClosed,
        }
    }
}
