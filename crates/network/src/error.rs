//! Error types for the network client.

use thiserror::Error;
use umi_core::{BridgeError, RetryError};

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur while talking to the network.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    /// Discovery did not reach the required agreement.
    #[error("network is unstable: {accepted} nodes accepted, {required} required of {observed} observed")]
    NetworkUnstable {
        accepted: usize,
        required: usize,
        observed: usize,
    },
    /// Every consensus attempt ran out of time without a verdict.
    #[error("no consensus after {attempts} attempts")]
    ConsensusTimeout { attempts: u32 },
    /// A retried operation other than consensus ran out of time.
    #[error("{operation} timed out after {attempts} attempts")]
    Timeout { operation: String, attempts: u32 },
    /// A single node could not be reached.
    #[error("transport error at {url}: {message}")]
    Transport { url: String, message: String },
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
    /// Trust level outside `0.1..=0.9`.
    #[error("trust must be in 0.1..0.9 range, got {0}")]
    InvalidTrust(f64),
    #[error("node index {index} out of range 0..{size}")]
    IndexOutOfRange { index: usize, size: usize },
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// A node or the engine answered with something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl NetworkError {
    /// Collapse a retry outcome for `operation` into a network error.
    pub fn from_retry(operation: &str, err: RetryError<NetworkError>) -> Self {
        match err {
            RetryError::Failed { last, .. } => last,
            RetryError::TimedOut { attempts } | RetryError::Aborted { attempts } => {
                NetworkError::Timeout {
                    operation: operation.to_string(),
                    attempts,
                }
            }
        }
    }
}
