//! Remote handle abstractions.
//!
//! A handle names one object resident in the engine. It is identified by a
//! compact `RemoteId` that is cheap to compare and hash.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the engine assigns to a live object. Unique per session.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub i64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Immutable name of a remote object: its id plus the remote class name.
///
/// Keep this struct small and cheap to clone; lifecycle state lives in the
/// proxy that wraps it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub remote_id: RemoteId,
    /// Fully qualified remote class name, e.g. `net.sergeych.tools.Binder`.
    pub type_name: String,
}

impl RemoteHandle {
    pub fn new(remote_id: RemoteId, type_name: impl Into<String>) -> Self {
        Self {
            remote_id,
            type_name: type_name.into(),
        }
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.type_name, self.remote_id)
    }
}
