//! Item identifiers and the states nodes report for them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest identifying a replicated item.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Vec<u8>);

impl ItemId {
    pub fn from_digest(digest: impl Into<Vec<u8>>) -> Self {
        Self(digest.into())
    }

    pub fn digest(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId(")?;
        for b in self.0.iter().take(8) {
            write!(f, "{b:02x}")?;
        }
        if self.0.len() > 8 {
            write!(f, "..")?;
        }
        write!(f, ")")
    }
}

/// State of one item as reported by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReport {
    /// Item state name, e.g. `APPROVED` or `PENDING_POSITIVE`.
    pub state: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl StateReport {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// `APPROVED` and `LOCKED` count as approved.
    pub fn is_approved(&self) -> bool {
        matches!(self.state.as_str(), "APPROVED" | "LOCKED")
    }

    /// Neither approved nor rejected yet.
    pub fn is_pending(&self) -> bool {
        self.state.starts_with("PENDING")
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for StateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<State:{}>", self.state)
    }
}

/// Round trip times between two nodes, in milliseconds; -1 when unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReport {
    pub tcp_ms: i64,
    pub udp_ms: i64,
}

impl Default for PingReport {
    fn default() -> Self {
        Self {
            tcp_ms: -1,
            udp_ms: -1,
        }
    }
}
