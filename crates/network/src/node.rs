//! Network node abstractions.
//!
//! A node is identified by its url together with its public key material;
//! two records naming the same url with different keys are different nodes.

use crate::error::{NetworkError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Node entry as it appears in bootstrap lists and topology replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub number: u32,
    pub url: String,
    /// Packed public key, base64.
    pub key: String,
}

impl NodeRecord {
    pub fn new(number: u32, url: impl Into<String>, key: &[u8]) -> Self {
        Self {
            number,
            url: url.into(),
            key: STANDARD.encode(key),
        }
    }
}

/// Known node plus the number of discovery votes it collected.
///
/// Equality and hashing use `(url, public_key)` only.
#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub number: u32,
    pub url: String,
    pub public_key: Vec<u8>,
    /// Candidates that reported this node in the last discovery round.
    pub rate: usize,
}

impl NodeInfo {
    pub fn new(number: u32, url: impl Into<String>, public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            number,
            url: url.into(),
            public_key: public_key.into(),
            rate: 0,
        }
    }

    pub fn to_record(&self) -> NodeRecord {
        NodeRecord::new(self.number, self.url.clone(), &self.public_key)
    }

    /// Parse a JSON bootstrap list of `{number, url, key}` entries.
    pub fn parse_list(json: &str) -> Result<Vec<NodeInfo>> {
        let records: Vec<NodeRecord> = serde_json::from_str(json)
            .map_err(|e| NetworkError::Protocol(format!("bad node list: {e}")))?;
        records.into_iter().map(NodeInfo::try_from).collect()
    }
}

impl TryFrom<NodeRecord> for NodeInfo {
    type Error = NetworkError;

    fn try_from(record: NodeRecord) -> Result<Self> {
        let compact: String = record.key.chars().filter(|c| !c.is_whitespace()).collect();
        let key = STANDARD.decode(compact).map_err(|e| {
            NetworkError::Protocol(format!("bad key for node {}: {e}", record.url))
        })?;
        Ok(NodeInfo::new(record.number, record.url, key))
    }
}

impl PartialEq for NodeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.public_key == other.public_key
    }
}

impl Eq for NodeInfo {}

impl Hash for NodeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.public_key.hash(state);
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} at {}", self.number, self.url)
    }
}
