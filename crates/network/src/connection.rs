//! Connection to a single node.

use crate::endpoint::NodeEndpoint;
use crate::error::Result;
use crate::node::NodeInfo;
use crate::state::{ItemId, PingReport, StateReport};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One topology member and the endpoint reaching it.
///
/// Obtained from [`crate::NetworkClient`]; not meant to be built by hand.
pub struct Connection {
    node: NodeInfo,
    endpoint: Arc<dyn NodeEndpoint>,
    number: OnceCell<u32>,
}

impl Connection {
    pub fn new(node: NodeInfo, endpoint: Arc<dyn NodeEndpoint>) -> Self {
        Self {
            node,
            endpoint,
            number: OnceCell::new(),
        }
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    pub fn url(&self) -> &str {
        &self.node.url
    }

    /// Number the node reports for itself; asked once.
    pub fn node_number(&self) -> Result<u32> {
        self.number
            .get_or_try_init(|| self.endpoint.node_number())
            .copied()
    }

    /// True if the node is alive. Call [`Connection::restart`] on nodes
    /// failing this.
    pub fn ping(&self) -> Result<bool> {
        self.endpoint.ping()
    }

    pub fn restart(&self) -> Result<()> {
        info!(url = %self.node.url, "restarting node connection");
        self.endpoint.restart()
    }

    /// Ask this node to ping node `number`.
    pub fn ping_node(&self, number: u32, timeout: Duration) -> Result<PingReport> {
        self.endpoint.ping_node(number, timeout)
    }

    /// State of `item` on this node alone.
    pub fn get_state(&self, item: &ItemId) -> Result<StateReport> {
        self.endpoint.get_state(item)
    }

    /// Submit a packed artifact to this node. The caller checks the
    /// returned state, which may carry errors.
    pub fn register_single(&self, packed: &[u8], timeout: Duration) -> Result<StateReport> {
        self.endpoint.register(packed, timeout)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Connection:{}>", self.node.url)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
