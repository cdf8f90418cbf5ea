//! Node endpoint abstractions.
//!
//! The client never talks to a node directly. It goes through a
//! [`NodeEndpoint`], which hides the authenticated command channel, and
//! gets endpoints from an [`EndpointConnector`]. Two implementations ship:
//!
//! - **BridgedNode**: the engine's node client, reached through a bridge session
//! - test doubles built on closures in the integration tests

use crate::error::Result;
use crate::node::{NodeInfo, NodeRecord};
use crate::state::{ItemId, PingReport, StateReport};
use std::sync::Arc;
use std::time::Duration;

/// Command channel to one node.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync): discovery and voting
/// query endpoints from pool workers.
pub trait NodeEndpoint: Send + Sync {
    /// Number the node reports for itself.
    fn node_number(&self) -> Result<u32>;

    /// Membership list as this node sees it.
    ///
    /// # Returns
    /// Every node record the endpoint reports, possibly including itself
    fn topology(&self) -> Result<Vec<NodeRecord>>;

    /// State of `item` on this node.
    fn get_state(&self, item: &ItemId) -> Result<StateReport>;

    /// Submit a packed, sealed artifact and wait up to `timeout` for its state.
    fn register(&self, packed: &[u8], timeout: Duration) -> Result<StateReport>;

    /// True if the node answers.
    fn ping(&self) -> Result<bool>;

    /// Re-establish the connection.
    fn restart(&self) -> Result<()>;

    /// Ask this node to ping node `number`.
    fn ping_node(&self, number: u32, timeout: Duration) -> Result<PingReport>;
}

/// Opens endpoints for known nodes.
pub trait EndpointConnector: Send + Sync {
    fn connect(&self, node: &NodeInfo) -> Result<Arc<dyn NodeEndpoint>>;
}
