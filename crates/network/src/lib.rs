//! Network client built on the bridge.
//!
//! This crate resolves the state of replicated items by asking many
//! partially trusted nodes:
//! - Node directory: trust-filtered topology discovery from a bootstrap list
//! - Consensus voter: quorum voting with early latching
//! - Per-node connections and a whole-network client
//! - An endpoint adapter that reaches nodes through an engine session

pub mod bridged;
pub mod client;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod node;
pub mod state;
pub mod voter;

pub use bridged::{BridgeConnector, BridgedNode};
pub use client::NetworkClient;
pub use config::NetworkConfig;
pub use connection::Connection;
pub use discovery::{NodeDirectory, Topology};
pub use endpoint::{EndpointConnector, NodeEndpoint};
pub use error::{NetworkError, Result};
pub use node::{NodeInfo, NodeRecord};
pub use state::{ItemId, PingReport, StateReport};
pub use voter::{check_trust, ConsensusVoter};
