//! Whole-network client.
//!
//! A [`NetworkClient`] is built from a discovered topology. Node
//! connections are opened lazily and cached by index. State checks go
//! through the consensus voter; submissions go to a random node.

use crate::config::NetworkConfig;
use crate::connection::Connection;
use crate::discovery::{NodeDirectory, Topology};
use crate::endpoint::EndpointConnector;
use crate::error::{NetworkError, Result};
use crate::state::{ItemId, StateReport};
use crate::voter::{check_trust, ConsensusVoter};
use once_cell::sync::OnceCell;
use rand::seq::index::sample as sample_indices;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};
use umi_core::WorkerPool;

struct ClientInner {
    topology: Topology,
    connector: Arc<dyn EndpointConnector>,
    connections: Vec<OnceCell<Arc<Connection>>>,
    voter: ConsensusVoter,
    config: NetworkConfig,
}

/// Client for one network. Cheap to clone.
#[derive(Clone)]
pub struct NetworkClient {
    inner: Arc<ClientInner>,
}

impl NetworkClient {
    /// Discover `network` and build a client for it.
    ///
    /// Fails with `NetworkUnstable` if discovery does not reach agreement.
    pub fn connect(directory: &NodeDirectory, network: &str) -> Result<Self> {
        let topology = directory.discover(network)?;
        Ok(Self::from_topology(
            topology,
            Arc::clone(directory.connector()),
            directory.pool().clone(),
            directory.config().clone(),
        ))
    }

    /// Build a client for an already known topology.
    pub fn from_topology(
        topology: Topology,
        connector: Arc<dyn EndpointConnector>,
        pool: WorkerPool,
        config: NetworkConfig,
    ) -> Self {
        info!(network = %topology.network, size = topology.len(), "network client ready");
        let connections = (0..topology.len()).map(|_| OnceCell::new()).collect();
        Self {
            inner: Arc::new(ClientInner {
                voter: ConsensusVoter::new(pool, config.consensus_retry),
                topology,
                connector,
                connections,
                config,
            }),
        }
    }

    /// Number of nodes in the topology.
    pub fn size(&self) -> usize {
        self.inner.topology.len()
    }

    pub fn topology(&self) -> &Topology {
        &self.inner.topology
    }

    /// Connection to node `index` in `0..size()`.
    pub fn connection(&self, index: usize) -> Result<Arc<Connection>> {
        let cell = self
            .inner
            .connections
            .get(index)
            .ok_or(NetworkError::IndexOutOfRange {
                index,
                size: self.size(),
            })?;
        cell.get_or_try_init(|| {
            let node = &self.inner.topology.nodes[index];
            let endpoint = self.inner.connector.connect(node)?;
            debug!(url = %node.url, "node connection opened");
            Ok(Arc::new(Connection::new(node.clone(), endpoint)))
        })
        .map(Arc::clone)
    }

    pub fn random_connection(&self) -> Result<Arc<Connection>> {
        let size = self.size();
        if size == 0 {
            return Err(NetworkError::IndexOutOfRange { index: 0, size });
        }
        self.connection(rand::thread_rng().gen_range(0..size))
    }

    /// Up to `count` connections to distinct random nodes.
    pub fn random_connections(&self, count: usize) -> Result<Vec<Arc<Connection>>> {
        let size = self.size();
        sample_indices(&mut rand::thread_rng(), size, count.min(size))
            .into_iter()
            .map(|i| self.connection(i))
            .collect()
    }

    /// Consensus state of `item` at trust level `trust` (0.1 to 0.9).
    ///
    /// Raises the first node error if no verdict was reached.
    pub fn get_state(&self, item: &ItemId, trust: f64) -> Result<StateReport> {
        check_trust(trust)?;
        let client = self.clone();
        let item = item.clone();
        self.inner.voter.vote(self.size(), trust, move |i| {
            client.connection(i)?.get_state(&item)
        })
    }

    /// True if the network approves `item` at trust level `trust`.
    pub fn approval_check(&self, item: &ItemId, trust: f64) -> Result<bool> {
        self.get_state(item, trust).map(|state| state.is_approved())
    }

    /// Submit `packed` to a random node, picking a new node on every retry.
    ///
    /// The returned state may carry errors; the caller checks it.
    pub fn register_single(&self, packed: &[u8]) -> Result<StateReport> {
        let config = &self.inner.config;
        let node_timeout = config.register_node_timeout();
        let client = self.clone();
        let packed: Arc<[u8]> = Arc::from(packed);
        config
            .register_retry()
            .run("register", move || {
                client.random_connection()?.register_single(&packed, node_timeout)
            })
            .map_err(|e| NetworkError::from_retry("register", e))
    }

    /// Submit `packed`, then poll consensus on `item` while it is pending.
    ///
    /// Returns the submission state if it carries errors, the first
    /// non-pending consensus state, or the last pending one once the polls
    /// run out.
    pub fn register_consensus(
        &self,
        packed: &[u8],
        item: &ItemId,
        trust: f64,
    ) -> Result<StateReport> {
        check_trust(trust)?;
        let submitted = self.register_single(packed)?;
        if submitted.has_errors() || !submitted.is_pending() {
            return Ok(submitted);
        }
        let config = &self.inner.config;
        let mut state = submitted;
        for poll in 0..config.pending_polls {
            state = self.get_state(item, trust)?;
            if !state.is_pending() {
                return Ok(state);
            }
            debug!(?item, poll, state = %state.state, "still pending");
            thread::sleep(config.pending_poll_interval());
        }
        Ok(state)
    }
}

impl std::fmt::Debug for NetworkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<NetworkClient:{}:{}>",
            self.inner.topology.network,
            self.size()
        )
    }
}
