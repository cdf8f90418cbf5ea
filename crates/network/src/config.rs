//! Network client configuration.

use crate::error::Result;
use crate::node::{NodeInfo, NodeRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use umi_core::{PoolConfig, RetryPolicy};

/// Discovery, voting and submission parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Share of bootstrap candidates asked during discovery.
    pub sample_fraction: f64,
    /// Share of sampled candidates that must report a node.
    pub min_consensus_fraction: f64,
    /// Share of observed urls that must be accepted.
    pub min_accepted_ratio: f64,
    /// Applied to each discovery candidate.
    pub discovery_retry: RetryPolicy,
    /// Applied to a whole consensus round.
    pub consensus_retry: RetryPolicy,
    pub register_timeout_ms: u64,
    pub register_retries: u32,
    /// Consensus polls after a submission while the state is pending.
    pub pending_polls: u32,
    pub pending_poll_interval_ms: u64,
    pub pool: PoolConfig,
    /// Bootstrap lists by network name.
    pub networks: BTreeMap<String, Vec<NodeRecord>>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            sample_fraction: 0.7,
            min_consensus_fraction: 0.8,
            min_accepted_ratio: 0.9,
            discovery_retry: RetryPolicy::new(Duration::from_secs(5), 3),
            consensus_retry: RetryPolicy::new(Duration::from_secs(60), 1),
            register_timeout_ms: 45_000,
            register_retries: 3,
            pending_polls: 30,
            pending_poll_interval_ms: 1_000,
            pool: PoolConfig {
                name: "umi-network".to_string(),
                ..PoolConfig::default()
            },
            networks: BTreeMap::new(),
        }
    }
}

impl NetworkConfig {
    pub fn with_network(mut self, name: impl Into<String>, nodes: &[NodeInfo]) -> Self {
        self.networks
            .insert(name.into(), nodes.iter().map(NodeInfo::to_record).collect());
        self
    }

    /// Add a network from a JSON bootstrap list.
    pub fn with_bootstrap_json(self, name: impl Into<String>, json: &str) -> Result<Self> {
        let nodes = NodeInfo::parse_list(json)?;
        Ok(self.with_network(name, &nodes))
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_discovery_retry(mut self, retry: RetryPolicy) -> Self {
        self.discovery_retry = retry;
        self
    }

    pub fn with_consensus_retry(mut self, retry: RetryPolicy) -> Self {
        self.consensus_retry = retry;
        self
    }

    /// Retry policy for single-node submissions.
    pub fn register_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.register_timeout_ms),
            self.register_retries,
        )
    }

    /// Per-attempt wait handed to the node, leaving headroom for the round trip.
    pub fn register_node_timeout(&self) -> Duration {
        let share = self.register_timeout_ms / u64::from(self.register_retries.max(1));
        Duration::from_millis(share.saturating_sub(100))
    }

    pub fn pending_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pending_poll_interval_ms)
    }
}
