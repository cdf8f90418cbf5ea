//! Topology discovery.
//!
//! The directory starts from a static bootstrap list and asks a random
//! sample of candidates who they think is in the network. A node makes it
//! into the topology only if enough of the sample reports it.
//!
//! # Algorithm
//!
//! 1. Sample `round(n × sample_fraction)` bootstrap candidates (at least one)
//! 2. Query the sample in parallel; each query runs under the discovery retry policy
//! 3. Count one vote per reporting candidate for every distinct `(url, key)`
//! 4. Group by url and keep the best-rated entry
//! 5. Accept entries with `rate >= sample_count × min_consensus_fraction`
//! 6. Fail with `NetworkUnstable` if fewer than `min_accepted_ratio` of the
//!    observed urls were accepted
//!
//! A candidate that keeps failing contributes no votes and does not abort
//! the round.

use crate::config::NetworkConfig;
use crate::endpoint::EndpointConnector;
use crate::error::{NetworkError, Result};
use crate::node::NodeInfo;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use umi_core::WorkerPool;

/// Accepted nodes of one network.
#[derive(Debug, Clone)]
pub struct Topology {
    pub network: String,
    /// Ordered by node number.
    pub nodes: Vec<NodeInfo>,
}

impl Topology {
    pub fn new(network: impl Into<String>, mut nodes: Vec<NodeInfo>) -> Self {
        nodes.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.url.cmp(&b.url)));
        Self {
            network: network.into(),
            nodes,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Discovers trust-filtered topologies for named networks.
pub struct NodeDirectory {
    config: NetworkConfig,
    connector: Arc<dyn EndpointConnector>,
    pool: WorkerPool,
}

impl NodeDirectory {
    pub fn new(config: NetworkConfig, connector: Arc<dyn EndpointConnector>) -> Self {
        let pool = WorkerPool::new(config.pool.clone());
        Self {
            config,
            connector,
            pool,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn connector(&self) -> &Arc<dyn EndpointConnector> {
        &self.connector
    }

    /// Fan-out pool shared with clients built from this directory.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Static candidate list for `network`.
    pub fn bootstrap(&self, network: &str) -> Result<Vec<NodeInfo>> {
        let records = self
            .config
            .networks
            .get(network)
            .ok_or_else(|| NetworkError::UnknownNetwork(network.to_string()))?;
        records.iter().cloned().map(NodeInfo::try_from).collect()
    }

    /// Run one discovery round for `network`.
    pub fn discover(&self, network: &str) -> Result<Topology> {
        let candidates = self.bootstrap(network)?;
        let sample_count = sample_size(candidates.len(), self.config.sample_fraction);
        let sample: Vec<NodeInfo> = candidates
            .choose_multiple(&mut rand::thread_rng(), sample_count)
            .cloned()
            .collect();
        debug!(network, candidates = candidates.len(), sample = sample_count, "discovery round");

        let tally: Arc<DashMap<NodeInfo, AtomicUsize>> = Arc::new(DashMap::new());
        let connector = Arc::clone(&self.connector);
        let retry = self.config.discovery_retry;
        let votes = Arc::clone(&tally);
        let answered = self.pool.map(sample, move |candidate| {
            let connector = Arc::clone(&connector);
            let url = candidate.url.clone();
            let reply = retry.run("discovery", move || {
                let endpoint = connector.connect(&candidate)?;
                endpoint
                    .topology()?
                    .into_iter()
                    .map(NodeInfo::try_from)
                    .collect::<Result<HashSet<NodeInfo>>>()
            });
            match reply {
                Ok(reported) => {
                    for node in reported {
                        votes
                            .entry(node)
                            .or_default()
                            .fetch_add(1, Ordering::AcqRel);
                    }
                    true
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "discovery candidate failed");
                    metrics::counter!("umi.discovery.candidate_failures").increment(1);
                    false
                }
            }
        });
        let answered = answered.into_iter().filter(|ok| *ok == Some(true)).count();

        let rated: Vec<NodeInfo> = tally
            .iter()
            .map(|entry| {
                let mut node = entry.key().clone();
                node.rate = entry.value().load(Ordering::Acquire);
                node
            })
            .collect();
        let best: Vec<NodeInfo> = self
            .pool
            .group_by(rated, |node| node.url.clone())
            .into_values()
            .filter_map(|group| group.into_iter().max_by_key(|node| node.rate))
            .collect();

        let observed = best.len();
        let threshold = sample_count as f64 * self.config.min_consensus_fraction;
        let accepted: Vec<NodeInfo> = best
            .into_iter()
            .filter(|node| node.rate as f64 >= threshold)
            .collect();
        let required = (observed as f64 * self.config.min_accepted_ratio).ceil() as usize;
        if observed == 0 || accepted.len() < required {
            warn!(
                network,
                answered,
                accepted = accepted.len(),
                observed,
                "discovery did not reach agreement"
            );
            return Err(NetworkError::NetworkUnstable {
                accepted: accepted.len(),
                required,
                observed,
            });
        }

        info!(network, nodes = accepted.len(), answered, "topology discovered");
        Ok(Topology::new(network, accepted))
    }
}

/// `round(n × fraction)` clamped to `1..=n`.
fn sample_size(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).round() as usize).clamp(1, n.max(1))
}
