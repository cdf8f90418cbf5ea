//! Scriptable node endpoints shared by the network tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use umi_core::{PoolConfig, RetryPolicy, WorkerPool};
use umi_network::{
    EndpointConnector, ItemId, NetworkClient, NetworkConfig, NetworkError, NodeEndpoint,
    NodeInfo, NodeRecord, PingReport, StateReport, Topology,
};

pub type Answer = Arc<dyn Fn() -> Result<StateReport, NetworkError> + Send + Sync>;

pub fn answer(state: &'static str, delay: Duration) -> Answer {
    Arc::new(move || {
        thread::sleep(delay);
        Ok(StateReport::new(state))
    })
}

pub fn failing(url: &str) -> Answer {
    let url = url.to_string();
    Arc::new(move || {
        Err(NetworkError::Transport {
            url: url.clone(),
            message: "connection refused".into(),
        })
    })
}

/// One scripted node.
pub struct FakeNode {
    pub info: NodeInfo,
    pub peers: Mutex<Result<Vec<NodeRecord>, NetworkError>>,
    pub state: Mutex<Answer>,
    pub register: Mutex<Answer>,
    pub number_calls: AtomicUsize,
    pub state_calls: AtomicUsize,
}

impl FakeNode {
    pub fn new(info: NodeInfo) -> Self {
        Self {
            info,
            peers: Mutex::new(Ok(Vec::new())),
            state: Mutex::new(answer("APPROVED", Duration::ZERO)),
            register: Mutex::new(answer("PENDING_POSITIVE", Duration::ZERO)),
            number_calls: AtomicUsize::new(0),
            state_calls: AtomicUsize::new(0),
        }
    }
}

impl NodeEndpoint for FakeNode {
    fn node_number(&self) -> Result<u32, NetworkError> {
        self.number_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.number)
    }

    fn topology(&self) -> Result<Vec<NodeRecord>, NetworkError> {
        self.peers.lock().clone()
    }

    fn get_state(&self, _item: &ItemId) -> Result<StateReport, NetworkError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        let answer = Arc::clone(&*self.state.lock());
        answer()
    }

    fn register(&self, _packed: &[u8], _timeout: Duration) -> Result<StateReport, NetworkError> {
        let answer = Arc::clone(&*self.register.lock());
        answer()
    }

    fn ping(&self) -> Result<bool, NetworkError> {
        Ok(true)
    }

    fn restart(&self) -> Result<(), NetworkError> {
        Ok(())
    }

    fn ping_node(&self, _number: u32, _timeout: Duration) -> Result<PingReport, NetworkError> {
        Ok(PingReport {
            tcp_ms: 3,
            udp_ms: -1,
        })
    }
}

/// Connector over a fixed set of fake nodes, keyed by url.
#[derive(Default)]
pub struct FakeNetwork {
    pub nodes: HashMap<String, Arc<FakeNode>>,
    pub connects: AtomicUsize,
}

impl FakeNetwork {
    /// `count` nodes numbered from 1, all answering APPROVED.
    pub fn with_nodes(count: u32) -> Self {
        let nodes = (1..=count)
            .map(|n| {
                let info = node_info(n);
                (info.url.clone(), Arc::new(FakeNode::new(info)))
            })
            .collect();
        Self {
            nodes,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn node(&self, number: u32) -> &Arc<FakeNode> {
        &self.nodes[&node_info(number).url]
    }

    pub fn infos(&self) -> Vec<NodeInfo> {
        let mut infos: Vec<_> = self.nodes.values().map(|n| n.info.clone()).collect();
        infos.sort_by_key(|n| n.number);
        infos
    }

    pub fn records(&self) -> Vec<NodeRecord> {
        self.infos().iter().map(NodeInfo::to_record).collect()
    }
}

impl EndpointConnector for FakeNetwork {
    fn connect(&self, node: &NodeInfo) -> Result<Arc<dyn NodeEndpoint>, NetworkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.nodes.get(&node.url) {
            Some(fake) => Ok(Arc::clone(fake) as Arc<dyn NodeEndpoint>),
            None => Err(NetworkError::Transport {
                url: node.url.clone(),
                message: "no route to host".into(),
            }),
        }
    }
}

pub fn node_info(number: u32) -> NodeInfo {
    NodeInfo::new(
        number,
        format!("http://10.0.0.{number}:8080"),
        vec![number as u8; 4],
    )
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_config() -> NetworkConfig {
    init_tracing();
    NetworkConfig::default()
        .with_pool(PoolConfig {
            name: "test-net".into(),
            max_workers: 160,
            keep_alive_ms: 500,
        })
        .with_discovery_retry(RetryPolicy::new(Duration::from_millis(300), 2))
        .with_consensus_retry(RetryPolicy::new(Duration::from_secs(5), 1))
}

pub fn client_for(network: Arc<FakeNetwork>, config: NetworkConfig) -> NetworkClient {
    let pool = WorkerPool::new(config.pool.clone());
    NetworkClient::from_topology(
        Topology::new("testnet", network.infos()),
        network,
        pool,
        config,
    )
}

pub fn item() -> ItemId {
    ItemId::from_digest(vec![7u8; 48])
}
