//! Node endpoints reached through the engine.
//!
//! The engine ships its own node client; [`BridgedNode`] wraps that remote
//! class and [`BridgeConnector`] creates one per node through a session.

use crate::endpoint::{EndpointConnector, NodeEndpoint};
use crate::error::{NetworkError, Result};
use crate::node::{NodeInfo, NodeRecord};
use crate::state::{ItemId, PingReport, StateReport};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use umi_core::{Adapter, Binder, Proxy, Session, TypedAdapter, Value};

/// Remote class of the engine's item digest.
pub const HASH_ID_CLASS: &str = "com.icodici.universa.HashId";

/// The engine's client for one node.
#[derive(Debug, Clone)]
pub struct BridgedNode(Proxy);

impl BridgedNode {
    /// Url the remote client is bound to.
    pub fn url(&self) -> Result<String> {
        let url = self.0.call("getUrl", Vec::new())?;
        text_of(&url)
    }

    fn millis(timeout: Duration) -> Value {
        Value::Int(i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX))
    }
}

impl Adapter for BridgedNode {
    fn proxy(&self) -> &Proxy {
        &self.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypedAdapter for BridgedNode {
    const REMOTE_CLASS: &'static str = "com.icodici.universa.node2.network.Client";

    fn wrap(proxy: Proxy) -> umi_core::Result<Self> {
        Ok(Self(proxy))
    }
}

impl NodeEndpoint for BridgedNode {
    fn node_number(&self) -> Result<u32> {
        let number = self.0.call("getNodeNumber", Vec::new())?;
        number
            .as_i64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| NetworkError::Protocol(format!("bad node number {number:?}")))
    }

    fn topology(&self) -> Result<Vec<NodeRecord>> {
        let nodes = self.0.call("getNodes", Vec::new())?;
        let items = nodes
            .as_array()
            .ok_or_else(|| NetworkError::Protocol(format!("node list is {}", nodes.kind())))?;
        items.iter().map(record_from).collect()
    }

    fn get_state(&self, item: &ItemId) -> Result<StateReport> {
        let session = self.0.session();
        let id = session.invoke_static(
            HASH_ID_CLASS,
            "withDigest",
            vec![Value::Binary(item.digest().to_vec())],
        )?;
        let result = self.0.call("getState", vec![id])?;
        report_from(&result)
    }

    fn register(&self, packed: &[u8], timeout: Duration) -> Result<StateReport> {
        let result = self.0.call(
            "register",
            vec![Value::Binary(packed.to_vec()), Self::millis(timeout)],
        )?;
        report_from(&result)
    }

    fn ping(&self) -> Result<bool> {
        let alive = self.0.call("ping", Vec::new())?;
        Ok(alive.as_bool().unwrap_or(false))
    }

    fn restart(&self) -> Result<()> {
        self.0.call("restart", Vec::new())?;
        Ok(())
    }

    fn ping_node(&self, number: u32, timeout: Duration) -> Result<PingReport> {
        let reply = self
            .0
            .call("pingNode", vec![Value::from(number), Self::millis(timeout)])?;
        let fields = fields_of(&reply)?;
        let millis = |name: &str| {
            fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .and_then(|(_, v)| v.as_i64())
                .unwrap_or(-1)
        };
        Ok(PingReport {
            tcp_ms: millis("TCP"),
            udp_ms: millis("UDP"),
        })
    }
}

/// Opens [`BridgedNode`] endpoints through one session.
pub struct BridgeConnector {
    session: Session,
    client_key: Value,
}

impl BridgeConnector {
    /// `client_key` is the remote private key nodes authenticate us with.
    pub fn new(session: Session, client_key: impl Into<Value>) -> Self {
        Self {
            session,
            client_key: client_key.into(),
        }
    }
}

impl EndpointConnector for BridgeConnector {
    fn connect(&self, node: &NodeInfo) -> Result<Arc<dyn NodeEndpoint>> {
        debug!(url = %node.url, "opening bridged node client");
        let endpoint = BridgedNode::instantiate(
            &self.session,
            vec![
                Value::from(node.url.as_str()),
                self.client_key.clone(),
                Value::Null,
            ],
        )?;
        Ok(Arc::new(endpoint))
    }
}

/// Plain text of a string, or of a remote object through its `toString`.
fn text_of(value: &Value) -> Result<String> {
    match (value.as_str(), value.as_proxy()) {
        (Some(s), _) => Ok(s.to_string()),
        (None, Some(proxy)) => Ok(proxy.to_remote_string()?),
        _ => Ok(format!("{value:?}")),
    }
}

/// Key/value view of a map or a remote object exposing `toBinder`.
fn fields_of(value: &Value) -> Result<BTreeMap<String, Value>> {
    if let Some(map) = value.as_map() {
        return Ok(map.clone());
    }
    if let Some(proxy) = value.as_proxy() {
        let binder: Binder = proxy.call("toBinder", Vec::new())?.into_adapter()?;
        return Ok(binder.to_map()?);
    }
    Err(NetworkError::Protocol(format!(
        "expected a record, got {}",
        value.kind()
    )))
}

fn record_from(value: &Value) -> Result<NodeRecord> {
    let fields = fields_of(value)?;
    let number = fields
        .get("number")
        .and_then(Value::as_i64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| NetworkError::Protocol("node record without number".into()))?;
    let url = fields
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| NetworkError::Protocol("node record without url".into()))?;
    match fields.get("key") {
        Some(Value::Binary(key)) => Ok(NodeRecord::new(number, url, key)),
        Some(Value::String(key)) => Ok(NodeRecord {
            number,
            url: url.to_string(),
            key: key.clone(),
        }),
        _ => Err(NetworkError::Protocol(format!("node record {url} without key"))),
    }
}

fn report_from(value: &Value) -> Result<StateReport> {
    let proxy = value
        .as_proxy()
        .ok_or_else(|| NetworkError::Protocol(format!("state is {}", value.kind())))?;
    let state = text_of(&proxy.call("state", Vec::new())?)?;
    let errors = match proxy.call("errors", Vec::new())? {
        Value::Array(items) => items.iter().map(text_of).collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };
    Ok(StateReport::new(state).with_errors(errors))
}
