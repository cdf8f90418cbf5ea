//! Adapter for the engine's key/value container.

use crate::adapter::{Adapter, TypedAdapter};
use crate::error::{BridgeError, Result};
use crate::proxy::Proxy;
use crate::session::Session;
use crate::value::Value;
use std::any::Any;
use std::collections::BTreeMap;

/// Remote string-keyed map living in the engine.
#[derive(Debug, Clone)]
pub struct Binder(Proxy);

impl Binder {
    /// Build a remote binder holding `entries`.
    pub fn of(session: &Session, entries: &BTreeMap<String, Value>) -> Result<Binder> {
        let args = entries
            .iter()
            .flat_map(|(key, value)| [Value::from(key.as_str()), value.clone()])
            .collect();
        Self::invoke_static(session, "of", args)?.into_adapter()
    }

    /// Value stored under `key`; `Null` when absent.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.0.call("get", vec![key.into()])
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.0.call("set", vec![key.into(), value.into()]).map(|_| ())
    }

    pub fn get_binary(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.0.call("getBinary", vec![key.into()])?;
        Ok(value.as_bytes().map(<[u8]>::to_vec))
    }

    /// Keys in the order the engine reports them.
    pub fn keys(&self) -> Result<Vec<String>> {
        let keys = self.0.call("keySet", Vec::new())?;
        let items = keys.as_array().ok_or_else(|| BridgeError::Codec(format!(
            "keySet returned {}",
            keys.kind()
        )))?;
        Ok(items
            .iter()
            .filter_map(|k| k.as_str().map(str::to_owned))
            .collect())
    }

    pub fn size(&self) -> Result<usize> {
        let size = self.0.call("size", Vec::new())?;
        Ok(size.as_i64().unwrap_or(0).max(0) as usize)
    }

    /// Copy every entry into a local map.
    pub fn to_map(&self) -> Result<BTreeMap<String, Value>> {
        self.keys()?
            .into_iter()
            .map(|key| {
                let value = self.get(&key)?;
                Ok((key, value))
            })
            .collect()
    }
}

impl Adapter for Binder {
    fn proxy(&self) -> &Proxy {
        &self.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypedAdapter for Binder {
    const REMOTE_CLASS: &'static str = "net.sergeych.tools.Binder";

    fn wrap(proxy: Proxy) -> Result<Self> {
        Ok(Self(proxy))
    }
}
