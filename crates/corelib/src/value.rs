//! Local values exchanged with the engine.
//!
//! `Value` is the rich side of the codec: it knows about binary blobs,
//! timestamps and remote objects, which the wire only sees as tagged
//! records. See [`crate::codec`] for the translation.

use crate::adapter::{Adapter, TypedAdapter};
use crate::error::{BridgeError, Result};
use crate::proxy::Proxy;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A value passed to or returned from the engine.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Raw bytes; travels as base64.
    Binary(Vec<u8>),
    /// Whole-second timestamp.
    Time(DateTime<Utc>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// A remote object, either a typed adapter or a generic [`Proxy`].
    Remote(Arc<dyn Adapter>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The proxy behind a remote value, typed or not.
    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Remote(remote) => Some(remote.proxy()),
            _ => None,
        }
    }

    /// Borrow the typed adapter the factory built for this value, if any.
    pub fn downcast_ref<T: Adapter>(&self) -> Option<&T> {
        match self {
            Value::Remote(remote) => remote.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Wrap a remote value into `T`, whether or not the factory knew `T`.
    pub fn into_adapter<T: TypedAdapter>(self) -> Result<T> {
        match self {
            Value::Remote(remote) => T::wrap(remote.proxy().clone()),
            other => Err(BridgeError::Adapter {
                class: T::REMOTE_CLASS.to_string(),
                reason: format!("expected a remote object, got {}", other.kind()),
            }),
        }
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Time(_) => "time",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Remote(_) => "remote",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Remote(a), Value::Remote(b)) => a.proxy() == b.proxy(),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
            Value::Time(t) => write!(f, "Time({t})"),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
            Value::Remote(remote) => write!(f, "Remote({:?})", remote),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Truncates to whole seconds, the wire's time resolution.
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t.trunc_subsecs(0))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<Proxy> for Value {
    fn from(proxy: Proxy) -> Self {
        Value::Remote(Arc::new(proxy))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
