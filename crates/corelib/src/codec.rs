//! Value codec.
//!
//! Translates between rich [`Value`]s and the tagged JSON the engine speaks:
//!
//! | local                | wire                                                |
//! |----------------------|-----------------------------------------------------|
//! | `Binary(bytes)`      | `{"__type": "binary", "base64": "..."}`             |
//! | `Time(t)`            | `{"__type": "unixtime", "seconds": 1700000000}`     |
//! | `Remote(proxy)`      | `{"__type": "RemoteObject", "id": 7, "className": "..."}` |
//! | scalars, arrays, maps| unchanged                                           |
//!
//! Map keys are never rewritten. Decoded remote records are handed to a
//! [`Resolve`] implementation, normally the session, which turns them into
//! proxies or typed adapters.

use crate::error::{BridgeError, Result};
use crate::handle::{RemoteHandle, RemoteId};
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::DateTime;
use serde_json::{json, Map, Number, Value as Json};
use std::collections::BTreeMap;

pub const TYPE_KEY: &str = "__type";
pub const REMOTE_OBJECT_TAG: &str = "RemoteObject";
pub const BINARY_TAG: &str = "binary";
pub const TIME_TAG: &str = "unixtime";

/// Turns decoded remote references into local values.
pub trait Resolve {
    /// Session whose handles this resolver accepts.
    fn session_id(&self) -> u64;

    /// Produce the local value for a remote reference.
    fn resolve(&self, handle: RemoteHandle) -> Result<Value>;
}

/// Resolver for values that live outside any session; rejects references.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl Resolve for Detached {
    fn session_id(&self) -> u64 {
        0
    }

    fn resolve(&self, handle: RemoteHandle) -> Result<Value> {
        Err(BridgeError::Codec(format!(
            "reference {handle} outside of a bridge session"
        )))
    }
}

/// Encode one argument for the session `session_id`.
pub fn encode(value: &Value, session_id: u64) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(x) => Number::from_f64(*x)
            .map(Json::Number)
            .ok_or_else(|| BridgeError::Codec(format!("cannot encode {x}")))?,
        Value::String(s) => Json::String(s.clone()),
        Value::Binary(bytes) => json!({ TYPE_KEY: BINARY_TAG, "base64": STANDARD.encode(bytes) }),
        Value::Time(t) => {
            if t.timestamp_subsec_nanos() != 0 {
                return Err(BridgeError::Codec(format!("{t} has sub-second precision")));
            }
            json!({ TYPE_KEY: TIME_TAG, "seconds": t.timestamp() })
        }
        Value::Array(items) => Json::Array(
            items
                .iter()
                .map(|item| encode(item, session_id))
                .collect::<Result<_>>()?,
        ),
        Value::Map(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), encode(item, session_id)?);
            }
            Json::Object(out)
        }
        Value::Remote(remote) => {
            let proxy = remote.proxy();
            if proxy.session_id() != session_id {
                return Err(BridgeError::Interchange);
            }
            json!({
                TYPE_KEY: REMOTE_OBJECT_TAG,
                "id": proxy.remote_id().0,
                "className": proxy.type_name(),
            })
        }
    })
}

/// Encode an argument list.
pub fn encode_args(args: &[Value], session_id: u64) -> Result<Vec<Json>> {
    args.iter().map(|arg| encode(arg, session_id)).collect()
}

/// Decode one result value.
pub fn decode(json: Json, resolver: &dyn Resolve) -> Result<Value> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if n.is_u64() {
                return Err(BridgeError::Codec(format!("integer {n} out of range")));
            } else {
                Value::Float(
                    n.as_f64()
                        .ok_or_else(|| BridgeError::Codec(format!("bad number {n}")))?,
                )
            }
        }
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| decode(item, resolver))
                .collect::<Result<_>>()?,
        ),
        Json::Object(map) => return decode_object(map, resolver),
    })
}

fn decode_object(mut map: Map<String, Json>, resolver: &dyn Resolve) -> Result<Value> {
    let tag = map.get(TYPE_KEY).and_then(Json::as_str).map(str::to_owned);
    match tag.as_deref() {
        Some(REMOTE_OBJECT_TAG) => {
            let id = map
                .get("id")
                .and_then(Json::as_i64)
                .ok_or_else(|| BridgeError::Codec("remote object without id".into()))?;
            let class = match map.remove("className") {
                Some(Json::String(class)) => class,
                _ => return Err(BridgeError::Codec("remote object without className".into())),
            };
            resolver.resolve(RemoteHandle::new(RemoteId(id), class))
        }
        Some(BINARY_TAG) => {
            let encoded = map
                .get("base64")
                .and_then(Json::as_str)
                .ok_or_else(|| BridgeError::Codec("binary without base64".into()))?;
            // encoders may wrap base64 lines
            let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Binary)
                .map_err(|e| BridgeError::Codec(format!("bad base64: {e}")))
        }
        Some(TIME_TAG) => {
            let seconds = map
                .get("seconds")
                .ok_or_else(|| BridgeError::Codec("unixtime without seconds".into()))
                .and_then(whole_seconds)?;
            DateTime::from_timestamp(seconds, 0)
                .map(Value::Time)
                .ok_or_else(|| BridgeError::Codec(format!("timestamp {seconds} out of range")))
        }
        _ => {
            let mut out = BTreeMap::new();
            for (key, item) in map {
                out.insert(key, decode(item, resolver)?);
            }
            Ok(Value::Map(out))
        }
    }
}

fn whole_seconds(seconds: &Json) -> Result<i64> {
    if let Some(s) = seconds.as_i64() {
        return Ok(s);
    }
    match seconds.as_f64() {
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f as i64)
        }
        _ => Err(BridgeError::Codec(format!("bad unixtime seconds {seconds}"))),
    }
}
