//! Wire frames.
//!
//! Every frame is one JSON object on its own line. Requests carry a
//! monotonically increasing `serial`; responses point back at it through
//! `ref` and carry either a `result` or an `error`.
//!
//! ```text
//! >> {"serial":7,"cmd":"invoke","args":[12,"toString"],"kwargs":{}}
//! << {"serial":9,"ref":7,"result":"Binder{...}"}
//! << {"serial":10,"ref":8,"error":{"class":"NoSuchMethodException","text":"foo"}}
//! ```

use crate::error::Fault;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outgoing request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub serial: u64,
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Request {
    pub fn new(serial: u64, cmd: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            serial,
            cmd: cmd.into(),
            args,
            kwargs: Map::new(),
        }
    }

    /// Encode as a single newline-terminated line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Exception report attached to a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub class: String,
    #[serde(default)]
    pub text: String,
}

/// Incoming frame. Frames without `ref` are peer-initiated and not answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub serial: Option<u64>,
    #[serde(rename = "ref", default)]
    pub reply_to: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    pub fn ok(reply_to: u64, result: Value) -> Self {
        Self {
            serial: None,
            reply_to: Some(reply_to),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(reply_to: u64, class: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            serial: None,
            reply_to: Some(reply_to),
            result: None,
            error: Some(RemoteError {
                class: class.into(),
                text: text.into(),
            }),
        }
    }

    /// Collapse the frame into the caller-facing outcome.
    ///
    /// A response with neither `result` nor `error` is a successful `null`.
    pub fn into_outcome(self) -> Result<Value, Fault> {
        match self.error {
            Some(err) => Err(Fault::Remote {
                class: err.class,
                message: err.text,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
