//! Local proxies for remote objects.
//!
//! # Lifecycle
//!
//! A [`Proxy`] is a cheap, cloneable handle to one shared `ProxyInner`. The
//! registry keeps only a weak entry, so when the last clone goes away the
//! inner value is dropped and its `Drop` impl reports the remote id as
//! unreachable. The finalization worker then releases the remote object.
//!
//! # Equality
//!
//! - `==` compares session and remote id, so a proxy recreated after
//!   collection still equals the old one.
//! - [`Proxy::same_instance`] checks that two proxies are the very same
//!   local object.
//! - [`Proxy::remote_equals`] asks the engine's `equals`.

use crate::error::Result;
use crate::handle::{RemoteHandle, RemoteId};
use crate::session::{Session, SessionCore};
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

pub(crate) struct ProxyInner {
    handle: RemoteHandle,
    core: Arc<SessionCore>,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        self.core
            .registry
            .notify_unreachable(self.handle.remote_id, self as *const ProxyInner);
    }
}

/// Local stand-in for one remote object.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<ProxyInner>,
}

impl Proxy {
    pub(crate) fn new(handle: RemoteHandle, core: Arc<SessionCore>) -> Self {
        Self {
            inner: Arc::new(ProxyInner { handle, core }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ProxyInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn handle(&self) -> &RemoteHandle {
        &self.inner.handle
    }

    pub fn remote_id(&self) -> RemoteId {
        self.inner.handle.remote_id
    }

    /// Remote class name as reported by the engine.
    pub fn type_name(&self) -> &str {
        &self.inner.handle.type_name
    }

    /// Id of the session this proxy belongs to.
    pub fn session_id(&self) -> u64 {
        self.inner.core.id
    }

    /// The session this proxy is bound to.
    pub fn session(&self) -> Session {
        Session::from_core(Arc::clone(&self.inner.core))
    }

    /// Call any remote method by name.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.session().invoke(self, method, args)
    }

    /// True when both proxies are the same local object.
    pub fn same_instance(a: &Proxy, b: &Proxy) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Compare through the remote `equals`. Same remote id short-circuits.
    pub fn remote_equals(&self, other: &Proxy) -> Result<bool> {
        if self == other {
            return Ok(true);
        }
        let answer = self.call("equals", vec![Value::from(other.clone())])?;
        Ok(answer.as_bool().unwrap_or(false))
    }

    /// Remote `toString()`; not cached.
    pub fn to_remote_string(&self) -> Result<String> {
        let answer = self.call("toString", Vec::new())?;
        Ok(answer.as_str().unwrap_or_default().to_string())
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.session_id() == other.session_id() && self.remote_id() == other.remote_id()
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session_id().hash(state);
        self.remote_id().hash(state);
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<UMI:Ref:{}:{}:{}>",
            self.session_id(),
            self.type_name(),
            self.remote_id().0
        )
    }
}
