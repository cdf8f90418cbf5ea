//! Bridge session.
//!
//! A [`Session`] is the explicit context object for one engine connection.
//! It is built once at startup and passed (cloned) to every component that
//! needs bridge access. It owns:
//!
//! - the call dispatcher and its transport
//! - the reference registry and the finalization worker
//! - the adapter factory used to type decoded references
//!
//! Proxies keep their session alive; the engine connection is closed on
//! [`Session::close`] or when the last session clone and proxy are gone.

use crate::adapter::AdapterFactory;
use crate::case::camelize_lower;
use crate::codec::{self, Resolve};
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::finalizer::Finalizer;
use crate::handle::{RemoteHandle, RemoteId};
use crate::proxy::Proxy;
use crate::registry::Registry;
use crate::value::Value;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value as Json;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use umi_wire::{ProcessTransport, Transport};

/// Remote collection classes copied into a local array on decode.
pub const SET_CLASSES: &[&str] = &["java.util.HashSet", "java.util.Set", "java.util.LinkedHashSet"];

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// What the engine reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    pub system: String,
    pub version: String,
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.system, self.version)
    }
}

pub(crate) struct SessionCore {
    pub(crate) id: u64,
    pub(crate) registry: Registry,
    dispatcher: Arc<Dispatcher>,
    adapters: AdapterFactory,
    convert_case: bool,
    version: VersionInfo,
    finalizer: Mutex<Option<Finalizer>>,
}

impl SessionCore {
    fn shutdown(&self) {
        let was_open = self.dispatcher.close();
        if let Some(finalizer) = self.finalizer.lock().take() {
            finalizer.shutdown();
        }
        if was_open {
            info!(session = self.id, "bridge session closed");
        }
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One open connection to the engine.
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
}

impl Session {
    /// Spawn the engine described by `config` and open a session to it.
    pub fn connect(config: &BridgeConfig, adapters: AdapterFactory) -> Result<Session> {
        let program = config.program.display().to_string();
        let transport = ProcessTransport::spawn(&program, config.command_args())
            .map_err(|e| BridgeError::Spawn(e.to_string()))?;
        Self::open(Arc::new(transport), config, adapters)
    }

    /// Open a session over an existing transport.
    ///
    /// Checks the engine's `version()` first; the transport is closed if
    /// the engine is not acceptable.
    pub fn open(
        transport: Arc<dyn Transport>,
        config: &BridgeConfig,
        adapters: AdapterFactory,
    ) -> Result<Session> {
        let dispatcher = Arc::new(Dispatcher::new(transport));
        let version = match handshake(&dispatcher, config) {
            Ok(version) => version,
            Err(e) => {
                dispatcher.close();
                return Err(e);
            }
        };

        let finalizer = Finalizer::start(Arc::clone(&dispatcher));
        let registry = Registry::new(finalizer.queue(), dispatcher.closed_flag());
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        info!(session = id, engine = %version, adapters = adapters.len(), "bridge session open");

        Ok(Session {
            core: Arc::new(SessionCore {
                id,
                registry,
                dispatcher,
                adapters,
                convert_case: config.convert_case,
                version,
                finalizer: Mutex::new(Some(finalizer)),
            }),
        })
    }

    pub(crate) fn from_core(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Engine version string, e.g. `0.8.21`.
    pub fn version(&self) -> &str {
        &self.core.version.version
    }

    pub fn version_info(&self) -> &VersionInfo {
        &self.core.version
    }

    pub fn is_closed(&self) -> bool {
        self.core.dispatcher.is_closed()
    }

    /// Create a remote instance of `class` with constructor `args`.
    pub fn instantiate(&self, class: &str, args: Vec<Value>) -> Result<Value> {
        self.ensure_open()?;
        let mut wire = Vec::with_capacity(args.len() + 1);
        wire.push(Json::String(class.to_string()));
        wire.extend(codec::encode_args(&args, self.id())?);
        self.call_and_decode("instantiate", wire)
    }

    /// Call `method` on the remote object behind `target`.
    pub fn invoke(&self, target: &Proxy, method: &str, args: Vec<Value>) -> Result<Value> {
        self.ensure_open()?;
        if target.session_id() != self.id() {
            return Err(BridgeError::Interchange);
        }
        let method = if self.core.convert_case {
            camelize_lower(method)
        } else {
            method.to_string()
        };
        let mut wire = Vec::with_capacity(args.len() + 2);
        wire.push(Json::from(target.remote_id().0));
        wire.push(Json::String(method));
        wire.extend(codec::encode_args(&args, self.id())?);
        self.call_and_decode("invoke", wire)
    }

    /// Call a static `method` of remote `class`. The method name is sent as is.
    pub fn invoke_static(&self, class: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        self.ensure_open()?;
        let mut wire = Vec::with_capacity(args.len() + 2);
        wire.push(Json::String(class.to_string()));
        wire.push(Json::String(method.to_string()));
        wire.extend(codec::encode_args(&args, self.id())?);
        self.call_and_decode("invoke", wire)
    }

    /// Debug lookup of a live cached proxy. Does not ask the engine.
    pub fn find_by_remote_id(&self, remote_id: RemoteId) -> Option<Proxy> {
        self.core.registry.find(remote_id)
    }

    /// Number of proxies currently reachable.
    pub fn live_proxies(&self) -> usize {
        self.core.registry.live_count()
    }

    /// Run `f` with protocol tracing on; the previous state is restored after.
    pub fn with_trace<T>(&self, f: impl FnOnce() -> T) -> T {
        let previous = self.core.dispatcher.set_trace(true);
        let result = f();
        self.core.dispatcher.set_trace(previous);
        result
    }

    /// Close the engine connection. Later calls fail with `SessionClosed`;
    /// pending drop notices are discarded.
    pub fn close(&self) {
        self.core.shutdown();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BridgeError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn call_and_decode(&self, command: &str, args: Vec<Json>) -> Result<Value> {
        let result = self.core.dispatcher.call(command, args)?;
        codec::decode(result, self)
    }
}

impl Resolve for Session {
    fn session_id(&self) -> u64 {
        self.core.id
    }

    fn resolve(&self, handle: RemoteHandle) -> Result<Value> {
        let core = Arc::clone(&self.core);
        let proxy = self
            .core
            .registry
            .register(handle, move |handle| Proxy::new(handle, core));
        if SET_CLASSES.contains(&proxy.type_name()) {
            return proxy.call("toArray", Vec::new());
        }
        self.core.adapters.adapt(proxy).map(Value::Remote)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<UMI:{}:{}>", self.core.id, self.core.version.version)
    }
}

fn handshake(dispatcher: &Dispatcher, config: &BridgeConfig) -> Result<VersionInfo> {
    let raw = dispatcher.call("version", Vec::new())?;
    let info: VersionInfo = serde_json::from_value(raw)
        .map_err(|e| BridgeError::Codec(format!("bad version reply: {e}")))?;
    if info.system != config.expected_system {
        warn!(system = %info.system, "unexpected engine");
        return Err(BridgeError::UnsupportedSystem(info.to_string()));
    }
    if let Some(prefix) = &config.version_prefix {
        if !info.version.starts_with(prefix.as_str()) {
            return Err(BridgeError::UnsupportedVersion(info.to_string()));
        }
    }
    Ok(info)
}
