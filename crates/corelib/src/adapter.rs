//! Adapter factory.
//!
//! Remote objects arrive as generic [`Proxy`] values. The factory maps a
//! remote class name to a constructor for a typed wrapper so callers get an
//! explicit interface for known remote types. Unknown classes pass through
//! as the generic proxy, which still offers the dynamic
//! [`Proxy::call`] capability.
//!
//! Registration is append-only and happens before the session is opened;
//! registering the same class twice is a configuration error.

use crate::error::{BridgeError, Result};
use crate::proxy::Proxy;
use crate::session::Session;
use crate::value::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Anything that stands in for a remote object.
pub trait Adapter: Any + Send + Sync + fmt::Debug {
    /// The proxy this adapter forwards to.
    fn proxy(&self) -> &Proxy;

    /// Upcast for downcasting to the concrete adapter type.
    fn as_any(&self) -> &dyn Any;
}

/// A wrapper with an explicit interface for one remote class.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone)]
/// struct KeyAddress(Proxy);
///
/// impl Adapter for KeyAddress { /* proxy(), as_any() */ }
///
/// impl TypedAdapter for KeyAddress {
///     const REMOTE_CLASS: &'static str = "com.icodici.crypto.KeyAddress";
///     fn wrap(proxy: Proxy) -> Result<Self> { Ok(Self(proxy)) }
/// }
/// ```
pub trait TypedAdapter: Adapter + Sized {
    /// Fully qualified remote class this adapter wraps.
    const REMOTE_CLASS: &'static str;

    /// Build the adapter around an existing proxy.
    fn wrap(proxy: Proxy) -> Result<Self>;

    /// Create a new remote instance through its constructor and wrap it.
    fn instantiate(session: &Session, args: Vec<Value>) -> Result<Self> {
        session
            .instantiate(Self::REMOTE_CLASS, args)?
            .into_adapter()
    }

    /// Call a static method of the remote class.
    fn invoke_static(session: &Session, method: &str, args: Vec<Value>) -> Result<Value> {
        session.invoke_static(Self::REMOTE_CLASS, method, args)
    }
}

type Constructor = Box<dyn Fn(Proxy) -> Result<Arc<dyn Adapter>> + Send + Sync>;

/// Remote class name to adapter constructor.
#[derive(Default)]
pub struct AdapterFactory {
    constructors: HashMap<String, Constructor>,
}

impl AdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` for its [`TypedAdapter::REMOTE_CLASS`].
    pub fn register<T: TypedAdapter>(&mut self) -> Result<()> {
        self.register_with(T::REMOTE_CLASS, |proxy| {
            T::wrap(proxy).map(|adapter| Arc::new(adapter) as Arc<dyn Adapter>)
        })
    }

    /// Builder-style [`AdapterFactory::register`].
    pub fn with<T: TypedAdapter>(mut self) -> Result<Self> {
        self.register::<T>()?;
        Ok(self)
    }

    /// Register a custom constructor for `class`.
    pub fn register_with<F>(&mut self, class: &str, constructor: F) -> Result<()>
    where
        F: Fn(Proxy) -> Result<Arc<dyn Adapter>> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(class) {
            return Err(BridgeError::DuplicateAdapter(class.to_string()));
        }
        self.constructors
            .insert(class.to_string(), Box::new(constructor));
        Ok(())
    }

    pub fn is_registered(&self, class: &str) -> bool {
        self.constructors.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Wrap `proxy` with the registered adapter for its class, or return it
    /// unchanged when the class is unknown.
    pub fn adapt(&self, proxy: Proxy) -> Result<Arc<dyn Adapter>> {
        match self.constructors.get(proxy.type_name()) {
            Some(constructor) => constructor(proxy),
            None => Ok(Arc::new(proxy)),
        }
    }
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<_> = self.constructors.keys().collect();
        classes.sort();
        f.debug_struct("AdapterFactory")
            .field("classes", &classes)
            .finish()
    }
}

impl Adapter for Proxy {
    fn proxy(&self) -> &Proxy {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
