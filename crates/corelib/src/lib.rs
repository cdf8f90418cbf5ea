//! Core library for the remote-object bridge.
//!
//! This crate provides the building blocks for working with objects that
//! live inside an external execution engine:
//! - Call dispatch and fault mapping
//! - Reference registry with identity-stable proxies
//! - Background finalization of unreachable proxies
//! - Value codec between rich local values and tagged wire values
//! - Type-driven adapter construction
//! - Retry policy and parallel fan-out helpers shared with the network client

pub mod adapter;
pub mod binder;
pub mod case;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
mod finalizer;
pub mod handle;
pub mod parallel;
pub mod proxy;
mod registry;
pub mod retry;
pub mod session;
pub mod value;

pub use adapter::{Adapter, AdapterFactory, TypedAdapter};
pub use binder::Binder;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use handle::{RemoteHandle, RemoteId};
pub use parallel::{PoolConfig, WorkerPool};
pub use proxy::Proxy;
pub use retry::{RetryError, RetryPolicy};
pub use session::{Session, VersionInfo};
pub use value::Value;
