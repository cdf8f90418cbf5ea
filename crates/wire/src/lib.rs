//! Transport channel to the external execution engine.
//!
//! This crate provides the framing and plumbing for bridge traffic:
//! - Line-delimited JSON request/response frames
//! - Serial-matched multiplexing so many callers can wait concurrently
//! - A child-process transport speaking the protocol over stdio
//! - An in-memory transport for embedding and tests

pub mod channel;
pub mod error;
pub mod frame;
pub mod memory;
pub mod process;
pub mod transport;

pub use channel::LineChannel;
pub use error::{Fault, WireError};
pub use frame::{RemoteError, Request, Response};
pub use memory::{MemoryTransport, RecordedCall};
pub use process::ProcessTransport;
pub use transport::Transport;
