//! Transport for the sesame Secret Service client.
//!
//! This crate provides:
//! - JSON-RPC 2.0 envelopes, one per line
//! - Typed Secret Service methods and their payloads
//! - A client [`Connection`] with ordered writes and reply correlation
//! - A [`Server`] and [`MethodRegistry`] for the serving side

pub mod connection;
pub mod error;
pub mod methods;
pub mod protocol;
pub mod rpc;
pub mod server;

pub use connection::Connection;
pub use error::{RemoteErrorKind, RpcError};
pub use methods::{MethodHandler, MethodRegistry};
pub use protocol::Method;
pub use rpc::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
pub use server::{Notifier, Server};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, RpcError>;
