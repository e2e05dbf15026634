//! Transport error types.

use std::fmt;

use thiserror::Error;

use crate::rpc::JsonRpcError;

/// Classification of the named errors a Secret Service peer returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    NoSuchObject,
    IsLocked,
    NoSession,
    AlreadyExists,
    InvalidArgs,
    NotSupported,
    /// Any name this client does not recognise.
    Failed,
}

impl RemoteErrorKind {
    /// Wire name carried in `error.data.name`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSuchObject => "NoSuchObject",
            Self::IsLocked => "IsLocked",
            Self::NoSession => "NoSession",
            Self::AlreadyExists => "AlreadyExists",
            Self::InvalidArgs => "InvalidArgs",
            Self::NotSupported => "NotSupported",
            Self::Failed => "Failed",
        }
    }

    /// Classify a wire error name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "NoSuchObject" => Self::NoSuchObject,
            "IsLocked" => Self::IsLocked,
            "NoSession" => Self::NoSession,
            "AlreadyExists" => Self::AlreadyExists,
            "InvalidArgs" => Self::InvalidArgs,
            "NotSupported" => Self::NotSupported,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur on a connection.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connection is gone; no reply will arrive.
    #[error("Connection closed")]
    Closed,

    /// The peer sent something that does not follow the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer does not implement the method.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The peer answered with a named error.
    #[error("{name}: {message}")]
    Remote { name: String, message: String },
}

impl RpcError {
    /// Build a named peer error.
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            name: kind.as_str().to_string(),
            message: message.into(),
        }
    }

    /// Classify a peer error. `None` for local transport failures.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { name, .. } => Some(RemoteErrorKind::from_name(name)),
            Self::MethodNotFound(_) => Some(RemoteErrorKind::NotSupported),
            _ => None,
        }
    }

    /// Whether this is the named peer error `kind`.
    pub fn is(&self, kind: RemoteErrorKind) -> bool {
        self.remote_kind() == Some(kind)
    }

    /// Get the JSON-RPC error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::MethodNotFound(_) => JsonRpcError::METHOD_NOT_FOUND,
            Self::Json(_) => JsonRpcError::PARSE_ERROR,
            Self::Remote { .. } => JsonRpcError::SERVICE_ERROR,
            _ => JsonRpcError::INTERNAL_ERROR,
        }
    }

    /// Encode for the wire, as a service answers a failed call.
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            Self::Remote { name, message } => JsonRpcError::named(name, message.clone()),
            Self::MethodNotFound(method) => JsonRpcError::method_not_found(method.clone()),
            Self::Json(e) => JsonRpcError::named(RemoteErrorKind::InvalidArgs.as_str(), e.to_string()),
            other => JsonRpcError::new(other.code(), other.to_string()),
        }
    }

    /// Decode an error object received from the peer.
    pub fn from_jsonrpc(error: JsonRpcError) -> Self {
        if let Some(name) = error.name() {
            return Self::Remote {
                name: name.to_string(),
                message: error.message,
            };
        }
        match error.code {
            JsonRpcError::METHOD_NOT_FOUND => Self::MethodNotFound(error.message),
            JsonRpcError::INVALID_PARAMS => Self::remote(RemoteErrorKind::InvalidArgs, error.message),
            _ => Self::remote(RemoteErrorKind::Failed, error.message),
        }
    }
}
