//! Error types for client operations.

use sesame_core::{ConfigError, ValidationError};
use sesame_rpc::{RemoteErrorKind, RpcError};
use sesame_session::SessionError;
use thiserror::Error;

/// Errors that can occur during a client operation.
///
/// Nothing matching is not an error: lookups return `None`, removals return
/// `false` and searches return an empty list.
#[derive(Debug, Error)]
pub enum Error {
    /// Attributes did not satisfy the schema. Never reaches the service.
    #[error("Invalid attributes: {0}")]
    Validation(#[from] ValidationError),

    /// The transport session could not be established or used.
    #[error("Session error: {0}")]
    Negotiation(#[from] SessionError),

    /// The connection failed or the service broke the protocol.
    #[error("Transport error: {0}")]
    Transport(RpcError),

    /// The service answered with a named error.
    #[error("{kind}: {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },

    /// Still locked after unlocking, or the user dismissed the prompt.
    #[error("Locked or access denied: {0}")]
    LockedOrDenied(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out")]
    Timeout,

    /// A blocking call was made from inside an async context.
    #[error("Blocking call made from within the dispatch loop")]
    WouldBlock,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// The named service error, if this is one.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this is the named service error `kind`.
    pub fn is(&self, kind: RemoteErrorKind) -> bool {
        self.remote_kind() == Some(kind)
    }

    pub(crate) fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }
}

impl From<RpcError> for Error {
    fn from(err: RpcError) -> Self {
        let Some(kind) = err.remote_kind() else {
            return Self::Transport(err);
        };
        let message = match err {
            RpcError::Remote { message, .. } => message,
            other => other.to_string(),
        };
        Self::Remote { kind, message }
    }
}

/// Convenience result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_are_classified() {
        let err: Error = RpcError::remote(RemoteErrorKind::NoSuchObject, "gone").into();
        assert!(err.is(RemoteErrorKind::NoSuchObject));
        assert!(!err.is(RemoteErrorKind::IsLocked));
    }

    #[test]
    fn test_transport_errors_stay_local() {
        let err: Error = RpcError::Closed.into();
        assert!(matches!(err, Error::Transport(RpcError::Closed)));
        assert_eq!(err.remote_kind(), None);
    }

    #[test]
    fn test_validation_error_converts() {
        let err: Error = ValidationError::EmptyTable("org.example".to_string()).into();
        assert!(matches!(err, Error::Validation(_)));
    }
}
