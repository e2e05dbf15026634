//! Error types for session negotiation and secret transfer.

use thiserror::Error;

/// Errors that can occur while negotiating or using a transport session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session negotiation rejected: {0}")]
    NegotiationRejected(String),

    #[error("Malformed handshake: {0}")]
    HandshakeMalformed(String),

    #[error("Unsupported session algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Secret encoded for session {found}, expected {expected}")]
    WrongSession { expected: String, found: String },

    #[error("Session is closed")]
    Closed,
}

/// Convenience result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
