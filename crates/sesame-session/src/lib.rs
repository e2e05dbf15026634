//! Transport sessions for sesame.
//!
//! Negotiates the `plain` and `dh-ietf1024-sha256-aes128-cbc-pkcs7`
//! algorithms and encodes secrets for transfer. Key material lives in
//! zeroizing containers and is destroyed when a session closes.

pub mod crypto;
pub mod error;
pub mod session;
pub mod wire;

pub use crypto::SessionKey;
pub use error::{Result, SessionError};
pub use session::{Algorithm, Handshake, Session, ALGORITHM_AES, ALGORITHM_PLAIN};
pub use wire::EncodedSecret;
