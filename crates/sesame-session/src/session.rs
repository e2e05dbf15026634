//! Transport sessions.
//!
//! A [`Handshake`] produces the input for `OpenSession` and turns the
//! service's answer into a [`Session`]. The service side of the same exchange
//! is [`Session::accept`]. Neither does any I/O.

use std::fmt;

use parking_lot::RwLock;
use sesame_core::SecretValue;
use tracing::debug;

use crate::crypto::{self, DhKeyPair, SessionKey};
use crate::error::{Result, SessionError};
use crate::wire::EncodedSecret;

/// Wire name of the unencrypted algorithm.
pub const ALGORITHM_PLAIN: &str = "plain";

/// Wire name of the DH + AES-128-CBC algorithm.
pub const ALGORITHM_AES: &str = "dh-ietf1024-sha256-aes128-cbc-pkcs7";

/// Session algorithms this crate can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Plain,
    DhAes,
}

impl Algorithm {
    /// Name used in `OpenSession`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => ALGORITHM_PLAIN,
            Self::DhAes => ALGORITHM_AES,
        }
    }

    /// Parse a wire algorithm name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            ALGORITHM_PLAIN => Ok(Self::Plain),
            ALGORITHM_AES => Ok(Self::DhAes),
            other => Err(SessionError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client half of a session negotiation in progress.
pub enum Handshake {
    Plain,
    DhAes(DhKeyPair),
}

impl Handshake {
    /// Start a plain negotiation.
    pub fn plain() -> Self {
        Self::Plain
    }

    /// Start a DH negotiation with a fresh key pair.
    pub fn aes() -> Self {
        Self::DhAes(DhKeyPair::generate())
    }

    /// Start a negotiation for the given algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Plain => Self::plain(),
            Algorithm::DhAes => Self::aes(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Plain => Algorithm::Plain,
            Self::DhAes(_) => Algorithm::DhAes,
        }
    }

    /// Bytes to send as the `OpenSession` input.
    pub fn input(&self) -> Vec<u8> {
        match self {
            Self::Plain => Vec::new(),
            Self::DhAes(pair) => pair.public_bytes().to_vec(),
        }
    }

    /// Finish the negotiation with the service's output and session handle.
    pub fn complete(self, output: &[u8], handle: impl Into<String>) -> Result<Session> {
        let handle = handle.into();
        if handle.is_empty() {
            return Err(SessionError::HandshakeMalformed(
                "service returned an empty session handle".to_string(),
            ));
        }

        let state = match self {
            Self::Plain => State::Plain,
            Self::DhAes(pair) => State::Keyed(pair.agree(output)?),
        };
        let session = Session::from_state(handle, state);
        debug!(session = %session.handle, algorithm = %session.algorithm, "session negotiated");
        Ok(session)
    }
}

enum State {
    Plain,
    Keyed(SessionKey),
    Closed,
}

/// A negotiated session.
///
/// Shared between every operation on one connection. Closing it destroys the
/// key immediately; later encode or decode calls fail with
/// [`SessionError::Closed`].
pub struct Session {
    handle: String,
    algorithm: Algorithm,
    state: RwLock<State>,
}

impl Session {
    fn from_state(handle: String, state: State) -> Self {
        let algorithm = match state {
            State::Keyed(_) => Algorithm::DhAes,
            _ => Algorithm::Plain,
        };
        Self {
            handle,
            algorithm,
            state: RwLock::new(state),
        }
    }

    /// Service side of `OpenSession`: answer a client's request.
    ///
    /// Returns the session and the output bytes to send back.
    pub fn accept(
        algorithm: &str,
        input: &[u8],
        handle: impl Into<String>,
    ) -> Result<(Self, Vec<u8>)> {
        match Algorithm::from_name(algorithm)? {
            Algorithm::Plain => Ok((Self::from_state(handle.into(), State::Plain), Vec::new())),
            Algorithm::DhAes => {
                let pair = DhKeyPair::generate();
                let key = pair.agree(input)?;
                let output = pair.public_bytes().to_vec();
                Ok((Self::from_state(handle.into(), State::Keyed(key)), output))
            }
        }
    }

    /// Service-assigned handle.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.read(), State::Closed)
    }

    /// Destroy the key material. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.write();
        if !matches!(*state, State::Closed) {
            debug!(session = %self.handle, "session closed");
        }
        // Dropping the old state zeroizes the key.
        *state = State::Closed;
    }

    /// Encode a secret for transfer on this session.
    pub fn encode(&self, secret: &SecretValue) -> Result<EncodedSecret> {
        let (parameters, value) = match &*self.state.read() {
            State::Closed => return Err(SessionError::Closed),
            State::Plain => (Vec::new(), secret.expose().to_vec()),
            State::Keyed(key) => crypto::encrypt(key, secret.expose())?,
        };

        Ok(EncodedSecret {
            session: self.handle.clone(),
            parameters,
            value,
            content_type: secret.content_type().to_string(),
        })
    }

    /// Decode a secret received on this session.
    pub fn decode(&self, encoded: &EncodedSecret) -> Result<SecretValue> {
        if encoded.session != self.handle {
            return Err(SessionError::WrongSession {
                expected: self.handle.clone(),
                found: encoded.session.clone(),
            });
        }

        match &*self.state.read() {
            State::Closed => Err(SessionError::Closed),
            State::Plain => {
                if !encoded.parameters.is_empty() {
                    return Err(SessionError::DecryptionFailed(
                        "plain secret carries algorithm parameters".to_string(),
                    ));
                }
                Ok(SecretValue::new(
                    encoded.value.clone(),
                    encoded.content_type.clone(),
                ))
            }
            State::Keyed(key) => {
                let plain = crypto::decrypt(key, &encoded.parameters, &encoded.value)?;
                Ok(SecretValue::new(plain.to_vec(), encoded.content_type.clone()))
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("algorithm", &self.algorithm)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiate(algorithm: Algorithm) -> (Session, Session) {
        let handshake = Handshake::new(algorithm);
        let (server, output) =
            Session::accept(algorithm.as_str(), &handshake.input(), "/session/7").unwrap();
        let client = handshake.complete(&output, "/session/7").unwrap();
        (client, server)
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(Algorithm::from_name("plain").unwrap(), Algorithm::Plain);
        assert_eq!(
            Algorithm::from_name("dh-ietf1024-sha256-aes128-cbc-pkcs7").unwrap(),
            Algorithm::DhAes
        );
        assert!(matches!(
            Algorithm::from_name("rot13"),
            Err(SessionError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_aes_session_transfers_secret() {
        let (client, server) = negotiate(Algorithm::DhAes);
        assert_eq!(client.algorithm(), Algorithm::DhAes);

        let encoded = client.encode(&SecretValue::text("222")).unwrap();
        assert_eq!(encoded.parameters.len(), 16);
        assert_eq!(encoded.value.len(), 16);
        assert_ne!(encoded.value, b"222");

        let decoded = server.decode(&encoded).unwrap();
        assert_eq!(decoded.expose(), b"222");
        assert_eq!(decoded.content_type(), "text/plain");
    }

    #[test]
    fn test_plain_session_is_identity() {
        let (client, server) = negotiate(Algorithm::Plain);
        let encoded = client.encode(&SecretValue::new(vec![0, 1, 2], "application/octet-stream")).unwrap();
        assert!(encoded.parameters.is_empty());
        assert_eq!(encoded.value, vec![0, 1, 2]);

        let decoded = server.decode(&encoded).unwrap();
        assert_eq!(decoded.expose(), &[0, 1, 2]);
        assert_eq!(decoded.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_plain_rejects_parameters() {
        let (client, _server) = negotiate(Algorithm::Plain);
        let mut encoded = client.encode(&SecretValue::text("x")).unwrap();
        encoded.parameters = vec![1; 16];
        assert!(matches!(
            client.decode(&encoded),
            Err(SessionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_other_session() {
        let (client, _) = negotiate(Algorithm::DhAes);
        let (other, _) = negotiate(Algorithm::DhAes);
        let mut encoded = other.encode(&SecretValue::text("x")).unwrap();
        encoded.session = "/session/other".to_string();

        assert!(matches!(
            client.decode(&encoded),
            Err(SessionError::WrongSession { .. })
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (client, server) = negotiate(Algorithm::DhAes);
        let mut encoded = client.encode(&SecretValue::text("secret")).unwrap();
        encoded.value.truncate(8);
        assert!(matches!(
            server.decode(&encoded),
            Err(SessionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_closed_session_refuses_work() {
        let (client, _server) = negotiate(Algorithm::DhAes);
        let encoded = client.encode(&SecretValue::text("x")).unwrap();
        client.close();
        client.close();

        assert!(client.is_closed());
        assert_eq!(client.encode(&SecretValue::text("x")).unwrap_err(), SessionError::Closed);
        assert_eq!(client.decode(&encoded).unwrap_err(), SessionError::Closed);
    }

    #[test]
    fn test_complete_rejects_bad_output() {
        let handshake = Handshake::aes();
        assert!(matches!(
            handshake.complete(&[], "/session/1"),
            Err(SessionError::HandshakeMalformed(_))
        ));

        let handshake = Handshake::plain();
        assert!(matches!(
            handshake.complete(&[], ""),
            Err(SessionError::HandshakeMalformed(_))
        ));
    }

    #[test]
    fn test_accept_rejects_unknown_algorithm() {
        assert!(matches!(
            Session::accept("des", &[], "/session/1"),
            Err(SessionError::UnsupportedAlgorithm(_))
        ));
    }
}
