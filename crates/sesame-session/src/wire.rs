//! Secret transfer encoding.
//!
//! A secret crosses the transport as a `(session, parameters, value,
//! content_type)` record. Binary fields are carried as standard base64.

use serde::{Deserialize, Serialize};

/// A secret as it travels between client and service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedSecret {
    /// Handle of the session the secret was encoded for.
    pub session: String,
    /// Algorithm parameters. The IV for encrypted sessions, empty for plain.
    #[serde(with = "base64_bytes", default)]
    pub parameters: Vec<u8>,
    /// Secret bytes, encrypted or not depending on the session.
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    pub content_type: String,
}

impl std::fmt::Debug for EncodedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedSecret")
            .field("session", &self.session)
            .field("parameters", &self.parameters.len())
            .field("value", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl Drop for EncodedSecret {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.value);
    }
}

/// Serde adapter for `Vec<u8>` fields carried as base64 strings.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
