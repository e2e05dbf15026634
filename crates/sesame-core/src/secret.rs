//! Secret values with memory protection.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Content type used for password-style secrets.
pub const TEXT_PLAIN: &str = "text/plain";

/// A secret value as moved to and from the service.
///
/// Holds the raw secret bytes plus the content type the service reports for
/// them. The bytes are zeroed on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue {
    bytes: Vec<u8>,
    #[zeroize(skip)]
    content_type: String,
}

impl SecretValue {
    /// Create a secret from raw bytes and a content type.
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Create a `text/plain` secret from a password string.
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(value.into().into_bytes(), TEXT_PLAIN)
    }

    /// Expose the raw secret bytes.
    ///
    /// Use sparingly - only when the actual value is needed.
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    /// Expose the secret as UTF-8 text, if it is valid text.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// The content type reported for this secret.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Check if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Get the length of the secret in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

// Never print secrets
impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("bytes", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl PartialEq for SecretValue {
    fn eq(&self, other: &Self) -> bool {
        // Use constant-time comparison for security
        self.content_type == other.content_type && constant_time_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for SecretValue {}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_value_redacted() {
        let secret = SecretValue::text("hunter2");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("text/plain"));
    }

    #[test]
    fn test_secret_value_expose() {
        let secret = SecretValue::new(vec![0xff, 0xfe], "application/octet-stream");
        assert_eq!(secret.expose(), &[0xff, 0xfe]);
        assert_eq!(secret.content_type(), "application/octet-stream");
        assert_eq!(secret.len(), 2);
        assert!(secret.as_text().is_none());
    }

    #[test]
    fn test_secret_value_text() {
        let secret: SecretValue = "222".into();
        assert_eq!(secret.as_text(), Some("222"));
        assert_eq!(secret.content_type(), TEXT_PLAIN);
    }

    #[test]
    fn test_secret_value_equality() {
        let a = SecretValue::text("secret");
        let b = SecretValue::text("secret");
        let c = SecretValue::text("different");
        let d = SecretValue::new("secret", "application/octet-stream");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
    }
}
