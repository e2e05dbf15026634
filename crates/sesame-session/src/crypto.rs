//! Diffie-Hellman key agreement, HKDF-SHA256 key derivation and AES-128-CBC
//! with PKCS#7 padding.
//!
//! Together these implement the `dh-ietf1024-sha256-aes128-cbc-pkcs7` session
//! algorithm: both sides exchange `2^x mod p` over the 1024-bit MODP group
//! from RFC 2409, feed the zero-padded shared secret to HKDF (no salt, no
//! info) to get a 16-byte key, and encrypt each secret under a fresh random IV.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use num_bigint::BigUint;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{Result, SessionError};

/// Size of the group prime, and of every public value and shared secret.
pub const PRIME_SIZE: usize = 128;

/// AES block size, also the IV size.
pub const BLOCK_SIZE: usize = 16;

/// Size of the derived AES-128 key.
pub const KEY_SIZE: usize = 16;

const GENERATOR: u32 = 2;

/// RFC 2409 second Oakley group (`ietf-ike-grp-modp-1024`).
const MODP_1024_PRIME: [u8; PRIME_SIZE] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xc9, 0x0f, 0xda, 0xa2, 0x21, 0x68, 0xc2, 0x34,
    0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1,
    0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74,
    0x02, 0x0b, 0xbe, 0xa6, 0x3b, 0x13, 0x9b, 0x22,
    0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
    0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b,
    0x30, 0x2b, 0x0a, 0x6d, 0xf2, 0x5f, 0x14, 0x37,
    0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45,
    0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6,
    0xf4, 0x4c, 0x42, 0xe9, 0xa6, 0x37, 0xed, 0x6b,
    0x0b, 0xff, 0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed,
    0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5,
    0xae, 0x9f, 0x24, 0x11, 0x7c, 0x4b, 0x1f, 0xe6,
    0x49, 0x28, 0x66, 0x51, 0xec, 0xe6, 0x53, 0x81,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

fn prime() -> BigUint {
    BigUint::from_bytes_be(&MODP_1024_PRIME)
}

/// Left-pad a big-endian number to the size of the prime.
fn to_fixed_bytes(value: &BigUint) -> Zeroizing<Vec<u8>> {
    let raw = Zeroizing::new(value.to_bytes_be());
    let mut out = Zeroizing::new(vec![0u8; PRIME_SIZE]);
    let offset = PRIME_SIZE.saturating_sub(raw.len());
    out[offset..].copy_from_slice(&raw[raw.len().saturating_sub(PRIME_SIZE)..]);
    out
}

/// A symmetric session key. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Expose the raw key bytes.
    pub fn expose(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// An ephemeral Diffie-Hellman key pair.
pub struct DhKeyPair {
    private: Zeroizing<Vec<u8>>,
    public: Vec<u8>,
}

impl DhKeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let mut private = Zeroizing::new(vec![0u8; PRIME_SIZE]);
        let exponent = loop {
            rand::thread_rng().fill_bytes(&mut private);
            // Keep the exponent below 2^1023, which is below p.
            private[0] &= 0x7f;
            let candidate = BigUint::from_bytes_be(&private);
            if candidate > BigUint::from(1u32) {
                break candidate;
            }
        };

        let public = BigUint::from(GENERATOR).modpow(&exponent, &prime());
        Self {
            private,
            public: to_fixed_bytes(&public).to_vec(),
        }
    }

    /// Public value `g^x mod p`, big-endian and padded to [`PRIME_SIZE`].
    pub fn public_bytes(&self) -> &[u8] {
        &self.public
    }

    /// Compute the shared secret with a peer's public value.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let peer = parse_public(peer_public)?;
        let exponent = BigUint::from_bytes_be(&self.private);
        let shared = peer.modpow(&exponent, &prime());
        Ok(to_fixed_bytes(&shared))
    }

    /// Run the full agreement: shared secret followed by key derivation.
    pub fn agree(&self, peer_public: &[u8]) -> Result<SessionKey> {
        let ikm = self.shared_secret(peer_public)?;
        derive_key(&ikm)
    }
}

/// Check that a peer public value is usable: present, no longer than the
/// prime, and strictly between 1 and p - 1.
fn parse_public(bytes: &[u8]) -> Result<BigUint> {
    if bytes.is_empty() {
        return Err(SessionError::HandshakeMalformed(
            "peer public value is empty".to_string(),
        ));
    }
    if bytes.len() > PRIME_SIZE {
        return Err(SessionError::HandshakeMalformed(format!(
            "peer public value is {} bytes, maximum is {PRIME_SIZE}",
            bytes.len()
        )));
    }

    let value = BigUint::from_bytes_be(bytes);
    let upper = prime() - 1u32;
    if value <= BigUint::from(1u32) || value >= upper {
        return Err(SessionError::HandshakeMalformed(
            "peer public value is out of range".to_string(),
        ));
    }
    Ok(value)
}

/// Derive the 128-bit session key from the shared secret via HKDF-SHA256.
pub fn derive_key(ikm: &[u8]) -> Result<SessionKey> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(&[], &mut okm[..])
        .map_err(|e| SessionError::NegotiationRejected(format!("key derivation failed: {e}")))?;
    Ok(SessionKey::from_bytes(*okm))
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
///
/// Returns `(iv, ciphertext)`; the ciphertext is PKCS#7 padded, so it is
/// never empty and always a multiple of [`BLOCK_SIZE`].
pub fn encrypt(key: &SessionKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut iv = [0u8; BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes128CbcEnc::new_from_slices(key.expose(), &iv)
        .map_err(|e| SessionError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Ok((iv.to_vec(), ciphertext))
}

/// Decrypt data produced by [`encrypt`].
pub fn decrypt(key: &SessionKey, iv: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if iv.len() != BLOCK_SIZE {
        return Err(SessionError::DecryptionFailed(format!(
            "IV must be {BLOCK_SIZE} bytes, got {}",
            iv.len()
        )));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(SessionError::DecryptionFailed(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let cipher = Aes128CbcDec::new_from_slices(key.expose(), iv)
        .map_err(|e| SessionError::DecryptionFailed(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| SessionError::DecryptionFailed("invalid padding".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_agreement_matches() {
        let ours = DhKeyPair::generate();
        let theirs = DhKeyPair::generate();

        let a = ours.shared_secret(theirs.public_bytes()).unwrap();
        let b = theirs.shared_secret(ours.public_bytes()).unwrap();
        assert_eq!(a.len(), PRIME_SIZE);
        assert_eq!(*a, *b);

        let key_a = ours.agree(theirs.public_bytes()).unwrap();
        let key_b = theirs.agree(ours.public_bytes()).unwrap();
        assert_eq!(key_a.expose(), key_b.expose());
    }

    #[test]
    fn test_public_value_is_padded() {
        let pair = DhKeyPair::generate();
        assert_eq!(pair.public_bytes().len(), PRIME_SIZE);
    }

    #[test]
    fn test_rejects_degenerate_public_values() {
        let pair = DhKeyPair::generate();
        assert!(matches!(
            pair.shared_secret(&[]),
            Err(SessionError::HandshakeMalformed(_))
        ));
        assert!(matches!(
            pair.shared_secret(&[1]),
            Err(SessionError::HandshakeMalformed(_))
        ));
        assert!(matches!(
            pair.shared_secret(&MODP_1024_PRIME),
            Err(SessionError::HandshakeMalformed(_))
        ));
        assert!(matches!(
            pair.shared_secret(&[2u8; PRIME_SIZE + 1]),
            Err(SessionError::HandshakeMalformed(_))
        ));
    }

    #[test]
    fn test_hkdf_known_answer() {
        // RFC 5869 test case 3 (no salt, no info), truncated to 16 bytes.
        let ikm = [0x0bu8; 22];
        let key = derive_key(&ikm).unwrap();
        assert_eq!(
            hex::encode(key.expose()),
            "8da4e775a563c18f715f802a063c5a31"
        );
    }

    #[test]
    fn test_round_trip_encrypt_decrypt() {
        let key = SessionKey::from_bytes([7u8; KEY_SIZE]);
        let plaintext = b"hello, secret world!";

        let (iv, ciphertext) = encrypt(&key, plaintext).unwrap();
        assert_eq!(iv.len(), BLOCK_SIZE);
        assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);
        assert_ne!(&ciphertext[..plaintext.len().min(ciphertext.len())], &plaintext[..]);

        let decrypted = decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(&decrypted[..], plaintext);
    }

    #[test]
    fn test_empty_plaintext_is_one_block() {
        let key = SessionKey::from_bytes([1u8; KEY_SIZE]);
        let (iv, ciphertext) = encrypt(&key, b"").unwrap();
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert!(decrypt(&key, &iv, &ciphertext).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key_a = SessionKey::from_bytes([1u8; KEY_SIZE]);
        let key_b = SessionKey::from_bytes([2u8; KEY_SIZE]);
        let (iv, ciphertext) = encrypt(&key_a, b"sensitive data").unwrap();

        // A wrong key almost always breaks the padding; if it happens to
        // produce valid padding the plaintext still differs.
        match decrypt(&key_b, &iv, &ciphertext) {
            Err(SessionError::DecryptionFailed(_)) => {}
            Ok(plain) => assert_ne!(&plain[..], b"sensitive data"),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decrypt_rejects_bad_lengths() {
        let key = SessionKey::from_bytes([3u8; KEY_SIZE]);
        assert!(decrypt(&key, &[0u8; 8], &[0u8; 16]).is_err());
        assert!(decrypt(&key, &[0u8; 16], &[]).is_err());
        assert!(decrypt(&key, &[0u8; 16], &[0u8; 17]).is_err());
    }

    #[test]
    fn test_session_key_debug_is_redacted() {
        let key = SessionKey::from_bytes([9u8; KEY_SIZE]);
        assert_eq!(format!("{key:?}"), "SessionKey([REDACTED])");
    }
}
