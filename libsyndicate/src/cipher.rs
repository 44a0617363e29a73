//! Token encryption at rest
//!
//! OAuth tokens never reach the store in plaintext. `TokenCipher` seals them
//! with AES-256-GCM and encodes the result as
//! `base64(nonce):base64(tag):base64(ciphertext)`.
//!
//! A cipher can only be constructed from a valid 32-byte key, so every
//! operation on it runs with the configured key.
//!
//! # Examples
//!
//! ```no_run
//! use libsyndicate::cipher::TokenCipher;
//!
//! # fn example() -> libsyndicate::Result<()> {
//! let cipher = TokenCipher::from_env()?;
//! let sealed = cipher.encrypt("access-token")?;
//! assert_eq!(cipher.decrypt(&sealed)?, "access-token");
//! # Ok(())
//! # }
//! ```

use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce, Tag};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CipherError, ConfigError, Result};

/// Environment variable holding the base64-encoded 32-byte key
pub const ENCRYPTION_KEY_ENV: &str = "SYNDICATE_ENCRYPTION_KEY";

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const STATE_LEN: usize = 32;

/// Authenticated encryption for OAuth tokens
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher { key: [redacted] }")
    }
}

impl TokenCipher {
    /// Build a cipher from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(ConfigError::InvalidValue {
                field: ENCRYPTION_KEY_ENV.to_string(),
                reason: format!("expected {} bytes, got {}", KEY_LEN, key.len()),
            }
            .into());
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Ok(Self { cipher })
    }

    /// Build a cipher from a base64-encoded key
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(ConfigError::MissingField(ENCRYPTION_KEY_ENV.to_string()).into());
        }

        let key = Zeroizing::new(STANDARD.decode(encoded).map_err(|e| {
            ConfigError::InvalidValue {
                field: ENCRYPTION_KEY_ENV.to_string(),
                reason: format!("not valid base64: {}", e),
            }
        })?);

        Self::new(&key)
    }

    /// Build a cipher from `SYNDICATE_ENCRYPTION_KEY`
    pub fn from_env() -> Result<Self> {
        let encoded = Zeroizing::new(
            std::env::var(ENCRYPTION_KEY_ENV)
                .map_err(|_| ConfigError::MissingField(ENCRYPTION_KEY_ENV.to_string()))?,
        );
        Self::from_base64_key(&encoded)
    }

    /// Generate a fresh random key, base64-encoded
    pub fn generate_key() -> String {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        STANDARD.encode(&key[..])
    }

    /// Encrypt a token into `nonce:tag:ciphertext`
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(
                CipherError::Encryption("refusing to encrypt an empty token".to_string()).into(),
            );
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        Ok(format!(
            "{}:{}:{}",
            STANDARD.encode(nonce_bytes),
            STANDARD.encode(tag),
            STANDARD.encode(&buffer)
        ))
    }

    /// Decrypt a `nonce:tag:ciphertext` string
    ///
    /// Fails on a malformed encoding, wrong component lengths, or a tag that
    /// does not verify under this key.
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let segments: Vec<&str> = encoded.split(':').collect();
        if segments.len() != 3 {
            return Err(CipherError::Decryption(format!(
                "expected 3 segments, found {}",
                segments.len()
            ))
            .into());
        }

        let nonce_bytes = decode_segment("nonce", segments[0])?;
        let tag_bytes = decode_segment("tag", segments[1])?;
        let mut buffer = decode_segment("ciphertext", segments[2])?;

        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::Decryption(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce_bytes.len()
            ))
            .into());
        }
        if tag_bytes.len() != TAG_LEN {
            return Err(CipherError::Decryption(format!(
                "tag must be {} bytes, got {}",
                TAG_LEN,
                tag_bytes.len()
            ))
            .into());
        }

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce_bytes),
                b"",
                &mut buffer,
                Tag::from_slice(&tag_bytes),
            )
            .map_err(|_| {
                CipherError::Decryption("authentication tag mismatch".to_string())
            })?;

        String::from_utf8(buffer)
            .map_err(|_| CipherError::Decryption("plaintext is not UTF-8".to_string()).into())
    }

    /// One-way SHA-256 digest (hex) for comparing tokens without decrypting
    pub fn hash(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Short digest prefix suitable for log lines
    pub fn fingerprint(token: &str) -> String {
        Self::hash(token)[..12].to_string()
    }

    /// Random CSRF state for an OAuth redirect
    pub fn generate_oauth_state() -> String {
        let mut bytes = [0u8; STATE_LEN];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Compare an echoed OAuth state with the expected value
    ///
    /// Empty inputs never verify. Lengths are compared first; equal-length
    /// inputs are compared in constant time.
    pub fn verify_oauth_state(candidate: &str, expected: &str) -> bool {
        if candidate.is_empty() || expected.is_empty() {
            return false;
        }

        let candidate = candidate.as_bytes();
        let expected = expected.as_bytes();
        if candidate.len() != expected.len() {
            return false;
        }

        candidate.ct_eq(expected).into()
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>> {
    if segment.is_empty() {
        return Err(CipherError::Decryption(format!("{} segment is empty", name)).into());
    }

    STANDARD
        .decode(segment)
        .map_err(|e| CipherError::Decryption(format!("{} is not valid base64: {}", name, e)).into())
}
