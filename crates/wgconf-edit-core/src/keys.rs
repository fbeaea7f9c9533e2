//! Curve25519 key pairs in the base64 form used by tunnel configuration files.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

pub const KEY_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is not valid base64")]
    InvalidBase64,

    #[error("key must decode to 32 bytes, got {actual}")]
    InvalidLength { actual: usize },
}

#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    private: [u8; KEY_LEN],
    public: [u8; KEY_LEN],
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self::from_private(clamp(bytes))
    }

    pub fn from_private(private: [u8; KEY_LEN]) -> Self {
        let public = public_for(private);
        Self { private, public }
    }

    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        decode_key(encoded).map(Self::from_private)
    }

    pub fn private_key(&self) -> &[u8; KEY_LEN] {
        &self.private
    }

    pub fn public_key(&self) -> &[u8; KEY_LEN] {
        &self.public
    }

    pub fn private_base64(&self) -> String {
        encode_key(&self.private)
    }

    pub fn public_base64(&self) -> String {
        encode_key(&self.public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"<redacted>")
            .field("public", &self.public_base64())
            .finish()
    }
}

/// Applies the X25519 scalar clamping rules to raw random bytes.
pub fn clamp(mut bytes: [u8; KEY_LEN]) -> [u8; KEY_LEN] {
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    bytes
}

/// Derives the public key for `private`, which must be exactly 32 bytes.
pub fn derive_public(private: &[u8]) -> Result<[u8; KEY_LEN], KeyError> {
    let bytes: [u8; KEY_LEN] = private
        .try_into()
        .map_err(|_| KeyError::InvalidLength {
            actual: private.len(),
        })?;
    Ok(public_for(bytes))
}

pub fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| KeyError::InvalidBase64)?;
    decoded
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidLength {
            actual: decoded.len(),
        })
}

pub fn encode_key(key: &[u8; KEY_LEN]) -> String {
    STANDARD.encode(key)
}

fn public_for(private: [u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let secret = StaticSecret::from(private);
    PublicKey::from(&secret).to_bytes()
}
