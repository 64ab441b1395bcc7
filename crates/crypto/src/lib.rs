#![forbid(unsafe_code)]
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing
    )
)]

//! # Attestor Crypto
//!
//! Hashing and signing primitives for the oracle protocol: SHA-256 and
//! secp256k1 ECDSA with 64-byte compact signatures over 33-byte compressed
//! public keys.
//!
//! All protocol signatures are computed over the canonical codec encoding of
//! a payload (`attestor_types::codec::encode`), never over ad-hoc JSON; the
//! helpers here therefore take the already-encoded buffer and hash it
//! internally.

use attestor_types::error::OracleError;
use once_cell::sync::Lazy;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

pub use secp256k1::PublicKey;

/// End-user auth envelope verification.
pub mod auth;

/// Length of a compact ECDSA signature.
pub const SIGNATURE_LEN: usize = 64;
/// Length of a compressed secp256k1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Computes the SHA-256 digest of a buffer.
pub fn sha256(buf: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(buf);
    digest.into()
}

/// Signs `SHA-256(buf)` with the given secret key, returning the 64-byte
/// compact signature.
pub fn sign(buf: &[u8], secret: &SecretKey) -> [u8; SIGNATURE_LEN] {
    let message = Message::from_digest(sha256(buf));
    SECP.sign_ecdsa(&message, secret).serialize_compact()
}

/// Verifies a compact signature over `SHA-256(buf)` under a public key.
///
/// Malformed signatures verify as `false` rather than erroring; the caller
/// only ever cares whether the buffer is authentic.
pub fn verify(buf: &[u8], signature: &[u8], public: &PublicKey) -> bool {
    let Ok(signature) = Signature::from_compact(signature) else {
        return false;
    };
    let message = Message::from_digest(sha256(buf));
    SECP.verify_ecdsa(&message, &signature, public).is_ok()
}

/// Parses a hex-encoded compressed public key.
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, OracleError> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| OracleError::Crypto(format!("public key is not valid hex: {e}")))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| OracleError::Crypto(format!("invalid public key: {e}")))
}

/// The local node's key material, parsed once from configuration.
#[derive(Clone)]
pub struct NodeKeys {
    secret: SecretKey,
    public: PublicKey,
}

impl std::fmt::Debug for NodeKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret key.
        f.debug_struct("NodeKeys")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl NodeKeys {
    /// Parses the configured hex key pair and checks that the public key is
    /// the one derived from the secret.
    pub fn from_hex(secret_hex: &str, public_hex: &str) -> Result<Self, OracleError> {
        let secret_bytes = hex::decode(secret_hex)
            .map_err(|e| OracleError::Crypto(format!("private key is not valid hex: {e}")))?;
        let secret = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| OracleError::Crypto(format!("invalid private key: {e}")))?;
        let derived = PublicKey::from_secret_key(&SECP, &secret);
        let configured = public_key_from_hex(public_hex)?;
        if derived != configured {
            return Err(OracleError::Crypto(
                "publicKey does not match the key derived from privateKey".into(),
            ));
        }
        Ok(Self {
            secret,
            public: derived,
        })
    }

    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        let (secret, public) = SECP.generate_keypair(&mut rand::thread_rng());
        Self { secret, public }
    }

    /// The compressed public key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Hex of the compressed public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Hex of the secret key. For key-generation tooling only; never log it.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    /// Signs `SHA-256(buf)`, returning the compact signature.
    pub fn sign(&self, buf: &[u8]) -> [u8; SIGNATURE_LEN] {
        sign(buf, &self.secret)
    }
}
