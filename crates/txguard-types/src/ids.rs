//! Identifiers used throughout TxGuard.
//!
//! Fixed-size byte identifiers (`Pubkey`, `Blockhash`, `TxHash`,
//! `TxSignature`) display and parse as lowercase hex, and serialize as hex
//! strings so they survive JSON transport unchanged.

use std::{fmt, str::FromStr};

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{TxGuardError, constants};

/// Implements hex `Display`, `FromStr` and string serde for a `[u8; N]` newtype.
macro_rules! hex_bytes_newtype {
    ($name:ident, $len:expr, $what:literal) => {
        impl $name {
            /// Wrap raw bytes.
            #[must_use]
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// `true` if every byte is zero.
            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = TxGuardError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut bytes = [0u8; $len];
                hex::decode_to_slice(s, &mut bytes).map_err(|e| TxGuardError::InvalidRequest {
                    reason: format!("{} is not {} hex bytes: {e}", $what, $len),
                })?;
                Ok(Self(bytes))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Pubkey
// ---------------------------------------------------------------------------

/// An account address: the raw ed25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Pubkey(pub [u8; 32]);

hex_bytes_newtype!(Pubkey, 32, "public key");

impl Pubkey {
    /// First 4 bytes as hex, for compact log fields.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<&ed25519_dalek::VerifyingKey> for Pubkey {
    fn from(key: &ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

// ---------------------------------------------------------------------------
// TxSignature
// ---------------------------------------------------------------------------

/// A detached ed25519 signature (64 bytes). All-zero means "slot not populated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxSignature(pub [u8; 64]);

hex_bytes_newtype!(TxSignature, 64, "signature");

impl Default for TxSignature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl From<ed25519_dalek::Signature> for TxSignature {
    fn from(sig: ed25519_dalek::Signature) -> Self {
        Self(sig.to_bytes())
    }
}

// ---------------------------------------------------------------------------
// Blockhash
// ---------------------------------------------------------------------------

/// The anti-replay nonce embedded in every transaction. All-zero means absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Blockhash(pub [u8; 32]);

hex_bytes_newtype!(Blockhash, 32, "blockhash");

// ---------------------------------------------------------------------------
// TxHash
// ---------------------------------------------------------------------------

/// A 256-bit digest of a transaction's signable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TxHash(pub [u8; 32]);

hex_bytes_newtype!(TxHash, 32, "hash");

impl TxHash {
    /// Leading hex characters, safe to put in logs and error details.
    #[must_use]
    pub fn prefix(&self) -> String {
        let mut hex = hex::encode(self.0);
        hex.truncate(constants::HASH_PREFIX_LEN);
        hex
    }
}

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// Opaque identifier of one build/confirm handshake.
///
/// 32 bytes from the thread-local CSPRNG, hex-encoded. Collisions are
/// negligible; ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; constants::REQUEST_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RequestId {
    type Err = TxGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != constants::REQUEST_ID_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TxGuardError::InvalidRequestId);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for RequestId {
    type Error = TxGuardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// ResourceKey
// ---------------------------------------------------------------------------

/// Identifier of a contended resource (sale, pool, escrow address).
///
/// Normalized on construction (trimmed, ASCII lower-case) so that addresses
/// arriving in mixed case map to the same lock and the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Normalize and validate a resource key.
    ///
    /// # Errors
    /// Returns [`TxGuardError::InvalidResourceKey`] if the key is empty.
    pub fn new(raw: impl AsRef<str>) -> crate::Result<Self> {
        let normalized = raw.as_ref().trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(TxGuardError::InvalidResourceKey {
                reason: "resource key must not be empty".to_string(),
            });
        }
        Ok(Self(normalized))
    }

    /// Borrow the normalized key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceKey {
    type Err = TxGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = TxGuardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.0
    }
}

impl From<Pubkey> for ResourceKey {
    fn from(key: Pubkey) -> Self {
        Self(key.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
