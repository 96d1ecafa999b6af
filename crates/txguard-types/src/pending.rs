//! # Pending handshake records
//!
//! A [`PendingRequest`] captures everything the confirm phase is allowed to
//! trust: the hash of the transaction the server built, the identity that must
//! sign it, and the flow payload captured at build time. Nothing supplied by
//! the client at confirm time ever overrides these values.
//!
//! ## State Machine
//!
//! ```text
//!   REQUESTED ─▶ BUILT ─▶ AWAITING_CLIENT_SIGNATURE ─▶ CONFIRM_SUBMITTED ─▶ VERIFYING
//!                                   │                                          │
//!                                   ▼ ttl                                      ▼
//!                                EXPIRED                              CUSTODIAL_CO_SIGNING
//!                                                                              │
//!                        SETTLED ◀─ CHAIN_CONFIRMING ◀─ BROADCASTING ◀─────────┘
//!
//!   any step after CONFIRM_SUBMITTED may end in REJECTED
//! ```

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Pubkey, RequestId, ResourceKey, TxHash};

/// Where a handshake currently is. Used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeState {
    Requested,
    Built,
    AwaitingClientSignature,
    ConfirmSubmitted,
    Verifying,
    CustodialCoSigning,
    Broadcasting,
    ChainConfirming,
    Settled,
    Rejected,
    Expired,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Requested => "REQUESTED",
            Self::Built => "BUILT",
            Self::AwaitingClientSignature => "AWAITING_CLIENT_SIGNATURE",
            Self::ConfirmSubmitted => "CONFIRM_SUBMITTED",
            Self::Verifying => "VERIFYING",
            Self::CustodialCoSigning => "CUSTODIAL_CO_SIGNING",
            Self::Broadcasting => "BROADCASTING",
            Self::ChainConfirming => "CHAIN_CONFIRMING",
            Self::Settled => "SETTLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(name)
    }
}

/// One in-flight build/confirm handshake.
///
/// Stored behind an `Arc` and never mutated in place: confirm reads it,
/// then deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRequest<P> {
    /// Opaque id handed to the client.
    pub request_id: RequestId,
    /// The contended resource the confirm phase locks.
    pub resource_key: ResourceKey,
    /// Set once at build time.
    pub created_at: DateTime<Utc>,
    /// Hash of the canonical unsigned message built by the server.
    pub expected_hash: TxHash,
    /// The client identity whose signature confirm requires.
    pub principal: Pubkey,
    /// The fee payer of the built transaction.
    pub fee_payer: Pubkey,
    /// Flow-specific values captured at build time (amounts, mints, ...).
    pub payload: P,
}

impl<P> PendingRequest<P> {
    /// Whether this record is at least `ttl` old at `now`.
    ///
    /// A record stamped in the future is never considered old.
    #[must_use]
    pub fn is_older_than(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.created_at)
            .to_std()
            .is_ok_and(|age| age >= ttl)
    }

    /// When this record stops being confirmable under `ttl`.
    #[must_use]
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Insert form of a [`PendingRequest`].
///
/// `created_at` is optional; the store stamps it with its clock when absent.
/// A supplied time later than the store clock is clamped to it, so no record
/// outlives its TTL.
#[derive(Debug, Clone)]
pub struct RequestDraft<P> {
    pub resource_key: ResourceKey,
    pub created_at: Option<DateTime<Utc>>,
    pub expected_hash: TxHash,
    pub principal: Pubkey,
    pub fee_payer: Pubkey,
    pub payload: P,
}

impl<P> RequestDraft<P> {
    #[must_use]
    pub fn new(
        resource_key: ResourceKey,
        expected_hash: TxHash,
        principal: Pubkey,
        fee_payer: Pubkey,
        payload: P,
    ) -> Self {
        Self {
            resource_key,
            created_at: None,
            expected_hash,
            principal,
            fee_payer,
            payload,
        }
    }

    /// Pin the creation time instead of letting the store stamp it.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Finalize into a stored record stamped no later than `now`.
    #[must_use]
    pub fn into_request(self, request_id: RequestId, now: DateTime<Utc>) -> PendingRequest<P> {
        PendingRequest {
            request_id,
            resource_key: self.resource_key,
            created_at: self.created_at.map_or(now, |at| at.min(now)),
            expected_hash: self.expected_hash,
            principal: self.principal,
            fee_payer: self.fee_payer,
            payload: self.payload,
        }
    }
}

/// Dummy draft for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl<P> RequestDraft<P> {
    pub fn dummy(resource_key: &str, payload: P) -> Self {
        Self::new(
            ResourceKey::new(resource_key).unwrap_or_else(|_| ResourceKey::from(Pubkey::default())),
            TxHash([0xaa; 32]),
            Pubkey([1u8; 32]),
            Pubkey([1u8; 32]),
            payload,
        )
    }
}
