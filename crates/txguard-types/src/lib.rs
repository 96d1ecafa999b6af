//! # txguard-types
//!
//! Shared types, errors, and configuration for the **TxGuard** build / sign /
//! confirm handshake.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`RequestId`], [`ResourceKey`], [`Pubkey`], [`TxSignature`], [`Blockhash`], [`TxHash`]
//! - **Transaction model**: [`Transaction`], [`Message`], [`Instruction`], [`AccountMeta`] and the wire codec
//! - **Pending handshakes**: [`PendingRequest`], [`RequestDraft`], [`HandshakeState`]
//! - **Time**: [`Clock`], [`SystemClock`] (plus `ManualClock` under `test-helpers`)
//! - **Configuration**: [`HandshakeConfig`], [`LogConfig`]
//! - **Wire bodies**: [`BuildResponse`], [`ConfirmRequest`], [`ConfirmResponse`], [`ErrorResponse`]
//! - **Errors**: [`TxGuardError`] with `TG_ERR_` prefix codes
//! - **Constants**: TTL defaults and limits

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod pending;
pub mod transaction;
pub mod wire;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use pending::*;
pub use transaction::*;
pub use wire::*;

// Constants are accessed via `txguard_types::constants::FOO`.
