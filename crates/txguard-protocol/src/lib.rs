//! # txguard-protocol
//!
//! The build / sign elsewhere / confirm handshake, assembled from the
//! workspace's parts:
//!
//! - [`HandshakeOrchestrator`]: the two-phase protocol itself
//! - Collaborator traits: [`InstructionBuilder`], [`ChainSubmitter`],
//!   [`BlockhashOracle`], [`CapacityLedger`], [`CustodialSigner`]
//! - Confirm policies: [`ConfirmPolicy`], [`NoPolicy`], [`CapacityPolicy`]
//! - [`KeypairSigner`]: an in-memory custodial key
//! - [`telemetry::init_tracing`]: subscriber setup for binaries and tests

pub mod collaborators;
pub mod orchestrator;
pub mod policy;
pub mod signer;
pub mod telemetry;

pub use collaborators::*;
pub use orchestrator::*;
pub use policy::*;
pub use signer::*;
