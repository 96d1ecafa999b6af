//! Traits for the services the orchestrator calls out to.
//!
//! Instruction building, chain access and balance bookkeeping are owned by
//! the embedding application. The orchestrator only sees these traits.

use async_trait::async_trait;
use rust_decimal::Decimal;
use txguard_types::{Pubkey, ResourceKey, Result, Transaction, TxSignature};

pub use txguard_verifier::BlockhashOracle;

// ---------------------------------------------------------------------------
// Instruction building
// ---------------------------------------------------------------------------

/// Output of [`InstructionBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltTransaction<P, Q> {
    /// Resource whose confirms must be serialized.
    pub resource_key: ResourceKey,
    /// Client identity that must sign.
    pub principal: Pubkey,
    /// Unsigned transaction, blockhash already set.
    pub transaction: Transaction,
    /// Values the confirm phase trusts (amounts, mints, ...).
    pub payload: P,
    /// Preview returned to the client.
    pub quote: Q,
}

/// Turns a client intent into an unsigned transaction.
#[async_trait]
pub trait InstructionBuilder: Send + Sync {
    /// Whatever the client asked for.
    type Intent: Send + Sync;
    /// Build-time values carried through to confirm.
    type Payload: Clone + Send + Sync + 'static;
    /// Client-facing preview.
    type Quote: Send;

    /// # Errors
    /// [`TxGuardError::InvalidRequest`](txguard_types::TxGuardError::InvalidRequest)
    /// for intents that cannot be built, or
    /// [`TxGuardError::Collaborator`](txguard_types::TxGuardError::Collaborator)
    /// for upstream failures.
    async fn build(
        &self,
        intent: &Self::Intent,
    ) -> Result<BuiltTransaction<Self::Payload, Self::Quote>>;
}

// ---------------------------------------------------------------------------
// Chain access
// ---------------------------------------------------------------------------

/// Outcome of waiting for a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Included and executed successfully.
    Confirmed,
    /// Still unknown when polling gave up. The transaction may yet land.
    TimedOut,
    /// Included but execution failed.
    Failed(String),
}

/// Submits fully signed transactions.
#[async_trait]
pub trait ChainSubmitter: BlockhashOracle {
    /// Send the serialized transaction.
    ///
    /// # Errors
    /// [`TxGuardError::SubmissionFailed`](txguard_types::TxGuardError::SubmissionFailed)
    /// when the node refuses it.
    async fn broadcast(&self, raw: &[u8]) -> Result<TxSignature>;

    /// Wait for the transaction to be confirmed.
    async fn await_confirmation(&self, signature: &TxSignature) -> Result<ConfirmationStatus>;
}

// ---------------------------------------------------------------------------
// Capacity bookkeeping
// ---------------------------------------------------------------------------

/// Remaining inventory of a capped resource (sale supply, pool liquidity).
///
/// Both methods are only called while the resource lock is held.
#[async_trait]
pub trait CapacityLedger: Send + Sync {
    async fn read_remaining(&self, resource_key: &ResourceKey) -> Result<Decimal>;

    async fn record_consumed(&self, resource_key: &ResourceKey, amount: Decimal) -> Result<()>;
}
