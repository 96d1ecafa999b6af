//! Chain view needed for freshness checks.

use async_trait::async_trait;
use txguard_types::{Blockhash, Result};

/// Answers whether the chain would still accept a transaction built on a
/// given blockhash.
#[async_trait]
pub trait BlockhashOracle: Send + Sync {
    /// # Errors
    /// Implementations return [`TxGuardError::Collaborator`](txguard_types::TxGuardError::Collaborator)
    /// when the chain cannot be reached. Callers treat that as a failed check.
    async fn is_blockhash_valid(&self, blockhash: &Blockhash) -> Result<bool>;
}
