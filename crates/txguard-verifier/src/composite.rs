//! Ordered composition of the individual checks.

use tracing::{debug, warn};
use txguard_types::{Pubkey, Result, Transaction, TxGuardError, TxHash};

use crate::{
    BlockhashOracle, verify_fee_payer, verify_freshness, verify_integrity, verify_signature,
};

/// Everything recorded at build time that a signed transaction is checked
/// against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationContext {
    pub expected_hash: TxHash,
    pub fee_payer: Pubkey,
    /// Party whose signature must be present.
    pub signer: Pubkey,
    /// Name of that party in errors and logs.
    pub signer_label: String,
}

impl VerificationContext {
    #[must_use]
    pub fn new(
        expected_hash: TxHash,
        fee_payer: Pubkey,
        signer: Pubkey,
        signer_label: impl Into<String>,
    ) -> Self {
        Self {
            expected_hash,
            fee_payer,
            signer,
            signer_label: signer_label.into(),
        }
    }
}

/// Fee payer, signature, integrity and freshness checks, in that order.
///
/// Stops at the first failure and returns it. On success the transaction
/// is handed back untouched.
pub async fn verify_signed_transaction<O>(
    tx: Transaction,
    ctx: &VerificationContext,
    oracle: &O,
) -> Result<Transaction>
where
    O: BlockhashOracle + ?Sized,
{
    verify_offline(&tx, ctx)?;
    verify_freshness(&tx, oracle).await?;
    debug!(
        hash = %ctx.expected_hash.prefix(),
        signer = %ctx.signer.short(),
        "Signed transaction verified"
    );
    Ok(tx)
}

/// Verify several transactions signed together.
///
/// `contexts[i]` applies to `txs[i]`. Every transaction must carry the same
/// blockhash; freshness is then checked once for the whole batch.
///
/// # Errors
/// Returns [`TxGuardError::InvalidRequest`] for an empty batch, a length
/// mismatch, or differing blockhashes, and otherwise the first failing
/// check in batch order.
pub async fn verify_signed_batch<O>(
    txs: Vec<Transaction>,
    contexts: &[VerificationContext],
    oracle: &O,
) -> Result<Vec<Transaction>>
where
    O: BlockhashOracle + ?Sized,
{
    if txs.len() != contexts.len() {
        return Err(TxGuardError::InvalidRequest {
            reason: format!(
                "{} transactions but {} verification contexts",
                txs.len(),
                contexts.len()
            ),
        });
    }
    let Some(first) = txs.first() else {
        return Err(TxGuardError::InvalidRequest {
            reason: "empty transaction batch".to_string(),
        });
    };

    let blockhash = first.message.recent_blockhash;
    if txs.iter().any(|tx| tx.message.recent_blockhash != blockhash) {
        warn!(size = txs.len(), "Batch members disagree on blockhash");
        return Err(TxGuardError::InvalidRequest {
            reason: "batch transactions must share one blockhash".to_string(),
        });
    }

    for (index, (tx, ctx)) in txs.iter().zip(contexts).enumerate() {
        verify_offline(tx, ctx).inspect_err(|e| {
            debug!(index, error = %e, "Batch member failed verification");
        })?;
    }
    verify_freshness(first, oracle).await?;

    debug!(size = txs.len(), "Signed batch verified");
    Ok(txs)
}

fn verify_offline(tx: &Transaction, ctx: &VerificationContext) -> Result<()> {
    verify_fee_payer(tx, &ctx.fee_payer)?;
    verify_signature(tx, &ctx.signer, &ctx.signer_label)?;
    verify_integrity(tx, &ctx.expected_hash)
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use txguard_types::Blockhash;

    use super::*;
    use crate::checks::tests::{FixedOracle, transfer, transfer_with};
    use crate::compute_hash;

    fn ctx_for(tx: &Transaction, payer: Pubkey, signer: Pubkey) -> VerificationContext {
        VerificationContext::new(compute_hash(tx), payer, signer, "user")
    }

    #[tokio::test]
    async fn valid_transaction_passes() {
        let mut f = transfer(10);
        let ctx = ctx_for(&f.tx, f.payer_key(), f.user_key());
        f.tx.partial_sign(&f.user).unwrap();
        let out = verify_signed_transaction(f.tx.clone(), &ctx, &FixedOracle(true))
            .await
            .unwrap();
        assert_eq!(out, f.tx);
    }

    #[tokio::test]
    async fn tampered_then_signed_is_detected() {
        let f = transfer(10);
        let ctx = ctx_for(&f.tx, f.payer_key(), f.user_key());

        // Rebuild with a different amount and sign it properly.
        let mut swapped = transfer_with(&f.payer, &f.user, 1000, Blockhash([9u8; 32]));
        swapped.partial_sign(&f.user).unwrap();

        let err = verify_signed_transaction(swapped, &ctx, &FixedOracle(true))
            .await
            .unwrap_err();
        assert!(matches!(err, TxGuardError::TamperDetected { .. }));
    }

    #[tokio::test]
    async fn fee_payer_is_checked_first() {
        let mut f = transfer(10);
        let mut ctx = ctx_for(&f.tx, f.payer_key(), f.user_key());
        ctx.fee_payer = Pubkey([0x44; 32]);
        // Also unsigned and stale: fee payer still wins.
        let err = verify_signed_transaction(f.tx.clone(), &ctx, &FixedOracle(false))
            .await
            .unwrap_err();
        assert!(matches!(err, TxGuardError::FeePayerMismatch { .. }));

        f.tx.partial_sign(&f.user).unwrap();
        ctx.fee_payer = f.payer_key();
        let err = verify_signed_transaction(f.tx, &ctx, &FixedOracle(false))
            .await
            .unwrap_err();
        assert!(matches!(err, TxGuardError::FreshnessExpired { .. }));
    }

    #[tokio::test]
    async fn batch_passes_and_checks_each_member() {
        let payer = SigningKey::generate(&mut OsRng);
        let user = SigningKey::generate(&mut OsRng);
        let bh = Blockhash([9u8; 32]);
        let payer_key = Pubkey::from(&payer.verifying_key());
        let user_key = Pubkey::from(&user.verifying_key());

        let mut txs = vec![
            transfer_with(&payer, &user, 1, bh),
            transfer_with(&payer, &user, 2, bh),
        ];
        let contexts: Vec<_> = txs
            .iter()
            .map(|tx| ctx_for(tx, payer_key, user_key))
            .collect();
        for tx in &mut txs {
            tx.partial_sign(&user).unwrap();
        }

        let out = verify_signed_batch(txs.clone(), &contexts, &FixedOracle(true))
            .await
            .unwrap();
        assert_eq!(out.len(), 2);

        // Swap contexts: each member now fails integrity.
        let swapped = vec![contexts[1].clone(), contexts[0].clone()];
        let err = verify_signed_batch(txs, &swapped, &FixedOracle(true))
            .await
            .unwrap_err();
        assert!(matches!(err, TxGuardError::TamperDetected { .. }));
    }

    #[tokio::test]
    async fn batch_rejects_mixed_blockhashes_and_bad_shapes() {
        let payer = SigningKey::generate(&mut OsRng);
        let user = SigningKey::generate(&mut OsRng);
        let payer_key = Pubkey::from(&payer.verifying_key());
        let user_key = Pubkey::from(&user.verifying_key());
        let txs = vec![
            transfer_with(&payer, &user, 1, Blockhash([1u8; 32])),
            transfer_with(&payer, &user, 2, Blockhash([2u8; 32])),
        ];
        let contexts: Vec<_> = txs
            .iter()
            .map(|tx| ctx_for(tx, payer_key, user_key))
            .collect();

        assert!(matches!(
            verify_signed_batch(txs.clone(), &contexts, &FixedOracle(true)).await,
            Err(TxGuardError::InvalidRequest { .. })
        ));
        assert!(
            verify_signed_batch(txs, &contexts[..1], &FixedOracle(true))
                .await
                .is_err()
        );
        assert!(
            verify_signed_batch(Vec::new(), &[], &FixedOracle(true))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn batch_freshness_checked_once_for_all() {
        let mut f = transfer(5);
        let ctx = ctx_for(&f.tx, f.payer_key(), f.user_key());
        f.tx.partial_sign(&f.user).unwrap();
        let err = verify_signed_batch(vec![f.tx], &[ctx], &FixedOracle(false))
            .await
            .unwrap_err();
        assert!(matches!(err, TxGuardError::FreshnessExpired { .. }));
    }
}
