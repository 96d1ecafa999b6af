//! Individual integrity checks.

use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::warn;
use txguard_types::{Pubkey, Result, Transaction, TxGuardError, TxHash};

use crate::BlockhashOracle;

/// Decode a base64 wire transaction.
///
/// # Errors
/// Returns [`TxGuardError::MalformedTransaction`] for anything that is not a
/// well-formed transaction.
pub fn decode_transaction(wire: &str) -> Result<Transaction> {
    Transaction::from_wire(wire)
}

/// SHA-256 over the signable message bytes.
///
/// Signatures are not part of the hash, so the value recorded for the
/// unsigned transaction at build time matches the signed one at confirm
/// time as long as the message is unchanged.
#[must_use]
pub fn compute_hash(tx: &Transaction) -> TxHash {
    let mut hasher = Sha256::new();
    hasher.update(tx.message.serialize());
    TxHash(hasher.finalize().into())
}

/// The transaction's fee payer must be `expected`.
pub fn verify_fee_payer(tx: &Transaction, expected: &Pubkey) -> Result<()> {
    match tx.fee_payer() {
        None => Err(TxGuardError::FeePayerMismatch {
            reason: "transaction declares no fee payer".to_string(),
        }),
        Some(actual) if actual != expected => Err(TxGuardError::FeePayerMismatch {
            reason: format!("expected {}.., got {}..", expected.short(), actual.short()),
        }),
        Some(_) => Ok(()),
    }
}

/// `expected` must hold a populated signature slot whose signature verifies
/// over the message bytes.
///
/// `label` names the party in errors and logs ("user", "custodial", ...).
pub fn verify_signature(tx: &Transaction, expected: &Pubkey, label: &str) -> Result<()> {
    let invalid = |reason: &str| TxGuardError::SignatureInvalid {
        label: label.to_string(),
        reason: reason.to_string(),
    };

    let signature = tx
        .signature_for(expected)
        .ok_or_else(|| invalid("signature missing"))?;
    let key = VerifyingKey::from_bytes(expected.as_bytes())
        .map_err(|_| invalid("signer is not a valid ed25519 key"))?;
    let signature = Signature::from_bytes(signature.as_bytes());

    key.verify_strict(&tx.message.serialize(), &signature)
        .map_err(|_| invalid("signature does not verify"))
}

/// The message must hash to `expected`, the value recorded at build time.
///
/// The full hashes are compared; only their prefixes reach the error and
/// the log.
pub fn verify_integrity(tx: &Transaction, expected: &TxHash) -> Result<()> {
    let actual = compute_hash(tx);
    if actual == *expected {
        return Ok(());
    }
    warn!(
        expected = %expected.prefix(),
        actual = %actual.prefix(),
        "Transaction hash mismatch"
    );
    Err(TxGuardError::TamperDetected {
        expected: expected.prefix(),
        actual: actual.prefix(),
    })
}

/// The embedded blockhash must be present and still accepted by the chain.
///
/// # Errors
/// Returns [`TxGuardError::FreshnessExpired`] when the blockhash is absent
/// or rejected, and propagates oracle failures unchanged.
pub async fn verify_freshness<O>(tx: &Transaction, oracle: &O) -> Result<()>
where
    O: BlockhashOracle + ?Sized,
{
    let blockhash = &tx.message.recent_blockhash;
    if blockhash.is_zero() {
        return Err(TxGuardError::FreshnessExpired {
            reason: "transaction has no recent blockhash".to_string(),
        });
    }
    if oracle.is_blockhash_valid(blockhash).await? {
        Ok(())
    } else {
        Err(TxGuardError::FreshnessExpired {
            reason: "blockhash is no longer accepted".to_string(),
        })
    }
}
