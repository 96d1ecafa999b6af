//! # Build / confirm orchestration
//!
//! [`HandshakeOrchestrator::build`] asks the [`InstructionBuilder`] for an
//! unsigned transaction, records its hash under a fresh request id, and
//! hands the transaction to the client. No lock is taken.
//!
//! [`HandshakeOrchestrator::confirm`] takes the client-signed transaction
//! back and, holding the resource lock for the whole pipeline:
//!
//! ```text
//!  lookup ─▶ lock ─▶ reload + TTL ─▶ decode ─▶ verify ─▶ policy ─▶ co-sign
//!                                                                    │
//!            unlock ◀─ delete ◀─ on_settled ◀─ await confirmation ◀─ broadcast
//! ```
//!
//! Every outcome after a successful decode deletes the record, so a
//! request id is confirmed at most once. A confirm whose payload fails to
//! decode leaves the record in place for a corrected retry.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use txguard_envelope::{RequestStore, RequestSweeper, ResourceGuard, ResourceLock};
use txguard_types::{
    BuildResponse, ConfirmRequest, ConfirmResponse, HandshakeConfig, HandshakeState,
    PendingRequest, RequestDraft, RequestId, ResourceKey, Result, Transaction, TxGuardError,
    TxSignature,
};
use txguard_verifier::{
    VerificationContext, compute_hash, decode_transaction, verify_signed_transaction,
};

use crate::{
    ChainSubmitter, ConfirmPolicy, ConfirmationStatus, CustodialSigner, InstructionBuilder, NoPolicy,
};

/// Label of the client's signature in errors and logs.
const PRINCIPAL_LABEL: &str = "user";

/// A successfully settled handshake.
#[derive(Debug, Clone)]
pub struct Settlement<P> {
    pub request_id: RequestId,
    pub resource_key: ResourceKey,
    pub signature: TxSignature,
    /// The payload captured at build time.
    pub payload: P,
}

impl<P> Settlement<P> {
    #[must_use]
    pub fn response(&self) -> ConfirmResponse {
        ConfirmResponse::settled(self.signature)
    }
}

/// Composes the request store, resource lock, verifier and collaborators
/// into the two-phase handshake.
pub struct HandshakeOrchestrator<B: InstructionBuilder> {
    builder: Arc<B>,
    store: Arc<RequestStore<B::Payload>>,
    lock: Arc<ResourceLock>,
    chain: Arc<dyn ChainSubmitter>,
    signer: Arc<dyn CustodialSigner>,
    policy: Arc<dyn ConfirmPolicy<B::Payload>>,
    config: HandshakeConfig,
}

impl<B: InstructionBuilder> HandshakeOrchestrator<B> {
    /// # Errors
    /// Returns [`TxGuardError::Configuration`] if `config` is inconsistent or
    /// its confirm TTL outlives the store's sweep TTL.
    pub fn new(
        builder: Arc<B>,
        store: Arc<RequestStore<B::Payload>>,
        lock: Arc<ResourceLock>,
        chain: Arc<dyn ChainSubmitter>,
        signer: Arc<dyn CustodialSigner>,
        config: HandshakeConfig,
    ) -> Result<Self> {
        config.validate()?;
        if config.confirm_ttl() > store.default_ttl() {
            return Err(TxGuardError::Configuration(format!(
                "confirm TTL ({}s) exceeds the store TTL ({}s)",
                config.confirm_ttl_secs,
                store.default_ttl().as_secs()
            )));
        }
        Ok(Self {
            builder,
            store,
            lock,
            chain,
            signer,
            policy: Arc::new(NoPolicy),
            config,
        })
    }

    /// Replace the default accept-everything policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ConfirmPolicy<B::Payload>>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<RequestStore<B::Payload>> {
        &self.store
    }

    #[must_use]
    pub fn lock(&self) -> &Arc<ResourceLock> {
        &self.lock
    }

    /// Start sweeping the store at the configured interval.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> RequestSweeper {
        RequestSweeper::spawn(&self.store, self.config.sweep_interval(), shutdown)
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// Produce an unsigned transaction for `intent` and remember its hash.
    ///
    /// # Errors
    /// Returns whatever the builder returns, or
    /// [`TxGuardError::InvalidRequest`] if the built transaction lacks a fee
    /// payer, a blockhash, or signer slots for the principal and the
    /// custodial key.
    pub async fn build(&self, intent: &B::Intent) -> Result<BuildResponse<B::Quote>> {
        debug!(state = %HandshakeState::Requested, "Building transaction");
        let built = self.builder.build(intent).await?;
        let tx = &built.transaction;
        debug!(
            resource_key = %built.resource_key,
            principal = %built.principal.short(),
            state = %HandshakeState::Built
        );

        let fee_payer = *tx.fee_payer().ok_or_else(|| TxGuardError::InvalidRequest {
            reason: "built transaction has no fee payer".to_string(),
        })?;
        if tx.message.recent_blockhash.is_zero() {
            return Err(TxGuardError::InvalidRequest {
                reason: "built transaction has no recent blockhash".to_string(),
            });
        }
        if tx.signer_position(&built.principal).is_none() {
            return Err(TxGuardError::InvalidRequest {
                reason: "principal is not a signer of the built transaction".to_string(),
            });
        }
        if tx.signer_position(&self.signer.public_key()).is_none() {
            return Err(TxGuardError::InvalidRequest {
                reason: "custodial key is not a signer of the built transaction".to_string(),
            });
        }

        let expected_hash = compute_hash(tx);
        let request_id = self.store.generate_id();
        let record = self.store.set(
            request_id.clone(),
            RequestDraft::new(
                built.resource_key,
                expected_hash,
                built.principal,
                fee_payer,
                built.payload,
            ),
        );

        info!(
            request_id = %request_id,
            resource_key = %record.resource_key,
            hash = %expected_hash.prefix(),
            state = %HandshakeState::AwaitingClientSignature,
            "Handshake built"
        );

        Ok(BuildResponse {
            transaction: built.transaction.to_wire(),
            request_id,
            expires_at: record.expires_at(self.config.confirm_ttl()),
            quote: built.quote,
        })
    }

    // -----------------------------------------------------------------------
    // Confirm
    // -----------------------------------------------------------------------

    /// Verify, co-sign and submit a client-signed transaction.
    ///
    /// # Errors
    /// - [`TxGuardError::InvalidRequestId`] / [`TxGuardError::MalformedTransaction`]
    ///   for unusable input (the record is kept)
    /// - [`TxGuardError::NotFoundOrExpired`] for unknown, consumed or expired ids
    /// - [`TxGuardError::LockTimeout`] when a lock timeout is configured and hit
    /// - any verification, policy or chain error (the record is deleted)
    pub async fn confirm(&self, request: &ConfirmRequest) -> Result<Settlement<B::Payload>> {
        let request_id: RequestId = request.request_id.parse()?;
        debug!(request_id = %request_id, state = %HandshakeState::ConfirmSubmitted);
        let resource_key = self
            .store
            .get(&request_id)
            .map(|record| record.resource_key.clone())
            .ok_or_else(|| not_found(&request_id))?;

        let mut guard = self.acquire(&resource_key).await?;

        // A concurrent confirm of the same id may have consumed the record
        // while we waited.
        let Some(record) = self.store.get(&request_id) else {
            debug!(request_id = %request_id, "Record consumed while waiting for lock");
            return Err(not_found(&request_id));
        };
        if self
            .store
            .is_expired(&request_id, Some(self.config.confirm_ttl()))
        {
            self.store.delete(&request_id);
            info!(
                request_id = %request_id,
                resource_key = %resource_key,
                state = %HandshakeState::Expired,
                "Confirm arrived after expiry"
            );
            return Err(not_found(&request_id));
        }

        let tx = decode_transaction(&request.signed_transaction).inspect_err(|e| {
            debug!(request_id = %request_id, error = %e, "Signed transaction did not decode");
        })?;

        let outcome = self.finalize(&record, tx).await;
        self.store.delete(&request_id);
        guard.release();

        match outcome {
            Ok(signature) => {
                info!(
                    request_id = %request_id,
                    resource_key = %resource_key,
                    signature = %signature,
                    state = %HandshakeState::Settled,
                    "Handshake settled"
                );
                Ok(Settlement {
                    request_id,
                    resource_key,
                    signature,
                    payload: record.payload.clone(),
                })
            }
            Err(e) => {
                if e.is_security_event() {
                    warn!(
                        request_id = %request_id,
                        resource_key = %resource_key,
                        kind = %e.kind(),
                        error = %e,
                        state = %HandshakeState::Rejected,
                        "Signed transaction rejected"
                    );
                } else {
                    info!(
                        request_id = %request_id,
                        resource_key = %resource_key,
                        kind = %e.kind(),
                        error = %e,
                        state = %HandshakeState::Rejected,
                        "Handshake failed"
                    );
                }
                Err(e)
            }
        }
    }

    async fn acquire(&self, key: &ResourceKey) -> Result<ResourceGuard> {
        match self.config.lock_timeout() {
            Some(timeout) => self.lock.acquire_timeout(key, timeout).await,
            None => Ok(self.lock.acquire(key).await),
        }
    }

    /// Verification through settlement, with the lock held by the caller.
    async fn finalize(
        &self,
        record: &PendingRequest<B::Payload>,
        tx: Transaction,
    ) -> Result<TxSignature> {
        debug!(request_id = %record.request_id, state = %HandshakeState::Verifying);
        let ctx = VerificationContext::new(
            record.expected_hash,
            record.fee_payer,
            record.principal,
            PRINCIPAL_LABEL,
        );
        let mut tx = verify_signed_transaction(tx, &ctx, self.chain.as_ref()).await?;

        self.policy.before_cosign(record).await?;

        debug!(request_id = %record.request_id, state = %HandshakeState::CustodialCoSigning);
        self.signer.co_sign(&mut tx)?;
        if !tx.is_fully_signed() {
            return Err(TxGuardError::Signing(
                "transaction still has unpopulated signature slots".to_string(),
            ));
        }

        debug!(request_id = %record.request_id, state = %HandshakeState::Broadcasting);
        let signature = self.chain.broadcast(&tx.serialize()).await?;

        debug!(
            request_id = %record.request_id,
            signature = %signature,
            state = %HandshakeState::ChainConfirming
        );
        match self.chain.await_confirmation(&signature).await {
            Ok(ConfirmationStatus::Confirmed) => {}
            Ok(ConfirmationStatus::Failed(reason)) => {
                return Err(TxGuardError::OnChainRejected {
                    signature: signature.to_string(),
                    reason,
                });
            }
            Ok(ConfirmationStatus::TimedOut) => {
                return Err(self.ambiguous(record, signature).await);
            }
            Err(e) => {
                warn!(signature = %signature, error = %e, "Confirmation polling failed");
                return Err(self.ambiguous(record, signature).await);
            }
        }

        // The transaction is final; a bookkeeping failure must not turn it
        // into a reported failure.
        if let Err(e) = self.policy.on_settled(record).await {
            error!(
                request_id = %record.request_id,
                signature = %signature,
                error = %e,
                "Post-settlement policy hook failed"
            );
        }
        Ok(signature)
    }

    /// The transaction is out of our hands but its fate is unknown. Let the
    /// policy account for it landing before the lock is released.
    async fn ambiguous(
        &self,
        record: &PendingRequest<B::Payload>,
        signature: TxSignature,
    ) -> TxGuardError {
        if let Err(e) = self.policy.on_ambiguous(record).await {
            error!(
                request_id = %record.request_id,
                signature = %signature,
                error = %e,
                "Ambiguous-outcome policy hook failed"
            );
        }
        TxGuardError::ConfirmationAmbiguous {
            signature: signature.to_string(),
        }
    }
}

fn not_found(request_id: &RequestId) -> TxGuardError {
    TxGuardError::NotFoundOrExpired {
        request_id: request_id.to_string(),
    }
}
