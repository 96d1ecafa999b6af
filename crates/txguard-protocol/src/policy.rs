//! Flow-specific checks run inside the resource lock.
//!
//! A confirm holds the lock from just before verification until the record
//! is deleted. Policies hook into that window, so whatever they read and
//! write about the resource is serialized with every other confirm on it.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};
use txguard_types::{PendingRequest, Result, TxGuardError};

use crate::CapacityLedger;

/// Hooks around the custodial co-signature.
///
/// Both hooks only see the stored [`PendingRequest`], never anything
/// supplied with the confirm call.
#[async_trait]
pub trait ConfirmPolicy<P: Send + Sync>: Send + Sync {
    /// Last chance to refuse before the server signs. An error here rejects
    /// the handshake.
    async fn before_cosign(&self, _request: &PendingRequest<P>) -> Result<()> {
        Ok(())
    }

    /// Called after the chain confirmed the transaction.
    async fn on_settled(&self, _request: &PendingRequest<P>) -> Result<()> {
        Ok(())
    }

    /// Called when the transaction was broadcast but its outcome is unknown.
    ///
    /// It may still land, so anything it would consume should be treated as
    /// spent until an operator reconciles it against the chain.
    async fn on_ambiguous(&self, _request: &PendingRequest<P>) -> Result<()> {
        Ok(())
    }
}

/// Policy that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPolicy;

impl<P: Send + Sync> ConfirmPolicy<P> for NoPolicy {}

/// Refuses confirms whose build-time amount exceeds the remaining capacity,
/// and records consumption once they settle.
pub struct CapacityPolicy<L, F> {
    ledger: Arc<L>,
    amount_of: F,
}

impl<L, F> CapacityPolicy<L, F> {
    /// `amount_of` extracts the requested amount from the stored payload.
    pub fn new(ledger: Arc<L>, amount_of: F) -> Self {
        Self { ledger, amount_of }
    }
}

impl<L, F> fmt::Debug for CapacityPolicy<L, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityPolicy").finish_non_exhaustive()
    }
}

#[async_trait]
impl<P, L, F> ConfirmPolicy<P> for CapacityPolicy<L, F>
where
    P: Send + Sync,
    L: CapacityLedger,
    F: Fn(&P) -> Decimal + Send + Sync,
{
    async fn before_cosign(&self, request: &PendingRequest<P>) -> Result<()> {
        let requested = (self.amount_of)(&request.payload);
        if requested <= Decimal::ZERO {
            return Err(TxGuardError::InvalidRequest {
                reason: format!("requested amount must be positive, got {requested}"),
            });
        }

        let remaining = self.ledger.read_remaining(&request.resource_key).await?;
        if requested > remaining {
            warn!(
                request_id = %request.request_id,
                resource_key = %request.resource_key,
                %requested,
                %remaining,
                "Capacity exceeded"
            );
            return Err(TxGuardError::CapacityExceeded {
                requested,
                remaining,
            });
        }
        Ok(())
    }

    async fn on_settled(&self, request: &PendingRequest<P>) -> Result<()> {
        let consumed = (self.amount_of)(&request.payload);
        self.ledger
            .record_consumed(&request.resource_key, consumed)
            .await?;
        info!(
            request_id = %request.request_id,
            resource_key = %request.resource_key,
            %consumed,
            "Capacity consumed"
        );
        Ok(())
    }

    async fn on_ambiguous(&self, request: &PendingRequest<P>) -> Result<()> {
        let reserved = (self.amount_of)(&request.payload);
        self.ledger
            .record_consumed(&request.resource_key, reserved)
            .await?;
        warn!(
            request_id = %request.request_id,
            resource_key = %request.resource_key,
            %reserved,
            "Capacity held for unconfirmed transaction"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use txguard_types::{RequestDraft, RequestId, ResourceKey};

    use super::*;

    #[derive(Default)]
    struct MemLedger(Mutex<HashMap<ResourceKey, Decimal>>);

    #[async_trait]
    impl CapacityLedger for MemLedger {
        async fn read_remaining(&self, key: &ResourceKey) -> Result<Decimal> {
            Ok(self.0.lock().unwrap().get(key).copied().unwrap_or_default())
        }

        async fn record_consumed(&self, key: &ResourceKey, amount: Decimal) -> Result<()> {
            *self.0.lock().unwrap().entry(key.clone()).or_default() -= amount;
            Ok(())
        }
    }

    fn request(amount: i64) -> PendingRequest<Decimal> {
        RequestDraft::dummy("sale-1", Decimal::new(amount, 0))
            .into_request(RequestId::generate(), chrono::Utc::now())
    }

    fn policy(remaining: i64) -> (CapacityPolicy<MemLedger, fn(&Decimal) -> Decimal>, Arc<MemLedger>) {
        let ledger = Arc::new(MemLedger::default());
        ledger
            .0
            .lock()
            .unwrap()
            .insert(ResourceKey::new("sale-1").unwrap(), Decimal::new(remaining, 0));
        let amount_of: fn(&Decimal) -> Decimal = |d| *d;
        (CapacityPolicy::new(Arc::clone(&ledger), amount_of), ledger)
    }

    #[tokio::test]
    async fn within_capacity_passes_and_settles() {
        let (policy, ledger) = policy(15);
        let req = request(10);
        policy.before_cosign(&req).await.unwrap();
        policy.on_settled(&req).await.unwrap();
        assert_eq!(
            ledger.read_remaining(&req.resource_key).await.unwrap(),
            Decimal::new(5, 0)
        );
    }

    #[tokio::test]
    async fn over_capacity_fails_closed() {
        let (policy, _) = policy(15);
        let err = policy.before_cosign(&request(16)).await.unwrap_err();
        let TxGuardError::CapacityExceeded {
            requested,
            remaining,
        } = err
        else {
            panic!("expected CapacityExceeded, got {err:?}");
        };
        assert_eq!(requested, Decimal::new(16, 0));
        assert_eq!(remaining, Decimal::new(15, 0));
    }

    #[tokio::test]
    async fn exact_remaining_is_allowed() {
        let (policy, _) = policy(10);
        assert!(policy.before_cosign(&request(10)).await.is_ok());
    }

    #[tokio::test]
    async fn non_positive_amount_rejected() {
        let (policy, _) = policy(10);
        assert!(matches!(
            policy.before_cosign(&request(0)).await,
            Err(TxGuardError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn ambiguous_outcome_holds_capacity() {
        let (policy, ledger) = policy(10);
        let req = request(10);
        policy.before_cosign(&req).await.unwrap();
        policy.on_ambiguous(&req).await.unwrap();
        assert_eq!(
            ledger.read_remaining(&req.resource_key).await.unwrap(),
            Decimal::ZERO
        );
        assert!(matches!(
            policy.before_cosign(&request(1)).await,
            Err(TxGuardError::CapacityExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn no_policy_accepts() {
        let req = request(1_000_000);
        assert!(ConfirmPolicy::<Decimal>::before_cosign(&NoPolicy, &req).await.is_ok());
        assert!(ConfirmPolicy::<Decimal>::on_settled(&NoPolicy, &req).await.is_ok());
        assert!(ConfirmPolicy::<Decimal>::on_ambiguous(&NoPolicy, &req).await.is_ok());
    }
}
