//! TTL-bounded store of pending handshakes.
//!
//! Records are written once at build time and read (then deleted) at confirm
//! time. Lookups never extend a record's life: a record is confirmable from
//! `created_at` until `created_at + ttl`, after which [`RequestStore::is_expired`]
//! reports it expired and the next [`RequestStore::sweep`] reclaims it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tracing::{debug, info};
use txguard_types::{
    Clock, HandshakeConfig, PendingRequest, RequestDraft, RequestId, SystemClock,
};

/// In-memory map from [`RequestId`] to [`PendingRequest`].
///
/// The map mutex is only ever held for a single lookup, insert, removal or
/// retain pass, never across an `.await`.
#[derive(Debug)]
pub struct RequestStore<P> {
    entries: Mutex<HashMap<RequestId, Arc<PendingRequest<P>>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl<P> RequestStore<P> {
    /// Store reading wall-clock time.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    /// Store reading time from `clock`.
    #[must_use]
    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            default_ttl,
        }
    }

    /// Store whose default TTL is the configured build-phase TTL.
    #[must_use]
    pub fn from_config(config: &HandshakeConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(config.build_ttl(), clock)
    }

    /// TTL used by [`sweep`](Self::sweep) and by `is_expired` without an override.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// The clock this store stamps and expires records with.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// A fresh, unguessable id. Does not insert anything.
    #[must_use]
    pub fn generate_id(&self) -> RequestId {
        RequestId::generate()
    }

    /// Insert or overwrite the record for `id`.
    ///
    /// `created_at` is stamped with the store clock when the draft has none,
    /// and clamped to it when the draft's lies in the future.
    pub fn set(&self, id: RequestId, draft: RequestDraft<P>) -> Arc<PendingRequest<P>> {
        let record = Arc::new(draft.into_request(id.clone(), self.clock.now()));
        let replaced = self.lock().insert(id, Arc::clone(&record)).is_some();
        debug!(
            request_id = %record.request_id,
            resource_key = %record.resource_key,
            replaced,
            "Pending request stored"
        );
        record
    }

    /// Look up a record. Does not refresh its TTL.
    #[must_use]
    pub fn get(&self, id: &RequestId) -> Option<Arc<PendingRequest<P>>> {
        self.lock().get(id).cloned()
    }

    /// Remove a record. Returns whether one was present.
    pub fn delete(&self, id: &RequestId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!(request_id = %id, "Pending request deleted");
        }
        removed
    }

    /// `true` if `id` is unknown, or its record is at least `ttl` old.
    ///
    /// `ttl` falls back to the store default when `None`.
    #[must_use]
    pub fn is_expired(&self, id: &RequestId, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = self.clock.now();
        self.lock()
            .get(id)
            .is_none_or(|record| record.is_older_than(now, ttl))
    }

    /// Remove every record at least the default TTL old.
    ///
    /// Per-call TTL overrides are not consulted. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.default_ttl;
        let (removed, remaining) = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|_, record| !record.is_older_than(now, ttl));
            (before - entries.len(), entries.len())
        };
        if removed > 0 {
            info!(removed, remaining, "Swept expired pending requests");
        } else {
            debug!(remaining, "Sweep found nothing to remove");
        }
        removed
    }

    /// Number of stored records, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Arc<PendingRequest<P>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txguard_types::ManualClock;

    const TEN_MIN: Duration = Duration::from_secs(600);
    const FIFTEEN_MIN: Duration = Duration::from_secs(900);

    fn store() -> (RequestStore<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (RequestStore::with_clock(FIFTEEN_MIN, clock.clone()), clock)
    }

    #[test]
    fn unknown_id_is_absent_and_expired() {
        let (store, _) = store();
        let id = store.generate_id();
        assert!(store.get(&id).is_none());
        assert!(store.is_expired(&id, None));
        assert!(store.is_expired(&id, Some(TEN_MIN)));
    }

    #[test]
    fn generate_id_does_not_insert() {
        let (store, _) = store();
        let _ = store.generate_id();
        assert!(store.is_empty());
    }

    #[test]
    fn set_then_get() {
        let (store, clock) = store();
        let id = store.generate_id();
        store.set(id.clone(), RequestDraft::dummy("pool-a", 7));
        let record = store.get(&id).unwrap();
        assert_eq!(record.payload, 7);
        assert_eq!(record.created_at, clock.now());
        assert_eq!(record.request_id, id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_overwrites() {
        let (store, _) = store();
        let id = store.generate_id();
        store.set(id.clone(), RequestDraft::dummy("pool-a", 1));
        store.set(id.clone(), RequestDraft::dummy("pool-a", 2));
        assert_eq!(store.get(&id).unwrap().payload, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_does_not_slide_expiry() {
        let (store, clock) = store();
        let id = store.generate_id();
        store.set(id.clone(), RequestDraft::dummy("pool-a", 1));
        clock.advance(Duration::from_secs(599));
        assert!(store.get(&id).is_some());
        clock.advance(Duration::from_secs(1));
        assert!(store.is_expired(&id, Some(TEN_MIN)));
    }

    #[test]
    fn expiry_boundary_with_override() {
        let (store, clock) = store();
        let id = store.generate_id();
        store.set(id.clone(), RequestDraft::dummy("pool-a", 1));

        clock.advance(Duration::from_secs(599));
        assert!(!store.is_expired(&id, Some(TEN_MIN)));
        clock.advance(Duration::from_secs(1));
        assert!(store.is_expired(&id, Some(TEN_MIN)));
        // Default TTL is longer.
        assert!(!store.is_expired(&id, None));
    }

    #[test]
    fn delete_is_idempotent() {
        let (store, _) = store();
        let id = store.generate_id();
        store.set(id.clone(), RequestDraft::dummy("pool-a", 1));
        assert!(store.delete(&id));
        assert!(!store.delete(&id));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn sweep_uses_default_ttl_only() {
        let (store, clock) = store();
        let old = store.generate_id();
        store.set(old.clone(), RequestDraft::dummy("pool-a", 1));
        clock.advance(Duration::from_secs(700));
        let young = store.generate_id();
        store.set(young.clone(), RequestDraft::dummy("pool-b", 2));

        // 700s: past the confirm window but not the build window.
        assert_eq!(store.sweep(), 0);
        assert!(store.is_expired(&old, Some(TEN_MIN)));

        clock.advance(Duration::from_secs(200));
        assert_eq!(store.sweep(), 1);
        assert!(store.get(&old).is_none());
        assert!(store.get(&young).is_some());
    }

    #[test]
    fn supplied_created_at_is_kept() {
        let (store, clock) = store();
        let id = store.generate_id();
        let then = clock.now() - chrono::Duration::seconds(900);
        store.set(
            id.clone(),
            RequestDraft::dummy("pool-a", 1).with_created_at(then),
        );
        assert!(store.is_expired(&id, None));
        assert_eq!(store.sweep(), 1);
    }

    #[test]
    fn future_created_at_still_expires_and_sweeps() {
        let (store, clock) = store();
        let id = store.generate_id();
        let far_future = clock.now() + chrono::Duration::days(365);
        let record = store.set(
            id.clone(),
            RequestDraft::dummy("pool-a", 1).with_created_at(far_future),
        );
        assert_eq!(record.created_at, clock.now());

        clock.advance(Duration::from_secs(3600));
        assert!(store.is_expired(&id, None));
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
    }
}
