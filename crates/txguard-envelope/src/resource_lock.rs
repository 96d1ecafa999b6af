//! Per-resource mutual exclusion.
//!
//! One [`ResourceLock`] exists per class of resource ("sale", "pool",
//! "escrow"). Each [`ResourceKey`] maps to its own `tokio::sync::Mutex`, so
//! confirms against different resources never wait on each other while
//! confirms against the same resource run strictly one at a time, in the
//! order they started waiting.
//!
//! The map entry for a key lives only while someone holds or waits for it;
//! the last [`ResourceGuard`] to let go removes it.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};
use txguard_types::{ResourceKey, Result, TxGuardError};

type Slots = Arc<Mutex<HashMap<ResourceKey, Arc<AsyncMutex<()>>>>>;

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<ResourceKey, Arc<AsyncMutex<()>>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keyed async lock for one class of resource.
pub struct ResourceLock {
    namespace: String,
    slots: Slots,
}

impl fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLock")
            .field("namespace", &self.namespace)
            .field("active", &lock_slots(&self.slots).len())
            .finish()
    }
}

impl ResourceLock {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Wait until `key` is free, then claim it.
    pub async fn acquire(&self, key: &ResourceKey) -> ResourceGuard {
        let started = Instant::now();
        let handle = self.slot(key);
        let permit = handle.mutex().lock_owned().await;
        self.claimed(handle, permit, started)
    }

    /// Like [`acquire`](Self::acquire), but give up after `timeout`.
    ///
    /// # Errors
    /// Returns [`TxGuardError::LockTimeout`] if the key is still held when
    /// `timeout` elapses. The caller is not queued after that.
    pub async fn acquire_timeout(
        &self,
        key: &ResourceKey,
        timeout: Duration,
    ) -> Result<ResourceGuard> {
        let started = Instant::now();
        let handle = self.slot(key);
        match tokio::time::timeout(timeout, handle.mutex().lock_owned()).await {
            Ok(permit) => Ok(self.claimed(handle, permit, started)),
            Err(_) => {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                warn!(
                    namespace = %self.namespace,
                    resource_key = %key,
                    waited_ms,
                    "Timed out waiting for resource lock"
                );
                Err(TxGuardError::LockTimeout {
                    resource_key: key.to_string(),
                    waited_ms,
                })
            }
        }
    }

    /// Run `work` while holding `key`, releasing afterwards.
    pub async fn with_lock<F, Fut, T>(&self, key: &ResourceKey, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut guard = self.acquire(key).await;
        let out = work().await;
        guard.release();
        out
    }

    /// Whether some guard currently holds `key`.
    #[must_use]
    pub fn is_locked(&self, key: &ResourceKey) -> bool {
        lock_slots(&self.slots)
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Keys currently held or waited on, sorted.
    #[must_use]
    pub fn active_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = lock_slots(&self.slots).keys().cloned().collect();
        keys.sort();
        keys
    }

    fn slot(&self, key: &ResourceKey) -> SlotHandle {
        let mutex = {
            let mut slots = lock_slots(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        SlotHandle {
            slots: Arc::clone(&self.slots),
            key: key.clone(),
            mutex: Some(mutex),
        }
    }

    fn claimed(
        &self,
        handle: SlotHandle,
        permit: OwnedMutexGuard<()>,
        started: Instant,
    ) -> ResourceGuard {
        debug!(
            namespace = %self.namespace,
            resource_key = %handle.key,
            waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Resource lock acquired"
        );
        ResourceGuard {
            namespace: self.namespace.clone(),
            permit: Some(permit),
            handle,
            released: false,
        }
    }
}

/// A reference to one key's mutex that prunes the map entry when dropped.
struct SlotHandle {
    slots: Slots,
    key: ResourceKey,
    mutex: Option<Arc<AsyncMutex<()>>>,
}

impl SlotHandle {
    fn mutex(&self) -> Arc<AsyncMutex<()>> {
        // Only `None` after `prune`, which runs on drop.
        self.mutex.clone().unwrap_or_default()
    }

    fn prune(&mut self) {
        if self.mutex.take().is_none() {
            return;
        }
        let mut slots = lock_slots(&self.slots);
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        self.prune();
    }
}

/// Exclusive claim on one resource key.
///
/// Released by [`release`](Self::release) or, failing that, on drop, which
/// covers early returns, `?`, panics and cancelled tasks alike.
pub struct ResourceGuard {
    namespace: String,
    permit: Option<OwnedMutexGuard<()>>,
    handle: SlotHandle,
    released: bool,
}

impl ResourceGuard {
    #[must_use]
    pub fn resource_key(&self) -> &ResourceKey {
        &self.handle.key
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Let the next waiter in. Calling this more than once has no effect.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        drop(self.permit.take());
        self.handle.prune();
        debug!(
            namespace = %self.namespace,
            resource_key = %self.handle.key,
            "Resource lock released"
        );
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("namespace", &self.namespace)
            .field("resource_key", &self.handle.key)
            .field("released", &self.released)
            .finish()
    }
}
