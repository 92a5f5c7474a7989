//! # Realtime Sync Cache
//!
//! TTL read-through cache cell fronting the dashboard's high-frequency
//! queries. Refresh is lazy/pull: a `get` within the TTL returns the stored
//! value, an expired `get` recomputes synchronously and stores the result.
//! There is no background refresh timer.
//!
//! The cell's lock is never held across the loader await, so two callers may
//! recompute the same key concurrently; recompute is idempotent and
//! last-write-wins.

use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

struct CachedValue<T> {
    stored_at: Instant,
    value: T,
}

/// One TTL-guarded cache slot.
pub struct TtlCell<T> {
    inner: Mutex<Option<CachedValue<T>>>,
}

impl<T> Default for TtlCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TtlCell<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Force the next access to recompute.
    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

impl<T: Clone> TtlCell<T> {
    /// The stored value, if it is younger than `ttl`.
    pub fn get_fresh(&self, ttl: Duration) -> Option<T> {
        let guard = self.inner.lock();
        match guard.as_ref() {
            Some(cached) if cached.stored_at.elapsed() < ttl => Some(cached.value.clone()),
            Some(cached) => {
                debug!(age_ms = cached.stored_at.elapsed().as_millis() as u64, "cache expired");
                None
            }
            None => None,
        }
    }

    /// Store a value with a fresh timestamp.
    pub fn store(&self, value: T) {
        *self.inner.lock() = Some(CachedValue {
            stored_at: Instant::now(),
            value,
        });
    }

    /// Read through the cache: return the fresh value if present, otherwise
    /// run `loader`, store its result and return it.
    pub async fn get_with<F, Fut, E>(&self, ttl: Duration, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get_fresh(ttl) {
            return Ok(value);
        }

        let value = loader().await?;
        self.store(value.clone());
        Ok(value)
    }
}
