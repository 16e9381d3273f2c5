//! Per-run derivation cache.
//!
//! Maps `(scope, original filename)` to the [`DerivationResult`] of that
//! source image. One cache lives for one migration run; it is constructed
//! by the caller and passed down explicitly.
//!
//! # In-flight memoization
//!
//! The cache stores the *computation*, not just its result. Each key owns a
//! slot (a once-cell). The first caller for a key runs the derivation inside
//! the slot; every concurrent caller for the same key blocks on that slot and
//! receives the identical outcome, so two records that reference the same
//! image never trigger two decodes or mint two ids.
//!
//! A failed derivation is handed to everyone already waiting on it, then its
//! slot is released so a later page can try the key again. Successful slots
//! are permanent for the run: there is no eviction.
//!
//! Callers must not request a key from inside that key's own derivation.

use crate::types::{CacheKey, DerivationResult};
use crate::upload::DerivationError;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

type Outcome = Result<Arc<DerivationResult>, DerivationError>;
type Slot = Arc<OnceLock<Outcome>>;

/// How a lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The key was already derived before this call.
    Hit,
    /// Another caller was deriving the key; this call waited for it.
    Joined,
    /// This call ran the derivation.
    Derived,
}

#[derive(Default)]
pub struct DerivationCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    hits: AtomicU32,
    joins: AtomicU32,
    derived: AtomicU32,
    failed: AtomicU32,
}

impl DerivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the completed result for `key`, running `derive` at most once
    /// across all concurrent callers.
    pub fn get_or_derive<F>(&self, key: &CacheKey, derive: F) -> (Lookup, Outcome)
    where
        F: FnOnce() -> Result<DerivationResult, DerivationError>,
    {
        let slot = self.lock().entry(key.clone()).or_default().clone();

        if let Some(done) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return (Lookup::Hit, done.clone());
        }

        let mut ran = false;
        let outcome = slot
            .get_or_init(|| {
                ran = true;
                derive().map(Arc::new)
            })
            .clone();

        if !ran {
            self.joins.fetch_add(1, Ordering::Relaxed);
            return (Lookup::Joined, outcome);
        }

        if outcome.is_ok() {
            self.derived.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.release(key, &slot);
        }
        (Lookup::Derived, outcome)
    }

    /// Drop a failed slot, unless it was already replaced.
    fn release(&self, key: &CacheKey, slot: &Slot) {
        let mut slots = self.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    /// Completed result for `key`, if its derivation succeeded.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DerivationResult>> {
        let slot = self.lock().get(key).cloned()?;
        match slot.get() {
            Some(Ok(result)) => Some(result.clone()),
            _ => None,
        }
    }

    /// All completed entries, sorted by key.
    pub fn entries(&self) -> Vec<(CacheKey, Arc<DerivationResult>)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .filter_map(|(key, slot)| match slot.get() {
                Some(Ok(result)) => Some((key.clone(), result.clone())),
                _ => None,
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of completed entries.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot.get(), Some(Ok(_))))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            derived: self.derived.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Summary of cache behavior for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub joins: u32,
    pub derived: u32,
    pub failed: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.joins + self.derived + self.failed
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reused = self.hits + self.joins;
        match (reused > 0, self.failed > 0) {
            (true, true) => write!(
                f,
                "{} reused, {} derived, {} failed ({} total)",
                reused,
                self.derived,
                self.failed,
                self.total()
            ),
            (true, false) => write!(
                f,
                "{} reused, {} derived ({} total)",
                reused,
                self.derived,
                self.total()
            ),
            (false, true) => write!(f, "{} derived, {} failed", self.derived, self.failed),
            (false, false) => write!(f, "{} derived", self.derived),
        }
    }
}
