//! Memoization cache keyed by fully-qualified call signature.
//!
//! Guarantees at most one computation per `(stage, op, args)` key per
//! configuration snapshot, including under concurrency: the first caller
//! claims a slot and computes; other threads requesting the same key block
//! on the slot's condvar; the claiming thread re-requesting its own
//! in-flight key is a cycle and fails instead of deadlocking.
//!
//! Failed computations never poison the cache: the slot is removed after
//! waiters are notified, so a later call recomputes. A computation that
//! panics is treated the same way, via an unwind guard on the claimed slot.

use crate::stages::{CallArgs, StageValue};
use crate::system::SystemError;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

/// Fully-qualified call signature: the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub stage: String,
    pub op: String,
    pub args: CallArgs,
}

impl CallKey {
    pub fn new(stage: &str, op: &str, args: CallArgs) -> Self {
        Self {
            stage: stage.to_string(),
            op: op.to_string(),
            args,
        }
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.stage, self.op, self.args)
    }
}

/// Hit/miss counters, for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

enum SlotState {
    /// Being computed by the named thread.
    InFlight(ThreadId),
    /// Finished; result plus the config snapshot hash it was computed under.
    Done(Result<StageValue, SystemError>, String),
}

struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Slot {
    fn new(owner: ThreadId) -> Self {
        Self {
            state: Mutex::new(SlotState::InFlight(owner)),
            ready: Condvar::new(),
        }
    }
}

pub struct MemoCache {
    slots: Mutex<HashMap<CallKey, Arc<Slot>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Lock helper that survives poisoning: a panic in one computation must not
/// wedge every later accessor call.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fails the claimed slot if the computation unwinds, so threads blocked on
/// its condvar wake up instead of waiting forever. Disarmed on the normal
/// completion path.
struct FailOnUnwind<'a> {
    cache: &'a MemoCache,
    key: &'a CallKey,
    slot: &'a Arc<Slot>,
    armed: bool,
}

impl Drop for FailOnUnwind<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = lock(&self.slot.state);
            *state = SlotState::Done(
                Err(SystemError::Panicked(self.key.to_string())),
                String::new(),
            );
        }
        self.slot.ready.notify_all();
        self.cache.remove_if_same(self.key, self.slot);
    }
}

impl MemoCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, or run `compute` exactly once and
    /// cache it. `snapshot` is the config snapshot hash recorded as entry
    /// provenance.
    pub fn get_or_compute<F>(
        &self,
        key: CallKey,
        snapshot: &str,
        compute: F,
    ) -> Result<StageValue, SystemError>
    where
        F: FnOnce() -> Result<StageValue, SystemError>,
    {
        let me = thread::current().id();

        let (slot, claimed) = {
            let mut slots = lock(&self.slots);
            match slots.entry(key.clone()) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
                Entry::Vacant(entry) => {
                    let slot = Arc::new(Slot::new(me));
                    entry.insert(Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if claimed {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "cache miss, computing");
            let mut unwind_guard = FailOnUnwind {
                cache: self,
                key: &key,
                slot: &slot,
                armed: true,
            };
            let result = compute();
            unwind_guard.armed = false;
            {
                let mut state = lock(&slot.state);
                *state = SlotState::Done(result.clone(), snapshot.to_string());
            }
            slot.ready.notify_all();
            if result.is_err() {
                // Leave the cache clean so a later call can retry.
                self.remove_if_same(&key, &slot);
            }
            return result;
        }

        let mut state = lock(&slot.state);
        loop {
            match &*state {
                SlotState::Done(result, _) => {
                    if result.is_ok() {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(key = %key, "cache hit");
                    }
                    return result.clone();
                }
                SlotState::InFlight(owner) if *owner == me => {
                    return Err(SystemError::CyclicDependency(key.to_string()));
                }
                SlotState::InFlight(_) => {
                    state = slot
                        .ready
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            }
        }
    }

    /// Config snapshot hash a completed entry was computed under, if cached.
    pub fn entry_snapshot(&self, key: &CallKey) -> Option<String> {
        // Clone the slot out so the map lock drops before the state lock.
        let slot = Arc::clone(lock(&self.slots).get(key)?);
        let snapshot = match &*lock(&slot.state) {
            SlotState::Done(Ok(_), snapshot) => Some(snapshot.clone()),
            _ => None,
        };
        snapshot
    }

    /// Drop every entry. Driven by configuration mutation.
    pub fn invalidate_all(&self) {
        let mut slots = lock(&self.slots);
        let n = slots.len();
        slots.clear();
        tracing::info!(entries = n, "cache invalidated");
    }

    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Remove `key` only if it still maps to this exact slot — a concurrent
    /// `invalidate_all` may already have replaced or dropped it.
    fn remove_if_same(&self, key: &CallKey, slot: &Arc<Slot>) {
        let mut slots = lock(&self.slots);
        if let Some(current) = slots.get(key) {
            if Arc::ptr_eq(current, slot) {
                slots.remove(key);
            }
        }
    }
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new()
    }
}
