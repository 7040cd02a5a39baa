//! Per-peer call-limit enforcement (spec §9: "The code carries both a
//! `call_limit` feature guarded by a compile-time flag and a peer-object
//! refcount counter with edge cases around hangup-cancel interleaving.
//! Port as an enforced feature, not optional, and re-derive the invariant
//! (current-inuse ≤ limit)."). SPEC_FULL.md §9 records the decision:
//! always-on, not a compile-time feature.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Tracks in-use call counts per peer name, enforcing `current-inuse ≤
/// limit`. `limit == 0` means unlimited, matching [`crate::account::AccountInfo::call_limit`].
#[derive(Default)]
pub struct CallLimiter {
    in_use: DashMap<String, u32>,
}

/// A held slot. Releases exactly once, whether by explicit [`Self::release`]
/// (e.g. on BYE) or by drop (e.g. a CANCEL tearing the call down before
/// any explicit release runs) -- the `released` flag is what makes
/// hangup and cancel racing each other safe (spec §9's "edge cases
/// around hangup-cancel interleaving").
pub struct CallSlot {
    peer: String,
    limiter: Arc<CallLimiter>,
    released: AtomicBool,
}

impl CallLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to reserve a slot for `peer` against `limit`. Returns the
    /// slot on success; `None` when the peer is already at capacity.
    pub fn try_acquire(self: &Arc<Self>, peer: &str, limit: u32) -> Option<CallSlot> {
        let mut entry = self.in_use.entry(peer.to_string()).or_insert(0);
        if limit != 0 && *entry >= limit {
            return None;
        }
        *entry += 1;
        Some(CallSlot { peer: peer.to_string(), limiter: self.clone(), released: AtomicBool::new(false) })
    }

    pub fn current(&self, peer: &str) -> u32 {
        self.in_use.get(peer).map(|v| *v).unwrap_or(0)
    }

    fn release(&self, peer: &str) {
        if let Some(mut entry) = self.in_use.get_mut(peer) {
            *entry = entry.saturating_sub(1);
        }
    }
}

impl CallSlot {
    /// Release this slot early instead of waiting for drop.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.limiter.release(&self.peer);
        }
    }
}

impl Drop for CallSlot {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_beyond_limit() {
        let limiter = Arc::new(CallLimiter::new());
        let s1 = limiter.try_acquire("bob", 2).unwrap();
        let _s2 = limiter.try_acquire("bob", 2).unwrap();
        assert!(limiter.try_acquire("bob", 2).is_none());
        s1.release();
        assert!(limiter.try_acquire("bob", 2).is_some());
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let limiter = Arc::new(CallLimiter::new());
        let mut slots = Vec::new();
        for _ in 0..10 {
            slots.push(limiter.try_acquire("bob", 0).unwrap());
        }
        assert_eq!(limiter.current("bob"), 10);
    }

    #[test]
    fn release_is_idempotent_against_double_release() {
        let limiter = Arc::new(CallLimiter::new());
        let slot = limiter.try_acquire("bob", 1).unwrap();
        assert_eq!(limiter.current("bob"), 1);
        slot.release();
        slot.release();
        assert_eq!(limiter.current("bob"), 0);
    }

    #[test]
    fn drop_releases_without_explicit_call() {
        let limiter = Arc::new(CallLimiter::new());
        {
            let _slot = limiter.try_acquire("bob", 1).unwrap();
            assert_eq!(limiter.current("bob"), 1);
        }
        assert_eq!(limiter.current("bob"), 0);
    }
}
