//! Debug-mode lock-order assertion (spec §9: "One document of lock order:
//! scheduler < transport < dialog-map < dialog < channel. Validated in
//! debug mode."), grounded in the teacher's
//! `infra-common::lifecycle::dependency::DependencyGraph` -- that module
//! already models "does A depend on B" as a graph with cycle detection;
//! here the graph is fixed (it's a total order, not something callers
//! mutate) and what's checked per-thread is the *acquisition* order
//! against it, not whether a dependency edge exists.

use std::cell::RefCell;

/// The five lock tiers named in spec §9, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockTier {
    Scheduler,
    Transport,
    DialogMap,
    Dialog,
    Channel,
}

impl LockTier {
    fn name(self) -> &'static str {
        match self {
            LockTier::Scheduler => "scheduler",
            LockTier::Transport => "transport",
            LockTier::DialogMap => "dialog-map",
            LockTier::Dialog => "dialog",
            LockTier::Channel => "channel",
        }
    }
}

thread_local! {
    static HELD: RefCell<Vec<LockTier>> = const { RefCell::new(Vec::new()) };
}

/// A guard representing one held tier; dropping it pops the tier off the
/// current thread's held stack. No-op in release builds (the check is
/// debug-only, as spec §9 specifies).
pub struct LockOrderGuard {
    #[cfg(debug_assertions)]
    tier: LockTier,
}

/// Record that the current thread is about to acquire `tier`, panicking
/// in debug builds if a higher-numbered tier (later in the order) is
/// already held -- that would mean acquiring out of order, the exact
/// failure mode spec §9 calls out ("avoid lock-order cycles").
///
/// In release builds this is a no-op that always succeeds, matching the
/// "validated in debug mode" scope spec §9 specifies.
#[cfg(debug_assertions)]
pub fn enter(tier: LockTier) -> LockOrderGuard {
    HELD.with(|held| {
        let held = held.borrow();
        if let Some(&last) = held.last() {
            assert!(
                tier >= last,
                "lock-order violation: attempted to acquire '{}' while holding '{}' (expected order scheduler < transport < dialog-map < dialog < channel)",
                tier.name(),
                last.name(),
            );
        }
    });
    HELD.with(|held| held.borrow_mut().push(tier));
    LockOrderGuard { tier }
}

#[cfg(not(debug_assertions))]
pub fn enter(_tier: LockTier) -> LockOrderGuard {
    LockOrderGuard {}
}

#[cfg(debug_assertions)]
impl Drop for LockOrderGuard {
    fn drop(&mut self) {
        HELD.with(|held| {
            let mut held = held.borrow_mut();
            if held.last() == Some(&self.tier) {
                held.pop();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascending_order_is_fine() {
        let _s = enter(LockTier::Scheduler);
        let _t = enter(LockTier::Transport);
        let _d = enter(LockTier::Dialog);
    }

    #[test]
    #[should_panic(expected = "lock-order violation")]
    fn descending_order_panics() {
        let _d = enter(LockTier::Dialog);
        let _s = enter(LockTier::Scheduler);
    }

    #[test]
    fn guard_drop_allows_reacquiring_a_lower_tier() {
        {
            let _d = enter(LockTier::Dialog);
        }
        let _s = enter(LockTier::Scheduler);
    }
}
