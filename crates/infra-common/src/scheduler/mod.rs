//! A single min-heap timer wheel, integrated with I/O readiness the way
//! spec §4.8 describes: the main loop waits `min(next-deadline, infinity)`
//! on the socket, then drains every timer whose deadline has passed.
//!
//! This is deliberately not `tokio::time::sleep`-per-timer: spec §5 calls
//! for exactly two long-running tasks (network reader, monitor) rather than
//! one task per pending retransmit or registration refresh, and the
//! monitor's suspension point is `scheduler.wait`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Opaque handle returned by [`Scheduler::add`]; pass it to [`Scheduler::del`]
/// to cancel, or use it to recognize your own timer from inside a callback
/// (reentrant add/cancel is supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// What a fired timer tells the scheduler to do next.
///
/// Returning `Reschedule(delay)` from a callback is how "variable
/// reschedule" (spec §4.8, e.g. non-INVITE retransmit backoff) is expressed:
/// the callback computes the next interval and the scheduler re-arms itself
/// without the caller re-registering by hand.
pub enum Outcome {
    Done,
    Reschedule(Duration),
}

struct Entry {
    deadline: Instant,
    id: TimerId,
    callback: Box<dyn FnMut() -> Outcome + Send>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline sorts first.
        other.deadline.cmp(&self.deadline).then_with(|| other.id.cmp(&self.id))
    }
}

/// Single-writer min-heap of `(deadline, id, callback)`, guarded by one lock
/// per spec §5 ("the scheduler heap: single-writer under its own lock").
pub struct Scheduler {
    heap: Mutex<BinaryHeap<Entry>>,
    next_id: AtomicU64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            heap: Mutex::new(BinaryHeap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn alloc_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Schedule `cb` to fire once after `delay`. If `cb` returns
    /// `Outcome::Reschedule(d)` it is re-armed `d` from now automatically.
    pub fn add<F>(&self, delay: Duration, cb: F) -> TimerId
    where
        F: FnMut() -> Outcome + Send + 'static,
    {
        let id = self.alloc_id();
        self.heap.lock().unwrap().push(Entry {
            deadline: Instant::now() + delay,
            id,
            callback: Box::new(cb),
        });
        id
    }

    /// Convenience wrapper for timers whose delay never changes between
    /// firings (e.g. the 1 s keepalive/voicemail scan tick).
    pub fn add_periodic<F>(&self, period: Duration, mut cb: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        self.add(period, move || {
            cb();
            Outcome::Reschedule(period)
        })
    }

    /// Cancel a pending timer. No-op if it already fired or was never valid.
    pub fn del(&self, id: TimerId) {
        let mut heap = self.heap.lock().unwrap();
        heap.retain(|e| e.id != id);
    }

    /// Milliseconds until the next deadline, or `None` if the heap is empty
    /// (the caller should then wait indefinitely on I/O).
    pub fn wait(&self, now: Instant) -> Option<u64> {
        let heap = self.heap.lock().unwrap();
        heap.peek().map(|e| {
            e.deadline
                .saturating_duration_since(now)
                .as_millis()
                .try_into()
                .unwrap_or(u64::MAX)
        })
    }

    /// Pop and run every timer whose deadline is `<= now`. Callbacks may
    /// reentrantly add/cancel further timers, including their own id -- the
    /// lock is released before invoking the callback to allow this.
    pub fn drive(&self, now: Instant) {
        loop {
            let due = {
                let mut heap = self.heap.lock().unwrap();
                match heap.peek() {
                    Some(e) if e.deadline <= now => heap.pop(),
                    _ => None,
                }
            };
            let Some(mut entry) = due else { break };
            match (entry.callback)() {
                Outcome::Done => {}
                Outcome::Reschedule(delay) => {
                    entry.deadline = now + delay;
                    self.heap.lock().unwrap().push(entry);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fires_in_deadline_order() {
        let sched = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        sched.add(Duration::from_millis(20), move || {
            o2.lock().unwrap().push(2);
            Outcome::Done
        });
        sched.add(Duration::from_millis(5), move || {
            o1.lock().unwrap().push(1);
            Outcome::Done
        });
        std::thread::sleep(Duration::from_millis(30));
        sched.drive(Instant::now());
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn cancel_prevents_firing() {
        let sched = Scheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let id = sched.add(Duration::from_millis(5), move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
            Outcome::Done
        });
        sched.del(id);
        std::thread::sleep(Duration::from_millis(10));
        sched.drive(Instant::now());
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn reschedule_reruns_with_new_delay() {
        let sched = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        sched.add(Duration::from_millis(1), move || {
            let n = c.fetch_add(1, AtomicOrdering::SeqCst);
            if n < 2 {
                Outcome::Reschedule(Duration::from_millis(1))
            } else {
                Outcome::Done
            }
        });
        for _ in 0..5 {
            std::thread::sleep(Duration::from_millis(3));
            sched.drive(Instant::now());
        }
        assert_eq!(count.load(AtomicOrdering::SeqCst), 3);
    }
}
