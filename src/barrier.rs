//! Phase-alignment barrier with cooperative abort.
//!
//! Worker threads rendezvous here between the clear, mark, and kill phases
//! of every trimming round. An abort flag, observable at every wait point,
//! turns all current and future waits into immediate returns so an
//! in-progress solve can be cancelled without stranding threads at the
//! barrier.
//!
//! The barrier's mutex also carries the happens-before edges that order the
//! relaxed bitmap traffic of one phase before the next (see `bitset`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

struct BarrierState {
    waiting: usize,
    generation: u64,
}

/// A reusable rendezvous point for a fixed number of worker threads.
pub struct TrimBarrier {
    nthreads: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
    aborted: AtomicBool,
}

impl TrimBarrier {
    /// Creates a barrier for `nthreads` participants.
    pub fn new(nthreads: usize) -> Self {
        debug_assert!(nthreads >= 1);
        Self {
            nthreads,
            state: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
            aborted: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        // A poisoned lock means a worker panicked; the state itself is a
        // pair of counters and remains usable for the abort path.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Blocks until all participants arrive, then releases them together.
    ///
    /// Returns `false` instead of blocking (or mid-wait) once [`Self::abort`]
    /// has been called; callers unwind without completing their remaining
    /// phases.
    pub fn wait(&self) -> bool {
        if self.aborted.load(Ordering::Acquire) {
            return false;
        }
        let mut state = self.lock();
        state.waiting += 1;
        if state.waiting == self.nthreads {
            state.waiting = 0;
            state.generation += 1;
            drop(state);
            self.cvar.notify_all();
            return !self.aborted.load(Ordering::Acquire);
        }
        let generation = state.generation;
        while state.generation == generation {
            if self.aborted.load(Ordering::Acquire) {
                return false;
            }
            state = match self.cvar.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        drop(state);
        !self.aborted.load(Ordering::Acquire)
    }

    /// Requests cooperative cancellation: every thread blocked at the
    /// barrier wakes and returns `false`, as does every later `wait`.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        // Take the lock so no waiter can slip between its flag check and
        // its condvar sleep and miss the wakeup.
        drop(self.lock());
        self.cvar.notify_all();
    }

    /// Whether an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Clears the abort flag and waiter count for the next solve attempt.
    ///
    /// Caller contract: no thread is inside `wait` when this runs.
    pub fn rearm(&self) {
        let mut state = self.lock();
        state.waiting = 0;
        drop(state);
        self.aborted.store(false, Ordering::Release);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn all_threads_pass_together() {
        const N: usize = 4;
        let barrier = TrimBarrier::new(N);
        let before = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..N {
                let barrier = &barrier;
                let before = &before;
                s.spawn(move || {
                    before.fetch_add(1, Ordering::SeqCst);
                    assert!(barrier.wait());
                    // Every thread incremented before anyone passed.
                    assert_eq!(before.load(Ordering::SeqCst), N);
                });
            }
        });
    }

    #[test]
    fn barrier_is_reusable_across_phases() {
        const N: usize = 3;
        const PHASES: usize = 10;
        let barrier = TrimBarrier::new(N);
        let phase_counter = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..N {
                let barrier = &barrier;
                let phase_counter = &phase_counter;
                s.spawn(move || {
                    for phase in 0..PHASES {
                        phase_counter.fetch_add(1, Ordering::SeqCst);
                        assert!(barrier.wait());
                        // All N arrivals of this phase are visible.
                        assert!(phase_counter.load(Ordering::SeqCst) >= (phase + 1) * N);
                        assert!(barrier.wait());
                    }
                });
            }
        });
        assert_eq!(phase_counter.load(Ordering::SeqCst), N * PHASES);
    }

    #[test]
    fn abort_wakes_blocked_waiters() {
        let barrier = TrimBarrier::new(2);
        std::thread::scope(|s| {
            let handle = s.spawn(|| barrier.wait());
            // Give the waiter time to block, then cancel.
            std::thread::sleep(std::time::Duration::from_millis(20));
            barrier.abort();
            assert!(!handle.join().expect("waiter must not panic"));
        });
        assert!(barrier.is_aborted());
    }

    #[test]
    fn wait_after_abort_returns_immediately() {
        let barrier = TrimBarrier::new(2);
        barrier.abort();
        assert!(!barrier.wait());
        assert!(!barrier.wait());
    }

    #[test]
    fn rearm_restores_normal_operation() {
        let barrier = TrimBarrier::new(1);
        barrier.abort();
        assert!(!barrier.wait());
        barrier.rearm();
        assert!(!barrier.is_aborted());
        // Single-participant barrier releases immediately.
        assert!(barrier.wait());
    }
}
