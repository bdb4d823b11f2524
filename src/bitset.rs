//! Shared bit structures for the trimming loop.
//!
//! Two structures live here: [`NodeBitmap`], the per-round node-presence
//! bitmap written by all worker threads at once, and [`ShrinkingSet`], the
//! live-edge set that only ever loses bits over a solve attempt.
//!
//! # Memory ordering
//!
//! All bit traffic uses `Relaxed` atomics. Phase ordering is provided
//! entirely by the trimming barrier: every thread passes through the
//! barrier's mutex between the clear, mark, and kill phases, which gives the
//! necessary happens-before edges. Within a phase the only concurrent writes
//! are idempotent `fetch_or`s to the presence bitmap (safe at any ordering)
//! and live-edge clears confined to the owning thread's blocks (never two
//! writers to one word). Rust forbids non-atomic racing stores outright, so
//! the atomic-OR fallback is the only correct rendition of the shared
//! bitmap, and it costs nothing extra on x86 and little on ARM.

use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// NodeBitmap
// ============================================================================

/// One bit per node slot, rebuilt every trimming round.
///
/// Bit `i` set means "slot `i` is touched by at least one currently-alive
/// edge, observed so far this round". Writes are idempotent ORs, so any
/// number of threads may mark concurrently; `clear` must only run while no
/// other thread is accessing the bitmap (one designated thread between
/// barriers).
pub struct NodeBitmap {
    words: Box<[AtomicU64]>,
    nbits: u64,
}

impl NodeBitmap {
    /// Allocates a zeroed bitmap over `nbits` bits (rounded up to whole words).
    pub fn new(nbits: u64) -> Self {
        let nwords = nbits.div_ceil(64) as usize;
        let words: Vec<AtomicU64> = (0..nwords).map(|_| AtomicU64::new(0)).collect();
        Self {
            words: words.into_boxed_slice(),
            nbits,
        }
    }

    /// Number of addressable bits.
    #[inline(always)]
    pub fn nbits(&self) -> u64 {
        self.nbits
    }

    /// Bytes of bit storage.
    #[inline(always)]
    pub fn byte_size(&self) -> usize {
        self.words.len() * 8
    }

    /// Zeroes every word. Single-threaded by contract.
    pub fn clear(&self) {
        for w in self.words.iter() {
            w.store(0, Ordering::Relaxed);
        }
    }

    /// Sets bit `i`. Safe for any number of concurrent callers.
    #[inline(always)]
    pub fn set(&self, i: u64) {
        debug_assert!(i < self.nbits);
        self.words[(i / 64) as usize].fetch_or(1 << (i % 64), Ordering::Relaxed);
    }

    /// Returns bit `i`.
    #[inline(always)]
    pub fn test(&self, i: u64) -> bool {
        debug_assert!(i < self.nbits);
        self.words[(i / 64) as usize].load(Ordering::Relaxed) >> (i % 64) & 1 != 0
    }

    /// Warms the cache line holding bit `i` ahead of a later `test`.
    ///
    /// Semantically a no-op; the load pulls the word into cache so a batch
    /// of dependent tests doesn't stall on memory.
    #[inline(always)]
    pub fn prefetch(&self, i: u64) {
        debug_assert!(i < self.nbits);
        let _ = self.words[(i / 64) as usize].load(Ordering::Relaxed);
    }
}

// ============================================================================
// ShrinkingSet
// ============================================================================

/// The live-edge set: one bit per edge index, 1 = alive.
///
/// Starts out full and monotonically shrinks. The bit array is partitioned
/// into 64-edge blocks, one word each; block `b` is owned by thread
/// `b % nthreads`, so no two threads ever clear bits in the same word.
/// Removal counts are kept per thread and summed on demand, which is only
/// meaningful between rounds, not concurrently with removals.
pub struct ShrinkingSet {
    words: Box<[AtomicU64]>,
    counts: Box<[AtomicU64]>,
    nedges: u64,
}

impl ShrinkingSet {
    /// Allocates the set for `nedges` edges (a multiple of 64) and
    /// `nthreads` removal counters, initially all-alive.
    pub fn new(nedges: u64, nthreads: usize) -> Self {
        debug_assert!(nedges % 64 == 0, "edge count must fill whole blocks");
        let words: Vec<AtomicU64> = (0..nedges / 64).map(|_| AtomicU64::new(0)).collect();
        let counts: Vec<AtomicU64> = (0..nthreads).map(|_| AtomicU64::new(0)).collect();
        let set = Self {
            words: words.into_boxed_slice(),
            counts: counts.into_boxed_slice(),
            nedges,
        };
        set.clear();
        set
    }

    /// Number of edges the set covers.
    #[inline(always)]
    pub fn nedges(&self) -> u64 {
        self.nedges
    }

    /// Number of 64-edge blocks.
    #[inline(always)]
    pub fn nblocks(&self) -> u64 {
        self.words.len() as u64
    }

    /// Resets every edge to alive and re-seeds the counters: thread 0 is
    /// credited with the full edge count so a global [`Self::count`] is
    /// correct before any removal.
    pub fn clear(&self) {
        for w in self.words.iter() {
            w.store(!0u64, Ordering::Relaxed);
        }
        for c in self.counts.iter() {
            c.store(0, Ordering::Relaxed);
        }
        self.counts[0].store(self.nedges, Ordering::Relaxed);
    }

    /// Kills edge `edge`, charging the removal to `thread`'s counter.
    ///
    /// Caller contract: `edge` lies in a block owned by `thread`; otherwise
    /// the per-thread counters drift (checked in debug builds only).
    #[inline(always)]
    pub fn remove(&self, edge: u64, thread: usize) {
        debug_assert!(edge < self.nedges);
        debug_assert_eq!(
            (edge / 64) as usize % self.counts.len(),
            thread,
            "edge {edge} removed by non-owning thread {thread}"
        );
        self.words[(edge / 64) as usize].fetch_and(!(1 << (edge % 64)), Ordering::Relaxed);
        self.counts[thread].fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns whether `edge` is still alive.
    #[inline(always)]
    pub fn is_alive(&self, edge: u64) -> bool {
        debug_assert!(edge < self.nedges);
        self.words[(edge / 64) as usize].load(Ordering::Relaxed) >> (edge % 64) & 1 != 0
    }

    /// Returns the 64 aliveness bits of block `block` for fast scanning.
    ///
    /// Callers walk set bits with a trailing-zeros / clear-lowest loop
    /// rather than testing every index; the set is sparse after a few
    /// rounds and whole-word scanning is what keeps trimming cheap.
    #[inline(always)]
    pub fn block(&self, block: u64) -> u64 {
        self.words[block as usize].load(Ordering::Relaxed)
    }

    /// Sums the per-thread counters into a global alive count.
    pub fn count(&self) -> u64 {
        self.counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .fold(0u64, u64::wrapping_add)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_bitmap_set_test_clear() {
        let bm = NodeBitmap::new(256);
        assert_eq!(bm.nbits(), 256);
        assert_eq!(bm.byte_size(), 32);
        for i in [0u64, 1, 63, 64, 65, 200, 255] {
            assert!(!bm.test(i));
            bm.set(i);
            assert!(bm.test(i));
        }
        // Neighbors are untouched.
        assert!(!bm.test(2));
        assert!(!bm.test(66));
        bm.clear();
        for i in 0..256 {
            assert!(!bm.test(i));
        }
    }

    #[test]
    fn node_bitmap_set_is_idempotent() {
        let bm = NodeBitmap::new(128);
        bm.set(77);
        bm.set(77);
        assert!(bm.test(77));
        assert!(!bm.test(76));
        assert!(!bm.test(78));
    }

    #[test]
    fn node_bitmap_concurrent_marking() {
        let bm = NodeBitmap::new(1024);
        std::thread::scope(|s| {
            for t in 0..4 {
                let bm = &bm;
                s.spawn(move || {
                    // Overlapping ranges on purpose; marking is idempotent.
                    for i in 0..1024u64 {
                        if i % 2 == t % 2 {
                            bm.set(i);
                        }
                    }
                });
            }
        });
        for i in 0..1024 {
            assert!(bm.test(i));
        }
    }

    #[test]
    fn prefetch_has_no_semantic_effect() {
        let bm = NodeBitmap::new(64);
        bm.prefetch(13);
        assert!(!bm.test(13));
        bm.set(13);
        bm.prefetch(13);
        assert!(bm.test(13));
    }

    #[test]
    fn shrinking_set_starts_full() {
        let set = ShrinkingSet::new(256, 2);
        assert_eq!(set.count(), 256);
        assert_eq!(set.nblocks(), 4);
        for e in 0..256 {
            assert!(set.is_alive(e));
        }
        assert_eq!(set.block(0), !0u64);
    }

    #[test]
    fn remove_updates_bits_and_owning_counter() {
        let set = ShrinkingSet::new(256, 2);
        // Block 1 (edges 64..128) is owned by thread 1.
        set.remove(65, 1);
        assert!(!set.is_alive(65));
        assert!(set.is_alive(64));
        assert_eq!(set.count(), 255);
        assert_eq!(set.block(1), !0u64 & !(1 << 1));

        // Block 0 is owned by thread 0.
        set.remove(0, 0);
        assert_eq!(set.count(), 254);
    }

    #[test]
    fn clear_restores_full_set_after_removals() {
        let set = ShrinkingSet::new(128, 2);
        set.remove(3, 0);
        set.remove(64, 1);
        assert_eq!(set.count(), 126);
        set.clear();
        assert_eq!(set.count(), 128);
        assert!(set.is_alive(3));
        assert!(set.is_alive(64));
    }

    #[test]
    fn block_word_matches_individual_bits() {
        let set = ShrinkingSet::new(128, 1);
        for e in [64u64, 70, 127] {
            set.remove(e, 0);
        }
        let word = set.block(1);
        for bit in 0..64u64 {
            assert_eq!(word >> bit & 1 != 0, set.is_alive(64 + bit));
        }
    }

    #[test]
    fn concurrent_disjoint_removals_keep_counts_consistent() {
        let nthreads = 4usize;
        let set = ShrinkingSet::new(1024, nthreads);
        std::thread::scope(|s| {
            for t in 0..nthreads {
                let set = &set;
                s.spawn(move || {
                    let mut block = t as u64;
                    while block < set.nblocks() {
                        let base = block * 64;
                        // Kill every other edge in the owned blocks.
                        for bit in (0..64).step_by(2) {
                            set.remove(base + bit, t);
                        }
                        block += nthreads as u64;
                    }
                });
            }
        });
        assert_eq!(set.count(), 512);
        for e in 0..1024 {
            assert_eq!(set.is_alive(e), e % 2 == 1);
        }
    }
}
