//! Edge-trimming rounds.
//!
//! Every worker thread runs the same loop over its private share of 64-edge
//! blocks: per round, first mark which node slots are touched by an alive
//! edge (on the side selected by the round's parity), then kill every alive
//! edge whose sibling slot went unmarked. A missing sibling means the
//! opposite endpoint has degree one in the live subgraph, and a degree-one
//! endpoint can never lie on a cycle.
//!
//! The node bitmap is cleared by thread 0 and the three phases of each pass
//! are separated by barrier waits, so a round's kills always observe the
//! complete marking of that round and the next round's marking always
//! observes the completed kills. This is what makes the result bit-identical
//! for any thread count.

use std::sync::Arc;

use crate::barrier::TrimBarrier;
use crate::bitset::{NodeBitmap, ShrinkingSet};
use crate::config::SolverConfig;
use crate::hash::SipKeys;

// ============================================================================
// Ownership and partition predicates
// ============================================================================

/// Owner of 64-edge block `block`: blocks are dealt round-robin, so no two
/// threads ever write the same live-edge word.
#[inline(always)]
pub fn thread_for(block: u64, nthreads: usize) -> usize {
    (block % nthreads as u64) as usize
}

/// Whether node slot `slot` falls in partition `part` (selected by the
/// slot's high bits).
#[inline(always)]
pub fn in_partition(slot: u64, part: u64, nonpart_bits: u32) -> bool {
    slot >> nonpart_bits == part
}

// ============================================================================
// Endpoint batching
// ============================================================================

/// A fixed-width batch of pending endpoint hashes.
///
/// The hash call always runs at full batch width; a partially filled tail is
/// padded by whatever stale inputs remain, whose hashes are simply never
/// consumed. Padding must stay free of bitmap side effects or partitioned
/// and unpartitioned runs would diverge.
struct EndpointBatch {
    nonces: Vec<u64>,
    inputs: Vec<u64>,
    hashes: Vec<u64>,
    len: usize,
}

impl EndpointBatch {
    fn new(size: usize) -> Self {
        Self {
            nonces: vec![0; size],
            inputs: vec![0; size],
            hashes: vec![0; size],
            len: 0,
        }
    }

    #[inline(always)]
    fn push(&mut self, nonce: u64, input: u64) {
        self.nonces[self.len] = nonce;
        self.inputs[self.len] = input;
        self.len += 1;
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        self.len == self.nonces.len()
    }
}

// ============================================================================
// TrimContext
// ============================================================================

/// Shared state of one solve attempt's trimming loop.
///
/// Immutable (or atomically mutated) during the round loop; the hash keys
/// are replaced between attempts only.
pub struct TrimContext {
    pub(crate) edge_mask: u64,
    nparts: u64,
    nonpart_bits: u32,
    nonpart_mask: u64,
    ntrims: usize,
    nthreads: usize,
    batch_size: usize,
    verbose: bool,
    pub(crate) keys: SipKeys,
    pub(crate) alive: ShrinkingSet,
    marks: NodeBitmap,
    pub(crate) barrier: Arc<TrimBarrier>,
}

impl TrimContext {
    /// Allocates the live-edge set, node bitmap, and barrier for `cfg`.
    pub fn new(cfg: &SolverConfig) -> Self {
        Self {
            edge_mask: cfg.edge_mask(),
            nparts: cfg.nparts(),
            nonpart_bits: cfg.nonpart_bits(),
            nonpart_mask: cfg.nonpart_mask(),
            ntrims: cfg.ntrims,
            nthreads: cfg.nthreads,
            batch_size: cfg.batch_size,
            verbose: cfg.verbose,
            keys: SipKeys::default(),
            alive: ShrinkingSet::new(cfg.nedges(), cfg.nthreads),
            marks: NodeBitmap::new(cfg.node_bitmap_bits()),
            barrier: Arc::new(TrimBarrier::new(cfg.nthreads)),
        }
    }

    /// The hash keys of the current attempt.
    pub fn keys(&self) -> &SipKeys {
        &self.keys
    }

    /// Number of currently-alive edges. Only meaningful between rounds.
    pub fn alive_count(&self) -> u64 {
        self.alive.count()
    }

    /// Marks the node bitmap from every alive edge in this thread's blocks
    /// whose `side`-endpoint lies in partition `part`.
    fn mark_nodes(&self, id: usize, side: u64, part: u64, batch: &mut EndpointBatch) {
        let nblocks = self.alive.nblocks();
        let mut block = id as u64;
        while block < nblocks {
            let mut word = self.alive.block(block);
            let base = block * 64;
            while word != 0 {
                let bit = u64::from(word.trailing_zeros());
                word &= word - 1;
                let nonce = base + bit;
                batch.push(nonce, 2 * nonce + side);
                if batch.is_full() {
                    self.flush_marks(part, batch);
                }
            }
            block += self.nthreads as u64;
        }
        self.flush_marks(part, batch);
    }

    fn flush_marks(&self, part: u64, batch: &mut EndpointBatch) {
        if batch.len == 0 {
            return;
        }
        self.keys.hash_batch(&batch.inputs, &mut batch.hashes);
        for i in 0..batch.len {
            let slot = batch.hashes[i] & self.edge_mask;
            if in_partition(slot, part, self.nonpart_bits) {
                self.marks.set(slot & self.nonpart_mask);
            }
        }
        batch.len = 0;
    }

    /// Kills every alive edge in this thread's blocks whose `side`-endpoint
    /// lies in partition `part` and whose sibling slot is unmarked.
    fn kill_leaves(&self, id: usize, side: u64, part: u64, batch: &mut EndpointBatch) {
        let nblocks = self.alive.nblocks();
        let mut block = id as u64;
        while block < nblocks {
            let mut word = self.alive.block(block);
            let base = block * 64;
            while word != 0 {
                let bit = u64::from(word.trailing_zeros());
                word &= word - 1;
                let nonce = base + bit;
                batch.push(nonce, 2 * nonce + side);
                if batch.is_full() {
                    self.flush_kills(id, part, batch);
                }
            }
            block += self.nthreads as u64;
        }
        self.flush_kills(id, part, batch);
    }

    fn flush_kills(&self, id: usize, part: u64, batch: &mut EndpointBatch) {
        if batch.len == 0 {
            return;
        }
        self.keys.hash_batch(&batch.inputs, &mut batch.hashes);
        // First sweep issues the cache warms, second does the dependent
        // test-and-kill; the batch width is what hides the bitmap latency.
        for i in 0..batch.len {
            let slot = batch.hashes[i] & self.edge_mask;
            if in_partition(slot, part, self.nonpart_bits) {
                self.marks.prefetch((slot & self.nonpart_mask) ^ 1);
            }
        }
        for i in 0..batch.len {
            let slot = batch.hashes[i] & self.edge_mask;
            if in_partition(slot, part, self.nonpart_bits)
                && !self.marks.test((slot & self.nonpart_mask) ^ 1)
            {
                self.alive.remove(batch.nonces[i], id);
            }
        }
        batch.len = 0;
    }

    /// Runs the full round loop as worker `id`.
    ///
    /// Returns `false` if the attempt was aborted; the live-edge set is then
    /// incomplete and must not be fed to the cycle finder.
    pub fn trim_rounds(&self, id: usize) -> bool {
        let mut batch = EndpointBatch::new(self.batch_size);
        for round in 0..self.ntrims {
            let side = (round & 1) as u64;
            for part in 0..self.nparts {
                if !self.barrier.wait() {
                    return false;
                }
                if id == 0 {
                    if self.verbose && round > 0 && part == 0 {
                        println!("round {:3} {:10} edges", round - 1, self.alive.count());
                    }
                    self.marks.clear();
                }
                if !self.barrier.wait() {
                    return false;
                }
                self.mark_nodes(id, side, part, &mut batch);
                if !self.barrier.wait() {
                    return false;
                }
                self.kill_leaves(id, side, part, &mut batch);
            }
        }
        if !self.barrier.wait() {
            return false;
        }
        if id == 0 && self.verbose {
            println!(
                "{} trim rounds completed, {} edges remain",
                self.ntrims,
                self.alive.count()
            );
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
