//! The solve entry point.
//!
//! A [`Solver`] owns one attempt's worth of state: the keyed hasher, the
//! live-edge set, the node bitmap, the barrier, and the cycle graph. A
//! solve keys the hasher from the caller's header, spawns the worker pool
//! to trim, then (on the calling thread, once all workers have joined)
//! rebuilds the cycle graph from the survivors and translates any reported
//! cycles back to edge nonces.

use std::sync::Arc;

use crate::barrier::TrimBarrier;
use crate::config::{ConfigError, SolverConfig};
use crate::graph::CycleGraph;
use crate::hash::{sipnode, SipKeys};
use crate::trim::TrimContext;

// ============================================================================
// Solution
// ============================================================================

/// One found cycle: the header nonce it was found under and the ordered
/// edge nonces forming the cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    /// Header nonce of the attempt that produced this proof.
    pub nonce: u32,
    /// The `proof_size` edge indices of the cycle, strictly ascending.
    pub proof: Vec<u64>,
}

// ============================================================================
// Abort handle
// ============================================================================

/// Cancels an in-flight [`Solver::run`] from another thread.
///
/// Cloneable and cheap; obtained from [`Solver::abort_handle`] before the
/// solver is handed to the solving thread.
#[derive(Clone)]
pub struct AbortHandle {
    barrier: Arc<TrimBarrier>,
}

impl AbortHandle {
    /// Requests cancellation: workers stop at their next phase boundary and
    /// the pending `run` returns an empty solution list.
    pub fn abort(&self) {
        self.barrier.abort();
    }
}

// ============================================================================
// Solver
// ============================================================================

/// A reusable solver for one configuration.
pub struct Solver {
    cfg: SolverConfig,
    ctx: TrimContext,
    graph: CycleGraph,
    nonce: u32,
}

impl Solver {
    /// Builds a solver, validating the configuration (including the cycle
    /// graph's byte budget when one is set).
    ///
    /// # Errors
    /// Returns the violated configuration constraint.
    pub fn new(cfg: SolverConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let graph = CycleGraph::new(
            cfg.resolved_graph_capacity(),
            cfg.proof_size,
            cfg.max_solutions,
        );
        let ctx = TrimContext::new(&cfg);
        Ok(Self {
            cfg,
            ctx,
            graph,
            nonce: 0,
        })
    }

    /// The configuration this solver was built with.
    pub fn config(&self) -> &SolverConfig {
        &self.cfg
    }

    /// The hash keys of the current attempt.
    pub fn keys(&self) -> &SipKeys {
        self.ctx.keys()
    }

    /// The header nonce of the current attempt.
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    /// Keys the hasher for a new attempt and resets all attempt state:
    /// every edge is set alive, pending solutions are dropped, and a
    /// previous abort is cleared.
    ///
    /// With `mutate_nonce` configured, the final four header bytes are
    /// overwritten with the little-endian nonce before keying (the
    /// conventional nonce-in-header encoding).
    ///
    /// # Panics
    /// Panics if `mutate_nonce` is configured and the header is shorter
    /// than four bytes.
    pub fn set_header_and_nonce(&mut self, header: &mut [u8], nonce: u32) {
        self.nonce = nonce;
        if self.cfg.mutate_nonce {
            assert!(
                header.len() >= 4,
                "mutate_nonce requires at least four header bytes"
            );
            let tail = header.len() - 4;
            header[tail..].copy_from_slice(&nonce.to_le_bytes());
        }
        self.ctx.keys = SipKeys::from_header(header);
        self.ctx.alive.clear();
        self.ctx.barrier.rearm();
        self.graph.reset();
    }

    /// Returns a handle that can cancel a `run` from another thread.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            barrier: Arc::clone(&self.ctx.barrier),
        }
    }

    /// Number of currently-alive edges. Meaningful before a run (the full
    /// edge count) and after one (the survivor count).
    pub fn alive_count(&self) -> u64 {
        self.ctx.alive_count()
    }

    /// The surviving edge indices in increasing order.
    pub fn surviving_edges(&self) -> Vec<u64> {
        let mut out = Vec::new();
        for block in 0..self.ctx.alive.nblocks() {
            let mut word = self.ctx.alive.block(block);
            let base = block * 64;
            while word != 0 {
                let bit = u64::from(word.trailing_zeros());
                word &= word - 1;
                out.push(base + bit);
            }
        }
        out
    }

    /// Runs the solve attempt to completion (or cooperative abort).
    ///
    /// Spawns the configured worker pool, joins it, and finalizes on the
    /// calling thread. Returns every found cycle, at most `max_solutions`;
    /// an aborted or cycle-free attempt returns an empty list.
    pub fn run(&mut self) -> Vec<Solution> {
        let ctx = &self.ctx;
        let completed = std::thread::scope(|s| {
            let workers: Vec<_> = (0..self.cfg.nthreads)
                .map(|id| s.spawn(move || ctx.trim_rounds(id)))
                .collect();
            workers
                .into_iter()
                .all(|worker| worker.join().unwrap_or(false))
        });
        if !completed {
            return Vec::new();
        }
        self.finalize()
    }

    /// Rebuilds the cycle graph from the survivors (in increasing edge
    /// order, so dense positions agree with the enumeration used by proof
    /// translation) and maps each reported cycle back to edge nonces.
    fn finalize(&mut self) -> Vec<Solution> {
        self.graph.reset();
        let keys = self.ctx.keys;
        let mask = self.ctx.edge_mask;
        for block in 0..self.ctx.alive.nblocks() {
            let mut word = self.ctx.alive.block(block);
            let base = block * 64;
            while word != 0 {
                let bit = u64::from(word.trailing_zeros());
                word &= word - 1;
                let nonce = base + bit;
                self.graph.add_edge(
                    sipnode(&keys, nonce, 0, mask),
                    sipnode(&keys, nonce, 1, mask),
                );
            }
        }

        let cycles: Vec<Vec<u64>> = self.graph.solve().to_vec();
        cycles
            .iter()
            .map(|cycle| Solution {
                nonce: self.nonce,
                proof: self.translate(cycle),
            })
            .collect()
    }

    /// Maps a cycle's dense positions (ascending) back to edge nonces with
    /// one pass over the live-edge set, counting an alive ordinal.
    ///
    /// # Panics
    /// Panics if the positions do not map onto exactly `proof_size`
    /// survivors: that means the cycle finder and the edge enumeration
    /// disagree on ordering, which is a defect, never a "no solution".
    fn translate(&self, positions: &[u64]) -> Vec<u64> {
        let mut proof = vec![0u64; self.cfg.proof_size];
        let mut filled = 0usize;
        let mut ordinal = 0u64;
        'scan: for block in 0..self.ctx.alive.nblocks() {
            let mut word = self.ctx.alive.block(block);
            let base = block * 64;
            while word != 0 {
                let bit = u64::from(word.trailing_zeros());
                word &= word - 1;
                if ordinal == positions[filled] {
                    proof[filled] = base + bit;
                    filled += 1;
                    if filled == positions.len() {
                        break 'scan;
                    }
                }
                ordinal += 1;
            }
        }
        assert_eq!(
            filled, self.cfg.proof_size,
            "cycle positions did not map onto the surviving edge enumeration"
        );
        proof
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(edge_bits: u32, proof_size: usize) -> SolverConfig {
        let mut cfg = SolverConfig::new(edge_bits);
        cfg.proof_size = proof_size;
        cfg.mutate_nonce = true;
        cfg
    }

    fn solve_nonce(cfg: &SolverConfig, nonce: u32) -> (Vec<Solution>, u64) {
        let mut solver = Solver::new(cfg.clone()).expect("valid config");
        let mut header = [0u8; 80];
        solver.set_header_and_nonce(&mut header, nonce);
        let sols = solver.run();
        let remaining = solver.alive_count();
        (sols, remaining)
    }

    #[test]
    fn construction_rejects_invalid_configs() {
        let mut cfg = SolverConfig::new(10);
        cfg.proof_size = 3;
        assert!(Solver::new(cfg).is_err());

        let mut cfg = SolverConfig::new(10);
        cfg.graph_budget = Some(1);
        assert!(matches!(
            Solver::new(cfg),
            Err(ConfigError::GraphBudget { .. })
        ));
    }

    #[test]
    fn thread_count_does_not_change_the_outcome() {
        let mut single = test_config(10, 8);
        single.ntrims = 12;
        let mut multi = single.clone();
        multi.nthreads = 4;

        for nonce in 0..8u32 {
            let (sols1, alive1) = solve_nonce(&single, nonce);
            let (sols4, alive4) = solve_nonce(&multi, nonce);
            assert_eq!(alive1, alive4, "survivor counts differ at nonce {nonce}");
            assert_eq!(sols1, sols4, "solutions differ at nonce {nonce}");
        }
    }

    #[test]
    fn random_headers_are_thread_invariant() {
        use rand::{RngCore, SeedableRng};
        use rand_xorshift::XorShiftRng;

        let mut rng = XorShiftRng::seed_from_u64(0xBEEF);
        let mut single = SolverConfig::new(9);
        single.proof_size = 4;
        single.ntrims = 10;
        let mut multi = single.clone();
        multi.nthreads = 3;

        let mut s1 = Solver::new(single).expect("valid config");
        let mut s3 = Solver::new(multi).expect("valid config");
        for _ in 0..5 {
            let mut header = [0u8; 64];
            rng.fill_bytes(&mut header);
            let mut h1 = header;
            let mut h3 = header;
            s1.set_header_and_nonce(&mut h1, 0);
            s3.set_header_and_nonce(&mut h3, 0);
            assert_eq!(s1.run(), s3.run());
            assert_eq!(s1.alive_count(), s3.alive_count());
            assert_eq!(s1.surviving_edges(), s3.surviving_edges());
        }
    }

    #[test]
    fn resolving_the_same_attempt_is_idempotent() {
        let cfg = test_config(9, 4);
        let mut solver = Solver::new(cfg).expect("valid config");
        let mut header = [0u8; 80];

        solver.set_header_and_nonce(&mut header, 7);
        let first = solver.run();
        let survivors = solver.surviving_edges();

        solver.set_header_and_nonce(&mut header, 7);
        let second = solver.run();
        assert_eq!(first, second);
        assert_eq!(survivors, solver.surviving_edges());
    }

    #[test]
    fn mutate_nonce_rewrites_the_header_tail() {
        let cfg = test_config(8, 4);
        let mut solver = Solver::new(cfg.clone()).expect("valid config");
        let mut header = [0u8; 80];
        solver.set_header_and_nonce(&mut header, 0xdead_beef);
        assert_eq!(&header[76..], &0xdead_beefu32.to_le_bytes());

        // Keying must equal hashing the mutated header directly.
        let mut plain = cfg.clone();
        plain.mutate_nonce = false;
        let mut direct = Solver::new(plain).expect("valid config");
        let mut prewritten = [0u8; 80];
        prewritten[76..].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        direct.set_header_and_nonce(&mut prewritten, 0);
        assert_eq!(solver.keys(), direct.keys());
    }

    #[test]
    fn surviving_edges_are_ascending_and_match_count() {
        let cfg = test_config(9, 4);
        let mut solver = Solver::new(cfg).expect("valid config");
        let mut header = [0u8; 80];
        solver.set_header_and_nonce(&mut header, 3);
        let _ = solver.run();
        let survivors = solver.surviving_edges();
        assert_eq!(survivors.len() as u64, solver.alive_count());
        for pair in survivors.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn proofs_have_exact_length_and_ascending_unique_nonces() {
        let cfg = test_config(8, 2);
        // Two-cycles are common at this size; scan until one shows up.
        let mut solver = Solver::new(cfg.clone()).expect("valid config");
        let mut header = [0u8; 80];
        let mut found = 0usize;
        for nonce in 0..200u32 {
            solver.set_header_and_nonce(&mut header, nonce);
            for sol in solver.run() {
                found += 1;
                assert_eq!(sol.nonce, nonce);
                assert_eq!(sol.proof.len(), 2);
                assert!(sol.proof[0] < sol.proof[1]);
            }
        }
        assert!(found > 0, "no two-cycle in 200 nonces is implausible");
    }

    #[test]
    fn solution_cap_bounds_the_result() {
        let mut cfg = test_config(8, 2);
        cfg.max_solutions = 1;
        let mut solver = Solver::new(cfg).expect("valid config");
        let mut header = [0u8; 80];
        for nonce in 0..100u32 {
            solver.set_header_and_nonce(&mut header, nonce);
            assert!(solver.run().len() <= 1);
        }
    }

    #[test]
    fn abort_returns_an_empty_result_promptly() {
        let mut cfg = test_config(12, 8);
        cfg.ntrims = 1_000_000; // far longer than the test will allow
        cfg.nthreads = 2;
        let mut solver = Solver::new(cfg).expect("valid config");
        let mut header = [0u8; 80];
        solver.set_header_and_nonce(&mut header, 0);

        let handle = solver.abort_handle();
        let sols = std::thread::scope(|s| {
            let runner = s.spawn(move || solver.run());
            std::thread::sleep(std::time::Duration::from_millis(30));
            handle.abort();
            runner.join().expect("runner must not panic")
        });
        assert!(sols.is_empty());
    }

    #[test]
    fn rekeying_clears_a_previous_abort() {
        let cfg = test_config(8, 4);
        let mut solver = Solver::new(cfg).expect("valid config");
        let mut header = [0u8; 80];

        solver.set_header_and_nonce(&mut header, 1);
        solver.abort_handle().abort();
        assert!(solver.run().is_empty());

        solver.set_header_and_nonce(&mut header, 1);
        // Full round budget runs again; alive count drops below the start.
        let _ = solver.run();
        assert!(solver.alive_count() < solver.config().nedges());
    }

    #[test]
    #[should_panic(expected = "surviving edge enumeration")]
    fn translation_faults_on_inconsistent_positions() {
        let cfg = test_config(8, 2);
        let solver = {
            let mut s = Solver::new(cfg).expect("valid config");
            let mut header = [0u8; 80];
            s.set_header_and_nonce(&mut header, 0);
            s
        };
        // Position beyond the alive ordinal range can never be matched.
        let bogus = vec![0u64, solver.config().nedges() + 1];
        let _ = solver.translate(&bogus);
    }
}
