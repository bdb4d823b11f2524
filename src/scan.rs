//! Multi-nonce search driver.
//!
//! A single solve attempt usually finds nothing; mining searches a range of
//! header nonces. The scan reuses one solver per chain (the live-edge set
//! and bitmaps are recycled between attempts) and deals nonces to chains by
//! stride, with an optional shared stop flag once any chain finds a proof.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{ConfigError, SolverConfig};
use crate::solver::{Solution, Solver};

// ============================================================================
// Options
// ============================================================================

/// Options for [`scan_range`].
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Number of parallel chains. Each chain owns a full solver, so memory
    /// scales linearly; `1` scans sequentially on the calling thread.
    pub chains: usize,
    /// Stop scanning once any chain reports a proof. Other chains finish
    /// their attempt in flight, so more than one solution may still come
    /// back.
    pub stop_on_first: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            chains: 1,
            stop_on_first: false,
        }
    }
}

// ============================================================================
// Scan
// ============================================================================

/// Solves header nonces `start..start+range`, returning every found
/// solution sorted by nonce.
///
/// The configuration's `mutate_nonce` flag is forced on: scanning works by
/// rewriting the trailing header word, so `header` must be at least four
/// bytes.
///
/// # Errors
/// Returns the violated configuration constraint.
pub fn scan_range(
    cfg: &SolverConfig,
    header: &[u8],
    start: u32,
    range: u32,
    opts: &ScanOptions,
) -> Result<Vec<Solution>, ConfigError> {
    let mut cfg = cfg.clone();
    cfg.mutate_nonce = true;
    cfg.validate()?;
    let chains = opts.chains.max(1);

    if chains == 1 {
        let mut solver = Solver::new(cfg)?;
        let mut hdr = header.to_vec();
        let mut out = Vec::new();
        for offset in 0..range {
            solver.set_header_and_nonce(&mut hdr, start.wrapping_add(offset));
            let sols = solver.run();
            let hit = !sols.is_empty();
            out.extend(sols);
            if hit && opts.stop_on_first {
                break;
            }
        }
        return Ok(out);
    }

    let mut solvers: Vec<Solver> = (0..chains)
        .map(|_| Solver::new(cfg.clone()))
        .collect::<Result<_, _>>()?;
    let found = AtomicBool::new(false);

    let mut out: Vec<Solution> = solvers
        .par_iter_mut()
        .enumerate()
        .map(|(chain, solver)| {
            let mut hdr = header.to_vec();
            let mut sols = Vec::new();
            let mut offset = chain as u64;
            while offset < u64::from(range) {
                if opts.stop_on_first && found.load(Ordering::Relaxed) {
                    break;
                }
                solver.set_header_and_nonce(&mut hdr, start.wrapping_add(offset as u32));
                let attempt = solver.run();
                if !attempt.is_empty() {
                    if opts.stop_on_first {
                        found.store(true, Ordering::Relaxed);
                    }
                    sols.extend(attempt);
                }
                offset += chains as u64;
            }
            sols
        })
        .reduce(Vec::new, |mut a, mut b| {
            a.append(&mut b);
            a
        });

    out.sort_by(|a, b| (a.nonce, &a.proof).cmp(&(b.nonce, &b.proof)));
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_config() -> SolverConfig {
        let mut cfg = SolverConfig::new(8);
        cfg.proof_size = 2;
        cfg
    }

    #[test]
    fn sequential_and_parallel_chains_agree() {
        let cfg = scan_config();
        let header = [7u8; 80];
        let sequential = scan_range(&cfg, &header, 0, 40, &ScanOptions::default())
            .expect("sequential scan");
        let parallel = scan_range(
            &cfg,
            &header,
            0,
            40,
            &ScanOptions {
                chains: 3,
                stop_on_first: false,
            },
        )
        .expect("parallel scan");
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn stop_on_first_returns_something_from_a_fertile_range() {
        let cfg = scan_config();
        let header = [0u8; 80];
        let sols = scan_range(
            &cfg,
            &header,
            0,
            200,
            &ScanOptions {
                chains: 1,
                stop_on_first: true,
            },
        )
        .expect("scan");
        assert!(!sols.is_empty(), "no two-cycle in 200 nonces is implausible");
        // Sequential stop-on-first returns exactly the first fertile nonce's
        // solutions.
        let first_nonce = sols[0].nonce;
        assert!(sols.iter().all(|s| s.nonce == first_nonce));
    }

    #[test]
    fn empty_range_yields_no_solutions() {
        let cfg = scan_config();
        let header = [0u8; 80];
        let sols = scan_range(&cfg, &header, 5, 0, &ScanOptions::default()).expect("scan");
        assert!(sols.is_empty());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut cfg = scan_config();
        cfg.proof_size = 3;
        let header = [0u8; 80];
        assert!(scan_range(&cfg, &header, 0, 10, &ScanOptions::default()).is_err());
    }

    #[test]
    fn results_are_sorted_by_nonce() {
        let cfg = scan_config();
        let header = [3u8; 80];
        let sols = scan_range(
            &cfg,
            &header,
            0,
            60,
            &ScanOptions {
                chains: 4,
                stop_on_first: false,
            },
        )
        .expect("scan");
        for pair in sols.windows(2) {
            assert!(pair[0].nonce <= pair[1].nonce);
        }
    }
}
