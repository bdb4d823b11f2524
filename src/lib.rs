//! # Cuckatoo Lean Solver
//!
//! A low-memory solver core for the cuckatoo cycle proof-of-work: a keyed
//! pseudorandom bipartite graph of \(2^{EDGEBITS}\) edges is repeatedly
//! trimmed of leaf edges until a compact subgraph remains, and the survivors
//! are searched for simple cycles of a fixed target length.
//!
//! This crate provides:
//! - A shared live-edge bitmap partitioned into per-thread 64-edge blocks,
//!   with per-thread alive counters (no shared-counter contention).
//! - A parallel mark-then-kill trimming loop, phase-aligned by a barrier
//!   with cooperative abort.
//! - A cycle finder over the surviving edges, plus translation of abstract
//!   cycle positions back to the original edge nonces.
//! - Independent proof verification and a multi-nonce search driver.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cuckatoo::config::SolverConfig;
//! use cuckatoo::solver::Solver;
//!
//! let mut cfg = SolverConfig::new(19);
//! cfg.nthreads = 4;
//! cfg.mutate_nonce = true;
//!
//! let mut solver = Solver::new(cfg).expect("valid configuration");
//! let mut header = [0u8; 80];
//! solver.set_header_and_nonce(&mut header, 23);
//! for sol in solver.run() {
//!     println!("found cycle: {:?}", sol.proof);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Runtime solver configuration and validation.
//! - [`bitset`]: Shared atomic bitmap and the shrinking live-edge set.
//! - [`hash`]: Keyed edge hasher (BLAKE2b header digest, SipHash-2-4 endpoints).
//! - [`barrier`]: Phase-alignment barrier with cooperative abort.
//! - [`trim`]: The mark/kill trimming rounds run by every worker thread.
//! - [`graph`]: Cycle finder over the surviving edges.
//! - [`solver`]: The solve entry point tying everything together.
//! - [`verify`]: Independent verification of claimed proofs.
//! - [`scan`]: Multi-nonce search over a header, optionally in parallel chains.
//!
//! ## Performance Notes
//!
//! - Peak memory is two bitmaps: one bit per edge plus one bit per node slot
//!   (the latter shrinks by `2^part_bits` when partitioned trimming is on).
//! - Edge hashing is batched so bitmap accesses can be prefetched ahead of
//!   the dependent test.
//! - Results are bit-identical for any thread count, partition count, and
//!   repeated run with the same header and nonce.
//! - For maximum throughput compile with `RUSTFLAGS="-C target-cpu=native"`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::inline_always)] // Intentional for hot-path code
#![allow(clippy::many_single_char_names)] // Hash-state variable names

pub mod barrier;
pub mod bitset;
pub mod config;
pub mod graph;
pub mod hash;
pub mod scan;
pub mod solver;
pub mod trim;
pub mod verify;

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::config::SolverConfig;
    pub use crate::scan::scan_range;
    pub use crate::solver::{Solution, Solver};
    pub use crate::verify::verify_proof;
}
