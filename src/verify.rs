//! Independent verification of claimed proofs.
//!
//! Re-derives the endpoint slots of every nonce in a proof and checks that
//! they form a single closed, non-branching cycle of exactly the target
//! length. This is the acceptance check a consumer of proofs runs; it
//! shares nothing with the solver's cycle finder beyond the hasher, so the
//! two sides cross-validate each other.

use std::fmt;

use crate::config::SolverConfig;
use crate::hash::{sipnode, SipKeys};

// ============================================================================
// Errors
// ============================================================================

/// Why a claimed proof was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// The proof does not contain exactly `proof_size` nonces.
    WrongLength {
        /// Nonces supplied.
        got: usize,
        /// Nonces required.
        want: usize,
    },
    /// A nonce lies outside the edge-index range.
    NonceOutOfRange {
        /// Offending position in the proof.
        index: usize,
    },
    /// Nonces are not strictly ascending.
    NoncesNotAscending {
        /// First offending position.
        index: usize,
    },
    /// Endpoint slots do not pair up into siblings (XOR accumulator check).
    EndpointsUnbalanced,
    /// An endpoint has more than one sibling match among the proof edges.
    Branch,
    /// An endpoint has no sibling match among the proof edges.
    DeadEnd,
    /// The edges close a cycle shorter than the target length.
    ShortCycle {
        /// Edges traversed before closing.
        got: usize,
        /// Required cycle length.
        want: usize,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::WrongLength { got, want } => {
                write!(f, "proof has {got} nonces, expected {want}")
            }
            VerifyError::NonceOutOfRange { index } => {
                write!(f, "nonce at position {index} exceeds the edge range")
            }
            VerifyError::NoncesNotAscending { index } => {
                write!(f, "nonces not strictly ascending at position {index}")
            }
            VerifyError::EndpointsUnbalanced => {
                write!(f, "endpoint slots do not pair up into siblings")
            }
            VerifyError::Branch => write!(f, "an endpoint matches more than one other edge"),
            VerifyError::DeadEnd => write!(f, "an endpoint matches no other edge"),
            VerifyError::ShortCycle { got, want } => {
                write!(f, "edges close a {got}-cycle, expected {want}")
            }
        }
    }
}

impl std::error::Error for VerifyError {}

// ============================================================================
// Verification
// ============================================================================

/// Checks that `proof` is a valid cycle for the graph keyed by `keys`.
///
/// # Errors
/// Returns the first violated property, in the order: length, nonce range
/// and ordering, endpoint balance, cycle structure.
pub fn verify_proof(
    proof: &[u64],
    keys: &SipKeys,
    cfg: &SolverConfig,
) -> Result<(), VerifyError> {
    let proof_size = cfg.proof_size;
    if proof.len() != proof_size {
        return Err(VerifyError::WrongLength {
            got: proof.len(),
            want: proof_size,
        });
    }
    let mask = cfg.edge_mask();

    // Each side's slots must form proof_size/2 sibling pairs, and each pair
    // XORs to exactly 1; seed the accumulators with the pair-count parity so
    // a balanced proof nets out to zero.
    let parity = ((proof_size / 2) & 1) as u64;
    let mut xor0 = parity;
    let mut xor1 = parity;
    let mut uvs = vec![0u64; 2 * proof_size];
    for (n, &nonce) in proof.iter().enumerate() {
        if nonce > mask {
            return Err(VerifyError::NonceOutOfRange { index: n });
        }
        if n > 0 && nonce <= proof[n - 1] {
            return Err(VerifyError::NoncesNotAscending { index: n });
        }
        uvs[2 * n] = sipnode(keys, nonce, 0, mask);
        xor0 ^= uvs[2 * n];
        uvs[2 * n + 1] = sipnode(keys, nonce, 1, mask);
        xor1 ^= uvs[2 * n + 1];
    }
    if xor0 | xor1 != 0 {
        return Err(VerifyError::EndpointsUnbalanced);
    }

    // Follow the cycle: from endpoint i, find the unique same-side endpoint
    // in its sibling pair, then cross that edge to its other side.
    let mut n = 0usize;
    let mut i = 0usize;
    loop {
        let mut j = i;
        let mut k = i;
        loop {
            k = (k + 2) % (2 * proof_size);
            if k == i {
                break;
            }
            if uvs[k] >> 1 == uvs[i] >> 1 {
                if j != i {
                    return Err(VerifyError::Branch);
                }
                j = k;
            }
        }
        if j == i || uvs[j] == uvs[i] {
            return Err(VerifyError::DeadEnd);
        }
        i = j ^ 1;
        n += 1;
        if i == 0 {
            break;
        }
    }
    if n == proof_size {
        Ok(())
    } else {
        Err(VerifyError::ShortCycle {
            got: n,
            want: proof_size,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
