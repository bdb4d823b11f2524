//! Cycle finder over the trimmed edge set.
//!
//! Surviving edges are added in increasing edge-index order and receive
//! dense sequential positions; [`CycleGraph::solve`] reports simple cycles
//! of exactly the target length as ascending lists of those positions,
//! which the solver later maps back to original edge nonces.
//!
//! Two edges are adjacent on a side when their endpoint slots on that side
//! are siblings: equal after clearing bit 0 but unequal as values, i.e.
//! slot `x` pairs with `x ^ 1`. A cycle alternates sides edge by edge, so
//! valid cycle lengths are always even.

use std::collections::{HashMap, HashSet};
use std::mem;

// ============================================================================
// CycleGraph
// ============================================================================

/// Dense edge store plus the cycle search over it.
pub struct CycleGraph {
    proof_size: usize,
    max_solutions: usize,
    capacity: usize,
    us: Vec<u64>,
    vs: Vec<u64>,
    solutions: Vec<Vec<u64>>,
}

impl CycleGraph {
    /// Creates a graph preallocated for `capacity` edges, reporting cycles
    /// of `proof_size` edges, at most `max_solutions` per solve.
    pub fn new(capacity: usize, proof_size: usize, max_solutions: usize) -> Self {
        Self {
            proof_size,
            max_solutions,
            capacity,
            us: Vec::with_capacity(capacity),
            vs: Vec::with_capacity(capacity),
            solutions: Vec::with_capacity(max_solutions),
        }
    }

    /// Bytes of the preallocated layout for the given parameters: the edge
    /// store, the per-side adjacency index built during `solve`, and the
    /// solution buffers. Used for budget validation at solver construction.
    pub fn layout_bytes(capacity: usize, proof_size: usize, max_solutions: usize) -> usize {
        let store = capacity * 2 * mem::size_of::<u64>();
        let index = capacity * 2 * (mem::size_of::<u64>() + mem::size_of::<u32>());
        let sols = max_solutions * proof_size * mem::size_of::<u64>();
        store + index + sols
    }

    /// Bytes of this graph's preallocated layout.
    pub fn byte_size(&self) -> usize {
        Self::layout_bytes(self.capacity, self.proof_size, self.max_solutions)
    }

    /// Number of edges currently stored.
    pub fn len(&self) -> usize {
        self.us.len()
    }

    /// Whether the graph holds no edges.
    pub fn is_empty(&self) -> bool {
        self.us.is_empty()
    }

    /// Drops all edges and solutions for the next solve attempt.
    pub fn reset(&mut self) {
        self.us.clear();
        self.vs.clear();
        self.solutions.clear();
    }

    /// Appends an edge; its dense position is the insertion order.
    ///
    /// The store may grow past the preallocated capacity rather than drop
    /// survivors; the capacity is what the byte budget validates, not a
    /// hard ceiling.
    #[inline]
    pub fn add_edge(&mut self, u: u64, v: u64) {
        self.us.push(u);
        self.vs.push(v);
    }

    /// Searches for simple cycles of exactly `proof_size` edges.
    ///
    /// Returns up to `max_solutions` cycles, each an ascending list of dense
    /// edge positions. Every distinct cycle is reported once: the search
    /// anchors each cycle at its minimum position and fixes the traversal
    /// direction.
    pub fn solve(&mut self) -> &[Vec<u64>] {
        self.solutions.clear();
        let nedges = self.us.len();

        let mut by_u: HashMap<u64, Vec<u32>> = HashMap::new();
        let mut by_v: HashMap<u64, Vec<u32>> = HashMap::new();
        for i in 0..nedges {
            by_u.entry(self.us[i]).or_default().push(i as u32);
            by_v.entry(self.vs[i]).or_default().push(i as u32);
        }

        let mut search = CycleSearch {
            us: &self.us,
            vs: &self.vs,
            by_u: &by_u,
            by_v: &by_v,
            proof_size: self.proof_size,
            max_solutions: self.max_solutions,
            start: 0,
            on_path: vec![false; nedges],
            used_u_pairs: HashSet::new(),
            used_v_pairs: HashSet::new(),
            path: Vec::with_capacity(self.proof_size),
            solutions: &mut self.solutions,
        };

        for start in 0..nedges as u32 {
            if search.solutions.len() >= search.max_solutions {
                break;
            }
            search.explore_from(start);
        }

        &self.solutions
    }
}

// ============================================================================
// Cycle search
// ============================================================================

struct CycleSearch<'a> {
    us: &'a [u64],
    vs: &'a [u64],
    by_u: &'a HashMap<u64, Vec<u32>>,
    by_v: &'a HashMap<u64, Vec<u32>>,
    proof_size: usize,
    max_solutions: usize,
    start: u32,
    on_path: Vec<bool>,
    used_u_pairs: HashSet<u64>,
    used_v_pairs: HashSet<u64>,
    path: Vec<u32>,
    solutions: &'a mut Vec<Vec<u64>>,
}

impl CycleSearch<'_> {
    fn explore_from(&mut self, start: u32) {
        self.start = start;
        self.path.clear();
        self.path.push(start);
        self.on_path[start as usize] = true;
        self.used_u_pairs.clear();
        self.used_v_pairs.clear();
        // Leave the anchor edge through its V endpoint; the cycle must
        // close back through its U endpoint. The fixed first side is what
        // makes each cycle come out in exactly one direction.
        self.extend(start, 1, true);
        self.on_path[start as usize] = false;
    }

    /// Extends the path from `current` (the `depth`-th edge) by one
    /// sibling-match on the indicated side.
    fn extend(&mut self, current: u32, depth: usize, leave_via_v: bool) {
        let slot = if leave_via_v {
            self.vs[current as usize]
        } else {
            self.us[current as usize]
        };
        let pair = slot >> 1;
        let inserted = if leave_via_v {
            self.used_v_pairs.insert(pair)
        } else {
            self.used_u_pairs.insert(pair)
        };
        if !inserted {
            // This node pair already links two other path edges; reusing it
            // would make the cycle non-simple.
            return;
        }

        let index = if leave_via_v { self.by_v } else { self.by_u };
        if let Some(partners) = index.get(&(slot ^ 1)) {
            for &next in partners {
                if self.solutions.len() >= self.max_solutions {
                    break;
                }
                if next == self.start {
                    if depth == self.proof_size {
                        let mut positions: Vec<u64> =
                            self.path.iter().map(|&e| u64::from(e)).collect();
                        positions.sort_unstable();
                        self.solutions.push(positions);
                    }
                    continue;
                }
                if depth == self.proof_size || next < self.start || self.on_path[next as usize] {
                    continue;
                }
                self.on_path[next as usize] = true;
                self.path.push(next);
                self.extend(next, depth + 1, !leave_via_v);
                self.path.pop();
                self.on_path[next as usize] = false;
            }
        }

        if leave_via_v {
            self.used_v_pairs.remove(&pair);
        } else {
            self.used_u_pairs.remove(&pair);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
