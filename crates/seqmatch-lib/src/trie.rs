//! Arena-backed trie with bounded edit-distance search.
//!
//! One trie indexes one partition of the sorted bag. All stored sequences
//! have the same padded length (the trie height), the node arena is sized
//! by an exact upfront count so insertion never reallocates, and terminals
//! address their sequence record by id through a two-step API: [`Trie::insert`]
//! reserves a *dark* slot that searches cannot see, and [`Trie::commit`]
//! makes it visible. A query therefore never matches itself while its own
//! block is being built.
//!
//! ## Distance semantics
//!
//! The search reports the Levenshtein distance of the *unpadded* sequences:
//! pad symbols match each other for free and cost nothing to insert or
//! delete, while every operation on a real symbol costs 1. Since padding is
//! confined to sequence heads, two distinct padded strings can never be at
//! distance 0.
//!
//! ## Prefix reuse
//!
//! Each node caches an L-shaped DP frontier: the band of half-width tau
//! along the row and column meeting at diagonal cell (d, d), where d is the
//! node depth. Every cache entry at depth d depends only on the query
//! prefix `q[0..d]`, so when consecutive queries share a prefix the search
//! can resume from the set of live nodes recorded at the shared depth (the
//! milestones kept in [`SearchMemo`]) instead of descending from the root.

use crate::constants::{INVALID_RECORD, MAX_TAU, PAD_BYTE, PAIR_SEPARATOR_BYTE};
use crate::record::{RecordId, SeqBag};
use std::ops::Range;
use thiserror::Error;

/// Number of child slots per node: pad, A, C, G, T, mate separator.
pub const ALPHABET: usize = 6;

/// Symbol index of the pad byte.
const PAD_SYM: u8 = 0;

/// Width of the cached DP frontier at the largest supported tau.
const CACHE_WIDTH: usize = 2 * MAX_TAU + 1;

/// Unreachable distance, saturating.
const INF: u8 = u8::MAX;

/// Arena index sentinel.
const INVALID_NODE: u32 = u32::MAX;

/// Error type for trie operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// Sequence length differs from the trie height
    #[error("sequence length {actual} does not match trie height {expected}")]
    HeightMismatch {
        /// Height the trie was built for
        expected: usize,
        /// Length of the offending sequence
        actual: usize,
    },
    /// A byte outside the trie alphabet
    #[error("unsupported byte in sequence: {0:?}")]
    UnsupportedByte(u8),
    /// The sequence is already committed in this trie
    #[error("sequence already present in the trie")]
    DuplicateSequence,
    /// Tau beyond what the node caches support
    #[error("edit-distance threshold {0} exceeds the supported maximum")]
    TauTooLarge(usize),
}

/// Map an input byte to its symbol index.
#[inline]
fn symbol(b: u8) -> Option<u8> {
    match b {
        PAD_BYTE => Some(0),
        b'A' | b'a' => Some(1),
        b'C' | b'c' => Some(2),
        b'G' | b'g' => Some(3),
        b'T' | b't' => Some(4),
        PAIR_SEPARATOR_BYTE => Some(5),
        _ => None,
    }
}

/// Length of the common prefix of two byte strings.
pub fn lcp(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Exact number of arena nodes needed to hold a sorted block of distinct
/// equal-length sequences: the full height for the first one, then one node
/// per symbol past the common prefix for each of the rest.
pub fn count_nodes(bag: &SeqBag, range: Range<usize>) -> usize {
    if range.is_empty() {
        return 0;
    }
    let height = bag[range.start].seq.len();
    let mut count = height;
    for i in range.start + 1..range.end {
        count += height - lcp(&bag[i - 1].seq, &bag[i].seq);
    }
    count
}

#[derive(Clone)]
struct Node {
    children: [u32; ALPHABET],
    /// Trailing edge symbols of the path to this node, 3 bits each, the
    /// newest in the low bits.
    path: u32,
    /// Non-pad symbols on the path to this node.
    nonpad: u16,
    /// Record id of the terminal, `INVALID_RECORD` while dark.
    record: u32,
    /// L-shaped DP frontier of the most recent search that visited this
    /// node; valid for any later query sharing the first `depth` symbols.
    cache: [u8; CACHE_WIDTH],
}

impl Node {
    fn new(path: u32, nonpad: u16) -> Self {
        Self {
            children: [INVALID_NODE; ALPHABET],
            path,
            nonpad,
            record: INVALID_RECORD,
            cache: [INF; CACHE_WIDTH],
        }
    }
}

/// Handle to a reserved terminal slot, redeemed by [`Trie::commit`].
#[must_use]
pub struct SlotHandle(u32);

/// Per-worker search continuation state: the milestone lists recording
/// which nodes were live at each depth of the previous search, plus a
/// reusable translated-query buffer.
pub struct SearchMemo {
    milestones: Vec<Vec<u32>>,
    query: Vec<u8>,
}

impl SearchMemo {
    /// Create memo state for a trie of the given height.
    pub fn new(height: usize) -> Self {
        Self {
            milestones: vec![Vec::new(); height + 1],
            query: Vec::with_capacity(height),
        }
    }
}

/// Collected neighbors of one query, bucketed by exact distance.
///
/// Each level holds at most `capacity` record ids; a push beyond that
/// drops the hit and flags the tower as overflowed, which the caller
/// reports as an incomplete search.
pub struct HitTower {
    levels: Vec<Vec<RecordId>>,
    capacity: usize,
    overflowed: bool,
}

impl HitTower {
    /// Create a tower with `tau + 1` levels.
    pub fn new(tau: usize, capacity: usize) -> Self {
        Self {
            levels: (0..=tau).map(|_| Vec::with_capacity(capacity)).collect(),
            capacity,
            overflowed: false,
        }
    }

    /// Empty all levels and reset the overflow flag.
    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.clear();
        }
        self.overflowed = false;
    }

    /// Hits at exactly the given distance.
    pub fn hits(&self, dist: usize) -> &[RecordId] {
        &self.levels[dist]
    }

    /// Whether any level dropped a hit since the last clear.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    fn push(&mut self, dist: usize, record: RecordId) {
        let level = &mut self.levels[dist];
        if level.len() >= self.capacity {
            self.overflowed = true;
            return;
        }
        level.push(record);
    }
}

/// Per-partition approximate-match index.
pub struct Trie {
    nodes: Vec<Node>,
    height: usize,
}

impl Trie {
    /// Allocate a trie for strings of exactly `height` symbols, with room
    /// for `nodes` arena nodes beyond the root (see [`count_nodes`]).
    pub fn with_capacity(height: usize, nodes: usize) -> Self {
        let mut arena = Vec::with_capacity(nodes + 1);
        arena.push(Node::new(0, 0));
        Self {
            nodes: arena,
            height,
        }
    }

    /// Height the trie was built for.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of arena nodes, root included.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Arena capacity, root slot included.
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Insert a sequence and reserve its terminal slot.
    ///
    /// The slot stays dark until [`Trie::commit`] is called, so searches
    /// running in between cannot find this sequence.
    pub fn insert(&mut self, seq: &[u8]) -> Result<SlotHandle, TrieError> {
        if seq.len() != self.height {
            return Err(TrieError::HeightMismatch {
                expected: self.height,
                actual: seq.len(),
            });
        }
        let mut node = 0u32;
        for &b in seq {
            let sym = symbol(b).ok_or(TrieError::UnsupportedByte(b))?;
            let child = self.nodes[node as usize].children[sym as usize];
            node = if child == INVALID_NODE {
                let parent = &self.nodes[node as usize];
                let path = (parent.path << 3) | sym as u32;
                let nonpad = parent.nonpad + u16::from(sym != PAD_SYM);
                let id = self.nodes.len() as u32;
                self.nodes.push(Node::new(path, nonpad));
                self.nodes[node as usize].children[sym as usize] = id;
                id
            } else {
                child
            };
        }
        if self.nodes[node as usize].record != INVALID_RECORD {
            return Err(TrieError::DuplicateSequence);
        }
        Ok(SlotHandle(node))
    }

    /// Point a reserved terminal at its record, making it visible to
    /// subsequent searches.
    pub fn commit(&mut self, handle: SlotHandle, record: RecordId) {
        self.nodes[handle.0 as usize].record = record;
    }

    /// Collect every committed sequence within distance `tau` of `seq`
    /// into `tower`, bucketed by exact distance.
    ///
    /// `start` and `trail` are the prefix-reuse hints: the caller
    /// guarantees `seq[0..start]` equals the previously searched query's
    /// prefix (so the search resumes from the milestones recorded at that
    /// depth) and `seq[0..trail]` equals the next query's prefix (so
    /// milestones are recorded for depths up to `trail`). Pass 0 for both
    /// to search from scratch.
    pub fn search(
        &mut self,
        seq: &[u8],
        tau: usize,
        tower: &mut HitTower,
        start: usize,
        trail: usize,
        memo: &mut SearchMemo,
    ) -> Result<(), TrieError> {
        if tau > MAX_TAU {
            return Err(TrieError::TauTooLarge(tau));
        }
        if seq.len() != self.height {
            return Err(TrieError::HeightMismatch {
                expected: self.height,
                actual: seq.len(),
            });
        }
        debug_assert!(start.max(trail) < self.height.max(1));

        let SearchMemo { milestones, query } = memo;

        query.clear();
        for &b in seq {
            query.push(symbol(b).ok_or(TrieError::UnsupportedByte(b))?);
        }

        // Insert cost of the first `d` query symbols, for the shallow
        // depths where the DP band reaches the matrix border.
        let mut query_nonpad = [0u8; MAX_TAU + 1];
        for d in 1..=tau.min(self.height) {
            query_nonpad[d] = query_nonpad[d - 1] + u8::from(query[d - 1] != PAD_SYM);
        }

        // Levels this search will rewrite; deeper stale levels are never
        // read because a future `start` cannot exceed this `trail`.
        for level in &mut milestones[start + 1..=trail.max(start)] {
            level.clear();
        }

        let mut pass = SearchPass {
            nodes: self.nodes.as_mut_slice(),
            query: query.as_slice(),
            query_nonpad,
            tau,
            trail,
            height: self.height,
        };

        if start == 0 {
            let mut root_cache = [INF; CACHE_WIDTH];
            root_cache[tau] = 0;
            pass.nodes[0].cache = root_cache;
            pass.descend(0, 0, tower, milestones);
        } else {
            let roots = std::mem::take(&mut milestones[start]);
            for &node_id in &roots {
                pass.descend(node_id, start, tower, milestones);
            }
            milestones[start] = roots;
        }

        Ok(())
    }
}

struct SearchPass<'a> {
    nodes: &'a mut [Node],
    query: &'a [u8],
    query_nonpad: [u8; MAX_TAU + 1],
    tau: usize,
    trail: usize,
    height: usize,
}

impl SearchPass<'_> {
    /// Explore the children of a node whose cache is valid for the current
    /// query, pruning subtrees whose whole band exceeds tau.
    fn descend(
        &mut self,
        node_id: u32,
        depth: usize,
        tower: &mut HitTower,
        milestones: &mut [Vec<u32>],
    ) {
        let parent_cache = self.nodes[node_id as usize].cache;
        let children = self.nodes[node_id as usize].children;
        let child_depth = depth + 1;

        for child_id in children {
            if child_id == INVALID_NODE {
                continue;
            }
            let child = &self.nodes[child_id as usize];
            let (cache, best) =
                self.child_band(&parent_cache, child.path, child.nonpad, child_depth);
            if best as usize > self.tau {
                continue;
            }
            let child = &mut self.nodes[child_id as usize];
            child.cache = cache;

            if child_depth == self.height {
                let record = child.record;
                let dist = cache[self.tau] as usize;
                if record != INVALID_RECORD && dist <= self.tau {
                    tower.push(dist, record);
                }
                continue;
            }
            if child_depth <= self.trail {
                milestones[child_depth].push(child_id);
            }
            self.descend(child_id, child_depth, tower, milestones);
        }
    }

    /// Compute the L-frontier of a child at depth `d` from its parent's
    /// frontier at depth `d - 1`.
    ///
    /// Layout for a band of half-width tau, with D the DP matrix of trie
    /// path prefixes against query prefixes:
    ///   cache[tau - i] = D[d - i][d]   (column arm, i = 1..=tau)
    ///   cache[tau]     = D[d][d]
    ///   cache[tau + i] = D[d][d - i]   (row arm, i = 1..=tau)
    ///
    /// Pad symbols are free to insert or delete; everything else costs 1.
    fn child_band(
        &self,
        parent: &[u8; CACHE_WIDTH],
        cpath: u32,
        cnonpad: u16,
        d: usize,
    ) -> ([u8; CACHE_WIDTH], u8) {
        let tau = self.tau;
        let mut cache = [INF; CACHE_WIDTH];

        // Edge symbol at depth `d - back` of the child's path.
        let path_sym = |back: usize| ((cpath >> (3 * back)) & 0b111) as u8;
        let edge = path_sym(0);

        let q_d = self.query[d - 1];
        let ins_q_d = u8::from(q_d != PAD_SYM);

        // Column arm, ascending a = d - tau .. d - 1.
        for m in 0..tau {
            let i = tau - m;
            let Some(a) = d.checked_sub(i) else {
                continue;
            };
            cache[m] = if a == 0 {
                // Matrix border: insert the whole query prefix.
                self.query_nonpad[d]
            } else {
                let p_a = path_sym(d - a);
                let diag = parent[tau - (d - a)];
                let up = if m == 0 { INF } else { cache[m - 1] };
                let left = parent[tau - (d - 1 - a)];
                let sub = u8::from(p_a != q_d);
                let del = u8::from(p_a != PAD_SYM);
                diag.saturating_add(sub)
                    .min(up.saturating_add(del))
                    .min(left.saturating_add(ins_q_d))
            };
        }

        // Row arm, ascending b = d - tau .. d - 1.
        for i in (1..=tau).rev() {
            let m = tau + i;
            let Some(b) = d.checked_sub(i) else {
                continue;
            };
            cache[m] = if b == 0 {
                // Matrix border: delete the whole path prefix.
                cnonpad as u8
            } else {
                let q_b = self.query[b - 1];
                let diag = parent[tau + (d - b)];
                let up = parent[tau + (d - 1 - b)];
                let left = if i == tau { INF } else { cache[m + 1] };
                let sub = u8::from(edge != q_b);
                let del = u8::from(edge != PAD_SYM);
                let ins = u8::from(q_b != PAD_SYM);
                diag.saturating_add(sub)
                    .min(up.saturating_add(del))
                    .min(left.saturating_add(ins))
            };
        }

        // Corner D[d][d].
        let up = if tau == 0 { INF } else { cache[tau - 1] };
        let left = if tau == 0 { INF } else { cache[tau + 1] };
        let sub = u8::from(edge != q_d);
        let del = u8::from(edge != PAD_SYM);
        cache[tau] = parent[tau]
            .saturating_add(sub)
            .min(up.saturating_add(del))
            .min(left.saturating_add(ins_q_d));

        let best = cache[..2 * tau + 1].iter().copied().min().unwrap_or(INF);
        (cache, best)
    }
}
