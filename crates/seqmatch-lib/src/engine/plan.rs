//! Partitioning and the diagonal job schedule.
//!
//! The sorted bag is cut into N contiguous blocks, N odd. Each block owns
//! one trie; trie `i` runs `(N + 1) / 2` jobs, where job `j` queries block
//! `(i + j) mod N` and job 0 additionally builds the trie from its own
//! block. Laid out as a grid (rows = blocks, columns = tries, `o` = build,
//! `x` = query):
//!
//! ```text
//!            --- tries ---
//!            1  2  3  4  5
//!         1  o  .  .  x  x
//!         2  x  o  .  .  x
//!         3  x  x  o  .  .
//!         4  .  x  x  o  .
//!         5  .  .  x  x  o
//! ```
//!
//! Because N is odd, every unordered pair of distinct blocks meets in
//! exactly one cell, and self-pairs are covered by the build job itself:
//! a block queried against its own trie as it is inserted, with terminals
//! committed only after their own search.

use crate::lookup::KmerLookup;
use crate::record::SeqBag;
use crate::trie::{count_nodes, Trie};

/// One plan item: query a block of the sorted bag against one trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JobSpec {
    /// First record index of the queried block.
    pub start: usize,
    /// One past the last record index of the queried block.
    pub end: usize,
    /// Whether this job also inserts the block into the trie.
    pub build: bool,
}

/// A partition's trie and prefilter, handed to one worker at a time.
pub(crate) struct PartitionIndex {
    pub trie: Trie,
    pub lookup: KmerLookup,
}

/// The complete job plan for one run.
pub struct MatchPlan {
    pub(crate) tau: usize,
    pub(crate) workers: usize,
    pub(crate) jobs: Vec<Vec<JobSpec>>,
    pub(crate) partitions: Vec<PartitionIndex>,
}

impl MatchPlan {
    /// Number of partitions (tries).
    pub fn num_tries(&self) -> usize {
        self.jobs.len()
    }

    /// Total number of jobs across all tries.
    pub fn num_jobs(&self) -> usize {
        self.jobs.iter().map(Vec::len).sum()
    }

    /// Effective worker budget (may be reduced to 1 for tiny inputs).
    pub fn workers(&self) -> usize {
        self.workers
    }
}

/// Build the job plan for a sorted, deduplicated, padded bag.
///
/// The partition count is `3 * workers`, bumped by one when `workers` is
/// even so it stays odd. Inputs smaller than the partition count fall back
/// to a single partition and a single worker.
pub fn build_plan(
    bag: &SeqBag,
    tau: usize,
    height: usize,
    median: usize,
    workers: usize,
) -> MatchPlan {
    let n = bag.len();
    let mut workers = workers.max(1);
    let mut ntries = 3 * workers + usize::from(workers % 2 == 0);
    if n < ntries {
        ntries = 1;
        workers = 1;
    }

    let q = n / ntries;
    let r = n % ntries;
    let bounds: Vec<usize> = (0..=ntries).map(|i| q * i + i.min(r)).collect();

    let partitions = (0..ntries)
        .map(|i| PartitionIndex {
            trie: Trie::with_capacity(height, count_nodes(bag, bounds[i]..bounds[i + 1])),
            lookup: KmerLookup::new(median, height, tau),
        })
        .collect();

    let njobs = (ntries + 1) / 2;
    let jobs = (0..ntries)
        .map(|i| {
            (0..njobs)
                .map(|j| {
                    let idx = (i + j) % ntries;
                    JobSpec {
                        start: bounds[idx],
                        end: bounds[idx + 1],
                        build: j == 0,
                    }
                })
                .collect()
        })
        .collect();

    MatchPlan {
        tau,
        workers,
        jobs,
        partitions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SeqRecord;
    use std::collections::HashSet;

    fn padded_bag(n: usize) -> SeqBag {
        // n distinct equal-length sequences.
        (0..n)
            .map(|i| {
                let seq: Vec<u8> = (0..8)
                    .map(|b| b"ACGT"[(i >> (2 * b)) & 3])
                    .collect();
                SeqRecord::new(seq)
            })
            .collect()
    }

    #[test]
    fn test_partition_count_is_odd() {
        let bag = padded_bag(100);
        for workers in 1..=8 {
            let plan = build_plan(&bag, 1, 8, 8, workers);
            assert_eq!(plan.num_tries() % 2, 1, "workers = {}", workers);
        }
        // 3W for odd W, 3W + 1 for even W.
        assert_eq!(build_plan(&bag, 1, 8, 8, 3).num_tries(), 9);
        assert_eq!(build_plan(&bag, 1, 8, 8, 4).num_tries(), 13);
    }

    #[test]
    fn test_tiny_input_falls_back_to_one_partition() {
        let bag = padded_bag(2);
        let plan = build_plan(&bag, 1, 8, 8, 4);
        assert_eq!(plan.num_tries(), 1);
        assert_eq!(plan.workers(), 1);
        assert_eq!(plan.num_jobs(), 1);
        assert!(plan.jobs[0][0].build);
    }

    #[test]
    fn test_blocks_tile_the_bag() {
        let bag = padded_bag(47);
        let plan = build_plan(&bag, 1, 8, 8, 2);
        let ntries = plan.num_tries();
        // The build jobs are the block decomposition.
        let mut covered = 0;
        let mut previous_end = 0;
        for i in 0..ntries {
            let job = plan.jobs[i][0];
            assert!(job.build);
            assert_eq!(job.start, previous_end);
            covered += job.end - job.start;
            previous_end = job.end;
        }
        assert_eq!(covered, bag.len());
    }

    #[test]
    fn test_every_block_pair_met_exactly_once() {
        let bag = padded_bag(49);
        let plan = build_plan(&bag, 1, 8, 8, 2);
        let ntries = plan.num_tries();

        // Map block start offsets back to block indices.
        let block_starts: Vec<usize> = (0..ntries).map(|i| plan.jobs[i][0].start).collect();
        let block_of = |start: usize| block_starts.iter().position(|&s| s == start).unwrap();

        let mut met = HashSet::new();
        for (trie, jobs) in plan.jobs.iter().enumerate() {
            for job in jobs {
                let block = block_of(job.start);
                let key = if trie <= block { (trie, block) } else { (block, trie) };
                assert!(met.insert(key), "pair {:?} scheduled twice", key);
            }
        }
        // All unordered pairs including self-pairs.
        assert_eq!(met.len(), ntries * (ntries + 1) / 2);
        for a in 0..ntries {
            for b in a..ntries {
                assert!(met.contains(&(a, b)), "pair ({}, {}) never met", a, b);
            }
        }
    }

    #[test]
    fn test_jobs_per_trie() {
        let bag = padded_bag(100);
        let plan = build_plan(&bag, 2, 8, 8, 2);
        let ntries = plan.num_tries();
        for jobs in &plan.jobs {
            assert_eq!(jobs.len(), (ntries + 1) / 2);
            assert!(jobs[0].build);
            assert!(jobs[1..].iter().all(|j| !j.build));
        }
        assert_eq!(plan.num_jobs(), ntries * (ntries + 1) / 2);
    }
}
