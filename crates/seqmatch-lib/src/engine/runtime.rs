//! Scheduler runtime: one coordinator, a bounded pool of worker threads.
//!
//! Each trie's jobs are strictly sequential: a trie is either parked in
//! the shared state (Free), physically moved into exactly one worker
//! (Busy), or exhausted (Done). The coordinator round-robins the trie
//! indices, dispatches whenever it finds a Free trie with jobs left and a
//! worker slot available, and blocks on the condition variable while all
//! slots are taken. Moving the partition state in and out of the shared
//! table is what makes trie mutation data-race-free without any per-trie
//! lock.

use super::plan::{JobSpec, MatchPlan, PartitionIndex};
use super::MatchError;
use crate::lookup::ProbeOutcome;
use crate::record::{RecordId, SeqBag};
use crate::sink::PairSink;
use crate::trie::{lcp, HitTower, SearchMemo};
use std::sync::{Condvar, Mutex};
use std::thread;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrieFlag {
    Free,
    Busy,
    Done,
}

struct TrieSlot {
    flag: TrieFlag,
    current_job: usize,
    partition: Option<PartitionIndex>,
}

/// Counters aggregated across all jobs of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunTotals {
    /// Queries that probed Hit and went through the trie.
    pub searches_run: u64,
    /// Queries skipped because the prefilter proved no neighbor.
    pub searches_skipped: u64,
    /// Searches that overflowed the hit tower.
    pub incomplete_searches: u64,
}

struct SchedState {
    active: usize,
    jobs_done: usize,
    tries: Vec<TrieSlot>,
    totals: RunTotals,
    failure: Option<MatchError>,
}

struct Shared {
    state: Mutex<SchedState>,
    monitor: Condvar,
}

/// Execute every job of the plan against the bag, emitting pairs to the
/// sink. Returns the aggregated counters.
pub(crate) fn run_plan<S: PairSink + ?Sized>(
    plan: MatchPlan,
    bag: &SeqBag,
    sink: &S,
    verbose: bool,
    hit_capacity: usize,
) -> Result<RunTotals, MatchError> {
    let MatchPlan {
        tau,
        workers,
        jobs,
        partitions,
    } = plan;
    let ntries = jobs.len();
    let total_jobs: usize = jobs.iter().map(Vec::len).sum();

    let shared = Shared {
        state: Mutex::new(SchedState {
            active: 0,
            jobs_done: 0,
            tries: partitions
                .into_iter()
                .map(|partition| TrieSlot {
                    flag: TrieFlag::Free,
                    current_job: 0,
                    partition: Some(partition),
                })
                .collect(),
            totals: RunTotals::default(),
            failure: None,
        }),
        monitor: Condvar::new(),
    };

    thread::scope(|scope| -> Result<(), MatchError> {
        let shared = &shared;
        let mut tries_done = 0;
        let mut idx = ntries - 1;

        while tries_done < ntries {
            idx = (idx + 1) % ntries;
            let mut state = shared.state.lock().expect("scheduler lock poisoned");

            if state.tries[idx].flag == TrieFlag::Free && state.active < workers {
                if state.tries[idx].current_job == jobs[idx].len() {
                    state.tries[idx].flag = TrieFlag::Done;
                    tries_done += 1;
                } else {
                    state.tries[idx].flag = TrieFlag::Busy;
                    state.active += 1;
                    let job = jobs[idx][state.tries[idx].current_job];
                    state.tries[idx].current_job += 1;
                    let Some(mut partition) = state.tries[idx].partition.take() else {
                        return Err(MatchError::SchedulerState);
                    };
                    if verbose {
                        info!(
                            "progress: {:.2}%",
                            100.0 * state.jobs_done as f64 / total_jobs as f64
                        );
                    }

                    thread::Builder::new()
                        .name(format!("seqmatch-worker-{idx}"))
                        .spawn_scoped(scope, move || {
                            let result =
                                run_job(&job, &mut partition, bag, sink, tau, hit_capacity);
                            let mut state =
                                shared.state.lock().expect("scheduler lock poisoned");
                            match result {
                                Ok(outcome) => {
                                    state.totals.searches_run += outcome.searches_run;
                                    state.totals.searches_skipped += outcome.searches_skipped;
                                    state.totals.incomplete_searches +=
                                        outcome.incomplete_searches;
                                }
                                Err(err) => {
                                    if state.failure.is_none() {
                                        state.failure = Some(err);
                                    }
                                }
                            }
                            state.tries[idx].partition = Some(partition);
                            state.tries[idx].flag = TrieFlag::Free;
                            state.active -= 1;
                            state.jobs_done += 1;
                            shared.monitor.notify_one();
                        })
                        .map_err(MatchError::WorkerSpawn)?;
                }
            }

            while state.active == workers {
                state = shared
                    .monitor
                    .wait(state)
                    .expect("scheduler lock poisoned");
            }
        }
        Ok(())
    })?;

    let state = shared
        .state
        .into_inner()
        .expect("scheduler lock poisoned");
    if let Some(err) = state.failure {
        return Err(err);
    }
    if verbose {
        info!("progress: 100.00%");
    }
    Ok(state.totals)
}

/// Per-job body: probe, dark-insert, search with prefix hints, emit, commit.
fn run_job<S: PairSink + ?Sized>(
    job: &JobSpec,
    partition: &mut PartitionIndex,
    bag: &SeqBag,
    sink: &S,
    tau: usize,
    hit_capacity: usize,
) -> Result<RunTotals, MatchError> {
    let mut tower = HitTower::new(tau, hit_capacity);
    let mut memo = SearchMemo::new(partition.trie.height());
    let mut last_searched: Option<usize> = None;
    let mut totals = RunTotals::default();

    for i in job.start..job.end {
        let query = bag.get(i as RecordId);
        let do_search = partition.lookup.probe(&query.seq) == ProbeOutcome::Hit;

        // Insert before searching, but leave the terminal dark so the
        // query cannot find itself.
        let handle = if job.build {
            partition.lookup.insert(&query.seq)?;
            Some(partition.trie.insert(&query.seq)?)
        } else {
            None
        };

        if do_search {
            let trail = if i + 1 < job.end {
                lcp(&query.seq, &bag.get(i as RecordId + 1).seq)
            } else {
                0
            };
            let start = match last_searched {
                Some(prev) => lcp(&query.seq, &bag.get(prev as RecordId).seq),
                None => 0,
            };

            tower.clear();
            partition
                .trie
                .search(&query.seq, tau, &mut tower, start, trail, &mut memo)?;

            if tower.overflowed() {
                warn!(
                    "incomplete search ({})",
                    String::from_utf8_lossy(query.label())
                );
                totals.incomplete_searches += 1;
            }

            // Distance 0 would be the query itself; start at 1.
            for dist in 1..=tau {
                for &hit in tower.hits(dist) {
                    sink.emit(query, bag.get(hit), dist as u32);
                }
            }

            last_searched = Some(i);
            totals.searches_run += 1;
        } else {
            totals.searches_skipped += 1;
        }

        if let Some(handle) = handle {
            partition.trie.commit(handle, i as RecordId);
        }
    }

    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::plan::build_plan;
    use crate::preprocess::{pad, sort_and_merge};
    use crate::record::SeqRecord;
    use crate::sink::VecPairSink;

    fn run(seqs: &[&str], tau: usize, workers: usize) -> Vec<(String, String, u32)> {
        let bag: SeqBag = seqs
            .iter()
            .map(|s| SeqRecord::new(s.as_bytes().to_vec()))
            .collect();
        let mut bag = sort_and_merge(bag, workers);
        let padding = pad(&mut bag);
        let plan = build_plan(&bag, tau, padding.height, padding.median, workers);
        let sink = VecPairSink::new();
        run_plan(plan, &bag, &sink, false, 64).unwrap();
        sink.canonical_pairs()
    }

    #[test]
    fn test_single_chain_of_neighbors() {
        let pairs = run(&["AAAA", "AAAT", "AATT", "ATTT", "TTTT"], 1, 2);
        assert_eq!(
            pairs,
            vec![
                ("AAAA".to_string(), "AAAT".to_string(), 1),
                ("AAAT".to_string(), "AATT".to_string(), 1),
                ("AATT".to_string(), "ATTT".to_string(), 1),
                ("ATTT".to_string(), "TTTT".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_tau_zero_emits_nothing() {
        let pairs = run(&["ACGT", "ACGA", "ACGT"], 0, 1);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_single_record_emits_nothing() {
        let pairs = run(&["ACGT"], 2, 1);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_worker_count_does_not_change_pairs() {
        let seqs: Vec<String> = {
            let mut state = 3u64;
            (0..200)
                .map(|_| {
                    (0..10)
                        .map(|_| {
                            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                            b"ACGT"[(state >> 33) as usize % 4] as char
                        })
                        .collect()
                })
                .collect()
        };
        let refs: Vec<&str> = seqs.iter().map(String::as_str).collect();

        let serial = run(&refs, 2, 1);
        let parallel = run(&refs, 2, 4);
        assert_eq!(serial, parallel);
        assert!(!serial.is_empty());
    }
}
