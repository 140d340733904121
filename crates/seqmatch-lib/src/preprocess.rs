//! Length-normalizing preprocessor
//!
//! Two stages run before any index is built:
//!
//! 1. [`sort_and_merge`] sorts the bag by (length, lexicographic bytes) and
//!    merges exact duplicates by summing their counts, shrinking the
//!    working set before trie construction.
//! 2. [`pad`] left-pads every surviving sequence to the common maximum
//!    length H and reports the median unpadded length M.
//!
//! Left padding aligns suffixes, so sequences of different original
//! lengths still share long prefixes once sorted, which keeps the trie
//! arena estimate tight.

use crate::constants::PAD_BYTE;
use crate::record::{SeqBag, SeqRecord};
use std::cmp::Ordering;

/// Result of [`pad`]: the common padded length and the median unpadded
/// length of the bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    /// Common length of all sequences after left-padding (H).
    pub height: usize,
    /// Median unpadded length (M): the smallest length whose cumulative
    /// record count reaches half the bag.
    pub median: usize,
}

/// Sort the bag and merge exact duplicates, returning the deduplicated bag.
///
/// The sort order is: shorter sequence first, then lexicographic byte
/// comparison. When two records compare equal their counts are summed into
/// the earlier one (which keeps its `info` label) and the later one is
/// dropped. The merge happens inside the sort itself, so duplicates never
/// survive past the level that discovers them.
///
/// Fans out over a power-of-two partition tree of depth
/// `floor(log2(worker_budget))`; below that the recursion is sequential.
/// The output is identical for every `worker_budget`.
pub fn sort_and_merge(bag: SeqBag, worker_budget: usize) -> SeqBag {
    let records = bag.into_records();
    if records.len() < 2 {
        return records.into();
    }

    let mut data: Vec<Option<SeqRecord>> = records.into_iter().map(Some).collect();
    let mut buffer: Vec<Option<SeqRecord>> = data.iter().map(|_| None).collect();

    // Number of times the recursion may still fork in two.
    let mut forks = 0;
    while (worker_budget.max(1) >> (forks + 1)) > 0 {
        forks += 1;
    }

    sort_in_place(&mut data, &mut buffer, forks);

    data.into_iter().flatten().collect()
}

/// Sort `a`, leaving the result compacted at the front of `a`.
/// Returns the number of merged duplicates.
fn sort_in_place(a: &mut [Option<SeqRecord>], b: &mut [Option<SeqRecord>], forks: usize) -> usize {
    let n = a.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let (a1, a2) = a.split_at_mut(mid);
    let (b1, b2) = b.split_at_mut(mid);

    let (r1, r2) = if forks > 0 {
        rayon::join(
            || sort_into(a1, b1, forks - 1),
            || sort_into(a2, b2, forks - 1),
        )
    } else {
        (sort_into(a1, b1, 0), sort_into(a2, b2, 0))
    };

    let (b1, b2) = b.split_at_mut(mid);
    r1 + r2 + merge(b1, b2, a)
}

/// Sort `a`, leaving the result compacted at the front of `b`.
/// Returns the number of merged duplicates.
fn sort_into(a: &mut [Option<SeqRecord>], b: &mut [Option<SeqRecord>], forks: usize) -> usize {
    let n = a.len();
    if n == 0 {
        return 0;
    }
    if n == 1 {
        b[0] = a[0].take();
        return 0;
    }
    let mid = n / 2;
    let (a1, a2) = a.split_at_mut(mid);
    let (b1, b2) = b.split_at_mut(mid);

    let (r1, r2) = if forks > 0 {
        rayon::join(
            || sort_in_place(a1, b1, forks - 1),
            || sort_in_place(a2, b2, forks - 1),
        )
    } else {
        (sort_in_place(a1, b1, 0), sort_in_place(a2, b2, 0))
    };

    let (a1, a2) = a.split_at_mut(mid);
    r1 + r2 + merge(a1, a2, b)
}

/// Merge two sorted compacted runs into `dst`, summing counts of equal
/// sequences. Each run holds its live records in a `Some` prefix; merged
/// slots in `dst` past the live region are reset to `None`.
fn merge(
    l: &mut [Option<SeqRecord>],
    r: &mut [Option<SeqRecord>],
    dst: &mut [Option<SeqRecord>],
) -> usize {
    let mut i = 0;
    let mut j = 0;
    let mut idx = 0;
    let mut repeats = 0;

    loop {
        let cmp = match (
            l.get(i).and_then(Option::as_ref),
            r.get(j).and_then(Option::as_ref),
        ) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(ul), Some(ur)) => ul.sort_key(ur),
        };
        match cmp {
            Ordering::Less => {
                dst[idx] = l[i].take();
                i += 1;
            }
            Ordering::Greater => {
                dst[idx] = r[j].take();
                j += 1;
            }
            Ordering::Equal => {
                // Identical sequences: the left record survives with the
                // summed count, the right one is dropped here.
                if let (Some(mut survivor), Some(dup)) = (l[i].take(), r[j].take()) {
                    survivor.count += dup.count;
                    dst[idx] = Some(survivor);
                }
                i += 1;
                j += 1;
                repeats += 1;
            }
        }
        idx += 1;
    }

    for slot in dst[idx..].iter_mut() {
        *slot = None;
    }
    repeats
}

/// Left-pad every sequence to the common maximum length and report the
/// height H and median unpadded length M.
pub fn pad(bag: &mut SeqBag) -> Padding {
    let height = bag.iter().map(|r| r.seq.len()).max().unwrap_or(0);

    let mut hist = vec![0usize; height + 1];
    for rec in bag.iter() {
        hist[rec.seq.len()] += 1;
    }

    for rec in bag.iter_mut() {
        let len = rec.seq.len();
        if len == height {
            continue;
        }
        let mut padded = vec![PAD_BYTE; height];
        padded[height - len..].copy_from_slice(&rec.seq);
        rec.seq = padded;
    }

    // Median: smallest length whose cumulative record count reaches n/2.
    let half = bag.len() / 2;
    let mut cumulative = 0;
    let mut median = 0;
    for len in 1..=height {
        cumulative += hist[len];
        median = len;
        if cumulative >= half {
            break;
        }
    }

    Padding { height, median }
}

/// Strip the left padding from every sequence, restoring the original
/// buffers.
pub fn unpad(bag: &mut SeqBag) {
    for rec in bag.iter_mut() {
        let stripped = rec.unpadded().to_vec();
        rec.seq = stripped;
    }
}
