//! End-to-end tests for the pair-discovery pipeline
//!
//! These tests exercise the full flow: sort/merge, padding, planning, and
//! the scheduled trie queries, checked against hand-computed pair sets and
//! a brute-force Levenshtein reference.

use seqmatch_lib::{
    MatchConfiguration, MatchError, PairFinder, SeqBag, SeqRecord, TauMode, VecPairSink,
};

fn run_pairs(
    records: Vec<SeqRecord>,
    tau: TauMode,
    threads: usize,
) -> Vec<(String, String, u32)> {
    let config = MatchConfiguration {
        tau,
        threads,
        ..MatchConfiguration::default()
    };
    let finder = PairFinder::new(config).unwrap();
    let sink = VecPairSink::new();
    finder.find_pairs(records.into(), &sink).unwrap();
    sink.canonical_pairs()
}

fn plain_records(seqs: &[&str]) -> Vec<SeqRecord> {
    seqs.iter()
        .map(|s| SeqRecord::new(s.as_bytes().to_vec()))
        .collect()
}

/// Plain Levenshtein distance, for cross-checking emitted pairs.
fn levenshtein(a: &[u8], b: &[u8]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut row = vec![0; b.len() + 1];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = (prev[j] + usize::from(ca != cb))
                .min(prev[j + 1] + 1)
                .min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Deterministic sequence generator.
fn random_sequences(count: usize, len: usize, seed: u64) -> Vec<String> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            (0..len)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                    b"ACGT"[(state >> 33) as usize % 4] as char
                })
                .collect()
        })
        .collect()
}

fn brute_force_pairs(seqs: &[String], tau: usize) -> Vec<(String, String, u32)> {
    let mut unique: Vec<&String> = seqs.iter().collect();
    unique.sort();
    unique.dedup();

    let mut pairs = Vec::new();
    for i in 0..unique.len() {
        for j in i + 1..unique.len() {
            let d = levenshtein(unique[i].as_bytes(), unique[j].as_bytes());
            if d >= 1 && d <= tau {
                let (a, b) = if unique[i] <= unique[j] {
                    (unique[i], unique[j])
                } else {
                    (unique[j], unique[i])
                };
                pairs.push((a.clone(), b.clone(), d as u32));
            }
        }
    }
    pairs.sort();
    pairs
}

#[test]
fn test_duplicate_merge_single_pair() {
    let records = vec![
        SeqRecord::with_count(b"ACGT".to_vec(), 1),
        SeqRecord::with_count(b"ACGT".to_vec(), 2),
        SeqRecord::with_count(b"ACGA".to_vec(), 1),
    ];
    let pairs = run_pairs(records, TauMode::Fixed(1), 1);
    assert_eq!(
        pairs,
        vec![("ACGA".to_string(), "ACGT".to_string(), 1)]
    );
}

#[test]
fn test_neighbor_chain_two_workers() {
    let records = plain_records(&["AAAA", "AAAT", "AATT", "ATTT", "TTTT"]);
    let pairs = run_pairs(records, TauMode::Fixed(1), 2);
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
fn test_mixed_lengths_report_unpadded_distance() {
    let records = plain_records(&["ACGT", "ACG", "AC", "A"]);
    let pairs = run_pairs(records, TauMode::Fixed(2), 1);
    assert_eq!(
        pairs,
        vec![
            ("A".to_string(), "AC".to_string(), 1),
            ("A".to_string(), "ACG".to_string(), 2),
            ("AC".to_string(), "ACG".to_string(), 1),
            ("AC".to_string(), "ACGT".to_string(), 2),
            ("ACG".to_string(), "ACGT".to_string(), 1),
        ]
    );
}

#[test]
fn test_worker_budget_does_not_change_pair_set() {
    let seqs = random_sequences(1000, 20, 42);
    let serial = run_pairs(plain_records_from(&seqs), TauMode::Fixed(2), 1);
    let parallel = run_pairs(plain_records_from(&seqs), TauMode::Fixed(2), 4);
    assert_eq!(serial, parallel);
}

#[test]
fn test_all_duplicates_collapse_with_tau_zero() {
    let records = plain_records(&["ACGT"; 10]);
    let config = MatchConfiguration {
        tau: TauMode::Fixed(0),
        threads: 1,
        ..MatchConfiguration::default()
    };
    let finder = PairFinder::new(config).unwrap();
    let sink = VecPairSink::new();
    let stats = finder.find_pairs(records.into(), &sink).unwrap();
    assert_eq!(stats.unique, 1);
    assert!(sink.canonical_pairs().is_empty());
}

#[test]
fn test_paired_end_labels_used_in_output() {
    // Joined mates, separator long enough that no admissible alignment
    // bridges them; the mates differ at one position of the first mate.
    let mate2 = "TTTTGGGGTTTTGGGG";
    let join = |mate1: &str| format!("{}---------{}", mate1, mate2);
    let records = vec![
        SeqRecord::with_info(
            join("ACGTACGTACGTACGT").into_bytes(),
            1,
            format!("ACGTACGTACGTACGT/{}", mate2),
        ),
        SeqRecord::with_info(
            join("ACGTACGAACGTACGT").into_bytes(),
            1,
            format!("ACGTACGAACGTACGT/{}", mate2),
        ),
    ];
    let pairs = run_pairs(records, TauMode::Fixed(1), 1);
    assert_eq!(
        pairs,
        vec![(
            format!("ACGTACGAACGTACGT/{}", mate2),
            format!("ACGTACGTACGTACGT/{}", mate2),
            1
        )]
    );
}

#[test]
fn test_pairs_match_brute_force() {
    let seqs = random_sequences(300, 10, 7);
    let expected = brute_force_pairs(&seqs, 2);
    let got = run_pairs(plain_records_from(&seqs), TauMode::Fixed(2), 2);
    assert_eq!(got, expected);
    assert!(!expected.is_empty());
}

#[test]
fn test_runs_are_deterministic() {
    let seqs = random_sequences(200, 10, 11);
    let first = run_pairs(plain_records_from(&seqs), TauMode::Fixed(2), 3);
    let second = run_pairs(plain_records_from(&seqs), TauMode::Fixed(2), 3);
    assert_eq!(first, second);
}

#[test]
fn test_emitted_distances_are_exact() {
    let seqs = random_sequences(150, 9, 23);
    let pairs = run_pairs(plain_records_from(&seqs), TauMode::Fixed(2), 1);
    for (a, b, d) in &pairs {
        assert_eq!(
            levenshtein(a.as_bytes(), b.as_bytes()) as u32,
            *d,
            "pair ({}, {})",
            a,
            b
        );
        assert!(*d >= 1 && *d <= 2);
        assert_ne!(a, b);
    }
}

#[test]
fn test_empty_input_reports_error() {
    let finder = PairFinder::new(MatchConfiguration::default()).unwrap();
    let sink = VecPairSink::new();
    let result = finder.find_pairs(SeqBag::new(), &sink);
    assert!(matches!(result, Err(MatchError::EmptyInput)));
}

fn plain_records_from(seqs: &[String]) -> Vec<SeqRecord> {
    seqs.iter()
        .map(|s| SeqRecord::new(s.as_bytes().to_vec()))
        .collect()
}
