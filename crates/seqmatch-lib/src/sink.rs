//! Pair sinks
//!
//! Workers emit `(query, match, dist)` triples concurrently and in no
//! particular global order; a sink only has to accept interleaved calls.
//! Labels follow the output contract: a record's informational tag when it
//! has one (paired-end input), otherwise its sequence with the left
//! padding stripped.

use crate::record::SeqRecord;
use std::io::Write;
use std::sync::Mutex;

/// Destination for discovered pairs. Implementations must tolerate
/// concurrent calls from multiple workers.
pub trait PairSink: Sync {
    /// Record one pair at distance `dist` (1 ≤ dist ≤ tau).
    fn emit(&self, query: &SeqRecord, hit: &SeqRecord, dist: u32);
}

struct TsvState<W> {
    writer: W,
    error: Option<std::io::Error>,
}

/// Writes one tab-separated `label_a\tlabel_b\tdist` line per pair.
///
/// Writes are serialized under an internal mutex. The first I/O error
/// stops further output and is surfaced by [`TsvPairWriter::finish`].
pub struct TsvPairWriter<W> {
    state: Mutex<TsvState<W>>,
}

impl<W: Write> TsvPairWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(TsvState {
                writer,
                error: None,
            }),
        }
    }

    /// Flush and return the writer, or the first error hit while emitting.
    pub fn finish(self) -> std::io::Result<W> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let TsvState { mut writer, error } = state;
        match error {
            Some(err) => Err(err),
            None => {
                writer.flush()?;
                Ok(writer)
            }
        }
    }
}

impl<W: Write + Send> PairSink for TsvPairWriter<W> {
    fn emit(&self, query: &SeqRecord, hit: &SeqRecord, dist: u32) {
        let mut state = self.state.lock().expect("pair writer lock poisoned");
        if state.error.is_some() {
            return;
        }
        let result = write_pair(&mut state.writer, query, hit, dist);
        if let Err(err) = result {
            state.error = Some(err);
        }
    }
}

fn write_pair<W: Write>(
    writer: &mut W,
    query: &SeqRecord,
    hit: &SeqRecord,
    dist: u32,
) -> std::io::Result<()> {
    writer.write_all(query.label())?;
    writer.write_all(b"\t")?;
    writer.write_all(hit.label())?;
    writer.write_all(b"\t")?;
    writeln!(writer, "{}", dist)
}

/// Collects emitted pairs in memory; intended for tests.
#[derive(Default)]
pub struct VecPairSink {
    pairs: Mutex<Vec<(String, String, u32)>>,
}

impl VecPairSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The collected pairs in emission order.
    pub fn into_pairs(self) -> Vec<(String, String, u32)> {
        self.pairs
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The collected pairs with each pair's labels ordered and the whole
    /// set sorted, for order-insensitive comparisons.
    pub fn canonical_pairs(self) -> Vec<(String, String, u32)> {
        let mut pairs: Vec<(String, String, u32)> = self
            .into_pairs()
            .into_iter()
            .map(|(a, b, d)| if a <= b { (a, b, d) } else { (b, a, d) })
            .collect();
        pairs.sort();
        pairs
    }
}

impl PairSink for VecPairSink {
    fn emit(&self, query: &SeqRecord, hit: &SeqRecord, dist: u32) {
        let a = String::from_utf8_lossy(query.label()).into_owned();
        let b = String::from_utf8_lossy(hit.label()).into_owned();
        self.pairs
            .lock()
            .expect("pair sink lock poisoned")
            .push((a, b, dist));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsv_output_strips_padding() {
        let writer = TsvPairWriter::new(Vec::new());
        let query = SeqRecord::new(b"  ACGA".to_vec());
        let hit = SeqRecord::new(b"ACGTGT".to_vec());
        writer.emit(&query, &hit, 2);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes, b"ACGA\tACGTGT\t2\n");
    }

    #[test]
    fn test_tsv_output_uses_info_labels() {
        let writer = TsvPairWriter::new(Vec::new());
        let query = SeqRecord::with_info(b"ACGT".to_vec(), 1, "r1/r2");
        let hit = SeqRecord::with_info(b"ACGA".to_vec(), 1, "r3/r4");
        writer.emit(&query, &hit, 1);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes, b"r1/r2\tr3/r4\t1\n");
    }

    #[test]
    fn test_vec_sink_canonicalizes() {
        let sink = VecPairSink::new();
        let a = SeqRecord::new(b"TTTT".to_vec());
        let b = SeqRecord::new(b"ACGT".to_vec());
        sink.emit(&a, &b, 1);
        let pairs = sink.canonical_pairs();
        assert_eq!(pairs, vec![("ACGT".to_string(), "TTTT".to_string(), 1)]);
    }
}
