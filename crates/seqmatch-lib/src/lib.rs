// seqmatch: all-pairs approximate matching of short DNA sequences
//
// The core of a sequence clustering engine: discovers every pair of
// distinct sequences within a bounded Levenshtein distance and emits the
// pairs with their exact distance.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod constants;
pub mod encoding;
pub mod engine;
pub mod lookup;
pub mod preprocess;
pub mod record;
pub mod sink;
pub mod trie;

// Re-export common types at crate root
pub use engine::{MatchConfiguration, MatchError, MatchStats, PairFinder, TauMode};
pub use preprocess::{pad, sort_and_merge, Padding};
pub use record::{RecordId, SeqBag, SeqRecord};
pub use sink::{PairSink, TsvPairWriter, VecPairSink};
pub use trie::{HitTower, SearchMemo, Trie};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}
