//! Input parsing: raw, FASTA, FASTQ, and paired-end FASTQ.
//!
//! The format is sniffed from the first byte of the file: `>` FASTA, `@`
//! FASTQ, gzip magic for compressed FASTA/FASTQ, anything else raw. Raw
//! input is one sequence per line, optionally `SEQ\tCOUNT`. Two input
//! files force paired-end FASTQ: mates are joined with a separator run
//! longer than any admissible edit distance, and the record label becomes
//! `mate1/mate2`.

use anyhow::{anyhow, bail, Context, Result};
use seqmatch_lib::constants::{MAX_SEQ_LEN, MAX_TAU, PAIR_SEPARATOR_BYTE};
use seqmatch_lib::encoding::is_dna;
use seqmatch_lib::{SeqBag, SeqRecord};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::info;

const GZIP_MAGIC: u8 = 0x1f;

/// Read an input file (or a pair of mate files) into a sequence bag.
pub fn read_input(path: &Path, mate_path: Option<&Path>, verbose: bool) -> Result<SeqBag> {
    if let Some(mate_path) = mate_path {
        if verbose {
            info!("paired-end FASTQ input");
        }
        return read_paired_fastq(path, mate_path);
    }

    let mut first = [0u8; 1];
    let n = File::open(path)
        .with_context(|| format!("cannot open {}", path.display()))?
        .read(&mut first)?;
    if n == 0 {
        return Ok(SeqBag::new());
    }

    match first[0] {
        b'>' | b'@' | GZIP_MAGIC => {
            if verbose {
                info!("FASTA/FASTQ format detected");
            }
            read_fastx(path)
        }
        _ => {
            if verbose {
                info!("raw format detected");
            }
            read_raw(path)
        }
    }
}

/// Enforce the input contract: non-empty, DNA alphabet, bounded length.
fn validate(seq: &[u8]) -> Result<()> {
    if seq.is_empty() {
        bail!("invalid input: empty sequence");
    }
    if seq.len() > MAX_SEQ_LEN {
        bail!(
            "max sequence length exceeded ({})\noffending sequence:\n{}",
            MAX_SEQ_LEN,
            String::from_utf8_lossy(seq)
        );
    }
    if let Some(&bad) = seq.iter().find(|&&b| !is_dna(b)) {
        bail!(
            "invalid input: non-DNA character {:?}\noffending sequence:\n{}",
            bad as char,
            String::from_utf8_lossy(seq)
        );
    }
    Ok(())
}

/// Raw format: one `SEQ` or `SEQ\tCOUNT` per line.
fn read_raw(path: &Path) -> Result<SeqBag> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut bag = SeqBag::new();

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (seq, count) = match line.split_once('\t') {
            Some((seq, count_field)) => match count_field.trim().parse::<u64>() {
                Ok(count) if count > 0 => (seq, count),
                _ => bail!(
                    "line {}: malformed count field {:?}",
                    lineno + 1,
                    count_field
                ),
            },
            None => (line, 1),
        };
        validate(seq.as_bytes())?;
        bag.push(SeqRecord::with_count(seq.as_bytes().to_ascii_uppercase(), count));
    }
    Ok(bag)
}

/// FASTA or FASTQ, possibly gzip-compressed.
fn read_fastx(path: &Path) -> Result<SeqBag> {
    let mut reader = needletail::parse_fastx_file(path)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    let mut bag = SeqBag::new();
    while let Some(record) = reader.next() {
        let record = record?;
        let seq = record.seq();
        validate(&seq)?;
        bag.push(SeqRecord::new(seq.to_ascii_uppercase()));
    }
    Ok(bag)
}

/// Paired-end FASTQ: mates joined with a separator run of length
/// `MAX_TAU + 1`, labelled `mate1/mate2`.
fn read_paired_fastq(path1: &Path, path2: &Path) -> Result<SeqBag> {
    let mut reader1 = needletail::parse_fastx_file(path1)
        .with_context(|| format!("cannot parse {}", path1.display()))?;
    let mut reader2 = needletail::parse_fastx_file(path2)
        .with_context(|| format!("cannot parse {}", path2.display()))?;

    let separator = [PAIR_SEPARATOR_BYTE; MAX_TAU + 1];
    let mut bag = SeqBag::new();

    loop {
        match (reader1.next(), reader2.next()) {
            (None, None) => break,
            (Some(rec1), Some(rec2)) => {
                let rec1 = rec1?;
                let rec2 = rec2?;
                validate(&rec1.seq())?;
                validate(&rec2.seq())?;
                let seq1 = rec1.seq().to_ascii_uppercase();
                let seq2 = rec2.seq().to_ascii_uppercase();

                let mut joined = Vec::with_capacity(seq1.len() + separator.len() + seq2.len());
                joined.extend_from_slice(&seq1);
                joined.extend_from_slice(&separator);
                joined.extend_from_slice(&seq2);

                let info = format!(
                    "{}/{}",
                    String::from_utf8_lossy(&seq1),
                    String::from_utf8_lossy(&seq2)
                );
                bag.push(SeqRecord::with_info(joined, 1, info));
            }
            _ => return Err(anyhow!("non conformable paired-end fastq files")),
        }
    }
    Ok(bag)
}
