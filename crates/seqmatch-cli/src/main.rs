use anyhow::{bail, Context};
use clap::Parser;
use seqmatch_lib::{MatchConfiguration, PairFinder, TauMode, TsvPairWriter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

mod input;

#[derive(Parser)]
#[command(name = "seqmatch")]
#[command(version)]
#[command(about = "Find all pairs of DNA sequences within a bounded edit distance", long_about = None)]
struct Cli {
    /// Input file: raw (SEQ or SEQ<TAB>COUNT per line), FASTA, or FASTQ
    input: PathBuf,

    /// Second mate file; enables paired-end FASTQ mode
    #[arg(long = "input2")]
    input2: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum edit distance (default: derived from the median sequence length)
    #[arg(short = 'd', long)]
    dist: Option<u32>,

    /// Number of worker threads
    #[arg(short, long, default_value = "1")]
    threads: usize,

    /// Verbose progress reporting
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        info!(
            "running seqmatch with {} thread{}",
            cli.threads,
            if cli.threads > 1 { "s" } else { "" }
        );
        info!("reading input files");
    }

    let bag = input::read_input(&cli.input, cli.input2.as_deref(), cli.verbose)?;
    if bag.is_empty() {
        bail!("input file empty");
    }

    let config = MatchConfiguration {
        tau: match cli.dist {
            Some(dist) => TauMode::Fixed(dist),
            None => TauMode::Auto,
        },
        threads: cli.threads,
        verbose: cli.verbose,
        ..MatchConfiguration::default()
    };
    let finder = PairFinder::new(config)?;

    let writer: Box<dyn Write + Send> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let sink = TsvPairWriter::new(writer);

    let stats = finder.find_pairs(bag, &sink)?;

    sink.finish().context("failed to write pairs")?;

    if cli.verbose {
        info!(
            "{} unique sequences, tau {}, {} searches run, {} skipped",
            stats.unique, stats.tau, stats.searches_run, stats.searches_skipped
        );
        if stats.incomplete_searches > 0 {
            info!("{} incomplete searches", stats.incomplete_searches);
        }
    }

    Ok(())
}
