//! Command line argument parsing for the vectra CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// Vectra - approximate nearest-neighbor vector index
#[derive(Parser, Debug, Clone)]
#[command(name = "vectra")]
#[command(about = "Build, query and inspect HNSW vector index snapshots")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct VectraArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// JSON configuration file supplying index defaults
    #[arg(short, long, env = "VECTRA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl VectraArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }

    /// Log level for the run: `-v`/`-q` when given, otherwise `configured`.
    pub fn log_level(&self, configured: LevelFilter) -> LevelFilter {
        if !self.quiet && self.verbose == 0 {
            return configured;
        }
        match self.verbosity() {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build an index from a JSON-lines file and write its snapshot
    Build(BuildArgs),

    /// Query a snapshot for nearest neighbors
    Search(SearchArgs),

    /// Show statistics for a snapshot
    Stats(StatsArgs),
}

/// Arguments for building an index.
///
/// Each input line is an object such as `{"id": 7, "vector": [0.1, 0.2]}`;
/// lines without an `id` get one assigned.
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// JSON-lines file of vectors
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory the snapshot is written to; defaults to the configured data directory
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Vector dimension; inferred from the first record when omitted
    #[arg(short, long)]
    pub dimension: Option<usize>,

    /// Distance metric (cosine, euclidean, manhattan)
    #[arg(long)]
    pub metric: Option<String>,

    /// Neighbors per node on upper layers
    #[arg(short, long)]
    pub m: Option<usize>,

    /// Candidate list size during construction
    #[arg(long)]
    pub ef_construction: Option<usize>,

    /// Snapshot name
    #[arg(short, long, default_value = "index")]
    pub name: String,

    /// Seed for level assignment
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for querying an index.
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Directory holding the snapshot; defaults to the configured data directory
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Query vector as comma-separated components
    #[arg(long, allow_hyphen_values = true)]
    pub vector: String,

    /// Number of neighbors to return
    #[arg(short, long, default_value = "10")]
    pub k: usize,

    /// Candidate list size; defaults to the index setting
    #[arg(long)]
    pub ef: Option<usize>,

    /// Drop results farther than this distance
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Snapshot name
    #[arg(short, long, default_value = "index")]
    pub name: String,

    /// Layer-0 search threads (0 = all cores)
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Arguments for showing statistics.
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    /// Directory holding the snapshot; defaults to the configured data directory
    #[arg(value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Snapshot name
    #[arg(short, long, default_value = "index")]
    pub name: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity() {
        let args = VectraArgs::parse_from(["vectra", "stats", "/tmp/idx"]);
        assert_eq!(args.verbosity(), 1);

        let args = VectraArgs::parse_from(["vectra", "-vvv", "stats", "/tmp/idx"]);
        assert_eq!(args.verbosity(), 3);

        let args = VectraArgs::parse_from(["vectra", "-q", "-vv", "stats", "/tmp/idx"]);
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_log_level() {
        let args = VectraArgs::parse_from(["vectra", "stats"]);
        assert_eq!(args.log_level(LevelFilter::Trace), LevelFilter::Trace);

        let args = VectraArgs::parse_from(["vectra", "-vv", "stats"]);
        assert_eq!(args.log_level(LevelFilter::Off), LevelFilter::Info);

        let args = VectraArgs::parse_from(["vectra", "-q", "stats"]);
        assert_eq!(args.log_level(LevelFilter::Debug), LevelFilter::Error);
    }

    #[test]
    fn test_dir_is_optional() {
        let args = VectraArgs::parse_from(["vectra", "build", "vectors.jsonl"]);
        match args.command {
            Command::Build(build) => {
                assert_eq!(build.input, PathBuf::from("vectors.jsonl"));
                assert!(build.dir.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let args = VectraArgs::parse_from(["vectra", "build", "vectors.jsonl", "/tmp/idx"]);
        match args.command {
            Command::Build(build) => assert_eq!(build.dir, Some(PathBuf::from("/tmp/idx"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_search_args() {
        let args = VectraArgs::parse_from([
            "vectra",
            "-f",
            "json",
            "search",
            "/tmp/idx",
            "--vector",
            "-1.0,0.5",
            "-k",
            "3",
            "--threshold",
            "0.25",
        ]);
        assert_eq!(args.output_format, OutputFormat::Json);
        match args.command {
            Command::Search(search) => {
                assert_eq!(search.dir, Some(PathBuf::from("/tmp/idx")));
                assert_eq!(search.vector, "-1.0,0.5");
                assert_eq!(search.k, 3);
                assert_eq!(search.threshold, Some(0.25));
                assert_eq!(search.name, "index");
                assert!(search.ef.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
