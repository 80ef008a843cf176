//! Command implementations for the vectra CLI.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use log::{debug, info};
use serde::Deserialize;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::VectraConfig;
use crate::error::{Result, VectraError};
use crate::storage::file::{FileStorage, FileStorageConfig};
use crate::vector::core::distance::DistanceMetric;
use crate::vector::core::vector::Vector;
use crate::vector::index::hnsw::HnswIndex;
use crate::vector::index::hnsw::snapshot::snapshot_file_name;
use crate::vector::search::hybrid::HybridSearchRequest;

/// One line of a build input file.
#[derive(Debug, Deserialize)]
struct VectorRecord {
    #[serde(default)]
    id: Option<u64>,
    vector: Vec<f32>,
}

/// Execute a CLI command under the loaded process configuration.
pub fn execute_command(args: VectraArgs, config: &VectraConfig) -> Result<()> {
    match &args.command {
        Command::Build(build_args) => build_index(build_args.clone(), &args, config),
        Command::Search(search_args) => search_index(search_args.clone(), &args, config),
        Command::Stats(stats_args) => show_stats(stats_args.clone(), &args, config),
    }
}

/// Snapshot directory: the one given on the command line, else `storage.data_dir`.
fn index_dir<'a>(dir: Option<&'a Path>, config: &'a VectraConfig) -> &'a Path {
    dir.unwrap_or(&config.storage.data_dir)
}

fn read_records(args: &BuildArgs) -> Result<Vec<VectorRecord>> {
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: VectorRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {}", line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Build an index from a JSON-lines file.
fn build_index(args: BuildArgs, cli_args: &VectraArgs, config: &VectraConfig) -> Result<()> {
    let records = read_records(&args)?;
    let dir = index_dir(args.dir.as_deref(), config);

    let mut index_config = config.vector_search.clone();
    index_config.dimension = match (args.dimension, records.first()) {
        (Some(dimension), _) => dimension,
        (None, Some(first)) => first.vector.len(),
        (None, None) => index_config.dimension,
    };
    if let Some(metric) = &args.metric {
        index_config.distance_metric = DistanceMetric::parse_str(metric)?;
    }
    if let Some(m) = args.m {
        index_config.m = m;
    }
    if let Some(ef_construction) = args.ef_construction {
        index_config.ef_construction = ef_construction;
    }
    if args.seed.is_some() {
        index_config.seed = args.seed;
    }
    let dimension = index_config.dimension;

    info!(
        "building {} index over {} records",
        index_config.distance_metric.name(),
        records.len()
    );
    let start = Instant::now();
    let index = HnswIndex::new(index_config)?;
    for record in &records {
        match record.id {
            Some(id) => index.insert(id, &record.vector)?,
            None => {
                index.insert_auto(&record.vector)?;
            }
        }
    }

    let storage = FileStorage::new(FileStorageConfig::new(dir))?;
    let snapshot_bytes = index.write_snapshot(&storage, &args.name)?;
    let elapsed = start.elapsed();

    let seconds = elapsed.as_secs_f64();
    let result = BuildResult {
        path: dir.join(snapshot_file_name(&args.name)).display().to_string(),
        vectors_inserted: records.len(),
        dimension,
        snapshot_bytes,
        duration_ms: elapsed.as_millis() as u64,
        vectors_per_second: if seconds > 0.0 {
            records.len() as f64 / seconds
        } else {
            0.0
        },
    };
    output_result("Index built", &result, cli_args)
}

fn open_index(dir: &Path, name: &str, threads: Option<usize>) -> Result<HnswIndex> {
    if !dir.is_dir() {
        return Err(VectraError::storage(format!(
            "Index directory not found: {}",
            dir.display()
        )));
    }
    let storage = FileStorage::new(FileStorageConfig::new(dir))?;
    HnswIndex::load(&storage, name, threads)
}

/// Query a snapshot.
fn search_index(args: SearchArgs, cli_args: &VectraArgs, config: &VectraConfig) -> Result<()> {
    let dir = index_dir(args.dir.as_deref(), config);
    let threads = args
        .threads
        .map(|t| if t == 0 { num_cpus::get() } else { t });
    let index = open_index(dir, &args.name, threads)?;
    let query = Vector::parse_csv(&args.vector)?;
    let ef = args.ef.unwrap_or(index.config().ef_search);
    debug!("searching k={} ef={ef} threads={threads:?}", args.k);

    let start = Instant::now();
    let hits = match args.threshold {
        Some(threshold) => {
            let request = HybridSearchRequest::new(query.data, args.k)
                .with_ef(ef)
                .with_distance_threshold(threshold);
            index.hybrid_search(&request, None)?
        }
        None => index.search(&query.data, args.k, ef)?,
    };
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    let result = SearchResults {
        hits,
        metric: index.distance_metric().name().to_string(),
        duration_ms,
    };
    output_result(
        &format!("Nearest neighbors in {}", dir.display()),
        &result,
        cli_args,
    )
}

/// Print statistics for a snapshot.
fn show_stats(args: StatsArgs, cli_args: &VectraArgs, config: &VectraConfig) -> Result<()> {
    let dir = index_dir(args.dir.as_deref(), config);
    let index = open_index(dir, &args.name, None)?;
    let stats = index.stats();
    output_result(
        &format!("Statistics for {}", dir.display()),
        &stats,
        cli_args,
    )
}
