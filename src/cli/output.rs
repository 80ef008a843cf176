//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, VectraArgs};
use crate::error::Result;
use crate::vector::search::VectorSearchResult;

/// Result of building an index.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildResult {
    pub path: String,
    pub vectors_inserted: usize,
    pub dimension: usize,
    pub snapshot_bytes: u64,
    pub duration_ms: u64,
    pub vectors_per_second: f64,
}

/// Result of a query.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<VectorSearchResult>,
    pub metric: String,
    pub duration_ms: f64,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &VectraArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &VectraArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    match value.get("hits").and_then(|h| h.as_array()) {
        Some(hits) => output_hits_human(hits, &value),
        None => output_generic_human(&value),
    }
    Ok(())
}

fn output_hits_human(hits: &[serde_json::Value], value: &serde_json::Value) {
    if hits.is_empty() {
        println!("No results.");
    }
    for (rank, hit) in hits.iter().enumerate() {
        let id = hit.get("id").and_then(|v| v.as_u64()).unwrap_or_default();
        let distance = hit.get("distance").and_then(|v| v.as_f64()).unwrap_or_default();
        println!("{:>4}. id={id:<12} distance={distance:.6}", rank + 1);
    }

    println!();
    if let Some(metric) = value.get("metric").and_then(|m| m.as_str()) {
        println!("Metric: {metric}");
    }
    if let Some(duration) = value.get("duration_ms").and_then(|d| d.as_f64()) {
        println!("Search time: {duration:.3}ms");
    }
}

fn output_generic_human(value: &serde_json::Value) {
    match value.as_object() {
        Some(obj) => {
            for (key, field) in obj {
                let label = key.replace('_', " ");
                match field {
                    serde_json::Value::String(s) => println!("{label}: {s}"),
                    other => println!("{label}: {other}"),
                }
            }
        }
        None => println!("{value}"),
    }
}

fn output_json<T: Serialize>(result: &T, args: &VectraArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
