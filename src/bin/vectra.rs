//! Vectra CLI binary.

use std::io::Write;
use std::process;

use clap::Parser;
use env_logger::Builder;

use vectra::cli::args::*;
use vectra::cli::commands::*;
use vectra::config::VectraConfig;

fn main() {
    let args = VectraArgs::parse();

    // File first, then VECTRA_* variables; -v/-q still override the level.
    let config = match VectraConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    let configured = config
        .logging
        .level_filter()
        .unwrap_or(log::LevelFilter::Info);

    Builder::new()
        .filter_level(args.log_level(configured))
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = execute_command(args, &config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
