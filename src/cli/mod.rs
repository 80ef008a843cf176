//! Command line interface for vectra.

pub mod args;
pub mod commands;
pub mod output;

pub use args::*;
pub use commands::*;
pub use output::*;
