//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Catalog ingestion for dispensary storefronts.
#[derive(Parser, Debug)]
#[command(name = "canopy", version, about = "Scrape storefront catalogs into canonical listings")]
pub struct Cli {
    /// Target registry file (defaults to `targets.toml` in the config directory)
    #[arg(long, global = true, env = "CANOPY_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Keep results in memory instead of the snapshot database
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// Print run reports as JSON
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Scrape one target
    Run {
        /// Target id from the registry
        #[arg(long)]
        target: String,
        /// Absolute page / scroll-iteration bound per strategy
        #[arg(long)]
        max_pages: Option<u32>,
        /// Wall-clock budget for the run in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Scrape every registered target
    RunAll {
        /// Number of targets scraped at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Absolute page / scroll-iteration bound per strategy
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// List registered targets
    Targets,
}
