use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_CONFIG_FILE, DEFAULT_WAREHOUSE_DIR, WAREHOUSE_ENV};

#[derive(Debug, Parser)]
#[command(author, version, about = "Keep warehouse tables in line with their schema files", long_about = None)]
pub struct Cli {
    /// Root directory of the table warehouse
    #[arg(long, global = true, env = WAREHOUSE_ENV, default_value = DEFAULT_WAREHOUSE_DIR)]
    pub warehouse: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Save the live schema of a table to a schema file
    Load(TableArgs),
    /// Add missing fields to a table, then rebuild it with the schema file's columns
    Update(TableArgs),
    /// Show what `update` would change without touching the table
    Plan(TableArgs),
    /// List tables with their last-modified time and upload the inventory
    Report(ReportArgs),
}

#[derive(Debug, Args)]
pub struct TableArgs {
    /// Dataset that holds the table
    #[arg(value_name = "DATASET")]
    pub dataset: String,
    /// Table to read or update
    #[arg(value_name = "TABLE")]
    pub table: String,
    /// Path to the JSON schema file
    #[arg(value_name = "SCHEMA_PATH")]
    pub schema_path: PathBuf,
    /// Project the dataset belongs to
    #[arg(value_name = "PROJECT")]
    pub project: String,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Inventory configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
    /// Collect and print the inventory without uploading it
    #[arg(long)]
    pub dry_run: bool,
    /// Also write the inventory as CSV (`-` for stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
