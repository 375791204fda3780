pub mod cli;
pub mod config;
pub mod error;
pub mod field_type;
pub mod gateway;
pub mod inventory;
pub mod io_utils;
pub mod query;
pub mod reconcile;
pub mod schema;
pub mod snapshot;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use similar::{ChangeTag, TextDiff};

use crate::{
    cli::{Cli, Commands, ReportArgs, TableArgs},
    config::InventoryConfig,
    error::SyncError,
    gateway::{TableLocator, warehouse::LocalWarehouse},
    inventory::{InventoryRow, TableInventory},
    reconcile::{PlannedRun, SchemaReconciler},
    schema::SchemaDescription,
    snapshot::SchemaSnapshotter,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("schema_sync", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    debug!("Using warehouse at {:?}", cli.warehouse);
    let warehouse = LocalWarehouse::new(&cli.warehouse);
    match cli.command {
        Commands::Load(args) => handle_load(&warehouse, &args),
        Commands::Update(args) => handle_update(&warehouse, &args),
        Commands::Plan(args) => handle_plan(&warehouse, &args),
        Commands::Report(args) => handle_report(&warehouse, &args),
    }
}

fn locator(args: &TableArgs) -> TableLocator {
    TableLocator::new(&args.project, &args.dataset, &args.table)
}

/// Prefixes the failing phase so the one-line diagnostic names it.
fn with_phase(err: SyncError) -> anyhow::Error {
    let phase = err.phase();
    anyhow::Error::new(err).context(format!("{phase} failed"))
}

fn handle_load(warehouse: &LocalWarehouse, args: &TableArgs) -> Result<()> {
    let table = locator(args);
    info!("Loading schema of {} into {:?}", table, args.schema_path);
    SchemaSnapshotter::new(warehouse)
        .snapshot(&table, &args.schema_path)
        .map_err(with_phase)?;
    Ok(())
}

fn handle_update(warehouse: &LocalWarehouse, args: &TableArgs) -> Result<()> {
    let table = locator(args);
    let desired = SchemaDescription::load(&args.schema_path).map_err(with_phase)?;
    info!(
        "Reconciling {} against {} field(s) from {:?}",
        table,
        desired.len(),
        args.schema_path
    );
    let outcome = SchemaReconciler::new(warehouse)
        .reconcile(&table, &desired)
        .map_err(with_phase)?;
    info!(
        "Table {} replaced: {} field(s) added, {} dropped",
        table,
        outcome.added.len(),
        outcome.dropped.len()
    );
    Ok(())
}

fn handle_plan(warehouse: &LocalWarehouse, args: &TableArgs) -> Result<()> {
    let table = locator(args);
    let desired = SchemaDescription::load(&args.schema_path).map_err(with_phase)?;
    let planned = SchemaReconciler::new(warehouse)
        .plan(&table, &desired)
        .map_err(with_phase)?;
    print!("{}", render_plan(&table, &planned));
    Ok(())
}

/// Column diff between live and desired order, followed by the additions and statement.
pub fn render_plan(table: &TableLocator, planned: &PlannedRun) -> String {
    let live = planned
        .live
        .names()
        .iter()
        .map(|name| format!("{name}\n"))
        .collect::<String>();
    let desired = planned
        .plan
        .final_projection
        .iter()
        .map(|name| format!("{name}\n"))
        .collect::<String>();
    let diff = TextDiff::from_lines(&live, &desired);

    let mut output = format!("Columns of {table} (live -> desired):\n");
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        output.push_str(&format!("{sign} {change}"));
    }

    if planned.plan.additions.is_empty() {
        output.push_str("\nNo fields to add.\n");
    } else {
        let headers = vec!["#".to_string(), "name".to_string(), "type".to_string()];
        let rows = planned
            .plan
            .additions
            .iter()
            .enumerate()
            .map(|(idx, f)| vec![(idx + 1).to_string(), f.name.clone(), f.field_type.to_string()])
            .collect::<Vec<_>>();
        output.push_str("\nFields to add:\n");
        output.push_str(&crate::table::render_table(&headers, &rows));
    }
    output.push_str(&format!("\nRebuild statement:\n{}\n", planned.query));
    output
}

fn handle_report(warehouse: &LocalWarehouse, args: &ReportArgs) -> Result<()> {
    let config = InventoryConfig::load(&args.config)
        .with_context(|| format!("Loading inventory config from {:?}", args.config))?;
    let inventory = TableInventory::new(warehouse, &config);
    let report = inventory.run(args.dry_run);

    if let Some(path) = &args.output {
        let mut writer = io_utils::open_csv_writer(Some(path))?;
        for row in &report.rows {
            writer.serialize(row).context("Writing inventory CSV row")?;
        }
        writer.flush().context("Flushing inventory CSV")?;
    } else if args.dry_run {
        let rows = report.rows.iter().map(InventoryRow::cells).collect::<Vec<_>>();
        table::print_table(&InventoryRow::headers(), &rows);
    }

    if args.dry_run {
        info!("Collected {} table(s) (dry run, nothing uploaded)", report.rows.len());
    } else {
        info!(
            "Uploaded {} of {} inventory row(s) to {}",
            report.uploaded,
            report.rows.len(),
            inventory.target()
        );
    }
    if !report.failed_datasets.is_empty() {
        warn!(
            "Inventory upload failed for dataset(s): {}",
            report.failed_datasets.join(", ")
        );
    }
    Ok(())
}
