//! Table inventory: one row per table with its last-modified time.
//!
//! Listing and metadata failures are logged and skipped so one unreadable
//! dataset does not hide the rest. Rows are uploaded per dataset to the
//! configured inventory table.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::{
    config::InventoryConfig,
    gateway::{Row, TableGateway, TableLocator},
};

pub const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRow {
    #[serde(rename = "No")]
    pub no: String,
    pub datasetid: String,
    pub tablename: String,
    pub last_modified_date: String,
}

impl InventoryRow {
    pub fn new(no: usize, dataset: &str, table: &str, last_modified: DateTime<Utc>) -> Self {
        Self {
            no: no.to_string(),
            datasetid: dataset.to_string(),
            tablename: table.to_string(),
            last_modified_date: last_modified.format(LAST_MODIFIED_FORMAT).to_string(),
        }
    }

    pub fn headers() -> Vec<String> {
        ["No", "datasetid", "tablename", "last_modified_date"]
            .iter()
            .map(|h| h.to_string())
            .collect()
    }

    pub fn cells(&self) -> Vec<String> {
        vec![
            self.no.clone(),
            self.datasetid.clone(),
            self.tablename.clone(),
            self.last_modified_date.clone(),
        ]
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("No".to_string(), self.no.clone().into());
        row.insert("datasetid".to_string(), self.datasetid.clone().into());
        row.insert("tablename".to_string(), self.tablename.clone().into());
        row.insert(
            "last_modified_date".to_string(),
            self.last_modified_date.clone().into(),
        );
        row
    }
}

#[derive(Debug, Default)]
pub struct InventoryReport {
    pub rows: Vec<InventoryRow>,
    pub uploaded: usize,
    pub failed_datasets: Vec<String>,
}

pub struct TableInventory<'g, G: TableGateway + ?Sized> {
    gateway: &'g G,
    config: &'g InventoryConfig,
}

impl<'g, G: TableGateway + ?Sized> TableInventory<'g, G> {
    pub fn new(gateway: &'g G, config: &'g InventoryConfig) -> Self {
        Self { gateway, config }
    }

    pub fn target(&self) -> TableLocator {
        TableLocator::new(
            &self.config.project_id,
            &self.config.target_dataset,
            &self.config.table_name,
        )
    }

    pub fn collect(&self, dataset: &str) -> Vec<InventoryRow> {
        let project = &self.config.project_id;
        let tables = match self.gateway.list_tables(project, dataset) {
            Ok(tables) => tables,
            Err(err) => {
                warn!("Failed to list tables in dataset {dataset}: {err}");
                return Vec::new();
            }
        };
        let mut rows = Vec::with_capacity(tables.len());
        for table in tables {
            let locator = TableLocator::new(project, dataset, &table);
            match self.gateway.get_metadata(&locator) {
                Ok(meta) => {
                    rows.push(InventoryRow::new(rows.len() + 1, dataset, &table, meta.last_modified))
                }
                Err(err) => warn!("Failed to get metadata for table {table}: {err}"),
            }
        }
        rows
    }

    /// Collects every configured dataset, uploading each batch unless `dry_run`.
    pub fn run(&self, dry_run: bool) -> InventoryReport {
        let target = self.target();
        let mut report = InventoryReport::default();
        for dataset in &self.config.dataset_ids {
            let rows = self.collect(dataset);
            info!("Collected {} table(s) from dataset {dataset}", rows.len());
            if !dry_run && !rows.is_empty() {
                let payload = rows.iter().map(InventoryRow::to_row).collect::<Vec<_>>();
                match self.gateway.insert_rows(&target, &payload) {
                    Ok(written) => report.uploaded += written,
                    Err(err) => {
                        warn!("Failed to write rows for dataset {dataset} to {target}: {err}");
                        report.failed_datasets.push(dataset.clone());
                    }
                }
            }
            report.rows.extend(rows);
        }
        report
    }
}
