//! Filesystem-backed warehouse.
//!
//! Tables live at `<root>/<project>/<dataset>/<table>.json` and hold a
//! [`StoredTable`]. A dataset is a directory; listing a dataset lists its
//! table files. Every write goes through [`write_atomic`], so a failed
//! mutation leaves the previous table file in place.

use std::{fs, io::ErrorKind, path::PathBuf};

use chrono::Utc;
use log::debug;

use super::{
    GatewayError, Row, TableField, TableGateway, TableLocator, TableMetadata, stored::StoredTable,
};
use crate::{io_utils::write_atomic, query::RebuildQuery};

const TABLE_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct LocalWarehouse {
    root: PathBuf,
}

impl LocalWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dataset_dir(&self, project: &str, dataset: &str) -> Result<PathBuf, GatewayError> {
        check_segment(project)?;
        check_segment(dataset)?;
        Ok(self.root.join(project).join(dataset))
    }

    fn table_path(&self, table: &TableLocator) -> Result<PathBuf, GatewayError> {
        check_segment(&table.table)?;
        Ok(self
            .dataset_dir(&table.project, &table.dataset)?
            .join(format!("{}.{TABLE_EXTENSION}", table.table)))
    }

    fn require_dataset(&self, project: &str, dataset: &str) -> Result<PathBuf, GatewayError> {
        let dir = self.dataset_dir(project, dataset)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(GatewayError::DatasetNotFound {
                project: project.to_string(),
                dataset: dataset.to_string(),
            })
        }
    }

    fn read_table(&self, table: &TableLocator) -> Result<Option<StoredTable>, GatewayError> {
        let path = self.table_path(table)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(GatewayError::Storage { path, source }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| GatewayError::Corrupt { path, source })
    }

    fn load_table(&self, table: &TableLocator) -> Result<StoredTable, GatewayError> {
        self.require_dataset(&table.project, &table.dataset)?;
        self.read_table(table)?
            .ok_or_else(|| GatewayError::TableNotFound(table.clone()))
    }

    fn write_table(&self, table: &TableLocator, stored: &StoredTable) -> Result<(), GatewayError> {
        let path = self.table_path(table)?;
        let buffer = serde_json::to_vec_pretty(stored).map_err(|source| GatewayError::Corrupt {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &buffer).map_err(|source| GatewayError::Storage { path, source })?;
        debug!("Wrote {} ({} row(s))", table, stored.rows.len());
        Ok(())
    }

    /// Creates an empty table, creating its dataset directory as needed.
    pub fn create_table(
        &self,
        table: &TableLocator,
        schema: Vec<TableField>,
    ) -> Result<(), GatewayError> {
        let dir = self.dataset_dir(&table.project, &table.dataset)?;
        fs::create_dir_all(&dir).map_err(|source| GatewayError::Storage { path: dir, source })?;
        self.write_table(table, &StoredTable::new(schema, Utc::now()))
    }
}

fn check_segment(value: &str) -> Result<(), GatewayError> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control)
    {
        return Err(GatewayError::InvalidIdentifier(format!("'{value}'")));
    }
    Ok(())
}

impl TableGateway for LocalWarehouse {
    fn get_metadata(&self, table: &TableLocator) -> Result<TableMetadata, GatewayError> {
        self.load_table(table).map(|stored| stored.metadata())
    }

    fn update_schema(
        &self,
        table: &TableLocator,
        schema: &[TableField],
    ) -> Result<TableMetadata, GatewayError> {
        let mut stored = self.load_table(table)?;
        stored.apply_schema(schema, Utc::now())?;
        self.write_table(table, &stored)?;
        Ok(stored.metadata())
    }

    fn run_query(&self, project: &str, sql: &str) -> Result<(), GatewayError> {
        let query =
            RebuildQuery::parse(sql).map_err(|err| GatewayError::QueryFailed(err.to_string()))?;
        let table = TableLocator::new(project, query.dataset(), query.table());
        let mut stored = self.load_table(&table)?;
        stored.apply_rebuild(&query, Utc::now())?;
        self.write_table(&table, &stored)
    }

    fn insert_rows(&self, table: &TableLocator, rows: &[Row]) -> Result<usize, GatewayError> {
        self.require_dataset(&table.project, &table.dataset)?;
        let now = Utc::now();
        let mut stored = self
            .read_table(table)?
            .unwrap_or_else(|| StoredTable::from_rows(rows, now));
        let written = stored.append_rows(rows, now)?;
        self.write_table(table, &stored)?;
        Ok(written)
    }

    fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>, GatewayError> {
        let dir = self.require_dataset(project, dataset)?;
        let entries = fs::read_dir(&dir).map_err(|source| GatewayError::Storage {
            path: dir.clone(),
            source,
        })?;
        let mut tables = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| GatewayError::Storage {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(TABLE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                tables.push(stem.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }
}
