//! In-process gateway with call recording and failure injection.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};

use super::{
    GatewayError, Row, TableField, TableGateway, TableLocator, TableMetadata, stored::StoredTable,
};
use crate::query::RebuildQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    GetMetadata(TableLocator),
    UpdateSchema {
        table: TableLocator,
        fields: Vec<String>,
    },
    RunQuery {
        project: String,
        sql: String,
    },
    InsertRows {
        table: TableLocator,
        count: usize,
    },
    ListTables {
        project: String,
        dataset: String,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<TableLocator, StoredTable>,
    datasets: BTreeSet<(String, String)>,
    calls: Vec<GatewayCall>,
    reject_additions: BTreeSet<String>,
    unreadable: BTreeSet<TableLocator>,
    unlistable: BTreeSet<String>,
    fail_queries: bool,
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_table(&self, table: &TableLocator, schema: Vec<TableField>) {
        self.create_table_at(table, schema, Utc::now());
    }

    pub fn create_table_at(
        &self,
        table: &TableLocator,
        schema: Vec<TableField>,
        last_modified: DateTime<Utc>,
    ) {
        let mut state = self.lock();
        state.add_dataset(&table.project, &table.dataset);
        state
            .tables
            .insert(table.clone(), StoredTable::new(schema, last_modified));
    }

    pub fn create_dataset(&self, project: &str, dataset: &str) {
        self.lock().add_dataset(project, dataset);
    }

    /// Makes every schema update that would add `field` fail.
    pub fn reject_addition_of(&self, field: &str) {
        self.lock().reject_additions.insert(field.to_string());
    }

    pub fn fail_metadata_for(&self, table: &TableLocator) {
        self.lock().unreadable.insert(table.clone());
    }

    pub fn fail_listing_for(&self, dataset: &str) {
        self.lock().unlistable.insert(dataset.to_string());
    }

    pub fn fail_queries(&self) {
        self.lock().fail_queries = true;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn table(&self, table: &TableLocator) -> Option<StoredTable> {
        self.lock().tables.get(table).cloned()
    }
}

impl MemoryState {
    fn add_dataset(&mut self, project: &str, dataset: &str) {
        self.datasets
            .insert((project.to_string(), dataset.to_string()));
    }

    fn has_dataset(&self, project: &str, dataset: &str) -> bool {
        self.datasets
            .contains(&(project.to_string(), dataset.to_string()))
    }

    fn stored_mut(&mut self, table: &TableLocator) -> Result<&mut StoredTable, GatewayError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| GatewayError::TableNotFound(table.clone()))
    }
}

impl TableGateway for MemoryGateway {
    fn get_metadata(&self, table: &TableLocator) -> Result<TableMetadata, GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::GetMetadata(table.clone()));
        if state.unreadable.contains(table) {
            return Err(GatewayError::Unavailable(format!("metadata for {table}")));
        }
        state
            .tables
            .get(table)
            .map(StoredTable::metadata)
            .ok_or_else(|| GatewayError::TableNotFound(table.clone()))
    }

    fn update_schema(
        &self,
        table: &TableLocator,
        schema: &[TableField],
    ) -> Result<TableMetadata, GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::UpdateSchema {
            table: table.clone(),
            fields: schema.iter().map(|f| f.name.clone()).collect(),
        });
        let rejected = state.reject_additions.clone();
        let stored = state.stored_mut(table)?;
        if let Some(field) = schema.iter().find(|f| {
            rejected.contains(&f.name) && !stored.schema.iter().any(|s| s.name == f.name)
        }) {
            return Err(GatewayError::SchemaRejected(format!(
                "permission denied adding '{}'",
                field.name
            )));
        }
        stored.apply_schema(schema, Utc::now())?;
        Ok(stored.metadata())
    }

    fn run_query(&self, project: &str, sql: &str) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::RunQuery {
            project: project.to_string(),
            sql: sql.to_string(),
        });
        if state.fail_queries {
            return Err(GatewayError::QueryFailed("backend error".to_string()));
        }
        let query =
            RebuildQuery::parse(sql).map_err(|err| GatewayError::QueryFailed(err.to_string()))?;
        let locator = TableLocator::new(project, query.dataset(), query.table());
        state.stored_mut(&locator)?.apply_rebuild(&query, Utc::now())
    }

    fn insert_rows(&self, table: &TableLocator, rows: &[Row]) -> Result<usize, GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::InsertRows {
            table: table.clone(),
            count: rows.len(),
        });
        if !state.has_dataset(&table.project, &table.dataset) {
            return Err(GatewayError::DatasetNotFound {
                project: table.project.clone(),
                dataset: table.dataset.clone(),
            });
        }
        let now = Utc::now();
        state
            .tables
            .entry(table.clone())
            .or_insert_with(|| StoredTable::from_rows(rows, now))
            .append_rows(rows, now)
    }

    fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>, GatewayError> {
        let mut state = self.lock();
        state.calls.push(GatewayCall::ListTables {
            project: project.to_string(),
            dataset: dataset.to_string(),
        });
        if state.unlistable.contains(dataset) {
            return Err(GatewayError::Unavailable(format!("listing {dataset}")));
        }
        if !state.has_dataset(project, dataset) {
            return Err(GatewayError::DatasetNotFound {
                project: project.to_string(),
                dataset: dataset.to_string(),
            });
        }
        Ok(state
            .tables
            .keys()
            .filter(|t| t.project == project && t.dataset == dataset)
            .map(|t| t.table.clone())
            .collect())
    }
}
