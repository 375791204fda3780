//! The boundary between schema-sync and the table storage service.
//!
//! [`TableGateway`] is the only path by which the snapshotter, reconciler,
//! and inventory touch a table. Callers receive a gateway explicitly, so the
//! same run can be pointed at the filesystem [`warehouse::LocalWarehouse`] or
//! the in-process [`memory::MemoryGateway`] used by tests.
//!
//! Calls are synchronous and carry no timeout; a caller that needs a
//! deadline wraps the gateway.

pub mod memory;
pub mod stored;
pub mod warehouse;

use std::{fmt, io, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{field_type::FieldType, schema::FieldDescriptor};

/// A single row as uploaded to or stored in a table.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableLocator {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableLocator {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project, self.dataset, self.table)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
}

/// A column as the storage service describes it.
///
/// `type_name` is the service's own token and is stored verbatim, including
/// types the schema-file codec does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub mode: FieldMode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl TableField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::native(name, field_type.as_token())
    }

    pub fn native(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            mode: FieldMode::Nullable,
            description: String::new(),
        }
    }

    /// The column type as the schema-file codec sees it.
    pub fn field_type(&self) -> FieldType {
        FieldType::from_token(&self.type_name)
    }
}

impl From<&TableField> for FieldDescriptor {
    fn from(field: &TableField) -> Self {
        FieldDescriptor {
            name: field.name.clone(),
            field_type: field.field_type(),
            required: field.mode == FieldMode::Required,
            description: field.description.clone(),
        }
    }
}

impl From<&FieldDescriptor> for TableField {
    fn from(field: &FieldDescriptor) -> Self {
        TableField {
            name: field.name.clone(),
            type_name: field.field_type.as_token().to_string(),
            mode: if field.required {
                FieldMode::Required
            } else {
                FieldMode::Nullable
            },
            description: field.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub schema: Vec<TableField>,
    pub last_modified: DateTime<Utc>,
    pub num_rows: u64,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("table {0} not found")]
    TableNotFound(TableLocator),
    #[error("dataset {project}:{dataset} not found")]
    DatasetNotFound { project: String, dataset: String },
    #[error("schema update rejected: {0}")]
    SchemaRejected(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("storage error at {path:?}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt table file {path:?}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

pub trait TableGateway: Send + Sync {
    fn get_metadata(&self, table: &TableLocator) -> Result<TableMetadata, GatewayError>;

    /// Replaces the table schema wholesale. Only appends are accepted.
    fn update_schema(
        &self,
        table: &TableLocator,
        schema: &[TableField],
    ) -> Result<TableMetadata, GatewayError>;

    /// Runs one statement to completion.
    fn run_query(&self, project: &str, sql: &str) -> Result<(), GatewayError>;

    /// Appends rows, returning how many were written.
    fn insert_rows(&self, table: &TableLocator, rows: &[Row]) -> Result<usize, GatewayError>;

    fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<String>, GatewayError>;
}
