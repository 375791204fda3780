//! Error taxonomy for snapshot and reconciliation runs.
//!
//! Every variant is fatal to the run that produced it. Causes are attached
//! as `source` so the CLI can print the whole chain on one line.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{gateway::GatewayError, gateway::TableLocator, query::QueryError};

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The table (or its dataset) could not be read.
    #[error("reading metadata for {table}")]
    MetadataFetch {
        table: TableLocator,
        #[source]
        source: GatewayError,
    },

    /// The schema file is not valid JSON, lacks `Name`/`Type`, or repeats a name.
    #[error("invalid schema file {path:?}: {reason}")]
    SchemaParse { path: PathBuf, reason: String },

    #[error("reading schema file {path:?}")]
    SchemaRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writing schema file {path:?}")]
    SchemaWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An additive patch was rejected. `applied` lists the fields committed
    /// earlier in the same run; they stay in place.
    #[error("adding field '{field}' to {table} (already added: [{}])", .applied.join(", "))]
    MetadataUpdate {
        table: TableLocator,
        field: String,
        applied: Vec<String>,
        #[source]
        source: GatewayError,
    },

    /// The projecting rebuild could not be built or did not run to completion.
    #[error("rebuilding {table}")]
    RebuildQuery {
        table: TableLocator,
        #[source]
        source: RebuildFailure,
    },
}

#[derive(Debug, Error)]
pub enum RebuildFailure {
    #[error(transparent)]
    Invalid(#[from] QueryError),
    #[error(transparent)]
    Remote(#[from] GatewayError),
}

impl SyncError {
    /// Short name of the phase that failed, used in diagnostics.
    pub fn phase(&self) -> &'static str {
        match self {
            SyncError::MetadataFetch { .. } => "metadata fetch",
            SyncError::SchemaParse { .. } | SyncError::SchemaRead { .. } => "schema load",
            SyncError::SchemaWrite { .. } => "schema write",
            SyncError::MetadataUpdate { .. } => "metadata update",
            SyncError::RebuildQuery { .. } => "rebuild query",
        }
    }
}
