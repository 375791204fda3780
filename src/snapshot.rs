//! Capturing a live table schema into a schema file.

use std::path::Path;

use log::info;

use crate::{
    error::{Result, SyncError},
    gateway::{TableGateway, TableLocator},
    schema::{FieldDescriptor, SchemaDescription},
};

pub struct SchemaSnapshotter<'g, G: TableGateway + ?Sized> {
    gateway: &'g G,
}

impl<'g, G: TableGateway + ?Sized> SchemaSnapshotter<'g, G> {
    pub fn new(gateway: &'g G) -> Self {
        Self { gateway }
    }

    pub fn capture(&self, table: &TableLocator) -> Result<SchemaDescription> {
        let metadata =
            self.gateway
                .get_metadata(table)
                .map_err(|source| SyncError::MetadataFetch {
                    table: table.clone(),
                    source,
                })?;
        Ok(metadata.schema.iter().map(FieldDescriptor::from).collect())
    }

    pub fn persist(&self, schema: &SchemaDescription, path: &Path) -> Result<()> {
        schema.save(path)
    }

    /// Captures `table` and writes it to `path`, returning the field count.
    pub fn snapshot(&self, table: &TableLocator, path: &Path) -> Result<usize> {
        let schema = self.capture(table)?;
        self.persist(&schema, path)?;
        info!(
            "Schema of {} with {} field(s) saved to {:?}",
            table,
            schema.len(),
            path
        );
        Ok(schema.len())
    }
}
