//! Table state and the mutation rules both bundled gateways enforce.
//!
//! Schema updates are full-replace but append-only: existing fields keep
//! their position, name, and type, and new fields must be nullable with a
//! known type. Rebuilds project rows onto an ordered column list.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FieldMode, GatewayError, Row, TableField, TableMetadata};
use crate::{field_type::FieldType, query::RebuildQuery};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTable {
    pub schema: Vec<TableField>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl StoredTable {
    pub fn new(schema: Vec<TableField>, now: DateTime<Utc>) -> Self {
        Self {
            schema,
            last_modified: now,
            rows: Vec::new(),
        }
    }

    /// A table whose columns follow the keys of the first row, all STRING.
    pub fn from_rows(rows: &[Row], now: DateTime<Utc>) -> Self {
        let schema = rows
            .first()
            .map(|row| {
                row.keys()
                    .map(|key| TableField::new(key.clone(), FieldType::String))
                    .collect()
            })
            .unwrap_or_default();
        Self::new(schema, now)
    }

    pub fn metadata(&self) -> TableMetadata {
        TableMetadata {
            schema: self.schema.clone(),
            last_modified: self.last_modified,
            num_rows: self.rows.len() as u64,
        }
    }

    pub fn apply_schema(
        &mut self,
        proposed: &[TableField],
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        check_append_only(&self.schema, proposed)?;
        self.schema = proposed.to_vec();
        self.last_modified = now;
        Ok(())
    }

    pub fn apply_rebuild(
        &mut self,
        query: &RebuildQuery,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let mut schema = Vec::with_capacity(query.projection().len());
        for column in query.projection() {
            let field = self
                .schema
                .iter()
                .find(|f| &f.name == column)
                .ok_or_else(|| {
                    GatewayError::QueryFailed(format!(
                        "Unrecognized name: {column} in {}.{}",
                        query.dataset(),
                        query.table()
                    ))
                })?;
            schema.push(field.clone());
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                query
                    .projection()
                    .iter()
                    .map(|column| {
                        let value = row.get(column).cloned().unwrap_or_default();
                        (column.clone(), value)
                    })
                    .collect::<Row>()
            })
            .collect();
        self.schema = schema;
        self.rows = rows;
        self.last_modified = now;
        Ok(())
    }

    pub fn append_rows(&mut self, rows: &[Row], now: DateTime<Utc>) -> Result<usize, GatewayError> {
        let known = self
            .schema
            .iter()
            .map(|f| f.name.as_str())
            .collect::<HashSet<_>>();
        for (idx, row) in rows.iter().enumerate() {
            if let Some(unknown) = row.keys().find(|key| !known.contains(key.as_str())) {
                return Err(GatewayError::QueryFailed(format!(
                    "row {} has no such field: {unknown}",
                    idx + 1
                )));
            }
        }
        self.rows.extend(rows.iter().cloned());
        self.last_modified = now;
        Ok(rows.len())
    }
}

fn check_append_only(current: &[TableField], proposed: &[TableField]) -> Result<(), GatewayError> {
    for (idx, existing) in current.iter().enumerate() {
        match proposed.get(idx) {
            Some(next) if next.name == existing.name && next.type_name == existing.type_name => {}
            Some(next) if next.name == existing.name => {
                return Err(GatewayError::SchemaRejected(format!(
                    "field '{}' cannot change type from {} to {}",
                    existing.name, existing.type_name, next.type_name
                )));
            }
            _ => {
                return Err(GatewayError::SchemaRejected(format!(
                    "field '{}' cannot be removed or moved",
                    existing.name
                )));
            }
        }
    }
    let mut names = current
        .iter()
        .map(|f| f.name.as_str())
        .collect::<HashSet<_>>();
    for added in &proposed[current.len()..] {
        if !names.insert(added.name.as_str()) {
            return Err(GatewayError::SchemaRejected(format!(
                "duplicate field name '{}'",
                added.name
            )));
        }
        if crate::query::validate_column(&added.name).is_err() {
            return Err(GatewayError::SchemaRejected(format!(
                "invalid field name '{}'",
                added.name
            )));
        }
        if added.mode == FieldMode::Required {
            return Err(GatewayError::SchemaRejected(format!(
                "cannot add REQUIRED field '{}' to an existing table",
                added.name
            )));
        }
        if !added.field_type().is_known() {
            return Err(GatewayError::SchemaRejected(format!(
                "field '{}' has unsupported type {}",
                added.name, added.type_name
            )));
        }
    }
    Ok(())
}
