//! Schema descriptions and the on-disk schema file format.
//!
//! A [`SchemaDescription`] is an ordered list of [`FieldDescriptor`]s. Both
//! the live schema read from a table and the desired schema read from a file
//! use this representation, and field order is the projection order of a
//! rebuild.
//!
//! ## File format
//!
//! A pretty-printed JSON array of `{"Name": ..., "Type": ...}` objects. Extra
//! keys such as `Description` or `Required` are accepted on load so files
//! exported by older tooling keep working, but only `Name` and `Type` are
//! ever written.

use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SyncError},
    field_type::FieldType,
    io_utils::write_atomic,
};

/// Description stamped on every field the reconciler adds to a table.
pub const NEW_FIELD_DESCRIPTION: &str = "New field";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub field_type: FieldType,
    #[serde(rename = "Required", default, skip_serializing)]
    pub required: bool,
    #[serde(rename = "Description", default, skip_serializing)]
    pub description: String,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            description: String::new(),
        }
    }

    /// Copy of this field as the reconciler adds it: nullable and marked.
    pub fn as_addition(&self) -> Self {
        Self {
            name: self.name.clone(),
            field_type: self.field_type,
            required: false,
            description: NEW_FIELD_DESCRIPTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDescription {
    pub fields: Vec<FieldDescriptor>,
}

impl SchemaDescription {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Checks that every name is non-empty and unique (case-sensitive).
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for (idx, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(format!("field at position {} has an empty name", idx + 1));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("duplicate field name '{}'", field.name));
            }
        }
        Ok(())
    }

    pub fn from_json_str(raw: &str, path: &Path) -> Result<Self> {
        let schema: SchemaDescription =
            serde_json::from_str(raw).map_err(|err| SyncError::SchemaParse {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        schema.validate().map_err(|reason| SyncError::SchemaParse {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(schema)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| SyncError::SchemaRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, path)
    }

    /// Writes the schema file, replacing any existing one in a single rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let buffer = self
            .to_json_string()
            .map_err(|err| SyncError::SchemaWrite {
                path: path.to_path_buf(),
                source: err.into(),
            })?;
        write_atomic(path, buffer.as_bytes()).map_err(|source| SyncError::SchemaWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl FromIterator<FieldDescriptor> for SchemaDescription {
    fn from_iter<I: IntoIterator<Item = FieldDescriptor>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
