//! Configuration for the table inventory report.
//!
//! The file is JSON and keeps the key spelling of existing `env.json` files:
//!
//! ```json
//! {
//!   "project_id": "analytics",
//!   "dataset_ids": ["sales", "marketing"],
//!   "tableName": "table_inventory",
//!   "targetDataset": "ops"
//! }
//! ```

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "env.json";
pub const WAREHOUSE_ENV: &str = "SCHEMA_SYNC_WAREHOUSE";
pub const DEFAULT_WAREHOUSE_DIR: &str = "warehouse";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub project_id: String,
    pub dataset_ids: Vec<String>,
    #[serde(rename = "tableName")]
    pub table_name: String,
    #[serde(rename = "targetDataset")]
    pub target_dataset: String,
}

impl InventoryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: InventoryConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config JSON {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.project_id.trim().is_empty(), "project_id must not be empty");
        ensure!(!self.table_name.trim().is_empty(), "tableName must not be empty");
        ensure!(
            !self.target_dataset.trim().is_empty(),
            "targetDataset must not be empty"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_json_key_spelling() {
        let raw = r#"{"project_id":"p","dataset_ids":["a","b"],"tableName":"inv","targetDataset":"ops"}"#;
        let config: InventoryConfig = serde_json::from_str(raw).expect("parse");
        assert_eq!(config.dataset_ids, vec!["a", "b"]);
        assert_eq!(config.table_name, "inv");
        assert_eq!(config.target_dataset, "ops");
        config.validate().expect("valid");
    }

    #[test]
    fn blank_target_is_rejected() {
        let config = InventoryConfig {
            project_id: "p".to_string(),
            dataset_ids: Vec::new(),
            table_name: "inv".to_string(),
            target_dataset: " ".to_string(),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("targetDataset"));
    }
}
