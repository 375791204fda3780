#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

/// Scratch warehouse plus a place for schema and config files.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn warehouse(&self) -> PathBuf {
        self.temp_dir.path().join("warehouse")
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }

    pub fn table_path(&self, project: &str, dataset: &str, table: &str) -> PathBuf {
        self.warehouse()
            .join(project)
            .join(dataset)
            .join(format!("{table}.json"))
    }

    /// Seeds a table file with `(name, type)` columns and the given rows.
    pub fn seed_table(
        &self,
        project: &str,
        dataset: &str,
        table: &str,
        columns: &[(&str, &str)],
        rows: Vec<Value>,
    ) -> PathBuf {
        let path = self.table_path(project, dataset, table);
        fs::create_dir_all(path.parent().expect("dataset dir")).expect("create dataset dir");
        let schema = columns
            .iter()
            .map(|(name, ty)| json!({"name": name, "type": ty, "mode": "NULLABLE"}))
            .collect::<Vec<_>>();
        let body = json!({
            "schema": schema,
            "last_modified": "2024-01-02T03:04:05Z",
            "rows": rows,
        });
        fs::write(&path, serde_json::to_string_pretty(&body).expect("json")).expect("seed table");
        path
    }

    pub fn read_table(&self, project: &str, dataset: &str, table: &str) -> Value {
        let raw = fs::read_to_string(self.table_path(project, dataset, table)).expect("read table");
        serde_json::from_str(&raw).expect("table json")
    }

    pub fn column_names(&self, project: &str, dataset: &str, table: &str) -> Vec<String> {
        self.read_table(project, dataset, table)["schema"]
            .as_array()
            .expect("schema array")
            .iter()
            .map(|f| f["name"].as_str().expect("name").to_string())
            .collect()
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("schema-sync").expect("binary exists");
        cmd.env_remove("RUST_LOG")
            .env("SCHEMA_SYNC_WAREHOUSE", self.warehouse());
        cmd
    }
}
