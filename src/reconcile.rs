//! Reconciling a live table against a desired schema.
//!
//! A run moves through `Loaded → Diffed → Augmented → Rebuilt`, or stops in
//! `Failed` at the first error:
//!
//! 1. **Loaded**: the live schema is read through the gateway.
//! 2. **Diffed**: desired fields missing from the live schema become
//!    additions (nullable, described as "New field") and the
//!    rebuild statement is built and validated. Nothing has been mutated yet.
//! 3. **Augmented**: each addition is applied on its own, re-reading the
//!    table metadata right before the update because updates replace the
//!    whole schema.
//! 4. **Rebuilt**: `CREATE OR REPLACE TABLE ... AS SELECT <desired names>`
//!    materializes the final column set and order, dropping live columns
//!    the desired schema does not list.
//!
//! Additions committed before a later failure are not rolled back. A fresh
//! run re-reads the widened schema and only adds what is still missing.

use std::collections::HashSet;

use log::{debug, info};

use crate::{
    error::{RebuildFailure, Result, SyncError},
    gateway::{GatewayError, TableField, TableGateway, TableLocator},
    query::RebuildQuery,
    schema::{FieldDescriptor, SchemaDescription},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Loaded,
    Diffed,
    Augmented,
    Rebuilt,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub additions: Vec<FieldDescriptor>,
    pub final_projection: Vec<String>,
}

impl ReconciliationPlan {
    pub fn diff(live: &SchemaDescription, desired: &SchemaDescription) -> Self {
        let existing = live
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect::<HashSet<_>>();
        let additions = desired
            .fields
            .iter()
            .filter(|f| !existing.contains(f.name.as_str()))
            .map(FieldDescriptor::as_addition)
            .collect();
        let final_projection = desired.fields.iter().map(|f| f.name.clone()).collect();
        Self {
            additions,
            final_projection,
        }
    }

    /// Live columns the rebuild will drop.
    pub fn dropped(&self, live: &SchemaDescription) -> Vec<String> {
        let kept = self
            .final_projection
            .iter()
            .map(String::as_str)
            .collect::<HashSet<_>>();
        live.fields
            .iter()
            .filter(|f| !kept.contains(f.name.as_str()))
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn rebuild_query(&self, table: &TableLocator) -> Result<RebuildQuery> {
        RebuildQuery::new(&table.dataset, &table.table, self.final_projection.iter().cloned())
            .map_err(|err| SyncError::RebuildQuery {
                table: table.clone(),
                source: RebuildFailure::Invalid(err),
            })
    }
}

/// Everything a run would do, computed without touching the table.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub live: SchemaDescription,
    pub plan: ReconciliationPlan,
    pub query: RebuildQuery,
}

impl PlannedRun {
    pub fn dropped(&self) -> Vec<String> {
        self.plan.dropped(&self.live)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub added: Vec<String>,
    pub dropped: Vec<String>,
    pub statement: String,
    pub state: RunState,
}

struct Run<'a> {
    table: &'a TableLocator,
    state: RunState,
}

impl<'a> Run<'a> {
    fn new(table: &'a TableLocator) -> Self {
        Self {
            table,
            state: RunState::Loaded,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug!("{}: {:?} -> {:?}", self.table, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: SyncError) -> SyncError {
        debug!(
            "{}: run failed during {} (last state {:?})",
            self.table,
            err.phase(),
            self.state
        );
        self.state = RunState::Failed;
        err
    }
}

pub struct SchemaReconciler<'g, G: TableGateway + ?Sized> {
    gateway: &'g G,
}

impl<'g, G: TableGateway + ?Sized> SchemaReconciler<'g, G> {
    pub fn new(gateway: &'g G) -> Self {
        Self { gateway }
    }

    fn fetch_live(&self, table: &TableLocator) -> Result<SchemaDescription> {
        let metadata =
            self.gateway
                .get_metadata(table)
                .map_err(|source| SyncError::MetadataFetch {
                    table: table.clone(),
                    source,
                })?;
        Ok(metadata.schema.iter().map(FieldDescriptor::from).collect())
    }

    pub fn plan(&self, table: &TableLocator, desired: &SchemaDescription) -> Result<PlannedRun> {
        let live = self.fetch_live(table)?;
        let plan = ReconciliationPlan::diff(&live, desired);
        let query = plan.rebuild_query(table)?;
        Ok(PlannedRun { live, plan, query })
    }

    pub fn reconcile(
        &self,
        table: &TableLocator,
        desired: &SchemaDescription,
    ) -> Result<ReconcileOutcome> {
        let mut run = Run::new(table);

        let live = self.fetch_live(table).map_err(|err| run.fail(err))?;
        debug!("{}: live schema has {} field(s)", table, live.len());

        let plan = ReconciliationPlan::diff(&live, desired);
        let query = plan.rebuild_query(table).map_err(|err| run.fail(err))?;
        let dropped = plan.dropped(&live);
        run.advance(RunState::Diffed);
        info!(
            "{}: {} field(s) to add, {} to drop",
            table,
            plan.additions.len(),
            dropped.len()
        );

        let mut added = Vec::with_capacity(plan.additions.len());
        for field in &plan.additions {
            match self.add_field(table, field) {
                Ok(true) => {
                    info!(
                        "Added field '{}' ({}) to {}",
                        field.name, field.field_type, table
                    );
                    added.push(field.name.clone());
                }
                Ok(false) => debug!("{}: field '{}' appeared concurrently", table, field.name),
                Err(source) => {
                    return Err(run.fail(SyncError::MetadataUpdate {
                        table: table.clone(),
                        field: field.name.clone(),
                        applied: added,
                        source,
                    }));
                }
            }
        }
        run.advance(RunState::Augmented);

        let statement = query.to_sql();
        info!("Rebuilding {} as [{}]", table, query.projection().join(", "));
        self.gateway
            .run_query(&table.project, &statement)
            .map_err(|source| {
                run.fail(SyncError::RebuildQuery {
                    table: table.clone(),
                    source: RebuildFailure::Remote(source),
                })
            })?;
        run.advance(RunState::Rebuilt);

        Ok(ReconcileOutcome {
            added,
            dropped,
            statement,
            state: run.state,
        })
    }

    /// Appends `field` to the table's current schema. Returns `false` when
    /// the field is already there.
    fn add_field(
        &self,
        table: &TableLocator,
        field: &FieldDescriptor,
    ) -> std::result::Result<bool, GatewayError> {
        let current = self.gateway.get_metadata(table)?;
        if current.schema.iter().any(|f| f.name == field.name) {
            return Ok(false);
        }
        let mut schema = current.schema;
        schema.push(TableField::from(field));
        self.gateway.update_schema(table, &schema)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field_type::FieldType,
        gateway::{FieldMode, memory::GatewayCall, memory::MemoryGateway},
        schema::NEW_FIELD_DESCRIPTION,
    };

    fn schema(fields: &[(&str, FieldType)]) -> SchemaDescription {
        fields
            .iter()
            .map(|(name, ty)| FieldDescriptor::new(*name, *ty))
            .collect()
    }

    fn table_fields(fields: &[(&str, FieldType)]) -> Vec<TableField> {
        fields
            .iter()
            .map(|(name, ty)| TableField::new(*name, *ty))
            .collect()
    }

    fn tbl() -> TableLocator {
        TableLocator::new("proj", "ds", "tbl")
    }

    #[test]
    fn diff_keeps_desired_order_and_marks_additions() {
        let live = schema(&[("a", FieldType::String), ("b", FieldType::String)]);
        let desired = schema(&[
            ("z", FieldType::Integer),
            ("b", FieldType::String),
            ("c", FieldType::Date),
        ]);
        let plan = ReconciliationPlan::diff(&live, &desired);
        let names = plan.additions.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["z", "c"]);
        assert!(plan.additions.iter().all(|f| !f.required));
        assert!(
            plan.additions
                .iter()
                .all(|f| f.description == NEW_FIELD_DESCRIPTION)
        );
        assert_eq!(plan.final_projection, vec!["z", "b", "c"]);
        assert_eq!(plan.dropped(&live), vec!["a"]);
    }

    #[test]
    fn adds_missing_field_then_rebuilds_projection() {
        let gateway = MemoryGateway::new();
        gateway.create_table(
            &tbl(),
            table_fields(&[
                ("a", FieldType::String),
                ("b", FieldType::Integer),
                ("c", FieldType::String),
            ]),
        );
        let desired = schema(&[("b", FieldType::Integer), ("d", FieldType::Float)]);

        let outcome = SchemaReconciler::new(&gateway)
            .reconcile(&tbl(), &desired)
            .expect("reconcile");

        assert_eq!(outcome.state, RunState::Rebuilt);
        assert_eq!(outcome.added, vec!["d"]);
        assert_eq!(outcome.dropped, vec!["a", "c"]);
        assert_eq!(
            outcome.statement,
            "CREATE OR REPLACE TABLE `ds.tbl` AS SELECT b, d FROM `ds.tbl`"
        );

        let stored = gateway.table(&tbl()).expect("table");
        let names = stored.schema.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["b", "d"]);
        assert_eq!(stored.schema[1].mode, FieldMode::Nullable);
        assert_eq!(stored.schema[1].description, NEW_FIELD_DESCRIPTION);
        assert_eq!(stored.schema[1].field_type(), FieldType::Float);
    }

    #[test]
    fn each_addition_rereads_metadata_before_updating() {
        let gateway = MemoryGateway::new();
        gateway.create_table(&tbl(), table_fields(&[("name", FieldType::String)]));
        let desired = schema(&[
            ("name", FieldType::String),
            ("x", FieldType::Integer),
            ("y", FieldType::Integer),
        ]);
        SchemaReconciler::new(&gateway)
            .reconcile(&tbl(), &desired)
            .expect("reconcile");

        let calls = gateway.calls();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[0], GatewayCall::GetMetadata(tbl()));
        assert_eq!(calls[1], GatewayCall::GetMetadata(tbl()));
        assert_eq!(
            calls[2],
            GatewayCall::UpdateSchema {
                table: tbl(),
                fields: vec!["name".to_string(), "x".to_string()],
            }
        );
        assert_eq!(calls[3], GatewayCall::GetMetadata(tbl()));
        assert_eq!(
            calls[4],
            GatewayCall::UpdateSchema {
                table: tbl(),
                fields: vec!["name".to_string(), "x".to_string(), "y".to_string()],
            }
        );
        assert!(matches!(calls[5], GatewayCall::RunQuery { .. }));
    }

    #[test]
    fn rejected_addition_stops_before_rebuild() {
        let gateway = MemoryGateway::new();
        gateway.create_table(&tbl(), table_fields(&[("name", FieldType::String)]));
        gateway.reject_addition_of("score");
        let desired = schema(&[("name", FieldType::String), ("score", FieldType::Float)]);

        let err = SchemaReconciler::new(&gateway)
            .reconcile(&tbl(), &desired)
            .unwrap_err();

        match &err {
            SyncError::MetadataUpdate { field, applied, .. } => {
                assert_eq!(field, "score");
                assert!(applied.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(
            !gateway
                .calls()
                .iter()
                .any(|c| matches!(c, GatewayCall::RunQuery { .. }))
        );
        let stored = gateway.table(&tbl()).expect("table");
        assert!(!stored.schema.iter().any(|f| f.name == "score"));
    }

    #[test]
    fn failure_after_partial_additions_reports_applied_fields() {
        let gateway = MemoryGateway::new();
        gateway.create_table(&tbl(), table_fields(&[("a", FieldType::String)]));
        gateway.reject_addition_of("c");
        let desired = schema(&[
            ("a", FieldType::String),
            ("b", FieldType::String),
            ("c", FieldType::String),
        ]);
        let err = SchemaReconciler::new(&gateway)
            .reconcile(&tbl(), &desired)
            .unwrap_err();
        assert!(matches!(
            &err,
            SyncError::MetadataUpdate { field, applied, .. }
                if field == "c" && applied == &vec!["b".to_string()]
        ));
        let stored = gateway.table(&tbl()).expect("table");
        assert_eq!(stored.schema.len(), 2);
    }

    #[test]
    fn failed_rebuild_keeps_widened_schema_and_rerun_is_safe() {
        let gateway = MemoryGateway::new();
        gateway.create_table(
            &tbl(),
            table_fields(&[("a", FieldType::String), ("old", FieldType::String)]),
        );
        gateway.fail_queries();
        let desired = schema(&[("a", FieldType::String), ("b", FieldType::Boolean)]);

        let err = SchemaReconciler::new(&gateway)
            .reconcile(&tbl(), &desired)
            .unwrap_err();
        assert!(matches!(err, SyncError::RebuildQuery { .. }));
        let stored = gateway.table(&tbl()).expect("table");
        let names = stored.schema.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "old", "b"]);

        let healthy = MemoryGateway::new();
        healthy.create_table(&tbl(), stored.schema.clone());
        let outcome = SchemaReconciler::new(&healthy)
            .reconcile(&tbl(), &desired)
            .expect("rerun");
        assert!(outcome.added.is_empty());
        assert_eq!(outcome.dropped, vec!["old"]);
    }

    #[test]
    fn invalid_projection_fails_before_any_mutation() {
        let gateway = MemoryGateway::new();
        gateway.create_table(&tbl(), table_fields(&[("a", FieldType::String)]));
        let desired = schema(&[("a", FieldType::String), ("b`; DROP", FieldType::String)]);

        let err = SchemaReconciler::new(&gateway)
            .reconcile(&tbl(), &desired)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::RebuildQuery {
                source: RebuildFailure::Invalid(_),
                ..
            }
        ));
        assert_eq!(gateway.calls(), vec![GatewayCall::GetMetadata(tbl())]);
    }

    #[test]
    fn missing_table_is_a_metadata_fetch_error() {
        let gateway = MemoryGateway::new();
        let err = SchemaReconciler::new(&gateway)
            .reconcile(&tbl(), &schema(&[("a", FieldType::String)]))
            .unwrap_err();
        assert!(matches!(err, SyncError::MetadataFetch { .. }));
        assert_eq!(err.phase(), "metadata fetch");
    }

    #[test]
    fn plan_does_not_touch_the_table() {
        let gateway = MemoryGateway::new();
        gateway.create_table(&tbl(), table_fields(&[("a", FieldType::String)]));
        let planned = SchemaReconciler::new(&gateway)
            .plan(&tbl(), &schema(&[("b", FieldType::String)]))
            .expect("plan");
        assert_eq!(planned.plan.additions.len(), 1);
        assert_eq!(planned.dropped(), vec!["a"]);
        assert_eq!(gateway.calls(), vec![GatewayCall::GetMetadata(tbl())]);
    }
}
