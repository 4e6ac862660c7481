//! Run the schema pipeline end to end and write migration artifacts.
//!
//! Loads the desired schema from registered metadata and the observed schema
//! from the live catalog, diffs them, renders the up-migration SQL, and
//! writes the four artifacts consumed by downstream tooling.

use std::path::Path;

use serde::Serialize;
use tokio_postgres::Client;

use crate::config::MeridianConfig;
use crate::ddl;
use crate::diff::{self, DiffOptions};
use crate::error::Result;
use crate::model::{Change, Schema};
use crate::{catalog, metadata};

/// Report produced by the plan command.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// The desired schema compiled from metadata.
    pub desired: Schema,
    /// The observed schema, filtered to tables the metadata also declares.
    pub observed: Schema,
    /// Ordered change list transforming observed into desired.
    pub changes: Vec<Change>,
    /// SQL statements implementing the changes, in order.
    pub statements: Vec<String>,
    /// Whether any changes were detected.
    pub has_changes: bool,
}

/// Execute the plan command against the registered entity metadata.
pub async fn execute(client: &Client, config: &MeridianConfig) -> Result<PlanReport> {
    execute_with_desired(client, config, metadata::dynamic_schema().clone()).await
}

/// Execute the plan command with an explicit desired schema.
pub async fn execute_with_desired(
    client: &Client,
    config: &MeridianConfig,
    desired: Schema,
) -> Result<PlanReport> {
    let observed = catalog::load_schema(client, &config.schema.name).await?;

    let options = DiffOptions {
        ignore_extra_tables: config.schema.ignore_extra_tables,
    };
    let changes = diff::diff(&desired, &observed, &options);
    let statements = ddl::to_sql(&changes);

    // The database dump is only meaningful for tables under management.
    let desired_names: Vec<&str> = desired.tables.iter().map(|t| t.name.as_str()).collect();
    let observed = observed.retain_tables(&desired_names);

    let has_changes = !changes.is_empty();
    log::info!(
        "Schema plan computed; tables={}, changes={}, statements={}",
        desired.tables.len(),
        changes.len(),
        statements.len()
    );

    Ok(PlanReport {
        desired,
        observed,
        changes,
        statements,
        has_changes,
    })
}

/// Write the plan artifacts into `dir`, creating it if needed.
///
/// Produces `schema-dynamic.json`, `schema-database.json`,
/// `schema-diff.json`, and `schema-sql.sql` (the `-- UP` section with one
/// statement per line).
pub fn write_artifacts(report: &PlanReport, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    std::fs::write(
        dir.join("schema-dynamic.json"),
        serde_json::to_string_pretty(&report.desired).unwrap(),
    )?;
    std::fs::write(
        dir.join("schema-database.json"),
        serde_json::to_string_pretty(&report.observed).unwrap(),
    )?;
    std::fs::write(
        dir.join("schema-diff.json"),
        serde_json::to_string_pretty(&report.changes).unwrap(),
    )?;

    let mut sql = String::from("-- UP\n");
    for statement in &report.statements {
        sql.push_str(statement);
        sql.push('\n');
    }
    std::fs::write(dir.join("schema-sql.sql"), sql)?;

    log::info!("Artifacts written; dir={}", dir.display());
    Ok(())
}
