//! Integration tests for meridian-core.
//!
//! Requires a running PostgreSQL instance (13+).
//! Set TEST_DATABASE_URL env var, e.g.:
//!   TEST_DATABASE_URL="host=localhost user=postgres dbname=meridian_test"
//!
//! Tests are skipped when TEST_DATABASE_URL is not set.
//!
//! Run with: cargo test --test integration_test

use std::sync::atomic::{AtomicU64, Ordering};

use meridian_core::commands::plan;
use meridian_core::config::MeridianConfig;
use meridian_core::db::{self, quote_ident};
use meridian_core::metadata::{ColumnDecl, DefaultValue, EntityDecl, IndexDecl, RelationDecl};
use meridian_core::model::Constraint;
use meridian_core::{catalog, metadata, MeridianError, ReferentialAction};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Skip the test when no database is configured.
macro_rules! require_db_url {
    () => {
        match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("skipping: TEST_DATABASE_URL not set");
                return;
            }
        }
    };
}

/// Helper: connect, create a fresh schema, return client + schema name.
async fn setup_schema(url: &str, prefix: &str) -> (tokio_postgres::Client, String) {
    let client = db::connect(url).await.expect("Failed to connect to DB");

    // Use a unique schema name per test to avoid collisions
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let schema = format!("meridian_test_{}_{}", prefix, id);

    // Drop any stale schema from a previous run, then create fresh
    client
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE; CREATE SCHEMA {}",
            quote_ident(&schema),
            quote_ident(&schema)
        ))
        .await
        .expect("Failed to create test schema");

    client
        .batch_execute(&format!("SET search_path TO {}", quote_ident(&schema)))
        .await
        .expect("Failed to set search_path");

    (client, schema)
}

/// Helper: drop the test schema.
async fn teardown_schema(client: &tokio_postgres::Client, schema: &str) {
    let _ = client
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {} CASCADE",
            quote_ident(schema)
        ))
        .await;
}

fn test_config(schema: &str) -> MeridianConfig {
    let mut config = MeridianConfig::default();
    config.schema.name = schema.to_string();
    config
}

/// Entities used by the pipeline tests. Defaults are limited to expressions
/// PostgreSQL reports back verbatim, so a second plan converges to no SQL.
fn sample_entities() -> Vec<EntityDecl> {
    vec![
        EntityDecl::new("UserEntity")
            .with_table_name("users")
            .column(
                ColumnDecl::new("id")
                    .with_type("uuid")
                    .primary()
                    .with_default(DefaultValue::Expression("gen_random_uuid()".to_string())),
            )
            .column(ColumnDecl::new("email").unique())
            .column(
                ColumnDecl::new("createdAt")
                    .with_type("timestamp with time zone")
                    .with_default(DefaultValue::Expression("now()".to_string())),
            ),
        EntityDecl::new("AssetEntity")
            .column(
                ColumnDecl::new("id")
                    .with_type("uuid")
                    .primary()
                    .with_default(DefaultValue::Expression("gen_random_uuid()".to_string())),
            )
            .column(ColumnDecl::new("originalPath"))
            .column(ColumnDecl::new("duration").with_default(DefaultValue::Null))
            .relation(
                RelationDecl::many_to_one("owner", "users")
                    .on_delete(ReferentialAction::Cascade)
                    .on_update(ReferentialAction::Cascade),
            )
            .index(IndexDecl::on_columns(["ownerId"]).named("IDX_asset_owner")),
    ]
}

// ─── Introspection ───

#[tokio::test]
async fn test_load_schema_of_empty_namespace() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "empty").await;

    let loaded = catalog::load_schema(&client, &schema).await.unwrap();
    assert_eq!(loaded.name, schema);
    assert!(loaded.tables.is_empty());

    teardown_schema(&client, &schema).await;
}

#[tokio::test]
async fn test_load_schema_missing_namespace_errors() {
    let url = require_db_url!();
    let client = db::connect(&url).await.unwrap();

    let result = catalog::load_schema(&client, "meridian_does_not_exist").await;
    assert!(matches!(
        result,
        Err(MeridianError::SchemaMissing { ref schema }) if schema == "meridian_does_not_exist"
    ));
}

#[tokio::test]
async fn test_introspect_columns_and_constraints() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "introspect").await;

    client
        .batch_execute(
            r#"
            CREATE TYPE asset_status AS ENUM ('active', 'trashed', 'deleted');
            CREATE TABLE asset (
                "id" uuid NOT NULL DEFAULT gen_random_uuid(),
                "status" asset_status NOT NULL,
                "tags" text[],
                "rating" numeric(3,1),
                "comment" character varying,
                CONSTRAINT "PK_asset" PRIMARY KEY ("id")
            );
            CREATE INDEX "IDX_asset_rating" ON asset ("rating");
            "#,
        )
        .await
        .unwrap();

    let loaded = catalog::load_schema(&client, &schema).await.unwrap();
    let asset = loaded.get_table("asset").expect("asset table introspected");

    let id = asset.get_column("id").unwrap();
    assert_eq!(id.col_type, "uuid");
    assert!(!id.nullable);
    assert!(id.primary);
    assert_eq!(id.default.as_deref(), Some("gen_random_uuid()"));

    let status = asset.get_column("status").unwrap();
    assert_eq!(status.col_type, "enum");
    assert_eq!(
        status.values.as_deref(),
        Some(
            &[
                "active".to_string(),
                "trashed".to_string(),
                "deleted".to_string()
            ][..]
        )
    );

    let tags = asset.get_column("tags").unwrap();
    assert!(tags.is_array);
    assert_eq!(tags.col_type, "text");
    assert!(tags.nullable);

    let rating = asset.get_column("rating").unwrap();
    assert_eq!(rating.col_type, "numeric");
    assert_eq!(rating.numeric_precision, Some(3));
    assert_eq!(rating.numeric_scale, Some(1));

    let pk = asset
        .constraints
        .iter()
        .find(|c| matches!(c, Constraint::PrimaryKey { .. }))
        .unwrap();
    assert_eq!(pk.name(), "PK_asset");

    // The PK-backing index is excluded; only the explicit one remains
    assert_eq!(asset.indexes.len(), 1);
    assert_eq!(asset.indexes[0].name, "IDX_asset_rating");
    assert!(asset.indexes[0].using.is_none());

    teardown_schema(&client, &schema).await;
}

#[tokio::test]
async fn test_introspect_foreign_key_actions() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "fk").await;

    client
        .batch_execute(
            r#"
            CREATE TABLE users ("id" uuid PRIMARY KEY);
            CREATE TABLE session (
                "id" uuid PRIMARY KEY,
                "userId" uuid NOT NULL,
                CONSTRAINT "FK_session_user" FOREIGN KEY ("userId")
                    REFERENCES users ("id") ON DELETE CASCADE ON UPDATE RESTRICT
            );
            "#,
        )
        .await
        .unwrap();

    let loaded = catalog::load_schema(&client, &schema).await.unwrap();
    let session = loaded.get_table("session").unwrap();
    let fk = session
        .constraints
        .iter()
        .find_map(|c| match c {
            Constraint::ForeignKey {
                name,
                reference_table_name,
                on_update,
                on_delete,
                ..
            } => Some((name, reference_table_name, on_update, on_delete)),
            _ => None,
        })
        .unwrap();

    assert_eq!(fk.0, "FK_session_user");
    assert_eq!(fk.1, "users");
    assert_eq!(*fk.2, ReferentialAction::Restrict);
    assert_eq!(*fk.3, ReferentialAction::Cascade);

    teardown_schema(&client, &schema).await;
}

#[tokio::test]
async fn test_introspect_partial_and_expression_indexes() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "indexes").await;

    client
        .batch_execute(
            r#"
            CREATE TABLE asset (
                "id" uuid PRIMARY KEY,
                "originalFileName" character varying NOT NULL,
                "deletedAt" timestamp with time zone
            );
            CREATE INDEX "IDX_asset_live" ON asset ("originalFileName")
                WHERE "deletedAt" IS NULL;
            CREATE INDEX "IDX_asset_lower" ON asset (lower("originalFileName"));
            "#,
        )
        .await
        .unwrap();

    let loaded = catalog::load_schema(&client, &schema).await.unwrap();
    let asset = loaded.get_table("asset").unwrap();

    let partial = asset.indexes.iter().find(|i| i.name == "IDX_asset_live").unwrap();
    assert!(partial.predicate.is_some());
    assert_eq!(
        partial.column_names.as_deref(),
        Some(&["originalFileName".to_string()][..])
    );

    let functional = asset.indexes.iter().find(|i| i.name == "IDX_asset_lower").unwrap();
    assert!(functional.column_names.is_none());
    assert!(functional
        .expression
        .as_deref()
        .unwrap()
        .contains("lower"));

    teardown_schema(&client, &schema).await;
}

// ─── Pipeline ───

#[tokio::test]
async fn test_plan_construction_converges() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "converge").await;
    let config = test_config(&schema);
    let desired = metadata::compile(&sample_entities());

    // First plan: everything is missing
    let report = plan::execute_with_desired(&client, &config, desired.clone())
        .await
        .unwrap();
    assert!(report.has_changes);
    assert!(!report.statements.is_empty());

    // Apply the generated SQL to the empty schema
    for statement in &report.statements {
        client
            .batch_execute(statement)
            .await
            .unwrap_or_else(|e| panic!("statement failed: {}\n{}", statement, e));
    }

    // Second plan: construction is idempotent, nothing left to emit
    let report = plan::execute_with_desired(&client, &config, desired)
        .await
        .unwrap();
    assert!(
        report.statements.is_empty(),
        "expected convergence, got: {:?}",
        report.statements
    );

    teardown_schema(&client, &schema).await;
}

#[tokio::test]
async fn test_plan_generated_names_survive_round_trip() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "names").await;
    let config = test_config(&schema);
    let desired = metadata::compile(&sample_entities());

    let report = plan::execute_with_desired(&client, &config, desired.clone())
        .await
        .unwrap();
    for statement in &report.statements {
        client.batch_execute(statement).await.unwrap();
    }

    let observed = catalog::load_schema(&client, &schema).await.unwrap();
    let desired_users = desired.get_table("users").unwrap();
    let observed_users = observed.get_table("users").unwrap();

    // Hashed PK/UQ names read back identical from the catalog
    for constraint in &desired_users.constraints {
        assert!(
            observed_users
                .constraints
                .iter()
                .any(|c| c.name() == constraint.name()),
            "constraint {} not found after round trip",
            constraint.name()
        );
    }

    teardown_schema(&client, &schema).await;
}

#[tokio::test]
async fn test_plan_ignores_extra_tables_by_default() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "extra").await;
    let config = test_config(&schema);

    client
        .batch_execute("CREATE TABLE third_party (\"id\" integer)")
        .await
        .unwrap();

    let report = plan::execute_with_desired(&client, &config, metadata::compile(&[]))
        .await
        .unwrap();
    assert!(report.statements.is_empty());

    // With ignore_extra_tables disabled, the table is dropped
    let mut config = test_config(&schema);
    config.schema.ignore_extra_tables = false;
    let report = plan::execute_with_desired(&client, &config, metadata::compile(&[]))
        .await
        .unwrap();
    assert_eq!(
        report.statements,
        vec!["DROP TABLE \"third_party\";".to_string()]
    );

    teardown_schema(&client, &schema).await;
}

#[tokio::test]
async fn test_plan_filters_database_dump_to_managed_tables() {
    let url = require_db_url!();
    let (client, schema) = setup_schema(&url, "filter").await;
    let config = test_config(&schema);

    client
        .batch_execute(
            "CREATE TABLE users (\"id\" uuid PRIMARY KEY); CREATE TABLE third_party (\"id\" integer)",
        )
        .await
        .unwrap();

    let desired = metadata::compile(&[EntityDecl::new("UserEntity")
        .with_table_name("users")
        .column(ColumnDecl::new("id").with_type("uuid").primary())]);

    let report = plan::execute_with_desired(&client, &config, desired)
        .await
        .unwrap();
    assert!(report.observed.get_table("users").is_some());
    assert!(report.observed.get_table("third_party").is_none());

    teardown_schema(&client, &schema).await;
}
