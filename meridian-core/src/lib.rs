//! Declarative schema diffing and migration-SQL generation for PostgreSQL.
//!
//! Applications declare their tables as entity metadata; Meridian compiles
//! the declarations into a schema model, introspects the live database into
//! the same model, computes the ordered change list between the two, and
//! emits the DDL implementing it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use meridian_core::config::{CliOverrides, MeridianConfig};
//! use meridian_core::Meridian;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MeridianConfig::load(None, &CliOverrides::default())?;
//! let meridian = Meridian::new(config).await?;
//! let report = meridian.plan().await?;
//! println!("{} change(s) detected", report.changes.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Declaring entities
//!
//! Entities are registered globally and compiled once:
//!
//! ```ignore
//! use meridian_core::metadata::{ColumnDecl, DefaultValue, EntityDecl};
//!
//! fn user_entity() -> EntityDecl {
//!     EntityDecl::new("UserEntity")
//!         .with_table_name("users")
//!         .column(
//!             ColumnDecl::new("id")
//!                 .with_type("uuid")
//!                 .primary()
//!                 .with_default(DefaultValue::Expression("uuid_generate_v4()".into())),
//!         )
//!         .column(ColumnDecl::new("email").unique())
//! }
//! meridian_core::register_entity!(user_entity);
//! ```
//!
//! # Architecture
//!
//! - [`model`] — schema value types and the change list
//! - [`catalog`] — PostgreSQL catalog introspection
//! - [`metadata`] — entity declarations and compilation
//! - [`diff`] — change-list computation
//! - [`ddl`] — SQL emission
//! - [`naming`] — deterministic constraint/index names
//! - [`commands`] — the plan pipeline and artifact writing
//! - [`config`] — configuration loading (TOML, env vars, CLI overrides)
//! - [`db`] — database connections, TLS, identifier quoting
//! - [`error`] — error types

pub mod catalog;
pub mod commands;
pub mod config;
pub mod db;
pub mod ddl;
pub mod diff;
pub mod error;
pub mod metadata;
pub mod model;
pub mod naming;

use config::MeridianConfig;
use error::Result;
use tokio_postgres::Client;

pub use commands::plan::PlanReport;
pub use config::CliOverrides;
pub use diff::DiffOptions;
pub use error::MeridianError;
pub use model::{Change, Column, Constraint, Index, ReferentialAction, Schema, Table};

// Re-exported for the register_entity! macro.
pub use inventory;

/// Main entry point for the Meridian library.
///
/// Create a `Meridian` instance with a config and use its methods to run
/// the schema pipeline programmatically.
pub struct Meridian {
    pub config: MeridianConfig,
    client: Client,
}

impl Meridian {
    /// Create a new Meridian instance, connecting to the database.
    ///
    /// If `connect_retries` is configured, retries with exponential backoff.
    pub async fn new(config: MeridianConfig) -> Result<Self> {
        let conn_string = config.connection_string()?;
        let client = db::connect_with_config(
            &conn_string,
            &config.database.ssl_mode,
            config.database.connect_retries,
            config.database.connect_timeout_secs,
            config.database.statement_timeout_secs,
        )
        .await?;
        Ok(Self { config, client })
    }

    /// Create a new Meridian instance with an existing database client.
    pub fn with_client(config: MeridianConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Get a reference to the underlying database client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Compute the schema plan: desired vs. observed, with generated SQL.
    pub async fn plan(&self) -> Result<PlanReport> {
        commands::plan::execute(&self.client, &self.config).await
    }
}
