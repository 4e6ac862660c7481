//! CLI entry point for the meridian schema tool.
//! Provides clap-based command routing, exit code mapping based on error
//! type, and JSON or colored terminal output.

mod output;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;

use meridian_core::config::{CliOverrides, MeridianConfig};
use meridian_core::error::MeridianError;
use meridian_core::Meridian;

/// Top-level CLI definition with global flags and subcommand dispatch.
#[derive(Parser)]
#[command(
    name = "meridian",
    about = "Declarative schema differ and migration-SQL generator for PostgreSQL",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Database URL (overrides config and DB_URL)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Schema namespace to compare (overrides config)
    #[arg(long, value_name = "SCHEMA")]
    schema: Option<String>,

    /// Number of retries when connecting to the database
    #[arg(long, value_name = "N")]
    connect_retries: Option<u32>,

    /// SSL/TLS mode: disable, prefer, require
    #[arg(long, value_name = "MODE")]
    ssl_mode: Option<String>,

    /// Connection timeout in seconds (default: 30, 0 = no timeout)
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u32>,

    /// Statement timeout in seconds (default: 0 = no limit)
    #[arg(long, value_name = "SECS")]
    statement_timeout: Option<u32>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// All available meridian subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Diff registered metadata against the live schema and write artifacts
    Plan {
        /// Directory for generated artifacts (overrides config)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<String>,

        /// Compute and print the plan without writing artifacts
        #[arg(long)]
        no_write: bool,

        /// Also drop database tables the metadata does not declare
        #[arg(long)]
        drop_extra_tables: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging (suppress when JSON output is requested)
    let filter = if cli.json {
        "error"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or(filter))
        .format_target(false)
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli).await {
        print_error(&e);
        process::exit(exit_code(&e));
    }
}

/// Map error types to differentiated exit codes.
fn exit_code(error: &MeridianError) -> i32 {
    match error {
        MeridianError::Config(_) => 2,
        MeridianError::SchemaMissing { .. } => 3,
        MeridianError::Catalog(_) => 4,
        _ => 1,
    }
}

/// Build configuration and dispatch the chosen subcommand.
async fn run(cli: Cli) -> Result<(), MeridianError> {
    let json_output = cli.json;

    let Commands::Plan {
        ref output_dir,
        no_write,
        drop_extra_tables,
    } = cli.command;

    let overrides = CliOverrides {
        url: cli.url,
        schema: cli.schema,
        output_dir: output_dir.as_ref().map(PathBuf::from),
        ignore_extra_tables: if drop_extra_tables { Some(false) } else { None },
        connect_retries: cli.connect_retries,
        ssl_mode: cli.ssl_mode,
        connect_timeout: cli.connect_timeout,
        statement_timeout: cli.statement_timeout,
    };

    let config = MeridianConfig::load(cli.config.as_deref(), &overrides)?;

    let meridian = Meridian::new(config).await?;
    let report = meridian.plan().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report).unwrap());
    } else {
        output::print_plan_report(&report);
    }

    if !no_write {
        let dir = &meridian.config.artifacts.directory;
        meridian_core::commands::plan::write_artifacts(&report, dir)?;
        if !json_output {
            println!(
                "{}",
                format!("Artifacts written to {}", dir.display()).green()
            );
        }
    }

    Ok(())
}

/// Print a formatted error message with actionable hints to stderr.
fn print_error(error: &MeridianError) {
    eprintln!("{} {}", "ERROR:".red().bold(), error);

    // Provide actionable guidance
    match error {
        MeridianError::Config(_) => {
            eprintln!(
                "{}",
                "Hint: Check your meridian.toml or set the DB_URL environment variable.".dimmed()
            );
        }
        MeridianError::Catalog(_) => {
            eprintln!(
                "{}",
                "Hint: Verify the database is running and connection details are correct."
                    .dimmed()
            );
        }
        MeridianError::SchemaMissing { schema } => {
            eprintln!(
                "{}",
                format!(
                    "Hint: Create the schema first: CREATE SCHEMA \"{}\";",
                    schema
                )
                .dimmed()
            );
        }
        _ => {}
    }
}
