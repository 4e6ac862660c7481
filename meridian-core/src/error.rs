//! Error types for Meridian operations.

use thiserror::Error;

/// Extract the full error message from a tokio_postgres::Error,
/// including the underlying DbError details that Display hides.
pub fn format_db_error(e: &tokio_postgres::Error) -> String {
    // The source chain contains the actual DbError with message/detail/hint
    if let Some(db_err) = e.as_db_error() {
        let mut msg = db_err.message().to_string();
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        return msg;
    }
    // Fallback: walk the source chain
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    if e.is_closed() {
        msg.push_str("\n  Note: The database connection was closed unexpectedly.");
    }
    msg
}

/// All error types that Meridian operations can produce.
///
/// Normalization problems during schema loading (unknown enum types, missing
/// array element types, unparseable constraint definitions, relations to
/// unregistered tables) are warnings, not errors: the offending object is
/// dropped from its table and logged. Diff and emission cannot fail.
#[derive(Error, Debug)]
pub enum MeridianError {
    /// Invalid or missing configuration (TOML parse errors, missing
    /// connection details, invalid identifiers).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A catalog query or connection operation failed.
    #[error("Catalog error: {}", format_db_error(.0))]
    Catalog(#[from] tokio_postgres::Error),

    /// The requested schema namespace does not exist in the database.
    #[error("Schema '{schema}' does not exist in the target database")]
    SchemaMissing { schema: String },

    /// A filesystem operation failed (writing artifacts, reading config).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, MeridianError>`.
pub type Result<T> = std::result::Result<T, MeridianError>;
