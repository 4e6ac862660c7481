//! Deterministic names for generated constraints and indexes.
//!
//! Names follow the TypeORM convention so that a constraint compiled from
//! metadata and the same constraint read back from the catalog carry the
//! same name: `sha1(table + "_" + sorted(columns).join("_"))`, first 27
//! lowercase hex characters, prefixed with the constraint kind. The result
//! is always a 30-character identifier.

use sha1::{Digest, Sha1};

const HASH_LEN: usize = 27;

/// Hash a table/column combination into the shared 27-hex-char suffix.
fn hashed_suffix(table_name: &str, column_names: &[&str]) -> String {
    let mut columns: Vec<&str> = column_names.to_vec();
    columns.sort_unstable();

    let input = format!("{}_{}", table_name, columns.join("_"));
    let digest = Sha1::digest(input.as_bytes());

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex.truncate(HASH_LEN);
    hex
}

/// `PK_` + hashed suffix.
pub fn primary_key_name(table_name: &str, column_names: &[&str]) -> String {
    format!("PK_{}", hashed_suffix(table_name, column_names))
}

/// `UQ_` + hashed suffix.
pub fn unique_constraint_name(table_name: &str, column_names: &[&str]) -> String {
    format!("UQ_{}", hashed_suffix(table_name, column_names))
}

/// `FK_` + hashed suffix.
pub fn foreign_key_name(table_name: &str, column_names: &[&str]) -> String {
    format!("FK_{}", hashed_suffix(table_name, column_names))
}

/// `IDX_` + hashed suffix, for column indexes declared without a name.
pub fn index_name(table_name: &str, column_names: &[&str]) -> String {
    format!("IDX_{}", hashed_suffix(table_name, column_names))
}

/// Convert an entity name to its default table name.
///
/// Strips a trailing `Entity` suffix and snake_cases the rest:
/// `SmartSearchEntity` -> `smart_search`.
pub fn entity_table_name(entity_name: &str) -> String {
    let base = entity_name.strip_suffix("Entity").unwrap_or(entity_name);
    to_snake_case(base)
}

/// CamelCase / PascalCase to snake_case.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}
