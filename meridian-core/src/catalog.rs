//! PostgreSQL catalog introspection.
//!
//! Reads `information_schema` and `pg_catalog` and normalizes the rows into
//! the schema model. The five catalog queries are independent and run
//! concurrently; their results are merged single-threaded. Dropping the
//! returned future cancels any in-flight queries.
//!
//! Objects that cannot be normalized (columns of unknown user-defined types,
//! arrays without a known element type, UNIQUE constraints whose definition
//! cannot be parsed) are dropped from their table with a warning rather than
//! failing the load.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex_lite::Regex;
use tokio_postgres::Client;

use crate::error::{MeridianError, Result};
use crate::model::{Column, Constraint, Index, ReferentialAction, Schema, Table};

/// Matches the parenthesized column list of a constraint definition,
/// e.g. `UNIQUE ("ownerId", "assetId")`.
static CONSTRAINT_COLUMNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());

/// Introspect a schema namespace into a [`Schema`] value.
///
/// Fails with [`MeridianError::SchemaMissing`] if the namespace does not
/// exist and [`MeridianError::Catalog`] if any catalog query fails.
pub async fn load_schema(client: &Client, schema_name: &str) -> Result<Schema> {
    let exists = client
        .query_opt(
            "SELECT 1 FROM pg_namespace WHERE nspname = $1",
            &[&schema_name],
        )
        .await?;
    if exists.is_none() {
        return Err(MeridianError::SchemaMissing {
            schema: schema_name.to_string(),
        });
    }

    // The five queries share no state; run them concurrently and merge below.
    let (table_names, column_rows, enums, index_rows, constraint_rows) = tokio::try_join!(
        query_tables(client, schema_name),
        query_columns(client, schema_name),
        query_enums(client, schema_name),
        query_indexes(client, schema_name),
        query_constraints(client, schema_name),
    )?;

    let mut schema = Schema::new(schema_name);
    schema.tables = table_names.into_iter().map(Table::new).collect();

    for row in column_rows {
        let table_name = row.table_name.clone();
        if let Some(column) = normalize_column(row, &enums) {
            if let Some(table) = table_mut(&mut schema.tables, &table_name) {
                table.columns.push(column);
            }
        }
    }

    for row in constraint_rows {
        let table_name = row.table_name.clone();
        if let Some(constraint) = normalize_constraint(row) {
            if let Some(table) = table_mut(&mut schema.tables, &table_name) {
                table.constraints.push(constraint);
            }
        }
    }

    // A column is primary iff it belongs to the table's PRIMARY KEY
    // constraint; information_schema.columns does not carry this.
    for table in &mut schema.tables {
        let pk_columns: Vec<String> = table
            .constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::PrimaryKey { column_names, .. } => Some(column_names.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        for column in &mut table.columns {
            if pk_columns.contains(&column.name) {
                column.primary = true;
            }
        }
    }

    for row in index_rows {
        let table_name = row.table_name.clone();
        if let Some(index) = normalize_index(row) {
            if let Some(table) = table_mut(&mut schema.tables, &table_name) {
                table.indexes.push(index);
            }
        }
    }

    Ok(schema)
}

fn table_mut<'a>(tables: &'a mut [Table], name: &str) -> Option<&'a mut Table> {
    tables.iter_mut().find(|t| t.name == name)
}

// ── Catalog queries ──

async fn query_tables(client: &Client, schema: &str) -> Result<Vec<String>> {
    let rows = client
        .query(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = $1 AND table_type = 'BASE TABLE'
             ORDER BY table_name",
            &[&schema],
        )
        .await?;

    Ok(rows.iter().map(|r| r.get(0)).collect())
}

/// Raw column row before normalization.
#[derive(Debug, Clone)]
struct ColumnRow {
    table_name: String,
    name: String,
    data_type: String,
    is_nullable: String,
    default: Option<String>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
    udt_name: String,
    element_type: Option<String>,
}

async fn query_columns(client: &Client, schema: &str) -> Result<Vec<ColumnRow>> {
    // element_types carries the element type of ARRAY columns; the join key
    // is the column's dtd_identifier.
    let rows = client
        .query(
            "SELECT c.table_name, c.column_name, c.data_type, c.is_nullable,
                    c.column_default, c.numeric_precision::int4, c.numeric_scale::int4,
                    c.udt_name, e.data_type AS element_type
             FROM information_schema.columns c
             LEFT JOIN information_schema.element_types e
               ON c.table_catalog = e.object_catalog
              AND c.table_schema = e.object_schema
              AND c.table_name = e.object_name
              AND e.object_type = 'TABLE'
              AND c.dtd_identifier = e.collection_type_identifier
             WHERE c.table_schema = $1
             ORDER BY c.table_name, c.ordinal_position",
            &[&schema],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|r| ColumnRow {
            table_name: r.get(0),
            name: r.get(1),
            data_type: r.get(2),
            is_nullable: r.get(3),
            default: r.get(4),
            numeric_precision: r.get(5),
            numeric_scale: r.get(6),
            udt_name: r.get(7),
            element_type: r.get(8),
        })
        .collect())
}

async fn query_enums(client: &Client, schema: &str) -> Result<HashMap<String, Vec<String>>> {
    let rows = client
        .query(
            "SELECT t.typname, array_agg(e.enumlabel ORDER BY e.enumsortorder)::text[]
             FROM pg_type t
             JOIN pg_enum e ON e.enumtypid = t.oid
             JOIN pg_namespace n ON n.oid = t.typnamespace
             WHERE n.nspname = $1 AND t.typtype = 'e'
             GROUP BY t.typname
             ORDER BY t.typname",
            &[&schema],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|r| (r.get::<_, String>(0), r.get::<_, Vec<String>>(1)))
        .collect())
}

/// Raw index row before normalization.
#[derive(Debug, Clone)]
struct IndexRow {
    name: String,
    table_name: String,
    unique: bool,
    using: String,
    column_names: Option<Vec<String>>,
    expression: Option<String>,
    predicate: Option<String>,
}

async fn query_indexes(client: &Client, schema: &str) -> Result<Vec<IndexRow>> {
    // Indexes backing a PRIMARY KEY or UNIQUE constraint are excluded; the
    // constraint itself represents them.
    let rows = client
        .query(
            "SELECT i.relname AS index_name,
                    t.relname AS table_name,
                    ix.indisunique AS is_unique,
                    am.amname AS using_method,
                    pg_get_expr(ix.indexprs, ix.indrelid) AS expression,
                    pg_get_expr(ix.indpred, ix.indrelid) AS predicate,
                    (SELECT array_agg(att.attname::text
                                      ORDER BY array_position(ix.indkey, att.attnum))
                       FROM pg_attribute att
                      WHERE att.attrelid = t.oid
                        AND att.attnum = ANY(ix.indkey)) AS column_names
             FROM pg_index ix
             JOIN pg_class i ON i.oid = ix.indexrelid
             JOIN pg_class t ON t.oid = ix.indrelid
             JOIN pg_namespace n ON n.oid = t.relnamespace
             JOIN pg_am am ON am.oid = i.relam
             WHERE n.nspname = $1
               AND NOT EXISTS (
                     SELECT 1 FROM pg_constraint con
                      WHERE con.conindid = ix.indexrelid
                        AND con.contype IN ('p', 'u'))
             ORDER BY t.relname, i.relname",
            &[&schema],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|r| IndexRow {
            name: r.get(0),
            table_name: r.get(1),
            unique: r.get(2),
            using: r.get(3),
            expression: r.get(4),
            predicate: r.get(5),
            column_names: r.get(6),
        })
        .collect())
}

/// Raw constraint row before normalization.
#[derive(Debug, Clone)]
struct ConstraintRow {
    name: String,
    contype: String,
    table_name: String,
    reference_table_name: Option<String>,
    column_names: Option<Vec<String>>,
    reference_column_names: Option<Vec<String>>,
    on_update: String,
    on_delete: String,
    definition: String,
}

async fn query_constraints(client: &Client, schema: &str) -> Result<Vec<ConstraintRow>> {
    let rows = client
        .query(
            "SELECT con.conname,
                    con.contype::text,
                    rel.relname AS table_name,
                    fref.relname AS reference_table_name,
                    con.confupdtype::text,
                    con.confdeltype::text,
                    pg_get_constraintdef(con.oid) AS definition,
                    (SELECT array_agg(att.attname::text
                                      ORDER BY array_position(con.conkey, att.attnum))
                       FROM pg_attribute att
                      WHERE att.attrelid = con.conrelid
                        AND att.attnum = ANY(con.conkey)) AS column_names,
                    (SELECT array_agg(att.attname::text
                                      ORDER BY array_position(con.confkey, att.attnum))
                       FROM pg_attribute att
                      WHERE att.attrelid = con.confrelid
                        AND att.attnum = ANY(con.confkey)) AS reference_column_names
             FROM pg_constraint con
             JOIN pg_namespace nsp ON nsp.oid = con.connamespace
             JOIN pg_class rel ON rel.oid = con.conrelid
                              AND rel.relkind IN ('r', 'p', 'f')
             LEFT JOIN pg_class fref ON fref.oid = con.confrelid
             WHERE nsp.nspname = $1
             ORDER BY rel.relname, con.conname",
            &[&schema],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|r| ConstraintRow {
            name: r.get(0),
            contype: r.get(1),
            table_name: r.get(2),
            reference_table_name: r.get(3),
            on_update: r.get(4),
            on_delete: r.get(5),
            definition: r.get(6),
            column_names: r.get(7),
            reference_column_names: r.get(8),
        })
        .collect())
}

// ── Normalization ──

fn normalize_column(row: ColumnRow, enums: &HashMap<String, Vec<String>>) -> Option<Column> {
    let mut is_array = false;
    let mut values = None;

    let col_type = match row.data_type.as_str() {
        "ARRAY" => {
            is_array = true;
            match row.element_type {
                Some(element) => element,
                None => {
                    log::warn!(
                        "Skipping array column with unknown element type; table={}, column={}",
                        row.table_name,
                        row.name
                    );
                    return None;
                }
            }
        }
        "USER-DEFINED" => match enums.get(&row.udt_name) {
            Some(labels) => {
                values = Some(labels.clone());
                "enum".to_string()
            }
            None => {
                log::warn!(
                    "Skipping column of unknown user-defined type; table={}, column={}, udt={}",
                    row.table_name,
                    row.name,
                    row.udt_name
                );
                return None;
            }
        },
        _ => row.data_type,
    };

    Some(Column {
        table_name: row.table_name,
        name: row.name,
        col_type,
        nullable: row.is_nullable == "YES",
        is_array,
        primary: false,
        default: row.default,
        values,
        numeric_precision: row.numeric_precision,
        numeric_scale: row.numeric_scale,
    })
}

fn normalize_constraint(row: ConstraintRow) -> Option<Constraint> {
    match row.contype.as_str() {
        "p" => {
            let Some(column_names) = row.column_names else {
                log::warn!(
                    "Skipping primary key without column names; table={}, constraint={}",
                    row.table_name,
                    row.name
                );
                return None;
            };
            Some(Constraint::PrimaryKey {
                name: row.name,
                table_name: row.table_name,
                column_names,
            })
        }
        "f" => {
            let (Some(column_names), Some(reference_table_name), Some(reference_column_names)) = (
                row.column_names,
                row.reference_table_name,
                row.reference_column_names,
            ) else {
                log::warn!(
                    "Skipping incomplete foreign key; table={}, constraint={}",
                    row.table_name,
                    row.name
                );
                return None;
            };
            Some(Constraint::ForeignKey {
                name: row.name,
                table_name: row.table_name,
                column_names,
                reference_table_name,
                reference_column_names,
                on_update: action_from_catalog(&row.on_update),
                on_delete: action_from_catalog(&row.on_delete),
            })
        }
        "u" => {
            // The catalog's conkey ordering is not the declaration ordering;
            // the column list is taken from the definition text instead.
            let Some(column_names) = parse_constraint_columns(&row.definition) else {
                log::warn!(
                    "Skipping unique constraint with unparseable definition; table={}, constraint={}, definition={}",
                    row.table_name,
                    row.name,
                    row.definition
                );
                return None;
            };
            Some(Constraint::Unique {
                name: row.name,
                table_name: row.table_name,
                column_names,
            })
        }
        "c" => {
            let expression = row
                .definition
                .strip_prefix("CHECK ")
                .unwrap_or(&row.definition)
                .to_string();
            Some(Constraint::Check {
                name: row.name,
                table_name: row.table_name,
                expression,
            })
        }
        // Exclusion and trigger constraints are outside the model.
        _ => None,
    }
}

fn normalize_index(row: IndexRow) -> Option<Index> {
    if row.expression.is_none() && row.column_names.is_none() {
        log::warn!(
            "Skipping index with neither columns nor expression; table={}, index={}",
            row.table_name,
            row.name
        );
        return None;
    }

    // Functional indexes carry the expression; plain indexes the column list.
    let (column_names, expression) = match row.expression {
        Some(expr) => (None, Some(expr)),
        None => (row.column_names, None),
    };

    Some(Index {
        name: row.name,
        table_name: row.table_name,
        unique: row.unique,
        column_names,
        expression,
        using: match row.using.as_str() {
            "btree" => None,
            other => Some(other.to_string()),
        },
        predicate: row.predicate,
    })
}

fn action_from_catalog(code: &str) -> ReferentialAction {
    ReferentialAction::from_code(code.chars().next().unwrap_or('a'))
}

/// Extract the column names from a constraint definition's parenthesized
/// list: `UNIQUE ("ownerId", "assetId")` -> `["ownerId", "assetId"]`.
fn parse_constraint_columns(definition: &str) -> Option<Vec<String>> {
    let captures = CONSTRAINT_COLUMNS_RE.captures(definition)?;
    let list = captures.get(1)?.as_str();
    let columns: Vec<String> = list
        .split(',')
        .map(|part| part.trim().trim_matches('"').to_string())
        .filter(|part| !part.is_empty())
        .collect();
    if columns.is_empty() {
        return None;
    }
    Some(columns)
}
