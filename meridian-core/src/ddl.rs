//! DDL generation - map each schema change to executable PostgreSQL.
//!
//! Every identifier is double-quoted. Constraint and index column lists are
//! sorted lexicographically before quoting, so emitted statements are stable
//! regardless of declaration order. CREATE TABLE preserves the declared
//! column order.
//!
//! Two oddities are deliberate and covered by tests: `CREATE INDEX` is the
//! only statement emitted without a terminating semicolon, and a
//! `column.update` change produces SQL only for nullability transitions
//! (type, default, primary, and array-flag changes surface in the diff
//! artifact but must be handled out-of-band).

use crate::db::quote_ident;
use crate::model::{Change, Column, Constraint, Index};

/// Render the change list to SQL statements, one or more per change,
/// preserving change order.
pub fn to_sql(changes: &[Change]) -> Vec<String> {
    changes.iter().flat_map(change_to_sql).collect()
}

fn change_to_sql(change: &Change) -> Vec<String> {
    match change {
        Change::CreateTable {
            table_name,
            columns,
        } => {
            let column_defs: Vec<String> = columns.iter().map(column_definition).collect();
            vec![format!(
                "CREATE TABLE {} ({});",
                quote_ident(table_name),
                column_defs.join(", ")
            )]
        }
        Change::DropTable { table_name } => {
            vec![format!("DROP TABLE {};", quote_ident(table_name))]
        }
        Change::AddColumn { column } => {
            vec![format!(
                "ALTER TABLE {} ADD {};",
                quote_ident(&column.table_name),
                column_definition(column)
            )]
        }
        Change::AlterColumn { source, target } => alter_column_sql(source, target),
        Change::DropColumn {
            table_name,
            column_name,
        } => {
            vec![format!(
                "ALTER TABLE {} DROP COLUMN {};",
                quote_ident(table_name),
                quote_ident(column_name)
            )]
        }
        Change::AddConstraint { constraint } => vec![add_constraint_sql(constraint)],
        Change::DropConstraint {
            table_name,
            constraint_name,
        } => {
            vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {};",
                quote_ident(table_name),
                quote_ident(constraint_name)
            )]
        }
        Change::AddIndex { index } => vec![create_index_sql(index)],
        Change::DropIndex { index_name } => {
            vec![format!("DROP INDEX {};", quote_ident(index_name))]
        }
    }
}

/// `"<name>" <type>[ NOT NULL][ DEFAULT <default>]`
fn column_definition(column: &Column) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.col_type);
    if column.is_array {
        def.push_str("[]");
    }
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(ref default) = column.default {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    def
}

/// Only nullability transitions have an ALTER rendering in this release.
fn alter_column_sql(source: &Column, target: &Column) -> Vec<String> {
    if source.nullable == target.nullable {
        return Vec::new();
    }
    if source.nullable {
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
            quote_ident(&target.table_name),
            quote_ident(&target.name)
        )]
    } else {
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
            quote_ident(&target.table_name),
            quote_ident(&target.name)
        )]
    }
}

fn add_constraint_sql(constraint: &Constraint) -> String {
    match constraint {
        Constraint::PrimaryKey {
            name,
            table_name,
            column_names,
        } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({});",
            quote_ident(table_name),
            quote_ident(name),
            quoted_column_list(column_names)
        ),
        Constraint::ForeignKey {
            name,
            table_name,
            column_names,
            reference_table_name,
            reference_column_names,
            on_update,
            on_delete,
        } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {};",
            quote_ident(table_name),
            quote_ident(name),
            quoted_column_list(column_names),
            quote_ident(reference_table_name),
            quoted_column_list(reference_column_names),
            on_delete.as_sql(),
            on_update.as_sql()
        ),
        Constraint::Unique {
            name,
            table_name,
            column_names,
        } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
            quote_ident(table_name),
            quote_ident(name),
            quoted_column_list(column_names)
        ),
        Constraint::Check {
            name,
            table_name,
            expression,
        } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({});",
            quote_ident(table_name),
            quote_ident(name),
            expression
        ),
    }
}

/// `CREATE[ UNIQUE] INDEX "<N>" ON "<T>"[ (<cols>)][ USING <using>]
/// [ (<expression>)][ WHERE <where>]` — no terminating semicolon.
fn create_index_sql(index: &Index) -> String {
    let mut sql = format!(
        "CREATE {}INDEX {} ON {}",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(&index.table_name)
    );
    if let Some(ref column_names) = index.column_names {
        sql.push_str(&format!(" ({})", quoted_column_list(column_names)));
    }
    if let Some(ref using) = index.using {
        sql.push_str(&format!(" USING {}", using));
    }
    if let Some(ref expression) = index.expression {
        sql.push_str(&format!(" ({})", expression));
    }
    if let Some(ref predicate) = index.predicate {
        sql.push_str(&format!(" WHERE {}", predicate));
    }
    sql
}

/// Sort lexicographically, quote, comma-join.
fn quoted_column_list(column_names: &[String]) -> String {
    let mut sorted: Vec<&String> = column_names.iter().collect();
    sorted.sort();
    sorted
        .iter()
        .map(|name| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ")
}
