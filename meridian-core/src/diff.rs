//! Schema diffing - compare the desired (metadata) schema against the
//! observed (database) schema.
//!
//! `source` is the desired state and `target` the observed state; the
//! returned changes transform the target into the source, in application
//! order. Structural changes that cannot be expressed as an in-place ALTER
//! (constraint shape, index shape, column type) become a drop-and-recreate
//! pair, delete first.

use std::collections::HashSet;

use crate::model::{Change, Column, Constraint, ConstraintKind, Index, Schema, Table};

/// Options controlling a diff run.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Leave database tables alone when the metadata does not mention them.
    /// On by default: third-party tables routinely share the namespace
    /// (extensions, job queues), and dropping them would be destructive.
    pub ignore_extra_tables: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            ignore_extra_tables: true,
        }
    }
}

/// Compute the ordered change list that transforms `target` into `source`.
pub fn diff(source: &Schema, target: &Schema, options: &DiffOptions) -> Vec<Change> {
    let mut changes = Vec::new();

    for table in &source.tables {
        match target.get_table(&table.name) {
            None => changes.extend(create_table_changes(table)),
            Some(existing) => {
                changes.extend(diff_columns(table, existing));
                changes.extend(diff_constraints(table, existing));
                changes.extend(diff_indexes(table, existing));
            }
        }
    }

    for table in &target.tables {
        if source.get_table(&table.name).is_none() {
            if options.ignore_extra_tables {
                log::debug!("Ignoring extra database table; table={}", table.name);
            } else {
                changes.push(Change::DropTable {
                    table_name: table.name.clone(),
                });
            }
        }
    }

    changes
}

/// Changes for a table that does not exist yet: the CREATE TABLE carries the
/// columns, then indexes, then constraints as separate changes.
fn create_table_changes(table: &Table) -> Vec<Change> {
    let mut changes = vec![Change::CreateTable {
        table_name: table.name.clone(),
        columns: table.columns.clone(),
    }];
    for index in &table.indexes {
        changes.push(Change::AddIndex {
            index: index.clone(),
        });
    }
    for constraint in &table.constraints {
        changes.push(Change::AddConstraint {
            constraint: constraint.clone(),
        });
    }
    changes
}

fn diff_columns(source: &Table, target: &Table) -> Vec<Change> {
    let mut changes = Vec::new();

    for key in union_of_names(
        source.columns.iter().map(|c| c.name.as_str()),
        target.columns.iter().map(|c| c.name.as_str()),
    ) {
        match (source.get_column(&key), target.get_column(&key)) {
            (Some(column), None) => changes.push(Change::AddColumn {
                column: column.clone(),
            }),
            (None, Some(_)) => changes.push(Change::DropColumn {
                table_name: target.name.clone(),
                column_name: key,
            }),
            (Some(desired), Some(current)) => {
                if desired.col_type != current.col_type {
                    // No data migration across type changes; recreate.
                    changes.push(Change::DropColumn {
                        table_name: target.name.clone(),
                        column_name: key,
                    });
                    changes.push(Change::AddColumn {
                        column: desired.clone(),
                    });
                } else if columns_differ(desired, current) {
                    changes.push(Change::AlterColumn {
                        source: desired.clone(),
                        target: current.clone(),
                    });
                }
            }
            (None, None) => unreachable!("key came from the union"),
        }
    }

    changes
}

/// Comparison fields for columns of identical type. Precision and scale are
/// informational and not compared.
fn columns_differ(a: &Column, b: &Column) -> bool {
    a.nullable != b.nullable
        || a.primary != b.primary
        || a.default != b.default
        || a.is_array != b.is_array
}

fn diff_constraints(source: &Table, target: &Table) -> Vec<Change> {
    let mut changes = Vec::new();

    // Constraints are compared within their kind; a PK and a CHECK sharing a
    // name are unrelated objects.
    for kind in [
        ConstraintKind::PrimaryKey,
        ConstraintKind::ForeignKey,
        ConstraintKind::Unique,
        ConstraintKind::Check,
    ] {
        let source_constraints: Vec<&Constraint> = source
            .constraints
            .iter()
            .filter(|c| c.kind() == kind)
            .collect();
        let target_constraints: Vec<&Constraint> = target
            .constraints
            .iter()
            .filter(|c| c.kind() == kind)
            .collect();

        for key in union_of_names(
            source_constraints.iter().map(|c| c.name()),
            target_constraints.iter().map(|c| c.name()),
        ) {
            let in_source = source_constraints.iter().find(|c| c.name() == key);
            let in_target = target_constraints.iter().find(|c| c.name() == key);
            match (in_source, in_target) {
                (Some(constraint), None) => changes.push(Change::AddConstraint {
                    constraint: (*constraint).clone(),
                }),
                (None, Some(_)) => changes.push(Change::DropConstraint {
                    table_name: target.name.clone(),
                    constraint_name: key,
                }),
                (Some(desired), Some(current)) => {
                    if !constraints_equal(desired, current) {
                        changes.push(Change::DropConstraint {
                            table_name: target.name.clone(),
                            constraint_name: key,
                        });
                        changes.push(Change::AddConstraint {
                            constraint: (*desired).clone(),
                        });
                    }
                }
                (None, None) => unreachable!("key came from the union"),
            }
        }
    }

    changes
}

/// Structural constraint equality. Column lists compare as sets: the catalog
/// does not preserve declaration order.
fn constraints_equal(a: &Constraint, b: &Constraint) -> bool {
    match (a, b) {
        (
            Constraint::PrimaryKey {
                table_name: a_table,
                column_names: a_columns,
                ..
            },
            Constraint::PrimaryKey {
                table_name: b_table,
                column_names: b_columns,
                ..
            },
        ) => a_table == b_table && same_name_set(a_columns, b_columns),
        (
            Constraint::ForeignKey {
                table_name: a_table,
                column_names: a_columns,
                reference_table_name: a_ref_table,
                reference_column_names: a_ref_columns,
                on_update: a_on_update,
                on_delete: a_on_delete,
                ..
            },
            Constraint::ForeignKey {
                table_name: b_table,
                column_names: b_columns,
                reference_table_name: b_ref_table,
                reference_column_names: b_ref_columns,
                on_update: b_on_update,
                on_delete: b_on_delete,
                ..
            },
        ) => {
            a_table == b_table
                && a_ref_table == b_ref_table
                && a_on_update == b_on_update
                && a_on_delete == b_on_delete
                && same_name_set(a_columns, b_columns)
                && same_name_set(a_ref_columns, b_ref_columns)
        }
        (
            Constraint::Unique {
                column_names: a_columns,
                ..
            },
            Constraint::Unique {
                column_names: b_columns,
                ..
            },
        ) => same_name_set(a_columns, b_columns),
        (
            Constraint::Check {
                expression: a_expression,
                ..
            },
            Constraint::Check {
                expression: b_expression,
                ..
            },
        ) => a_expression == b_expression,
        _ => false,
    }
}

fn diff_indexes(source: &Table, target: &Table) -> Vec<Change> {
    let mut changes = Vec::new();

    for key in union_of_names(
        source.indexes.iter().map(|i| i.name.as_str()),
        target.indexes.iter().map(|i| i.name.as_str()),
    ) {
        let in_source = source.indexes.iter().find(|i| i.name == key);
        let in_target = target.indexes.iter().find(|i| i.name == key);
        match (in_source, in_target) {
            (Some(index), None) => changes.push(Change::AddIndex {
                index: index.clone(),
            }),
            (None, Some(_)) => changes.push(Change::DropIndex { index_name: key }),
            (Some(desired), Some(current)) => {
                if !indexes_equal(desired, current) {
                    changes.push(Change::DropIndex { index_name: key });
                    changes.push(Change::AddIndex {
                        index: desired.clone(),
                    });
                }
            }
            (None, None) => unreachable!("key came from the union"),
        }
    }

    changes
}

/// Index equality over columns (as sets), expression, uniqueness, and
/// predicate. The access method is not compared: changing only `using`
/// produces no diff.
fn indexes_equal(a: &Index, b: &Index) -> bool {
    let columns_match = match (&a.column_names, &b.column_names) {
        (Some(a_columns), Some(b_columns)) => same_name_set(a_columns, b_columns),
        (None, None) => true,
        _ => false,
    };
    columns_match && a.expression == b.expression && a.unique == b.unique && a.predicate == b.predicate
}

/// Union of two name sequences, source order first, then target-only names
/// in their own order. Deterministic for deterministic inputs.
fn union_of_names<'a>(
    source: impl Iterator<Item = &'a str>,
    target: impl Iterator<Item = &'a str>,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut union = Vec::new();
    for name in source.chain(target) {
        if seen.insert(name) {
            union.push(name.to_string());
        }
    }
    union
}

fn same_name_set(a: &[String], b: &[String]) -> bool {
    let a_set: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b_set: HashSet<&str> = b.iter().map(String::as_str).collect();
    a_set == b_set
}
