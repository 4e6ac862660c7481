//! Schema model shared by the catalog introspector and the metadata compiler.
//!
//! Both producers normalize into these value types, which makes the diff
//! engine independent of where a schema came from. Values are built once per
//! load and never mutated; equality is structural.

use serde::Serialize;

/// A named schema namespace and the tables it contains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    /// Namespace name (`public` unless configured otherwise).
    pub name: String,
    /// Tables in the namespace, unique by name.
    pub tables: Vec<Table>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            name: "public".to_string(),
            tables: Vec::new(),
        }
    }
}

impl Schema {
    /// Create an empty schema for the given namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    /// Look up a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// A copy of this schema containing only the tables named in `keep`.
    pub fn retain_tables(&self, keep: &[&str]) -> Schema {
        Schema {
            name: self.name.clone(),
            tables: self
                .tables
                .iter()
                .filter(|t| keep.contains(&t.name.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// A single table: ordered columns plus its indexes and constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    /// Table name, unique within the schema.
    pub name: String,
    /// Columns in declaration order (preserved for CREATE TABLE emission).
    pub columns: Vec<Column>,
    /// Indexes, unique by name, excluding those backing PK/UNIQUE constraints.
    pub indexes: Vec<Index>,
    /// Constraints, unique by (type, name).
    pub constraints: Vec<Constraint>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A table column.
///
/// `col_type` holds the PostgreSQL type name verbatim (`character varying`,
/// `timestamp with time zone`, …). Enum-valued columns use `enum` with the
/// ordered labels in `values`; array columns carry the element type with
/// `is_array` set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub table_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
    pub nullable: bool,
    pub is_array: bool,
    pub primary: bool,
    /// Default expression, verbatim (`now()`, `TRUE`, `0`). None means no
    /// DEFAULT clause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Ordered enum labels; present iff `col_type` is `enum`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<i32>,
}

/// A secondary index. Exactly one of `column_names` / `expression` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub table_name: String,
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_names: Option<Vec<String>>,
    /// Functional-index expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Access method when not the default btree (e.g. `gin`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub using: Option<String>,
    /// Partial-index predicate.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ReferentialAction {
    #[default]
    #[serde(rename = "NO ACTION")]
    NoAction,
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

impl ReferentialAction {
    /// Map a `pg_constraint.confupdtype` / `confdeltype` code. Unknown codes
    /// fall back to `NO ACTION`.
    pub fn from_code(code: char) -> Self {
        match code {
            'c' => ReferentialAction::Cascade,
            'r' => ReferentialAction::Restrict,
            'n' => ReferentialAction::SetNull,
            'd' => ReferentialAction::SetDefault,
            _ => ReferentialAction::NoAction,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl std::fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A table constraint, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Constraint {
    #[serde(rename = "PRIMARY_KEY", rename_all = "camelCase")]
    PrimaryKey {
        name: String,
        table_name: String,
        column_names: Vec<String>,
    },
    #[serde(rename = "FOREIGN_KEY", rename_all = "camelCase")]
    ForeignKey {
        name: String,
        table_name: String,
        column_names: Vec<String>,
        reference_table_name: String,
        reference_column_names: Vec<String>,
        on_update: ReferentialAction,
        on_delete: ReferentialAction,
    },
    #[serde(rename = "UNIQUE", rename_all = "camelCase")]
    Unique {
        name: String,
        table_name: String,
        column_names: Vec<String>,
    },
    /// Predicate text without the leading `CHECK` keyword.
    #[serde(rename = "CHECK", rename_all = "camelCase")]
    Check {
        name: String,
        table_name: String,
        expression: String,
    },
}

/// Constraint kind discriminant, used to partition constraints before
/// name-keyed comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

impl Constraint {
    pub fn name(&self) -> &str {
        match self {
            Constraint::PrimaryKey { name, .. }
            | Constraint::ForeignKey { name, .. }
            | Constraint::Unique { name, .. }
            | Constraint::Check { name, .. } => name,
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            Constraint::PrimaryKey { table_name, .. }
            | Constraint::ForeignKey { table_name, .. }
            | Constraint::Unique { table_name, .. }
            | Constraint::Check { table_name, .. } => table_name,
        }
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::PrimaryKey { .. } => ConstraintKind::PrimaryKey,
            Constraint::ForeignKey { .. } => ConstraintKind::ForeignKey,
            Constraint::Unique { .. } => ConstraintKind::Unique,
            Constraint::Check { .. } => ConstraintKind::Check,
        }
    }
}

/// One structural change in the diff output; the unit of SQL emission.
///
/// Serialized tags match the artifact format consumed by tooling downstream
/// of `schema-diff.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Change {
    #[serde(rename = "table.create", rename_all = "camelCase")]
    CreateTable {
        table_name: String,
        columns: Vec<Column>,
    },
    #[serde(rename = "table.delete", rename_all = "camelCase")]
    DropTable { table_name: String },
    #[serde(rename = "column.create")]
    AddColumn { column: Column },
    #[serde(rename = "column.update")]
    AlterColumn { source: Column, target: Column },
    #[serde(rename = "column.delete", rename_all = "camelCase")]
    DropColumn {
        table_name: String,
        column_name: String,
    },
    #[serde(rename = "constraint.create")]
    AddConstraint { constraint: Constraint },
    #[serde(rename = "constraint.delete", rename_all = "camelCase")]
    DropConstraint {
        table_name: String,
        constraint_name: String,
    },
    #[serde(rename = "index.create")]
    AddIndex { index: Index },
    #[serde(rename = "index.delete", rename_all = "camelCase")]
    DropIndex { index_name: String },
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::CreateTable {
                table_name,
                columns,
            } => write!(f, "+ TABLE {} ({} columns)", table_name, columns.len()),
            Change::DropTable { table_name } => write!(f, "- TABLE {}", table_name),
            Change::AddColumn { column } => {
                write!(
                    f,
                    "+ COLUMN {}.{} ({})",
                    column.table_name, column.name, column.col_type
                )
            }
            Change::AlterColumn { target, .. } => {
                write!(f, "~ COLUMN {}.{}", target.table_name, target.name)
            }
            Change::DropColumn {
                table_name,
                column_name,
            } => write!(f, "- COLUMN {}.{}", table_name, column_name),
            Change::AddConstraint { constraint } => {
                write!(
                    f,
                    "+ CONSTRAINT {} ON {}",
                    constraint.name(),
                    constraint.table_name()
                )
            }
            Change::DropConstraint {
                table_name,
                constraint_name,
            } => write!(f, "- CONSTRAINT {} ON {}", constraint_name, table_name),
            Change::AddIndex { index } => {
                write!(f, "+ INDEX {} ON {}", index.name, index.table_name)
            }
            Change::DropIndex { index_name } => write!(f, "- INDEX {}", index_name),
        }
    }
}
