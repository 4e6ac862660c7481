//! Entity metadata registration and compilation.
//!
//! Applications describe their tables as [`EntityDecl`] values — columns,
//! indexes, and relations built with a small builder API — and register them
//! globally with [`register_entity!`]. [`dynamic_schema`] drains the registry
//! once and compiles it into a [`Schema`]; subsequent calls return the cached
//! value. [`compile`] is the pure compilation step and can be called directly
//! with an explicit declaration list.
//!
//! Generated constraint names follow the recipe in [`crate::naming`], so a
//! compiled schema and its introspected counterpart agree on names and
//! diff to nothing once applied.

use std::sync::OnceLock;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{Column, Constraint, Index, ReferentialAction, Schema, Table};
use crate::naming;

/// A normalized default value for a declared column.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Rendered as `TRUE` / `FALSE`.
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Rendered as an ISO-8601 string with millisecond precision.
    Timestamp(DateTime<Utc>),
    /// A SQL expression emitted verbatim (`uuid_generate_v4()`, `now()`,
    /// `'unknown'`).
    Expression(String),
    /// No default; forces the column nullable.
    Null,
}

impl DefaultValue {
    /// Render to the stored default string. `Null` renders to nothing.
    fn render(&self) -> Option<String> {
        match self {
            DefaultValue::Bool(true) => Some("TRUE".to_string()),
            DefaultValue::Bool(false) => Some("FALSE".to_string()),
            DefaultValue::Int(i) => Some(i.to_string()),
            DefaultValue::Float(x) => Some(x.to_string()),
            DefaultValue::Timestamp(ts) => {
                Some(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            DefaultValue::Expression(expr) => Some(expr.clone()),
            DefaultValue::Null => None,
        }
    }
}

/// A declared column on an entity.
#[derive(Debug, Clone, Default)]
pub struct ColumnDecl {
    field_name: String,
    name: Option<String>,
    col_type: Option<String>,
    enum_values: Option<Vec<String>>,
    nullable: bool,
    is_array: bool,
    primary: bool,
    unique: bool,
    default: Option<DefaultValue>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
    indexed: bool,
    index_name: Option<String>,
}

impl ColumnDecl {
    /// Declare a column for the given field. The column name is the field
    /// name unless overridden with [`ColumnDecl::with_name`]; the type
    /// defaults to `character varying`.
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, col_type: impl Into<String>) -> Self {
        self.col_type = Some(col_type.into());
        self
    }

    /// Make this an enum column with the given ordered labels.
    pub fn with_enum<S: Into<String>>(mut self, values: impl IntoIterator<Item = S>) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.numeric_precision = Some(precision);
        self.numeric_scale = Some(scale);
        self
    }

    /// Create a single-column index on this column.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Create a single-column index with an explicit name.
    pub fn indexed_as(mut self, name: impl Into<String>) -> Self {
        self.indexed = true;
        self.index_name = Some(name.into());
        self
    }

    fn column_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.field_name)
    }
}

/// A declared table-level index.
#[derive(Debug, Clone, Default)]
pub struct IndexDecl {
    name: Option<String>,
    column_names: Vec<String>,
    expression: Option<String>,
    using: Option<String>,
    predicate: Option<String>,
    unique: bool,
}

impl IndexDecl {
    pub fn on_columns<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            column_names: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn on_expression(expression: impl Into<String>) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Access method (e.g. `gin`).
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.using = Some(method.into());
        self
    }

    /// Partial-index predicate.
    pub fn where_clause(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }
}

/// A declared many-to-one relation.
///
/// Compiles to a `{property}Id` uuid column plus a foreign key to the
/// target table's primary key.
#[derive(Debug, Clone)]
pub struct RelationDecl {
    property_name: String,
    target: String,
    nullable: bool,
    on_update: ReferentialAction,
    on_delete: ReferentialAction,
}

impl RelationDecl {
    /// Declare a many-to-one relation. `target` is the referenced table
    /// name (or entity name, resolved after the table pass).
    pub fn many_to_one(property_name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            target: target.into(),
            nullable: false,
            on_update: ReferentialAction::NoAction,
            on_delete: ReferentialAction::NoAction,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}

/// A declared entity: one table plus its columns, indexes, and relations.
#[derive(Debug, Clone)]
pub struct EntityDecl {
    name: String,
    table_name: Option<String>,
    columns: Vec<ColumnDecl>,
    indexes: Vec<IndexDecl>,
    relations: Vec<RelationDecl>,
}

impl EntityDecl {
    /// Declare an entity. The table name is the snake_cased entity name
    /// (minus any `Entity` suffix) unless overridden with
    /// [`EntityDecl::with_table_name`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn column(mut self, column: ColumnDecl) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexDecl) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn relation(mut self, relation: RelationDecl) -> Self {
        self.relations.push(relation);
        self
    }

    fn resolved_table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| naming::entity_table_name(&self.name))
    }
}

/// A registered entity constructor, submitted through inventory.
pub struct EntityRegistration {
    build: fn() -> EntityDecl,
}

impl EntityRegistration {
    pub const fn new(build: fn() -> EntityDecl) -> Self {
        Self { build }
    }
}

inventory::collect!(EntityRegistration);

/// Register an entity declaration globally.
///
/// ```ignore
/// fn user_entity() -> EntityDecl {
///     EntityDecl::new("UserEntity")
///         .with_table_name("users")
///         .column(ColumnDecl::new("id").with_type("uuid").primary())
/// }
/// meridian_core::register_entity!(user_entity);
/// ```
#[macro_export]
macro_rules! register_entity {
    ($build:path) => {
        $crate::inventory::submit! {
            $crate::metadata::EntityRegistration::new($build)
        }
    };
}

/// Compile every registered entity into the desired schema.
///
/// Idempotent: the first call compiles, subsequent calls return the cached
/// value. No registrations are observed after the first call.
pub fn dynamic_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let entities: Vec<EntityDecl> = inventory::iter::<EntityRegistration>
            .into_iter()
            .map(|reg| (reg.build)())
            .collect();
        compile(&entities)
    })
}

/// Compile a list of entity declarations into a [`Schema`].
pub fn compile(entities: &[EntityDecl]) -> Schema {
    let mut schema = Schema::default();

    // Pass 1: tables. Entity names map to table names for relation targets.
    let mut entity_tables: Vec<(String, String)> = Vec::new();
    for entity in entities {
        let table_name = entity.resolved_table_name();
        entity_tables.push((entity.name.clone(), table_name.clone()));
        schema.tables.push(Table::new(table_name));
    }

    // Pass 2: columns, plus synthetic UNIQUE constraints for unique columns.
    for entity in entities {
        let table_name = entity.resolved_table_name();
        for decl in &entity.columns {
            let column = compile_column(&table_name, decl);
            let unique = decl.unique && !decl.primary;
            let table = table_mut(&mut schema.tables, &table_name);
            if unique {
                table.constraints.push(Constraint::Unique {
                    name: naming::unique_constraint_name(&table_name, &[column.name.as_str()]),
                    table_name: table_name.clone(),
                    column_names: vec![column.name.clone()],
                });
            }
            table.columns.push(column);
        }
    }

    // Pass 3: primary keys.
    for table in &mut schema.tables {
        let pk_columns: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.name.as_str())
            .collect();
        if !pk_columns.is_empty() {
            table.constraints.push(Constraint::PrimaryKey {
                name: naming::primary_key_name(&table.name, &pk_columns),
                table_name: table.name.clone(),
                column_names: pk_columns.iter().map(|c| c.to_string()).collect(),
            });
        }
    }

    // Pass 4: table-level indexes, then field-level column indexes.
    for entity in entities {
        let table_name = entity.resolved_table_name();
        for decl in &entity.indexes {
            let index = compile_index(&table_name, decl);
            table_mut(&mut schema.tables, &table_name).indexes.push(index);
        }
        for decl in entity.columns.iter().filter(|c| c.indexed) {
            let column_name = decl.column_name().to_string();
            let name = decl
                .index_name
                .clone()
                .unwrap_or_else(|| naming::index_name(&table_name, &[&column_name]));
            table_mut(&mut schema.tables, &table_name).indexes.push(Index {
                name,
                table_name: table_name.clone(),
                unique: false,
                column_names: Some(vec![column_name]),
                expression: None,
                using: None,
                predicate: None,
            });
        }
    }

    // Pass 5: relations. Requires target primary keys, so runs last.
    for entity in entities {
        let table_name = entity.resolved_table_name();
        for relation in &entity.relations {
            let Some(target_table) = resolve_target(&entity_tables, &relation.target) else {
                log::warn!(
                    "Dropping relation to unregistered table; table={}, property={}, target={}",
                    table_name,
                    relation.property_name,
                    relation.target
                );
                continue;
            };
            let reference_column_names = primary_key_columns(&schema.tables, &target_table);
            if reference_column_names.is_empty() {
                log::warn!(
                    "Dropping relation to table without a primary key; table={}, property={}, target={}",
                    table_name,
                    relation.property_name,
                    target_table
                );
                continue;
            }

            let column_name = format!("{}Id", relation.property_name);
            let constraint = Constraint::ForeignKey {
                name: naming::foreign_key_name(&table_name, &[&column_name]),
                table_name: table_name.clone(),
                column_names: vec![column_name.clone()],
                reference_table_name: target_table,
                reference_column_names,
                on_update: relation.on_update,
                on_delete: relation.on_delete,
            };

            let table = table_mut(&mut schema.tables, &table_name);
            if table.get_column(&column_name).is_none() {
                table.columns.push(Column {
                    table_name: table_name.clone(),
                    name: column_name,
                    col_type: "uuid".to_string(),
                    nullable: relation.nullable,
                    is_array: false,
                    primary: false,
                    default: None,
                    values: None,
                    numeric_precision: None,
                    numeric_scale: None,
                });
            }
            table.constraints.push(constraint);
        }
    }

    schema
}

fn compile_column(table_name: &str, decl: &ColumnDecl) -> Column {
    let (col_type, values) = match &decl.enum_values {
        Some(labels) => ("enum".to_string(), Some(labels.clone())),
        None => (
            decl.col_type
                .clone()
                .unwrap_or_else(|| "character varying".to_string()),
            None,
        ),
    };

    let default = decl.default.as_ref().and_then(DefaultValue::render);
    // A null default means "no default, nullable"; a primary column is
    // never nullable.
    let mut nullable = decl.nullable || matches!(decl.default, Some(DefaultValue::Null));
    if decl.primary {
        nullable = false;
    }

    Column {
        table_name: table_name.to_string(),
        name: decl.column_name().to_string(),
        col_type,
        nullable,
        is_array: decl.is_array,
        primary: decl.primary,
        default,
        values,
        numeric_precision: decl.numeric_precision,
        numeric_scale: decl.numeric_scale,
    }
}

fn compile_index(table_name: &str, decl: &IndexDecl) -> Index {
    let column_refs: Vec<&str> = decl.column_names.iter().map(String::as_str).collect();
    let name = decl
        .name
        .clone()
        .unwrap_or_else(|| naming::index_name(table_name, &column_refs));
    Index {
        name,
        table_name: table_name.to_string(),
        unique: decl.unique,
        column_names: if decl.column_names.is_empty() {
            None
        } else {
            Some(decl.column_names.clone())
        },
        expression: decl.expression.clone(),
        using: decl.using.clone(),
        predicate: decl.predicate.clone(),
    }
}

fn table_mut<'a>(tables: &'a mut [Table], name: &str) -> &'a mut Table {
    tables
        .iter_mut()
        .find(|t| t.name == name)
        .expect("table registered in pass 1")
}

/// Resolve a relation target given as either a table name or an entity name.
fn resolve_target(entity_tables: &[(String, String)], target: &str) -> Option<String> {
    entity_tables
        .iter()
        .find(|(entity, table)| table == target || entity == target)
        .map(|(_, table)| table.clone())
}

fn primary_key_columns(tables: &[Table], table_name: &str) -> Vec<String> {
    tables
        .iter()
        .find(|t| t.name == table_name)
        .and_then(|t| {
            t.constraints.iter().find_map(|c| match c {
                Constraint::PrimaryKey { column_names, .. } => Some(column_names.clone()),
                _ => None,
            })
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn users_entity() -> EntityDecl {
        EntityDecl::new("UserEntity")
            .with_table_name("users")
            .column(
                ColumnDecl::new("id")
                    .with_type("uuid")
                    .primary()
                    .with_default(DefaultValue::Expression("uuid_generate_v4()".to_string())),
            )
            .column(ColumnDecl::new("email").unique())
            .column(
                ColumnDecl::new("isAdmin")
                    .with_type("boolean")
                    .with_default(DefaultValue::Bool(false)),
            )
    }

    #[test]
    fn test_table_name_defaults_to_snake_case() {
        let schema = compile(&[EntityDecl::new("SmartSearchEntity")
            .column(ColumnDecl::new("id").with_type("integer").primary())]);
        assert!(schema.get_table("smart_search").is_some());
    }

    #[test]
    fn test_column_type_defaults_to_varchar() {
        let schema = compile(&[users_entity()]);
        let email = schema.get_table("users").unwrap().get_column("email").unwrap();
        assert_eq!(email.col_type, "character varying");
    }

    #[test]
    fn test_boolean_default_is_normalized() {
        let schema = compile(&[users_entity()]);
        let col = schema.get_table("users").unwrap().get_column("isAdmin").unwrap();
        assert_eq!(col.default.as_deref(), Some("FALSE"));
    }

    #[test]
    fn test_timestamp_default_is_iso8601() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap();
        let schema = compile(&[EntityDecl::new("SessionEntity").column(
            ColumnDecl::new("expiresAt")
                .with_type("timestamp with time zone")
                .with_default(DefaultValue::Timestamp(ts)),
        )]);
        let col = schema.get_table("session").unwrap().get_column("expiresAt").unwrap();
        assert_eq!(col.default.as_deref(), Some("2024-01-15T08:30:00.000Z"));
    }

    #[test]
    fn test_null_default_forces_nullable() {
        let schema = compile(&[EntityDecl::new("AssetEntity")
            .column(ColumnDecl::new("duration").with_default(DefaultValue::Null))]);
        let col = schema.get_table("asset").unwrap().get_column("duration").unwrap();
        assert!(col.nullable);
        assert!(col.default.is_none());
    }

    #[test]
    fn test_primary_column_is_not_nullable() {
        let schema = compile(&[EntityDecl::new("UserEntity")
            .column(ColumnDecl::new("id").with_type("uuid").primary().nullable())]);
        let col = schema.get_table("user").unwrap().get_column("id").unwrap();
        assert!(!col.nullable);
    }

    #[test]
    fn test_primary_key_constraint_is_emitted() {
        let schema = compile(&[users_entity()]);
        let table = schema.get_table("users").unwrap();
        let pk = table
            .constraints
            .iter()
            .find(|c| matches!(c, Constraint::PrimaryKey { .. }))
            .unwrap();
        assert_eq!(pk.name().len(), 30);
        assert!(pk.name().starts_with("PK_"));
    }

    #[test]
    fn test_unique_column_emits_synthetic_constraint() {
        let schema = compile(&[users_entity()]);
        let table = schema.get_table("users").unwrap();
        let uq = table
            .constraints
            .iter()
            .find(|c| matches!(c, Constraint::Unique { .. }))
            .unwrap();
        assert!(uq.name().starts_with("UQ_"));
        assert_eq!(uq.name().len(), 30);
        assert_eq!(
            uq.name(),
            &naming::unique_constraint_name("users", &["email"])
        );
    }

    #[test]
    fn test_primary_unique_column_emits_no_unique_constraint() {
        let schema = compile(&[EntityDecl::new("UserEntity")
            .column(ColumnDecl::new("id").with_type("uuid").primary().unique())]);
        let table = schema.get_table("user").unwrap();
        assert!(!table
            .constraints
            .iter()
            .any(|c| matches!(c, Constraint::Unique { .. })));
    }

    #[test]
    fn test_enum_column() {
        let schema = compile(&[EntityDecl::new("AssetEntity").column(
            ColumnDecl::new("status").with_enum(["active", "trashed", "deleted"]),
        )]);
        let col = schema.get_table("asset").unwrap().get_column("status").unwrap();
        assert_eq!(col.col_type, "enum");
        assert_eq!(
            col.values.as_deref(),
            Some(&["active".to_string(), "trashed".to_string(), "deleted".to_string()][..])
        );
    }

    #[test]
    fn test_table_level_index() {
        let schema = compile(&[EntityDecl::new("AssetEntity")
            .column(ColumnDecl::new("ownerId").with_type("uuid"))
            .column(ColumnDecl::new("createdAt").with_type("timestamp with time zone"))
            .index(
                IndexDecl::on_columns(["ownerId", "createdAt"])
                    .named("IDX_asset_owner_created")
                    .unique(),
            )]);
        let table = schema.get_table("asset").unwrap();
        assert_eq!(table.indexes.len(), 1);
        let idx = &table.indexes[0];
        assert_eq!(idx.name, "IDX_asset_owner_created");
        assert!(idx.unique);
        assert_eq!(
            idx.column_names.as_deref(),
            Some(&["ownerId".to_string(), "createdAt".to_string()][..])
        );
    }

    #[test]
    fn test_field_level_index_gets_generated_name() {
        let schema = compile(&[EntityDecl::new("AssetEntity")
            .column(ColumnDecl::new("ownerId").with_type("uuid").indexed())]);
        let table = schema.get_table("asset").unwrap();
        assert_eq!(table.indexes.len(), 1);
        assert_eq!(table.indexes[0].name, naming::index_name("asset", &["ownerId"]));
    }

    #[test]
    fn test_relation_creates_column_and_foreign_key() {
        let schema = compile(&[
            users_entity(),
            EntityDecl::new("AssetEntity")
                .column(ColumnDecl::new("id").with_type("uuid").primary())
                .relation(
                    RelationDecl::many_to_one("owner", "users")
                        .on_delete(ReferentialAction::Cascade)
                        .on_update(ReferentialAction::Cascade),
                ),
        ]);
        let asset = schema.get_table("asset").unwrap();

        let column = asset.get_column("ownerId").unwrap();
        assert_eq!(column.col_type, "uuid");
        assert!(!column.nullable);

        let fk = asset
            .constraints
            .iter()
            .find_map(|c| match c {
                Constraint::ForeignKey {
                    name,
                    reference_table_name,
                    reference_column_names,
                    on_delete,
                    ..
                } => Some((name, reference_table_name, reference_column_names, on_delete)),
                _ => None,
            })
            .unwrap();
        assert!(fk.0.starts_with("FK_"));
        assert_eq!(fk.0.len(), 30);
        assert_eq!(fk.1, "users");
        assert_eq!(fk.2, &["id".to_string()]);
        assert_eq!(*fk.3, ReferentialAction::Cascade);
    }

    #[test]
    fn test_relation_does_not_duplicate_declared_column() {
        let schema = compile(&[
            users_entity(),
            EntityDecl::new("AssetEntity")
                .column(ColumnDecl::new("id").with_type("uuid").primary())
                .column(ColumnDecl::new("ownerId").with_type("uuid"))
                .relation(RelationDecl::many_to_one("owner", "users")),
        ]);
        let asset = schema.get_table("asset").unwrap();
        assert_eq!(
            asset.columns.iter().filter(|c| c.name == "ownerId").count(),
            1
        );
    }

    #[test]
    fn test_relation_to_unregistered_table_is_dropped() {
        let schema = compile(&[EntityDecl::new("AssetEntity")
            .column(ColumnDecl::new("id").with_type("uuid").primary())
            .relation(RelationDecl::many_to_one("owner", "nowhere"))]);
        let asset = schema.get_table("asset").unwrap();
        assert!(asset.get_column("ownerId").is_none());
        assert!(!asset
            .constraints
            .iter()
            .any(|c| matches!(c, Constraint::ForeignKey { .. })));
    }

    #[test]
    fn test_relation_resolves_entity_name() {
        let schema = compile(&[
            users_entity(),
            EntityDecl::new("SessionEntity")
                .column(ColumnDecl::new("id").with_type("uuid").primary())
                .relation(RelationDecl::many_to_one("user", "UserEntity").nullable()),
        ]);
        let session = schema.get_table("session").unwrap();
        let column = session.get_column("userId").unwrap();
        assert!(column.nullable);
    }

    #[test]
    fn test_compile_is_pure() {
        let entities = vec![users_entity()];
        assert_eq!(compile(&entities), compile(&entities));
    }
}
