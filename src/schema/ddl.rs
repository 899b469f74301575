//! DDL rendering with sea-query.

use std::sync::Arc;

use sea_query::{
    Alias, ColumnDef, Expr, ForeignKey, ForeignKeyAction, ForeignKeyCreateStatement, Index,
    PostgresQueryBuilder, SchemaStatementBuilder, SqliteQueryBuilder, Table,
};

use crate::meta::{Attribute, ReferentialAction, Type};
use crate::sql::{BuilderOptions, Dialect};
use crate::value::FieldType;

/// An index the model declares on one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<Arc<Attribute>>,
    pub unique: bool,
}

/// Renders DDL for one dialect, applying the configured name transforms
pub(crate) struct DdlWriter<'a> {
    dialect: Dialect,
    options: &'a BuilderOptions,
}

impl<'a> DdlWriter<'a> {
    pub(crate) fn new(dialect: Dialect, options: &'a BuilderOptions) -> Self {
        Self { dialect, options }
    }

    pub(crate) fn table_name(&self, ty: &Type) -> String {
        self.options.transform_table(ty.name())
    }

    pub(crate) fn column_name(&self, attribute: &Attribute) -> String {
        self.options.transform_column(attribute.name())
    }

    pub(crate) fn create_table(&self, ty: &Type, if_not_exists: bool) -> String {
        let table = self.table_name(ty);
        let keys = ty.key_attributes();
        let inline_key = keys.len() == 1;

        let mut stmt = Table::create();
        stmt.table(Alias::new(&table));
        if if_not_exists {
            stmt.if_not_exists();
        }
        for attribute in ty.columns() {
            let mut def = self.column_def(attribute, inline_key && attribute.is_key());
            if !attribute.is_nullable() && !attribute.is_key() {
                def.not_null();
            }
            stmt.col(def);
        }
        if keys.len() > 1 {
            let mut primary = Index::create();
            for key in &keys {
                primary.col(Alias::new(self.column_name(key)));
            }
            stmt.primary_key(&mut primary);
        }
        for attribute in ty.columns().filter(|a| a.is_foreign_key()) {
            stmt.foreign_key(&mut self.foreign_key(&table, attribute));
        }
        self.render(&stmt)
    }

    pub(crate) fn drop_table(&self, ty: &Type) -> String {
        let stmt = Table::drop()
            .table(Alias::new(self.table_name(ty)))
            .if_exists()
            .to_owned();
        self.render(&stmt)
    }

    /// `ALTER TABLE … ADD COLUMN`, plus a separate constraint statement for a
    /// foreign key where the platform can add one to an existing table
    ///
    /// A column added to a table that may hold rows is only `NOT NULL` when it
    /// has a default.
    pub(crate) fn add_column(
        &self,
        ty: &Type,
        attribute: &Attribute,
        separate_constraint: bool,
    ) -> Vec<String> {
        let table = self.table_name(ty);
        let mut def = self.column_def(attribute, false);
        if !attribute.is_nullable() && attribute.default_value().is_some() {
            def.not_null();
        }
        let mut statements = Vec::with_capacity(2);
        let inline_reference = attribute.is_foreign_key() && !separate_constraint;
        if inline_reference {
            if let Some(fk) = attribute.foreign_key() {
                let mut clause = format!(
                    "REFERENCES \"{}\" (\"{}\")",
                    self.options.transform_table(&fk.referenced_type),
                    self.options.transform_column(&fk.referenced_column)
                );
                clause.push_str(&action_clause("ON DELETE", fk.on_delete));
                clause.push_str(&action_clause("ON UPDATE", fk.on_update));
                def.extra(clause);
            }
        }
        let stmt = Table::alter()
            .table(Alias::new(&table))
            .add_column(def)
            .to_owned();
        statements.push(self.render(&stmt));
        if attribute.is_foreign_key() && separate_constraint {
            statements.push(self.render(&self.foreign_key(&table, attribute)));
        }
        statements
    }

    pub(crate) fn drop_column(&self, ty: &Type, attribute: &Attribute) -> String {
        let stmt = Table::alter()
            .table(Alias::new(self.table_name(ty)))
            .drop_column(Alias::new(self.column_name(attribute)))
            .to_owned();
        self.render(&stmt)
    }

    pub(crate) fn create_index(&self, ty: &Type, spec: &IndexSpec, if_not_exists: bool) -> String {
        let mut stmt = Index::create();
        stmt.name(&spec.name).table(Alias::new(self.table_name(ty)));
        for column in &spec.columns {
            stmt.col(Alias::new(self.column_name(column)));
        }
        if spec.unique {
            stmt.unique();
        }
        if if_not_exists {
            stmt.if_not_exists();
        }
        self.render(&stmt)
    }

    /// Indexes declared on `ty`: unique columns that are not otherwise indexed
    /// come first, then the declared indexes. Attributes sharing an index name
    /// form one composite index.
    pub(crate) fn indexes(&self, ty: &Type) -> Vec<IndexSpec> {
        let table = self.table_name(ty);
        let mut unique = Vec::new();
        let mut declared: Vec<IndexSpec> = Vec::new();
        for attribute in ty.columns().filter(|a| !a.is_key()) {
            let default_name = format!("idx_{}_{}", table, self.column_name(attribute));
            if attribute.is_unique() && !attribute.is_indexed() {
                unique.push(IndexSpec {
                    name: default_name,
                    columns: vec![Arc::clone(attribute)],
                    unique: true,
                });
                continue;
            }
            if !attribute.is_indexed() {
                continue;
            }
            if attribute.index_names().is_empty() {
                declared.push(IndexSpec {
                    name: default_name,
                    columns: vec![Arc::clone(attribute)],
                    unique: attribute.is_unique(),
                });
            }
            for name in attribute.index_names() {
                match declared.iter_mut().find(|spec| &spec.name == name) {
                    Some(spec) => {
                        spec.unique &= attribute.is_unique();
                        spec.columns.push(Arc::clone(attribute));
                    }
                    None => declared.push(IndexSpec {
                        name: name.clone(),
                        columns: vec![Arc::clone(attribute)],
                        unique: attribute.is_unique(),
                    }),
                }
            }
        }
        unique.extend(declared);
        unique
    }

    fn column_def(&self, attribute: &Attribute, primary_key: bool) -> ColumnDef {
        let mut def = ColumnDef::new(Alias::new(self.column_name(attribute)));
        let generated = primary_key && attribute.is_generated();
        if generated && self.dialect == Dialect::Sqlite {
            // only INTEGER PRIMARY KEY aliases the rowid
            def.integer();
        } else {
            self.column_type(&mut def, attribute);
        }
        if primary_key {
            def.primary_key();
            if generated {
                def.auto_increment();
            }
        }
        if let Some(default) = attribute.default_value() {
            def.default(Expr::cust(default));
        }
        def
    }

    fn column_type(&self, def: &mut ColumnDef, attribute: &Attribute) {
        match attribute.field_type() {
            FieldType::Boolean => def.boolean(),
            FieldType::SmallInt => def.small_integer(),
            FieldType::Integer => def.integer(),
            FieldType::BigInt => def.big_integer(),
            FieldType::Float => def.float(),
            FieldType::Double => def.double(),
            FieldType::Decimal => def.decimal(),
            FieldType::Text => def.text(),
            FieldType::Varchar => match attribute.length() {
                Some(length) => def.string_len(length),
                None => def.string(),
            },
            FieldType::Blob => match self.dialect {
                Dialect::Sqlite => def.custom(Alias::new("BLOB")),
                Dialect::Postgres => def.custom(Alias::new("BYTEA")),
            },
            FieldType::Date => def.date(),
            FieldType::Time => def.time(),
            FieldType::Timestamp => def.timestamp(),
            FieldType::TimestampTz => def.timestamp_with_time_zone(),
            FieldType::Uuid => def.uuid(),
            FieldType::Json => def.json(),
        };
    }

    fn foreign_key(&self, table: &str, attribute: &Attribute) -> ForeignKeyCreateStatement {
        let mut stmt = ForeignKey::create();
        let column = self.column_name(attribute);
        stmt.name(format!("fk_{table}_{column}"))
            .from(Alias::new(table), Alias::new(&column));
        if let Some(fk) = attribute.foreign_key() {
            stmt.to(
                Alias::new(self.options.transform_table(&fk.referenced_type)),
                Alias::new(self.options.transform_column(&fk.referenced_column)),
            );
            if let Some(action) = foreign_key_action(fk.on_delete) {
                stmt.on_delete(action);
            }
            if let Some(action) = foreign_key_action(fk.on_update) {
                stmt.on_update(action);
            }
        }
        stmt
    }

    fn render(&self, stmt: &impl SchemaStatementBuilder) -> String {
        match self.dialect {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
        }
    }
}

fn foreign_key_action(action: ReferentialAction) -> Option<ForeignKeyAction> {
    match action {
        ReferentialAction::NoAction => None,
        ReferentialAction::Restrict => Some(ForeignKeyAction::Restrict),
        ReferentialAction::Cascade => Some(ForeignKeyAction::Cascade),
        ReferentialAction::SetNull => Some(ForeignKeyAction::SetNull),
        ReferentialAction::SetDefault => Some(ForeignKeyAction::SetDefault),
    }
}

fn action_clause(prefix: &str, action: ReferentialAction) -> String {
    let action = match action {
        ReferentialAction::NoAction => return String::new(),
        ReferentialAction::Restrict => "RESTRICT",
        ReferentialAction::Cascade => "CASCADE",
        ReferentialAction::SetNull => "SET NULL",
        ReferentialAction::SetDefault => "SET DEFAULT",
    };
    format!(" {prefix} {action}")
}
