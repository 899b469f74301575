//! Live schema introspection.

use std::collections::HashSet;

use crate::driver::Connection;
use crate::error::{QuarryError, Result};
use crate::sql::Dialect;
use crate::value::Value;

/// Reads what the database currently has
///
/// Names are returned lowercased so they can be compared with the model
/// regardless of how the database folds identifiers.
pub trait Catalog: Send + Sync {
    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool>;

    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<HashSet<String>>;

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<HashSet<String>>;
}

pub fn catalog_for(dialect: Dialect) -> Box<dyn Catalog> {
    match dialect {
        Dialect::Sqlite => Box::new(SqliteCatalog),
        Dialect::Postgres => Box::new(PostgresCatalog),
    }
}

/// `sqlite_master` and `PRAGMA table_info` / `index_list`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCatalog;

impl Catalog for SqliteCatalog {
    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool> {
        let count = first_integer(
            conn,
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?)",
            &[Value::from(table)],
        )?;
        Ok(count > 0)
    }

    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<HashSet<String>> {
        names(conn, &format!("PRAGMA table_info({})", pragma_arg(table)), &[], 1)
    }

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<HashSet<String>> {
        names(conn, &format!("PRAGMA index_list({})", pragma_arg(table)), &[], 1)
    }
}

/// `information_schema` and `pg_indexes` of the current schema
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCatalog;

impl Catalog for PostgresCatalog {
    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool> {
        let count = first_integer(
            conn,
            "SELECT count(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND lower(table_name) = lower($1)",
            &[Value::from(table)],
        )?;
        Ok(count > 0)
    }

    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<HashSet<String>> {
        names(
            conn,
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND lower(table_name) = lower($1)",
            &[Value::from(table)],
            0,
        )
    }

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<HashSet<String>> {
        names(
            conn,
            "SELECT indexname FROM pg_indexes \
             WHERE schemaname = current_schema() AND lower(tablename) = lower($1)",
            &[Value::from(table)],
            0,
        )
    }
}

fn pragma_arg(table: &str) -> String {
    format!("'{}'", table.replace('\'', "''"))
}

fn first_integer(conn: &mut dyn Connection, sql: &str, params: &[Value]) -> Result<i64> {
    let mut cursor = conn
        .query(sql, params)
        .map_err(|e| QuarryError::statement(sql, e))?;
    let row = cursor.next_row()?;
    cursor.close();
    match row.and_then(|r| r.into_iter().next()) {
        Some(value) => value.into_typed(),
        None => Ok(0),
    }
}

fn names(
    conn: &mut dyn Connection,
    sql: &str,
    params: &[Value],
    column: usize,
) -> Result<HashSet<String>> {
    let mut cursor = conn
        .query(sql, params)
        .map_err(|e| QuarryError::statement(sql, e))?;
    let mut names = HashSet::new();
    while let Some(row) = cursor.next_row()? {
        if let Some(name) = row.get(column).and_then(Value::as_str) {
            names.insert(name.to_ascii_lowercase());
        }
    }
    Ok(names)
}
