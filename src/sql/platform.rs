//! Database platforms: the dialect differences the generator and schema code care about.

use std::fmt;

/// Dialect family, used to pick the sea-query backend and the catalog queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// Capabilities of the target database
pub trait Platform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn dialect(&self) -> Dialect;

    /// Placeholder for the parameter at one-based `index`
    fn placeholder(&self, index: usize) -> String;

    /// `ALTER TABLE … ADD CONSTRAINT … FOREIGN KEY` is available
    fn supports_add_constraint(&self) -> bool;

    /// `ON CONFLICT (…) DO UPDATE`
    fn supports_upsert(&self) -> bool {
        true
    }

    /// `INSERT … RETURNING`
    fn supports_returning(&self) -> bool {
        true
    }

    /// `OFFSET` is only valid after a `LIMIT`
    fn offset_requires_limit(&self) -> bool;

    /// Most parameters one statement may bind
    fn max_parameters(&self) -> usize;
}

/// SQLite 3.35+ (bundled by `rusqlite`)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Platform for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn supports_add_constraint(&self) -> bool {
        false
    }

    fn offset_requires_limit(&self) -> bool {
        true
    }

    fn max_parameters(&self) -> usize {
        999
    }
}

/// PostgreSQL 9.5+
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgreSql;

impl Platform for PostgreSql {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn supports_add_constraint(&self) -> bool {
        true
    }

    fn offset_requires_limit(&self) -> bool {
        false
    }

    fn max_parameters(&self) -> usize {
        u16::MAX as usize
    }
}
