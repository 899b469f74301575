//! Lifecycle callbacks.
//!
//! [`EntityListener`]s see every entity the store writes or loads; a failing
//! `pre_*` hook aborts the write. [`StatementListener`]s see every statement the
//! store sends to the driver.

use std::fmt;

use crate::entity::Entity;
use crate::error::Result;
use crate::meta::Type;
use crate::value::Value;

/// Entity lifecycle hooks; every method defaults to a no-op
pub trait EntityListener: Send + Sync {
    fn pre_insert(&self, _ty: &Type, _entity: &mut dyn Entity) -> Result<()> {
        Ok(())
    }

    fn post_insert(&self, _ty: &Type, _entity: &dyn Entity) {}

    fn pre_update(&self, _ty: &Type, _entity: &mut dyn Entity) -> Result<()> {
        Ok(())
    }

    fn post_update(&self, _ty: &Type, _entity: &dyn Entity) {}

    fn pre_delete(&self, _ty: &Type, _entity: &dyn Entity) -> Result<()> {
        Ok(())
    }

    fn post_delete(&self, _ty: &Type, _entity: &dyn Entity) {}

    /// Called after a row has been read into a new entity
    fn post_load(&self, _ty: &Type, _entity: &mut dyn Entity) {}
}

/// Statement hooks; every method defaults to a no-op
pub trait StatementListener: Send + Sync {
    fn before_query(&self, _sql: &str, _params: &[Value]) {}

    fn after_query(&self, _sql: &str) {}

    fn before_update(&self, _sql: &str, _params: &[Value]) {}

    /// `affected` is the row count reported by the driver
    fn after_update(&self, _sql: &str, _affected: u64) {}
}

/// Logs statements through `log` at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl StatementListener for LoggingListener {
    fn before_query(&self, sql: &str, params: &[Value]) {
        log::debug!("query: {sql} {}", DisplayParams(params));
    }

    fn before_update(&self, sql: &str, params: &[Value]) {
        log::debug!("update: {sql} {}", DisplayParams(params));
    }

    fn after_update(&self, _sql: &str, affected: u64) {
        log::debug!("affected rows: {affected}");
    }
}

impl EntityListener for LoggingListener {
    fn post_insert(&self, ty: &Type, _entity: &dyn Entity) {
        log::debug!("inserted {}", ty.name());
    }

    fn post_update(&self, ty: &Type, _entity: &dyn Entity) {
        log::debug!("updated {}", ty.name());
    }

    fn post_delete(&self, ty: &Type, _entity: &dyn Entity) {
        log::debug!("deleted {}", ty.name());
    }
}

struct DisplayParams<'a>(&'a [Value]);

impl fmt::Display for DisplayParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}
