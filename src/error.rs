//! Error type shared by every layer of the store.
//!
//! Driver errors are wrapped rather than flattened so callers can still inspect
//! the underlying `rusqlite`/`may_postgres` error when they need to.

use std::fmt;

/// Crate-wide error
#[derive(Debug)]
pub enum QuarryError {
    /// A property, type or clause could not be mapped (missing or ambiguous attribute,
    /// type not registered in the model, key-based operation on a key-less type).
    UnsupportedOperation(String),
    /// SQLite error from `rusqlite`
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Error),
    /// PostgreSQL error from `may_postgres`
    #[cfg(feature = "postgres")]
    Postgres(may_postgres::Error),
    /// Driver failure annotated with the statement that caused it
    StatementExecution {
        sql: String,
        source: Box<QuarryError>,
    },
    /// A single-entity write affected an unexpected number of rows
    RowCount { expected: u64, actual: u64 },
    /// A versioned update or delete matched no row
    OptimisticLock { type_name: String },
    /// Schema creation or upgrade failed; the enclosing transaction was not committed
    TableModification(Box<QuarryError>),
    /// Foreign keys between types form a cycle
    CircularReference(String),
    /// The body of a transaction failed and the transaction was rolled back
    Rollback(Box<QuarryError>),
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Other transaction misuse (nesting, isolation)
    Transaction(String),
    /// Iteration attempted on a closed result
    ResultClosed,
    /// A value could not be converted to the requested Rust type
    Conversion(String),
    /// Settings could not be loaded
    Configuration(String),
    /// Other errors
    Other(String),
}

impl QuarryError {
    /// Wraps a driver error with the SQL text that produced it.
    pub fn statement(sql: &str, source: QuarryError) -> Self {
        QuarryError::StatementExecution {
            sql: sql.to_string(),
            source: Box::new(source),
        }
    }

    /// True when the root cause is an integrity constraint violation
    /// (unique, foreign key, not null, check).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            QuarryError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            #[cfg(feature = "postgres")]
            QuarryError::Postgres(e) => e
                .code()
                .map(|state| state.code().starts_with("23"))
                .unwrap_or(false),
            QuarryError::StatementExecution { source, .. }
            | QuarryError::TableModification(source)
            | QuarryError::Rollback(source) => source.is_constraint_violation(),
            _ => false,
        }
    }

    /// Innermost error, skipping statement/rollback/table-modification wrappers.
    pub fn root_cause(&self) -> &QuarryError {
        match self {
            QuarryError::StatementExecution { source, .. }
            | QuarryError::TableModification(source)
            | QuarryError::Rollback(source) => source.root_cause(),
            other => other,
        }
    }
}

impl fmt::Display for QuarryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarryError::UnsupportedOperation(s) => write!(f, "Unsupported operation: {s}"),
            #[cfg(feature = "sqlite")]
            QuarryError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            #[cfg(feature = "postgres")]
            QuarryError::Postgres(e) => write!(f, "PostgreSQL error: {e}"),
            QuarryError::StatementExecution { sql, source } => {
                write!(f, "Statement failed: {source} (sql: {sql})")
            }
            QuarryError::RowCount { expected, actual } => {
                write!(f, "Expected {expected} affected row(s), got {actual}")
            }
            QuarryError::OptimisticLock { type_name } => {
                write!(f, "Optimistic lock failure on {type_name}: row was modified or removed")
            }
            QuarryError::TableModification(e) => write!(f, "Table modification failed: {e}"),
            QuarryError::CircularReference(s) => write!(f, "Circular reference: {s}"),
            QuarryError::Rollback(e) => write!(f, "Transaction rolled back: {e}"),
            QuarryError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            QuarryError::Transaction(s) => write!(f, "Transaction error: {s}"),
            QuarryError::ResultClosed => write!(f, "Result is closed"),
            QuarryError::Conversion(s) => write!(f, "Conversion error: {s}"),
            QuarryError::Configuration(s) => write!(f, "Configuration error: {s}"),
            QuarryError::Other(s) => write!(f, "Error: {s}"),
        }
    }
}

impl std::error::Error for QuarryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "sqlite")]
            QuarryError::Sqlite(e) => Some(e),
            #[cfg(feature = "postgres")]
            QuarryError::Postgres(e) => Some(e),
            QuarryError::StatementExecution { source, .. }
            | QuarryError::TableModification(source)
            | QuarryError::Rollback(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for QuarryError {
    fn from(err: rusqlite::Error) -> Self {
        QuarryError::Sqlite(err)
    }
}

#[cfg(feature = "postgres")]
impl From<may_postgres::Error> for QuarryError {
    fn from(err: may_postgres::Error) -> Self {
        QuarryError::Postgres(err)
    }
}

impl From<config::ConfigError> for QuarryError {
    fn from(err: config::ConfigError) -> Self {
        QuarryError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(err: serde_json::Error) -> Self {
        QuarryError::Conversion(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = QuarryError> = std::result::Result<T, E>;
