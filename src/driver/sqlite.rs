//! SQLite driver over `rusqlite`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, OpenFlags, ToSql};

use super::{BufferedCursor, Connection, ConnectionProvider, RowCursor};
use crate::error::{QuarryError, Result};
use crate::sql::{Platform, Sqlite};
use crate::transaction::IsolationLevel;
use crate::value::Value;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STATEMENT_CACHE: usize = 32;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(
            std::str::from_utf8(t)
                .map_err(|e| QuarryError::Conversion(format!("invalid UTF-8 in text column: {e}")))?
                .to_string(),
        ),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    })
}

/// Connections to one SQLite database
///
/// Every handle owns its own `rusqlite` connection, so a transaction opened on
/// one handle never sees statements issued through another. In-memory
/// databases are opened as a private shared cache; while one handle holds a
/// write transaction, writers on other handles fail with a locked error.
#[derive(Debug)]
pub struct SqliteProvider {
    /// Path or `file:` URI every connection opens
    target: String,
    idle: Arc<Mutex<Vec<rusqlite::Connection>>>,
    /// Keeps an in-memory database alive while no handle is out
    _anchor: Option<Mutex<rusqlite::Connection>>,
}

static MEMORY_DATABASES: AtomicUsize = AtomicUsize::new(0);

fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

impl SqliteProvider {
    pub fn memory() -> Result<Self> {
        let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
        let target = format!(
            "file:quarry-mem-{}-{n}?mode=memory&cache=shared",
            std::process::id()
        );
        let anchor = open_configured(&target)?;
        Ok(Self {
            target,
            idle: Arc::new(Mutex::new(Vec::new())),
            _anchor: Some(Mutex::new(anchor)),
        })
    }

    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let target = path.to_string_lossy().into_owned();
        let conn = open_configured(&target)?;
        log::debug!("opened sqlite database {}", path.display());
        Ok(Self {
            target,
            idle: Arc::new(Mutex::new(vec![conn])),
            _anchor: None,
        })
    }
}

fn open_configured(target: &str) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open_with_flags(target, open_flags())?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &rusqlite::Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.set_prepared_statement_cache_capacity(DEFAULT_STATEMENT_CACHE);
    Ok(())
}

impl ConnectionProvider for SqliteProvider {
    fn connection(&self) -> Result<Box<dyn Connection>> {
        let reused = self.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => open_configured(&self.target)?,
        };
        Ok(Box::new(SqliteConnection {
            conn: Some(conn),
            idle: Arc::clone(&self.idle),
        }))
    }

    fn platform(&self) -> Arc<dyn Platform> {
        Arc::new(Sqlite)
    }
}

/// One SQLite connection handed out by [`SqliteProvider`]
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
    idle: Arc<Mutex<Vec<rusqlite::Connection>>>,
}

impl SqliteConnection {
    fn with<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> Result<T>) -> Result<T> {
        match &self.conn {
            Some(conn) => f(conn),
            None => Err(QuarryError::Other("connection already released".to_string())),
        }
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.with(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let affected = stmt.execute(params_from_iter(params.iter()))?;
            Ok(affected as u64)
        })
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>> {
        self.with(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
            let width = columns.len();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut buffered = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(from_value_ref(row.get_ref(i)?)?);
                }
                buffered.push(values);
            }
            Ok(Box::new(BufferedCursor::new(columns, buffered)) as Box<dyn RowCursor>)
        })
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.with(|conn| Ok(conn.execute_batch(sql)?))
    }

    fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()> {
        // SQLite transactions are serializable; IMMEDIATE takes the write lock up front
        let sql = match isolation {
            Some(IsolationLevel::Serializable) => "BEGIN IMMEDIATE",
            _ => "BEGIN",
        };
        self.execute_batch(sql)
    }

    fn commit(&mut self) -> Result<()> {
        self.execute_batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.execute_batch("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        self.with(|conn| Ok(!conn.is_autocommit())).unwrap_or(false)
    }

    fn set_statement_cache_capacity(&mut self, capacity: usize) {
        let _ = self.with(|conn| {
            conn.set_prepared_statement_cache_capacity(capacity);
            Ok(())
        });
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A connection left inside a transaction is closed, which rolls it back
            if conn.is_autocommit() {
                self.idle.lock().push(conn);
            } else {
                log::warn!("closing sqlite connection with an open transaction");
            }
        }
    }
}
