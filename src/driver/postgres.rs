//! PostgreSQL driver over `may_postgres`.
//!
//! Parameters are encoded by [`Value`]'s `ToSql` impl against the type the server
//! inferred for each placeholder, so an `Integer` bound to an `int4` column is sent
//! as `i32` and a `Text` bound to a `timestamptz` column is parsed first.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use may_postgres::{Client, Row};
use postgres_types::{IsNull, ToSql, Type};
use rust_decimal::Decimal;

use super::{BufferedCursor, Connection, ConnectionProvider, RowCursor};
use crate::error::Result;
use crate::sql::{Platform, PostgreSql};
use crate::transaction::IsolationLevel;
use crate::value::{FromValue, Value};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

type BoxError = Box<dyn StdError + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Integer(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::BOOL => (*i != 0).to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Real(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::Text(s) => encode_text(s, ty, out),
            Value::Blob(b) => match *ty {
                Type::UUID => uuid::Uuid::from_slice(b)?.to_sql(ty, out),
                _ => b.to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
    let value = Value::Text(s.to_string());
    match *ty {
        Type::TIMESTAMPTZ => DateTime::<Utc>::from_value(value)?.to_sql(ty, out),
        Type::TIMESTAMP => NaiveDateTime::from_value(value)?.to_sql(ty, out),
        Type::DATE => NaiveDate::from_value(value)?.to_sql(ty, out),
        Type::TIME => NaiveTime::from_value(value)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::from_value(value)?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_value(value)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::Value::from_value(value)?.to_sql(ty, out),
        _ => s.to_sql(ty, out),
    }
}

fn read_column(row: &Row, index: usize) -> Result<Value> {
    let ty = row.columns()[index].type_().clone();
    let value = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(index)?.map(Value::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(index)?.map(Value::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(Value::Integer),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(index)?.map(Value::from),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(Value::Real),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(index)?.map(Value::from),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index)?.map(Value::Blob),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(Value::from),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(index)?.map(Value::from),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(index)?.map(Value::from),
        Type::TIME => row.try_get::<_, Option<NaiveTime>>(index)?.map(Value::from),
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(index)?.map(Value::from),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(index)?
            .map(Value::from),
        _ => row.try_get::<_, Option<String>>(index)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Opens one `may_postgres` client per connection request
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    url: String,
}

impl PostgresProvider {
    pub fn new(url: &str) -> Result<Self> {
        crate::connection::validate_postgres_url(url)?;
        Ok(Self {
            url: url.to_string(),
        })
    }
}

impl ConnectionProvider for PostgresProvider {
    fn connection(&self) -> Result<Box<dyn Connection>> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        let start = Instant::now();
        let client = may_postgres::connect(&self.url)?;
        log::debug!("postgres connection established in {:?}", start.elapsed());
        Ok(Box::new(PostgresConnection {
            client,
            in_transaction: false,
        }))
    }

    fn platform(&self) -> Arc<dyn Platform> {
        Arc::new(PostgreSql)
    }
}

pub struct PostgresConnection {
    client: Client,
    in_transaction: bool,
}

fn as_params(params: &[Value]) -> Vec<&dyn ToSql> {
    params.iter().map(|v| v as &dyn ToSql).collect()
}

impl Connection for PostgresConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.client.execute(sql, &as_params(params))?)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor>> {
        let rows = self.client.query(sql, &as_params(params))?;
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let mut buffered = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                values.push(read_column(row, i)?);
            }
            buffered.push(values);
        }
        Ok(Box::new(BufferedCursor::new(columns, buffered)))
    }

    /// Statements are split on `;`, so they must not contain semicolons in literals
    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            self.client.execute(statement, &[])?;
        }
        Ok(())
    }

    fn begin(&mut self, isolation: Option<IsolationLevel>) -> Result<()> {
        let sql = match isolation {
            Some(level) => format!("BEGIN ISOLATION LEVEL {}", level.to_sql()),
            None => "BEGIN".to_string(),
        };
        self.client.execute(sql.as_str(), &[])?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.client.execute("COMMIT", &[])?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.client.execute("ROLLBACK", &[])?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}
