// PostgreSQL Driver
// Cursor over a tokio-postgres client. Shared by PostgreSQL, CockroachDB and
// Supabase, which differ only in how the endpoint is derived.

use crate::db::config::ConnectionConfig;
use crate::db::cursor::{CloseSignal, Cursor, Driver};
use crate::db::dialect::{Dialect, SUPABASE};
use crate::db::drivers::{connect_error, query_error};
use crate::db::traits::{CellValue, Connection, DatabaseError, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SUPABASE_REGION: &str = "us-east-1";

/// PostgreSQL specific connection wrapper
pub struct PostgresConnection {
    id: String,
    client: Client,
    /// Drives the socket; aborting it fails every pending request
    io_task: JoinHandle<()>,
    signal: CloseSignal,
}

#[async_trait::async_trait]
impl Connection for PostgresConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        !self.signal.is_closed() && !self.client.is_closed()
    }

    fn close(&self) -> Result<(), DatabaseError> {
        if self.signal.trigger() {
            self.io_task.abort();
            debug!(connection_id = %self.id, "PostgreSQL connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.signal.is_closed() || self.client.is_closed()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn cursor(&self) -> Option<&dyn Cursor> {
        Some(self)
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        self.io_task.abort();
    }
}

#[async_trait::async_trait]
impl Cursor for PostgresConnection {
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        limit: Option<usize>,
    ) -> Result<(Vec<String>, Vec<Row>), DatabaseError> {
        self.signal
            .guard(async {
                let stmt = self.client.prepare(sql).await.map_err(query_error)?;
                let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();

                let binds = params.iter().map(|p| p as &(dyn ToSql + Sync));
                let stream = self.client.query_raw(&stmt, binds).await.map_err(query_error)?;
                futures::pin_mut!(stream);

                let mut rows = Vec::new();
                while limit.map_or(true, |n| rows.len() < n) {
                    let Some(row) = stream.try_next().await.map_err(query_error)? else {
                        break;
                    };
                    rows.push((0..row.len()).map(|idx| cell_value_from_row(&row, idx)).collect());
                }
                Ok((columns, rows))
            })
            .await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
        self.signal
            .guard(async { self.client.execute(sql, &[]).await.map_err(query_error) })
            .await
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

/// Extract cell value from row based on the column's Postgres type
fn cell_value_from_row(row: &tokio_postgres::Row, idx: usize) -> CellValue {
    let Some(column) = row.columns().get(idx) else {
        return CellValue::Null;
    };
    let ty = column.type_();

    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx).map(CellValue::Bool),
        Type::CHAR => get::<i8>(row, idx).map(|v| CellValue::Int(v as i64)),
        Type::INT2 => get::<i16>(row, idx).map(|v| CellValue::Int(v as i64)),
        Type::INT4 => get::<i32>(row, idx).map(|v| CellValue::Int(v as i64)),
        Type::INT8 => get::<i64>(row, idx).map(CellValue::Int),
        Type::OID => get::<u32>(row, idx).map(|v| CellValue::Int(v as i64)),
        Type::FLOAT4 => get::<f32>(row, idx).map(|v| CellValue::Float(v as f64)),
        Type::FLOAT8 => get::<f64>(row, idx).map(CellValue::Float),
        Type::NUMERIC => get::<Decimal>(row, idx).map(|d| {
            d.to_f64()
                .map(CellValue::Float)
                .unwrap_or_else(|| CellValue::String(d.to_string()))
        }),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx).map(|dt| CellValue::DateTime(dt.to_string())),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx).map(|dt| CellValue::DateTime(dt.to_rfc3339())),
        Type::DATE => get::<NaiveDate>(row, idx).map(|d| CellValue::DateTime(d.to_string())),
        Type::TIME => get::<NaiveTime>(row, idx).map(|t| CellValue::DateTime(t.to_string())),
        Type::UUID => get::<uuid::Uuid>(row, idx).map(|u| CellValue::String(u.to_string())),
        Type::JSON | Type::JSONB => {
            get::<serde_json::Value>(row, idx).map(|v| CellValue::String(v.to_string()))
        }
        Type::BYTEA => get::<Vec<u8>>(row, idx).map(CellValue::Binary),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map(CellValue::String),
            // no text decoding for this type (arrays, ranges, geometric types)
            Err(_) => Some(CellValue::String(format!("<{}>", ty.name()))),
        },
    };
    value.unwrap_or(CellValue::Null)
}

/// PostgreSQL driver implementation
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }

    /// Build the tokio-postgres config for a dialect. Supabase endpoints are
    /// derived from the region and project id.
    fn build_config(
        dialect: &Dialect,
        config: &ConnectionConfig,
    ) -> Result<tokio_postgres::Config, DatabaseError> {
        let mut pg = tokio_postgres::Config::new();
        pg.connect_timeout(CONNECT_TIMEOUT)
            .application_name("sqlterm")
            .password(config.password());

        if dialect.name == SUPABASE.name {
            let region = config.option("supabase_region").unwrap_or(DEFAULT_SUPABASE_REGION);
            let project = config.option("supabase_project_id").ok_or_else(|| {
                DatabaseError::InvalidConfig("Supabase project ID is required".to_string())
            })?;
            pg.host(&format!("aws-0-{}.pooler.supabase.com", region))
                .port(5432)
                .user(&format!("postgres.{}", project))
                .dbname("postgres");
            return Ok(pg);
        }

        let tcp = config.tcp_endpoint().ok_or_else(|| {
            DatabaseError::InvalidConfig(format!("{} requires a server address", dialect.name))
        })?;
        if tcp.host.is_empty() {
            return Err(DatabaseError::InvalidConfig("Host is required".to_string()));
        }
        pg.host(&tcp.host)
            .port(tcp.port.or(dialect.default_port).unwrap_or(5432))
            .user(if tcp.username.is_empty() { "postgres" } else { tcp.username.as_str() })
            .dbname(if tcp.database.is_empty() { "postgres" } else { tcp.database.as_str() });
        Ok(pg)
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Driver for PostgresDriver {
    async fn connect(
        &self,
        dialect: &'static Dialect,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, DatabaseError> {
        let pg = Self::build_config(dialect, config)?;
        let (client, connection) = pg.connect(NoTls).await.map_err(connect_error)?;

        let id = uuid::Uuid::new_v4().to_string();
        let task_id = id.clone();
        let io_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(connection_id = %task_id, error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Arc::new(PostgresConnection {
            id,
            client,
            io_task,
            signal: CloseSignal::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::{COCKROACHDB, POSTGRES};
    use tokio_postgres::config::Host;

    fn host(pg: &tokio_postgres::Config) -> String {
        match pg.get_hosts().first() {
            Some(Host::Tcp(h)) => h.clone(),
            _ => String::new(),
        }
    }

    #[test]
    fn test_build_config_defaults() {
        let config = ConnectionConfig::tcp("local", "postgresql", "db.local", None, "", "", "pw");
        let pg = PostgresDriver::build_config(&POSTGRES, &config).unwrap();
        assert_eq!(host(&pg), "db.local");
        assert_eq!(pg.get_ports(), &[5432]);
        assert_eq!(pg.get_user(), Some("postgres"));
        assert_eq!(pg.get_dbname(), Some("postgres"));

        let pg = PostgresDriver::build_config(&COCKROACHDB, &config).unwrap();
        assert_eq!(pg.get_ports(), &[26257]);
    }

    #[test]
    fn test_build_config_supabase_endpoint() {
        let config = ConnectionConfig::tcp("sb", "supabase", "", None, "", "", "secret")
            .with_option("supabase_region", "eu-west-2")
            .with_option("supabase_project_id", "abcd1234");
        let pg = PostgresDriver::build_config(&SUPABASE, &config).unwrap();
        assert_eq!(host(&pg), "aws-0-eu-west-2.pooler.supabase.com");
        assert_eq!(pg.get_user(), Some("postgres.abcd1234"));
        assert_eq!(pg.get_dbname(), Some("postgres"));

        let missing = ConnectionConfig::tcp("sb", "supabase", "", None, "", "", "secret");
        assert!(matches!(
            PostgresDriver::build_config(&SUPABASE, &missing),
            Err(DatabaseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_build_config_requires_host() {
        let config = ConnectionConfig::file("f", "postgresql", "/tmp/x");
        assert!(PostgresDriver::build_config(&POSTGRES, &config).is_err());
        let config = ConnectionConfig::tcp("x", "postgresql", "", None, "", "", "");
        assert!(PostgresDriver::build_config(&POSTGRES, &config).is_err());
    }
}
