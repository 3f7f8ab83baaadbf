// MySQL Driver
// Cursor over a single sqlx MySQL connection, shared by MySQL and MariaDB

use crate::db::config::ConnectionConfig;
use crate::db::cursor::{CloseSignal, Cursor, Driver};
use crate::db::dialect::Dialect;
use crate::db::drivers::{connect_error, query_error};
use crate::db::traits::{CellValue, Connection, DatabaseError, Row};
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection as SqlxMySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Executor, Row as _, Statement};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// MySQL specific connection wrapper
pub struct MysqlConnection {
    id: String,
    conn: Mutex<Option<SqlxMySqlConnection>>,
    signal: CloseSignal,
}

#[async_trait::async_trait]
impl Connection for MysqlConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        self.execute("SELECT 1").await.is_ok()
    }

    fn close(&self) -> Result<(), DatabaseError> {
        if !self.signal.trigger() {
            return Ok(());
        }
        if let Ok(mut guard) = self.conn.try_lock() {
            guard.take();
        }
        debug!(connection_id = %self.id, "MySQL connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn cursor(&self) -> Option<&dyn Cursor> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl Cursor for MysqlConnection {
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        limit: Option<usize>,
    ) -> Result<(Vec<String>, Vec<Row>), DatabaseError> {
        self.signal
            .guard(async {
                let mut guard = self.conn.lock().await;
                let conn = guard.as_mut().ok_or(DatabaseError::ConnectionClosed)?;

                let stmt = conn.prepare(sql).await.map_err(query_error)?;
                let columns: Vec<String> = stmt
                    .columns()
                    .iter()
                    .map(|c| sqlx::Column::name(c).to_string())
                    .collect();

                let mut query = stmt.query();
                for param in params {
                    query = query.bind(param.as_str());
                }

                let mut stream = query.fetch(&mut *conn);
                let mut rows = Vec::new();
                while limit.map_or(true, |n| rows.len() < n) {
                    let Some(row) = stream.try_next().await.map_err(query_error)? else {
                        break;
                    };
                    rows.push(convert_row(&row));
                }
                Ok((columns, rows))
            })
            .await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
        self.signal
            .guard(async {
                let mut guard = self.conn.lock().await;
                let conn = guard.as_mut().ok_or(DatabaseError::ConnectionClosed)?;
                // Simple query protocol: some DDL is rejected as a prepared statement
                let result = conn.execute(sqlx::raw_sql(sql)).await.map_err(query_error)?;
                Ok(result.rows_affected())
            })
            .await
    }
}

fn convert_row(row: &MySqlRow) -> Row {
    (0..row.len()).map(|idx| extract_value(row, idx)).collect()
}

/// Extracts a value from a MySqlRow at the given index. sqlx checks type
/// compatibility, so the first decoder that accepts the column wins.
fn extract_value(row: &MySqlRow, idx: usize) -> CellValue {
    // u64 first for BIGINT UNSIGNED columns
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v
            .map(|u| i64::try_from(u).map(CellValue::Int).unwrap_or(CellValue::String(u.to_string())))
            .unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(CellValue::Int).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| CellValue::Int(i as i64)).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<u32>, _>(idx) {
        return v.map(|u| CellValue::Int(u as i64)).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|i| CellValue::Int(i as i64)).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<u16>, _>(idx) {
        return v.map(|u| CellValue::Int(u as i64)).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
        return v.map(|i| CellValue::Int(i as i64)).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<u8>, _>(idx) {
        return v.map(|u| CellValue::Int(u as i64)).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(CellValue::Bool).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(CellValue::Float).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| CellValue::Float(f as f64)).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Uuid>, _>(idx) {
        return v.map(|u| CellValue::String(u.to_string())).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
        return v
            .map(|d| d.to_f64().map(CellValue::Float).unwrap_or_else(|| CellValue::String(d.to_string())))
            .unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(CellValue::String).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| CellValue::DateTime(dt.to_rfc3339())).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| CellValue::DateTime(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| CellValue::DateTime(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        return v
            .map(|t| CellValue::DateTime(t.format("%H:%M:%S").to_string()))
            .unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(CellValue::Binary).unwrap_or(CellValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(|j| CellValue::String(j.to_string())).unwrap_or(CellValue::Null);
    }

    CellValue::Null
}

/// The MySQL client treats `localhost` as a Unix socket; force TCP
fn resolve_host(host: &str) -> &str {
    if host.eq_ignore_ascii_case("localhost") {
        "127.0.0.1"
    } else {
        host
    }
}

/// MySQL driver implementation
pub struct MysqlDriver;

impl MysqlDriver {
    pub fn new() -> Self {
        Self
    }

    fn build_connect_options(
        dialect: &Dialect,
        config: &ConnectionConfig,
    ) -> Result<MySqlConnectOptions, DatabaseError> {
        let tcp = config.tcp_endpoint().ok_or_else(|| {
            DatabaseError::InvalidConfig(format!("{} requires a server address", dialect.name))
        })?;
        if tcp.host.trim().is_empty() {
            return Err(DatabaseError::InvalidConfig("Host is required".to_string()));
        }

        let mut opts = MySqlConnectOptions::new()
            .host(resolve_host(tcp.host.trim()))
            .port(tcp.port.or(dialect.default_port).unwrap_or(3306))
            .username(&tcp.username)
            .password(&tcp.password)
            .charset("utf8mb4");

        let db = tcp.database.trim();
        if !db.is_empty() {
            opts = opts.database(db);
        }
        Ok(opts)
    }
}

impl Default for MysqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Driver for MysqlDriver {
    async fn connect(
        &self,
        dialect: &'static Dialect,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, DatabaseError> {
        let opts = Self::build_connect_options(dialect, config)?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, opts.connect())
            .await
            .map_err(|_| connect_error(format!("{} connection timed out", dialect.name)))?
            .map_err(connect_error)?;

        Ok(Arc::new(MysqlConnection {
            id: Uuid::new_v4().to_string(),
            conn: Mutex::new(Some(conn)),
            signal: CloseSignal::new(),
        }))
    }
}
