// SQLite Driver
// Cursor over a rusqlite connection. rusqlite is blocking, so every call runs
// on the blocking pool and close() interrupts whatever is running.

use crate::db::config::{resolve_file_path, ConnectionConfig};
use crate::db::cursor::{CloseSignal, Cursor, Driver};
use crate::db::dialect::Dialect;
use crate::db::drivers::{connect_error, query_error};
use crate::db::traits::{CellValue, Connection, DatabaseError, Row};
use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection as RusqliteConnection, InterruptHandle, OpenFlags};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// SQLite specific connection wrapper
pub struct SqliteConnection {
    id: String,
    path: PathBuf,
    conn: Arc<Mutex<Option<RusqliteConnection>>>,
    interrupt: InterruptHandle,
    signal: CloseSignal,
}

impl SqliteConnection {
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&RusqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let conn = self.conn.clone();
        self.signal
            .guard(async move {
                tokio::task::spawn_blocking(move || {
                    let guard = conn.lock().map_err(|_| DatabaseError::ConnectionClosed)?;
                    let conn = guard.as_ref().ok_or(DatabaseError::ConnectionClosed)?;
                    f(conn)
                })
                .await
                .map_err(query_error)?
            })
            .await
    }
}

#[async_trait::async_trait]
impl Connection for SqliteConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).map_err(query_error))
            .await
            .is_ok()
    }

    fn close(&self) -> Result<(), DatabaseError> {
        if !self.signal.trigger() {
            return Ok(());
        }
        self.interrupt.interrupt();
        // A running statement holds the lock; it is interrupted above and the
        // handle is released when the last reference drops.
        if let Ok(mut guard) = self.conn.try_lock() {
            guard.take();
        }
        debug!(connection_id = %self.id, path = %self.path.display(), "SQLite connection closed");
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
impl Cursor for SqliteConnection {
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        limit: Option<usize>,
    ) -> Result<(Vec<String>, Vec<Row>), DatabaseError> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(query_error)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = stmt
                .query(rusqlite::params_from_iter(params.iter()))
                .map_err(query_error)?;
            let mut out = Vec::new();
            while limit.map_or(true, |n| out.len() < n) {
                let Some(row) = rows.next().map_err(query_error)? else {
                    break;
                };
                out.push((0..columns.len()).map(|idx| cell_value_from_row(row, idx)).collect());
            }
            Ok((columns, out))
        })
        .await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
        let sql = sql.to_string();
        // autocommit mode: each statement commits on its own
        self.with_conn(move |conn| execute_single(conn, &sql)).await
    }
}

/// Runs exactly one statement to completion and returns the rows it changed.
/// Rows produced by `RETURNING` are drained and discarded. Text holding more
/// than one statement is rejected before anything runs.
fn execute_single(conn: &RusqliteConnection, sql: &str) -> Result<u64, DatabaseError> {
    let mut batch = Batch::new(conn, sql);
    let Some(mut stmt) = batch.next().map_err(query_error)? else {
        return Ok(0);
    };
    if !matches!(batch.next(), Ok(None)) {
        return Err(DatabaseError::QueryError(
            "only one statement can be executed at a time".to_string(),
        ));
    }

    let before = conn.total_changes();
    {
        let mut rows = stmt.query([]).map_err(query_error)?;
        while rows.next().map_err(query_error)?.is_some() {}
    }

    // changes() keeps the previous DML count across DDL, so only trust it
    // when this statement moved the connection-wide counter
    if conn.total_changes() == before {
        return Ok(0);
    }
    Ok(conn.changes())
}

/// Extract cell value from row. SQLite is dynamically typed, so the storage
/// class of each value decides the variant.
fn cell_value_from_row(row: &rusqlite::Row, idx: usize) -> CellValue {
    match row.get_ref(idx) {
        Ok(ValueRef::Integer(v)) => CellValue::Int(v),
        Ok(ValueRef::Real(v)) => CellValue::Float(v),
        Ok(ValueRef::Text(v)) => CellValue::String(String::from_utf8_lossy(v).into_owned()),
        Ok(ValueRef::Blob(v)) => CellValue::Binary(v.to_vec()),
        Ok(ValueRef::Null) => CellValue::Null,
        Err(e) => {
            warn!(column = idx, error = %e, "Failed to decode SQLite value");
            CellValue::Null
        }
    }
}

/// SQLite driver implementation
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }

    /// Extract database path from config
    fn database_path(config: &ConnectionConfig) -> Result<PathBuf, DatabaseError> {
        match config.file_path().map(str::trim) {
            Some(":memory:") => Ok(PathBuf::from(":memory:")),
            Some(path) if !path.is_empty() => Ok(resolve_file_path(path)),
            _ => Err(DatabaseError::InvalidConfig(
                "SQLite database path is required".to_string(),
            )),
        }
    }

    /// Open SQLite connection
    fn open_connection(path: &PathBuf) -> Result<RusqliteConnection, DatabaseError> {
        RusqliteConnection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| connect_error(format!("Failed to open SQLite database: {}", e)))
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Driver for SqliteDriver {
    async fn connect(
        &self,
        _dialect: &'static Dialect,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, DatabaseError> {
        let path = Self::database_path(config)?;
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || Self::open_connection(&open_path))
            .await
            .map_err(connect_error)??;

        let interrupt = conn.get_interrupt_handle();
        Ok(Arc::new(SqliteConnection {
            id: uuid::Uuid::new_v4().to_string(),
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
            interrupt,
            signal: CloseSignal::new(),
        }))
    }
}
