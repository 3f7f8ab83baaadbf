// Database Adapter Traits
// Defines the contract every database engine adapter implements

use crate::db::config::ConnectionConfig;
use crate::db::cursor::Cursor;
use crate::db::schema::{
    ColumnInfo, IndexDefinition, IndexInfo, SequenceDefinition, SequenceInfo, TableInfo,
    TriggerDefinition, TriggerInfo,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("{driver} driver is not available. {hint}")]
    MissingDriver { driver: String, hint: String },

    #[error("{driver} requires a platform driver that is not installed. {hint}")]
    MissingPlatformDriver { driver: String, hint: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution error: {0}")]
    QueryError(String),

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Unknown database type: {0}")]
    UnknownProvider(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Invalid connection type")]
    InvalidConnection,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("SSH tunnel error: {0}")]
    Tunnel(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DatabaseError {
    pub fn is_missing_driver(&self) -> bool {
        matches!(
            self,
            DatabaseError::MissingDriver { .. } | DatabaseError::MissingPlatformDriver { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DatabaseError::Cancelled)
    }
}

/// Optional features an engine exposes through its catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub multiple_databases: bool,
    pub stored_procedures: bool,
    pub indexes: bool,
    pub triggers: bool,
    pub sequences: bool,
}

/// Cell value in a result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(String),
    Binary(Vec<u8>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Textual view used when reading catalog rows. Binary values are decoded
    /// as UTF-8 since some engines report identifier columns as bytes.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::String(s) | CellValue::DateTime(s) => Some(s.clone()),
            CellValue::Binary(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            CellValue::Bool(b) => Some(i64::from(*b)),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Engines spell booleans in many ways: native bits, 0/1 integers and
    /// `YES`/`NO` strings from information_schema.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(b) => Some(*b),
            CellValue::Int(i) => Some(*i != 0),
            CellValue::Float(f) => Some(*f != 0.0),
            CellValue::String(s) => {
                let s = s.trim();
                Some(
                    s.eq_ignore_ascii_case("yes")
                        || s.eq_ignore_ascii_case("true")
                        || s.eq_ignore_ascii_case("t")
                        || s.eq_ignore_ascii_case("y")
                        || s == "1",
                )
            }
            CellValue::DateTime(_) | CellValue::Binary(_) => None,
        }
    }
}

pub type Row = Vec<CellValue>;

/// Columns, rows and the truncation flag produced by `execute_query`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub truncated: bool,
}

/// Number of rows to request from a driver for a given cap: one more than
/// the cap so that truncation can be detected without a COUNT query.
pub fn fetch_limit(max_rows: Option<usize>) -> Option<usize> {
    max_rows.map(|n| n.saturating_add(1))
}

/// Applies the row cap to rows fetched with `fetch_limit`. Returns the kept
/// rows and whether more rows existed beyond the cap.
pub fn apply_row_limit(mut rows: Vec<Row>, max_rows: Option<usize>) -> (Vec<Row>, bool) {
    match max_rows {
        Some(n) if rows.len() > n => {
            rows.truncate(n);
            (rows, true)
        }
        _ => (rows, false),
    }
}

/// Connection trait - all database connections must implement this
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection ID
    fn connection_id(&self) -> &str;

    /// Test if the connection is alive
    async fn is_alive(&self) -> bool;

    /// Close the connection. Safe to call from any thread while another task
    /// is blocked inside a driver call on this connection; that call fails
    /// instead of hanging. Calling it again is a no-op.
    fn close(&self) -> Result<(), DatabaseError>;

    fn is_closed(&self) -> bool;

    /// Allow downcasting for driver-specific operations
    fn as_any(&self) -> &dyn std::any::Any;

    /// Cursor-style access used by the shared SQL adapter
    fn cursor(&self) -> Option<&dyn Cursor> {
        None
    }
}

/// Database adapter trait - one implementation per database engine.
///
/// Introspection methods return an empty list when the matching capability
/// is off. The `get_*_definition` lookups assume the capability is on, so
/// callers check it first.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    // --- Metadata ---
    /// Display name, e.g. "PostgreSQL"
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn supports_multiple_databases(&self) -> bool {
        self.capabilities().multiple_databases
    }

    fn supports_stored_procedures(&self) -> bool {
        self.capabilities().stored_procedures
    }

    fn supports_indexes(&self) -> bool {
        self.capabilities().indexes
    }

    fn supports_triggers(&self) -> bool {
        self.capabilities().triggers
    }

    fn supports_sequences(&self) -> bool {
        self.capabilities().sequences
    }

    /// Empty when the engine has no schema concept
    fn default_schema(&self) -> &str;

    /// Runtime components this adapter needs before `connect` can work
    fn driver_import_names(&self) -> &[&'static str];

    fn install_hint(&self) -> String;

    /// Fails with a missing-driver error when any of `driver_import_names`
    /// is unavailable in this build.
    fn ensure_driver_available(&self) -> Result<(), DatabaseError>;

    fn test_query(&self) -> &str {
        "SELECT 1"
    }

    /// Display name for a table, omitting the default schema
    fn format_table_name(&self, schema: &str, name: &str) -> String {
        if schema.is_empty() || schema == self.default_schema() {
            name.to_string()
        } else {
            format!("{}.{}", schema, name)
        }
    }

    // --- Connection Management ---
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>, DatabaseError>;

    async fn execute_test_query(&self, conn: &dyn Connection) -> Result<(), DatabaseError> {
        self.execute_query(conn, self.test_query(), Some(1))
            .await
            .map(|_| ())
            .map_err(|e| match e {
                DatabaseError::QueryError(msg) => DatabaseError::ConnectionFailed(msg),
                other => other,
            })
    }

    // --- Schema Metadata ---
    async fn get_databases(&self, conn: &dyn Connection) -> Result<Vec<String>, DatabaseError>;

    async fn get_tables(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<TableInfo>, DatabaseError>;

    async fn get_views(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<TableInfo>, DatabaseError>;

    async fn get_columns(
        &self,
        conn: &dyn Connection,
        table: &str,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>, DatabaseError>;

    async fn get_procedures(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<String>, DatabaseError>;

    async fn get_indexes(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<IndexInfo>, DatabaseError>;

    async fn get_triggers(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<TriggerInfo>, DatabaseError>;

    async fn get_sequences(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<SequenceInfo>, DatabaseError>;

    async fn get_index_definition(
        &self,
        conn: &dyn Connection,
        index_name: &str,
        table_name: &str,
        database: Option<&str>,
    ) -> Result<IndexDefinition, DatabaseError>;

    async fn get_trigger_definition(
        &self,
        conn: &dyn Connection,
        trigger_name: &str,
        table_name: &str,
        database: Option<&str>,
    ) -> Result<TriggerDefinition, DatabaseError>;

    async fn get_sequence_definition(
        &self,
        conn: &dyn Connection,
        sequence_name: &str,
        database: Option<&str>,
    ) -> Result<SequenceDefinition, DatabaseError>;

    // --- SQL Building ---
    /// Quote an identifier, doubling any embedded quote character
    fn quote_identifier(&self, name: &str) -> String;

    fn build_select_query(
        &self,
        table: &str,
        limit: usize,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> String;

    // --- Query Execution ---
    /// Run a data query. With `max_rows = Some(n)` at most `n` rows are
    /// returned and `truncated` reports whether more existed.
    async fn execute_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
        max_rows: Option<usize>,
    ) -> Result<RowSet, DatabaseError>;

    /// Run a mutating statement and return the number of affected rows
    async fn execute_non_query(&self, conn: &dyn Connection, sql: &str) -> Result<u64, DatabaseError>;
}
