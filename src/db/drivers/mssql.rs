// SQL Server Driver
// Cursor over a dedicated tiberius client

use crate::db::config::ConnectionConfig;
use crate::db::cursor::{CloseSignal, Cursor, Driver};
use crate::db::dialect::Dialect;
use crate::db::drivers::{connect_error, query_error};
use crate::db::traits::{CellValue, Connection, DatabaseError, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::{Stream, TryStreamExt};
use std::sync::Arc;
use tiberius::{AuthMethod, Client, ColumnType, Config, EncryptionLevel, QueryItem, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server specific connection wrapper
pub struct MssqlConnection {
    id: String,
    client: Mutex<Option<MssqlClient>>,
    signal: CloseSignal,
}

#[async_trait::async_trait]
impl Connection for MssqlConnection {
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
        // An in-flight call holds the lock until the close signal aborts it;
        // the client is then dropped with this connection.
        if let Ok(mut guard) = self.client.try_lock() {
            guard.take();
        }
        debug!(connection_id = %self.id, "SQL Server connection closed");
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
impl Cursor for MssqlConnection {
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        limit: Option<usize>,
    ) -> Result<(Vec<String>, Vec<Row>), DatabaseError> {
        self.signal
            .guard(async {
                let mut guard = self.client.lock().await;
                let client = guard.as_mut().ok_or(DatabaseError::ConnectionClosed)?;

                let binds: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();
                let stream = client.query(sql, &binds).await.map_err(query_error)?;
                let items = stream.map_err(query_error).map_ok(|item| match item {
                    QueryItem::Metadata(meta) => ResultItem::Metadata(
                        meta.result_index(),
                        meta.columns().iter().map(|c| c.name().to_string()).collect::<Vec<_>>(),
                    ),
                    QueryItem::Row(row) => ResultItem::Row(
                        row.result_index(),
                        (0..row.len()).map(|idx| cell_value_from_row(&row, idx)).collect::<Row>(),
                    ),
                });

                // The client drains whatever is left of the TDS stream before
                // its next request.
                let (columns, rows) = first_result_set(items, limit).await?;
                Ok((columns.unwrap_or_default(), rows))
            })
            .await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
        self.signal
            .guard(async {
                let mut guard = self.client.lock().await;
                let client = guard.as_mut().ok_or(DatabaseError::ConnectionClosed)?;
                let result = client.execute(sql, &[]).await.map_err(query_error)?;
                Ok(result.total())
            })
            .await
    }
}

enum ResultItem<M, R> {
    Metadata(usize, M),
    Row(usize, R),
}

/// Collects the first result set, reading no further once `limit` rows
/// arrived or a second result set starts
async fn first_result_set<S, M, R>(mut stream: S, limit: Option<usize>) -> Result<(Option<M>, Vec<R>), DatabaseError>
where
    S: Stream<Item = Result<ResultItem<M, R>, DatabaseError>> + Unpin,
{
    let mut columns = None;
    let mut rows = Vec::new();
    while limit.map_or(true, |n| rows.len() < n) {
        let Some(item) = stream.try_next().await? else {
            break;
        };
        match item {
            ResultItem::Metadata(0, meta) => columns = Some(meta),
            ResultItem::Row(0, row) => rows.push(row),
            _ => break,
        }
    }
    Ok((columns, rows))
}

/// Extract cell value from row
fn cell_value_from_row(row: &tiberius::Row, idx: usize) -> CellValue {
    let col_type = row
        .columns()
        .get(idx)
        .map(|c| c.column_type())
        .unwrap_or(ColumnType::Null);

    let value = match col_type {
        ColumnType::Null => None,

        ColumnType::Int1 => row.try_get::<u8, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int2 => row.try_get::<i16, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int4 => row.try_get::<i32, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)),
        ColumnType::Int8 => row.try_get::<i64, _>(idx).ok().flatten().map(CellValue::Int),
        ColumnType::Intn => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Int)
            .or_else(|| row.try_get::<i32, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)))
            .or_else(|| row.try_get::<i16, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64)))
            .or_else(|| row.try_get::<u8, _>(idx).ok().flatten().map(|v| CellValue::Int(v as i64))),

        ColumnType::Float4 => row.try_get::<f32, _>(idx).ok().flatten().map(|v| CellValue::Float(v as f64)),
        ColumnType::Float8 | ColumnType::Money | ColumnType::Money4 => {
            row.try_get::<f64, _>(idx).ok().flatten().map(CellValue::Float)
        }
        ColumnType::Floatn => row
            .try_get::<f64, _>(idx)
            .ok()
            .flatten()
            .map(CellValue::Float)
            .or_else(|| row.try_get::<f32, _>(idx).ok().flatten().map(|v| CellValue::Float(v as f64))),

        ColumnType::Decimaln | ColumnType::Numericn => row
            .try_get::<tiberius::numeric::Numeric, _>(idx)
            .ok()
            .flatten()
            .map(|n| CellValue::Float(f64::from(n))),

        ColumnType::Bit | ColumnType::Bitn => row.try_get::<bool, _>(idx).ok().flatten().map(CellValue::Bool),

        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map(|s| CellValue::String(s.to_string())),

        ColumnType::Datetime | ColumnType::Datetime2 | ColumnType::Datetimen | ColumnType::Datetime4 => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .flatten()
            .map(|dt| CellValue::DateTime(dt.to_string())),
        ColumnType::DatetimeOffsetn => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .flatten()
            .map(|dt| CellValue::DateTime(dt.to_rfc3339())),
        ColumnType::Daten => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .flatten()
            .map(|d| CellValue::DateTime(d.to_string())),
        ColumnType::Timen => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .flatten()
            .map(|t| CellValue::DateTime(t.to_string())),

        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => row
            .try_get::<&[u8], _>(idx)
            .ok()
            .flatten()
            .map(|b| CellValue::Binary(b.to_vec())),

        ColumnType::Guid => row
            .try_get::<tiberius::Uuid, _>(idx)
            .ok()
            .flatten()
            .map(|u| CellValue::String(u.to_string())),

        ColumnType::Xml => row
            .try_get::<&tiberius::xml::XmlData, _>(idx)
            .ok()
            .flatten()
            .map(|xml| CellValue::String(xml.to_owned().into_string())),

        _ => None,
    };
    value.unwrap_or(CellValue::Null)
}

/// SQL Server driver implementation
pub struct MssqlDriver;

impl MssqlDriver {
    pub fn new() -> Self {
        Self
    }

    /// Create a tiberius Config from a connection config
    fn to_tiberius_config(dialect: &Dialect, config: &ConnectionConfig) -> Result<Config, DatabaseError> {
        let tcp = config.tcp_endpoint().ok_or_else(|| {
            DatabaseError::InvalidConfig("SQL Server requires a server address".to_string())
        })?;

        // `server\instance`: named instances are reached through the port
        let host = tcp.host.split('\\').next().unwrap_or_default().trim();
        if host.is_empty() {
            return Err(DatabaseError::InvalidConfig("Server is required".to_string()));
        }

        let mut tiberius_config = Config::new();
        tiberius_config.host(host);
        tiberius_config.port(tcp.port.or(dialect.default_port).unwrap_or(1433));
        if !tcp.database.is_empty() {
            tiberius_config.database(&tcp.database);
        }

        match config.option("auth_type").unwrap_or("sql") {
            "sql" => tiberius_config.authentication(AuthMethod::sql_server(&tcp.username, &tcp.password)),
            other => {
                return Err(DatabaseError::InvalidConfig(format!(
                    "SQL Server authentication '{}' is not supported by this build",
                    other
                )))
            }
        }

        if config.option("trust_server_certificate").map_or(true, is_truthy) {
            tiberius_config.trust_cert();
        }
        tiberius_config.encryption(if config.option("encrypt").is_some_and(is_truthy) {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });

        Ok(tiberius_config)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Default for MssqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Driver for MssqlDriver {
    async fn connect(
        &self,
        dialect: &'static Dialect,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, DatabaseError> {
        let tiberius_config = Self::to_tiberius_config(dialect, config)?;

        let tcp = TcpStream::connect(tiberius_config.get_addr())
            .await
            .map_err(|e| connect_error(format!("TCP connection failed: {}", e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| connect_error(format!("Failed to set TCP_NODELAY: {}", e)))?;

        let client = Client::connect(tiberius_config, tcp.compat_write())
            .await
            .map_err(connect_error)?;

        Ok(Arc::new(MssqlConnection {
            id: uuid::Uuid::new_v4().to_string(),
            client: Mutex::new(Some(client)),
            signal: CloseSignal::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::MSSQL;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(host: &str) -> ConnectionConfig {
        ConnectionConfig::tcp("prod", "mssql", host, None, "master", "sa", "secret")
    }

    #[test]
    fn test_config_conversion() {
        let tiberius_config = MssqlDriver::to_tiberius_config(&MSSQL, &config("db.local")).unwrap();
        assert_eq!(tiberius_config.get_addr(), "db.local:1433");
    }

    #[test]
    fn test_named_instance_is_stripped() {
        let tiberius_config = MssqlDriver::to_tiberius_config(&MSSQL, &config("db.local\\SQLEXPRESS")).unwrap();
        assert_eq!(tiberius_config.get_addr(), "db.local:1433");
    }

    #[test]
    fn test_unsupported_auth_and_missing_server() {
        let windows = config("db.local").with_option("auth_type", "windows");
        assert!(matches!(
            MssqlDriver::to_tiberius_config(&MSSQL, &windows),
            Err(DatabaseError::InvalidConfig(_))
        ));
        assert!(MssqlDriver::to_tiberius_config(&MSSQL, &config("\\SQLEXPRESS")).is_err());
    }

    #[test]
    fn test_truthy_options() {
        assert!(is_truthy("YES"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
    }

    fn counted(
        items: Vec<ResultItem<Vec<String>, i64>>,
        polled: &AtomicUsize,
    ) -> impl Stream<Item = Result<ResultItem<Vec<String>, i64>, DatabaseError>> + Unpin + '_ {
        futures::stream::iter(items.into_iter().map(Ok)).inspect(move |_| {
            polled.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_first_result_set_stops_at_limit() {
        let polled = AtomicUsize::new(0);
        let mut items = vec![ResultItem::Metadata(0, vec!["n".to_string()])];
        items.extend((0..100).map(|i| ResultItem::Row(0, i)));

        let (columns, rows) = first_result_set(counted(items, &polled), Some(3)).await.unwrap();
        assert_eq!(columns.unwrap(), vec!["n"]);
        assert_eq!(rows, vec![0, 1, 2]);
        assert_eq!(polled.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_first_result_set_ignores_later_sets() {
        let polled = AtomicUsize::new(0);
        let items = vec![
            ResultItem::Metadata(0, vec!["a".to_string()]),
            ResultItem::Row(0, 1),
            ResultItem::Metadata(1, vec!["b".to_string()]),
            ResultItem::Row(1, 9),
        ];

        let (columns, rows) = first_result_set(counted(items, &polled), None).await.unwrap();
        assert_eq!(columns.unwrap(), vec!["a"]);
        assert_eq!(rows, vec![1]);
        assert_eq!(polled.load(Ordering::SeqCst), 3);
    }
}
