// Test Doubles
// Scripted connection, driver and tunnel provider used by the adapter,
// session and explorer tests

use crate::db::config::ConnectionConfig;
use crate::db::cursor::{CloseSignal, Cursor, Driver};
use crate::db::dialect::{Catalog, Dialect, LimitStyle, PlaceholderStyle, Qualification, QuoteStyle};
use crate::db::traits::{Capabilities, CellValue, Connection, DatabaseError, Row};
use crate::db::tunnel::{TunnelEndpoint, TunnelHandle, TunnelProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub static MOCK_DIALECT: Dialect = mock_dialect(Capabilities {
    multiple_databases: true,
    stored_procedures: true,
    indexes: true,
    triggers: true,
    sequences: true,
});

/// Mock engine without any optional catalog features
pub static MOCK_FLAT_DIALECT: Dialect = mock_dialect(Capabilities {
    multiple_databases: false,
    stored_procedures: false,
    indexes: false,
    triggers: false,
    sequences: false,
});

const fn mock_dialect(capabilities: Capabilities) -> Dialect {
    Dialect {
        name: "Mock",
        quote: QuoteStyle::DoubleQuote,
        limit: LimitStyle::Limit,
        qualification: Qualification::Schema,
        placeholder: PlaceholderStyle::Question,
        default_schema: "",
        capabilities,
        test_query: "SELECT 1",
        default_port: None,
        driver_import_names: &[],
        install_hint: "",
        platform_driver: false,
        catalog: Catalog {
            databases: Some("SELECT name FROM mock_databases"),
            tables: "SELECT schema, name FROM mock_tables WHERE db = :database",
            views: "SELECT schema, name FROM mock_views WHERE db = :database",
            primary_keys: Some("SELECT name FROM mock_keys WHERE t = :table"),
            columns: "SELECT name, type FROM mock_columns WHERE t = :table",
            procedures: Some("SELECT name FROM mock_procedures"),
            indexes: Some("SELECT name, t, uniq FROM mock_indexes"),
            index_columns: None,
            triggers: Some("SELECT name, t FROM mock_triggers"),
            trigger_definition: None,
            sequences: Some("SELECT name FROM mock_sequences"),
            sequence_definition: None,
        },
    }
}

struct Response {
    pattern: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Connection answering queries from a script keyed by SQL substring.
/// Unscripted queries return no rows.
pub struct MockConnection {
    id: String,
    responses: Vec<Response>,
    failures_left: AtomicUsize,
    failure: String,
    blocking: bool,
    affected: u64,
    executed: Mutex<Vec<(String, Vec<String>)>>,
    last_limit: Mutex<Option<usize>>,
    close_calls: AtomicUsize,
    signal: CloseSignal,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            responses: Vec::new(),
            failures_left: AtomicUsize::new(0),
            failure: String::new(),
            blocking: false,
            affected: 0,
            executed: Mutex::new(Vec::new()),
            last_limit: Mutex::new(None),
            close_calls: AtomicUsize::new(0),
            signal: CloseSignal::new(),
        }
    }

    pub fn with_response(mut self, pattern: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.responses.push(Response {
            pattern: pattern.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        });
        self
    }

    /// Scripts `count` rows of integers
    pub fn with_rows(self, pattern: &str, columns: &[&str], count: usize) -> Self {
        let rows = (0..count)
            .map(|i| columns.iter().map(|_| CellValue::Int(i as i64)).collect())
            .collect();
        self.with_response(pattern, columns, rows)
    }

    pub fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    /// Every call fails with a query error
    pub fn failing(self, message: &str) -> Self {
        self.failing_times(usize::MAX, message)
    }

    pub fn failing_times(mut self, times: usize, message: &str) -> Self {
        self.failures_left = AtomicUsize::new(times);
        self.failure = message.to_string();
        self
    }

    /// Every call hangs until the connection is closed
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn executed(&self) -> Vec<(String, Vec<String>)> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last_limit(&self) -> Option<usize> {
        self.last_limit.lock().ok().and_then(|l| *l)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn record(&self, sql: &str, params: &[String], limit: Option<usize>) -> Result<(), DatabaseError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push((sql.to_string(), params.to_vec()));
        }
        if let Ok(mut last) = self.last_limit.lock() {
            *last = limit;
        }
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            Err(DatabaseError::QueryError(self.failure.clone()))
        } else {
            Ok(())
        }
    }

    async fn wait(&self) -> Result<(), DatabaseError> {
        if self.blocking {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Connection for MockConnection {
    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn is_alive(&self) -> bool {
        !self.signal.is_closed()
    }

    fn close(&self) -> Result<(), DatabaseError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.signal.trigger();
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
impl Cursor for MockConnection {
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        limit: Option<usize>,
    ) -> Result<(Vec<String>, Vec<Row>), DatabaseError> {
        self.signal
            .guard(async {
                self.record(sql, params, limit)?;
                self.wait().await?;
                let Some(response) = self.responses.iter().find(|r| sql.contains(&r.pattern)) else {
                    return Ok((Vec::new(), Vec::new()));
                };
                let rows = match limit {
                    Some(n) => response.rows.iter().take(n).cloned().collect(),
                    None => response.rows.clone(),
                };
                Ok((response.columns.clone(), rows))
            })
            .await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DatabaseError> {
        self.signal
            .guard(async {
                self.record(sql, &[], None)?;
                self.wait().await?;
                Ok(self.affected)
            })
            .await
    }
}

type ConnectionScript = Box<dyn Fn(usize) -> MockConnection + Send + Sync>;

/// Driver handing out scripted connections. The script receives the
/// zero-based connect attempt number.
pub struct MockDriver {
    script: ConnectionScript,
    connect_calls: AtomicUsize,
    fail_connect: Option<String>,
    block_connect: bool,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    configs: Mutex<Vec<ConnectionConfig>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::scripted(|_| MockConnection::new())
    }

    pub fn scripted(script: impl Fn(usize) -> MockConnection + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            connect_calls: AtomicUsize::new(0),
            fail_connect: None,
            block_connect: false,
            connections: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_connect(mut self, message: &str) -> Self {
        self.fail_connect = Some(message.to_string());
        self
    }

    pub fn blocking_connect(mut self) -> Self {
        self.block_connect = true;
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn configs(&self) -> Vec<ConnectionConfig> {
        self.configs.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Driver for MockDriver {
    async fn connect(
        &self,
        _dialect: &'static Dialect,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, DatabaseError> {
        let attempt = self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut configs) = self.configs.lock() {
            configs.push(config.clone());
        }
        if self.block_connect {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.fail_connect {
            return Err(DatabaseError::ConnectionFailed(message.clone()));
        }
        let conn = Arc::new((self.script)(attempt));
        if let Ok(mut connections) = self.connections.lock() {
            connections.push(conn.clone());
        }
        Ok(conn)
    }
}

pub const FORWARDED_PORT: u16 = 40111;

struct MockTunnel {
    stops: Arc<AtomicUsize>,
}

impl TunnelHandle for MockTunnel {
    fn stop(&mut self) -> Result<(), DatabaseError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Tunnel provider that pretends to forward every tunneled config to
/// `127.0.0.1:FORWARDED_PORT` and counts how often tunnels are stopped
#[derive(Default)]
pub struct MockTunnels {
    created: AtomicUsize,
    stops: Arc<AtomicUsize>,
    fail: bool,
}

impl MockTunnels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TunnelProvider for MockTunnels {
    async fn create_tunnel(&self, config: &ConnectionConfig) -> Result<TunnelEndpoint, DatabaseError> {
        if !config.requires_tunnel() {
            return Ok(TunnelEndpoint::direct(config));
        }
        if self.fail {
            return Err(DatabaseError::Tunnel("bastion unreachable".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(TunnelEndpoint {
            handle: Some(Box::new(MockTunnel {
                stops: self.stops.clone(),
            })),
            host: "127.0.0.1".to_string(),
            port: Some(FORWARDED_PORT),
        })
    }
}

/// Tunnel settings for tests that need a tunneled config
pub fn bastion() -> crate::db::config::TunnelConfig {
    crate::db::config::TunnelConfig {
        host: "bastion".to_string(),
        port: 22,
        username: "ops".to_string(),
        password: None,
        key_path: None,
    }
}

/// Routes `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
