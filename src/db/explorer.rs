// Explorer Schema Service
// Lazy schema lookups for the object tree. Listings are cached per database
// and every lookup gets one reconnect-and-retry.

use crate::db::schema::{ColumnInfo, IndexDefinition, ObjectDefinition, SequenceDefinition, TriggerDefinition};
use crate::db::session::ConnectionSession;
use crate::db::traits::{Connection, DatabaseAdapter, DatabaseError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache key used when no database is selected
pub const DEFAULT_CACHE_KEY: &str = "__default__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    Tables,
    Views,
    Databases,
    Indexes,
    Triggers,
    Sequences,
    Procedures,
}

impl FolderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tables" => Some(Self::Tables),
            "views" => Some(Self::Views),
            "databases" => Some(Self::Databases),
            "indexes" => Some(Self::Indexes),
            "triggers" => Some(Self::Triggers),
            "sequences" => Some(Self::Sequences),
            "procedures" => Some(Self::Procedures),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Views => "views",
            Self::Databases => "databases",
            Self::Indexes => "indexes",
            Self::Triggers => "triggers",
            Self::Sequences => "sequences",
            Self::Procedures => "procedures",
        }
    }

    fn is_cached(self) -> bool {
        matches!(self, Self::Tables | Self::Views | Self::Databases | Self::Procedures)
    }
}

/// One node under an explorer folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplorerItem {
    Table { schema: String, name: String },
    View { schema: String, name: String },
    Database { name: String },
    Index { name: String, table_name: String },
    Trigger { name: String, table_name: String },
    Sequence { name: String },
    Procedure { name: String },
}

/// Reestablishes a session after a failed lookup
#[async_trait::async_trait]
pub trait Reconnect: Send + Sync {
    async fn reconnect(
        &self,
        session: &mut ConnectionSession,
        database: Option<&str>,
    ) -> Result<(), DatabaseError>;
}

/// Default reconnect: switch the session to the requested database. File
/// based sessions have nothing to switch to and are not retried.
pub struct SwitchDatabase;

#[async_trait::async_trait]
impl Reconnect for SwitchDatabase {
    async fn reconnect(
        &self,
        session: &mut ConnectionSession,
        database: Option<&str>,
    ) -> Result<(), DatabaseError> {
        if session.config().tcp_endpoint().is_none() {
            return Err(DatabaseError::InvalidConfig(
                "file-based connections cannot be reconnected".to_string(),
            ));
        }
        session.switch_database(database.unwrap_or_default()).await
    }
}

type DbArgResolver = Box<dyn Fn(Option<&str>) -> Option<String> + Send + Sync>;

pub struct SchemaService {
    session: ConnectionSession,
    cache: HashMap<String, HashMap<FolderKind, Vec<ExplorerItem>>>,
    reconnect: Box<dyn Reconnect>,
    db_arg_resolver: Option<DbArgResolver>,
}

impl SchemaService {
    pub fn new(session: ConnectionSession) -> Self {
        Self {
            session,
            cache: HashMap::new(),
            reconnect: Box::new(SwitchDatabase),
            db_arg_resolver: None,
        }
    }

    pub fn with_reconnect(mut self, reconnect: impl Reconnect + 'static) -> Self {
        self.reconnect = Box::new(reconnect);
        self
    }

    /// Maps the tree's database name to the argument passed to the adapter,
    /// e.g. `None` when the session is already connected to that database
    pub fn with_db_arg_resolver(
        mut self,
        resolver: impl Fn(Option<&str>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.db_arg_resolver = Some(Box::new(resolver));
        self
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ConnectionSession {
        &mut self.session
    }

    pub fn into_session(self) -> ConnectionSession {
        self.session
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn db_arg(&self, database: Option<&str>) -> Option<String> {
        match &self.db_arg_resolver {
            Some(resolve) => resolve(database),
            None => database.map(str::to_string),
        }
    }

    async fn run<T, F, Fut>(&self, op: &F) -> Result<T, DatabaseError>
    where
        F: Fn(Arc<dyn DatabaseAdapter>, Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        let adapter = self.session.adapter().clone();
        let conn = self.session.connection()?.clone();
        op(adapter, conn).await
    }

    /// Reconnects through the configured hook. The cache is cleared only
    /// when the reconnect succeeds.
    async fn reconnect(&mut self, database: Option<&str>) -> Result<(), DatabaseError> {
        let target = database
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .or_else(|| Some(self.session.database().to_string()).filter(|d| !d.is_empty()));

        self.reconnect.reconnect(&mut self.session, target.as_deref()).await?;
        self.cache.clear();
        debug!(database = ?target, "Explorer reconnected");
        Ok(())
    }

    /// Runs a lookup; on failure reconnects once and retries exactly once.
    /// When the reconnect itself fails the original error is returned.
    pub async fn run_with_retry<T, F, Fut>(&mut self, database: Option<&str>, op: F) -> Result<T, DatabaseError>
    where
        F: Fn(Arc<dyn DatabaseAdapter>, Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        let err = match self.run(&op).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        warn!(error = %err, "Schema lookup failed, reconnecting");

        if let Err(reconnect_err) = self.reconnect(database).await {
            debug!(error = %reconnect_err, "Reconnect failed");
            return Err(err);
        }
        self.run(&op).await
    }

    pub async fn list_databases(&mut self) -> Result<Vec<String>, DatabaseError> {
        self.run_with_retry(None, |adapter, conn| async move { adapter.get_databases(conn.as_ref()).await })
            .await
    }

    pub async fn list_columns(
        &mut self,
        database: Option<&str>,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let db_arg = self.db_arg(database);
        let schema = schema.map(str::to_string);
        let table = table.to_string();
        self.run_with_retry(database, move |adapter, conn| {
            let (db_arg, schema, table) = (db_arg.clone(), schema.clone(), table.clone());
            async move {
                adapter
                    .get_columns(conn.as_ref(), &table, db_arg.as_deref(), schema.as_deref())
                    .await
            }
        })
        .await
    }

    fn cached(&self, cache_key: &str, folder: FolderKind) -> Option<Vec<ExplorerItem>> {
        let items = self.cache.get(cache_key)?.get(&folder)?;
        // DuckDB reports an empty catalog while the file is still attaching
        let refetch_empty = self.session.config().db_type == "duckdb"
            && matches!(folder, FolderKind::Tables | FolderKind::Views);
        if items.is_empty() && refetch_empty {
            return None;
        }
        Some(items.clone())
    }

    /// Items under one explorer folder. Folders for features the engine
    /// lacks are empty.
    pub async fn list_folder_items(
        &mut self,
        folder: FolderKind,
        database: Option<&str>,
    ) -> Result<Vec<ExplorerItem>, DatabaseError> {
        let cache_key = database.unwrap_or(DEFAULT_CACHE_KEY).to_string();
        if folder.is_cached() {
            if let Some(items) = self.cached(&cache_key, folder) {
                return Ok(items);
            }
        }

        let adapter = self.session.adapter().clone();
        let db_arg = self.db_arg(database);
        let items: Vec<ExplorerItem> = match folder {
            FolderKind::Tables => self
                .run_with_retry(database, |adapter, conn| {
                    let db = db_arg.clone();
                    async move { adapter.get_tables(conn.as_ref(), db.as_deref()).await }
                })
                .await?
                .into_iter()
                .map(|t| ExplorerItem::Table {
                    schema: t.schema,
                    name: t.name,
                })
                .collect(),
            FolderKind::Views => self
                .run_with_retry(database, |adapter, conn| {
                    let db = db_arg.clone();
                    async move { adapter.get_views(conn.as_ref(), db.as_deref()).await }
                })
                .await?
                .into_iter()
                .map(|t| ExplorerItem::View {
                    schema: t.schema,
                    name: t.name,
                })
                .collect(),
            FolderKind::Databases => self
                .run_with_retry(None, |adapter, conn| async move {
                    adapter.get_databases(conn.as_ref()).await
                })
                .await?
                .into_iter()
                .map(|name| ExplorerItem::Database { name })
                .collect(),
            FolderKind::Indexes if adapter.supports_indexes() => self
                .run_with_retry(database, |adapter, conn| {
                    let db = db_arg.clone();
                    async move { adapter.get_indexes(conn.as_ref(), db.as_deref()).await }
                })
                .await?
                .into_iter()
                .map(|i| ExplorerItem::Index {
                    name: i.name,
                    table_name: i.table_name,
                })
                .collect(),
            FolderKind::Triggers if adapter.supports_triggers() => self
                .run_with_retry(database, |adapter, conn| {
                    let db = db_arg.clone();
                    async move { adapter.get_triggers(conn.as_ref(), db.as_deref()).await }
                })
                .await?
                .into_iter()
                .map(|t| ExplorerItem::Trigger {
                    name: t.name,
                    table_name: t.table_name,
                })
                .collect(),
            FolderKind::Sequences if adapter.supports_sequences() => self
                .run_with_retry(database, |adapter, conn| {
                    let db = db_arg.clone();
                    async move { adapter.get_sequences(conn.as_ref(), db.as_deref()).await }
                })
                .await?
                .into_iter()
                .map(|s| ExplorerItem::Sequence { name: s.name })
                .collect(),
            FolderKind::Procedures if adapter.supports_stored_procedures() => self
                .run_with_retry(database, |adapter, conn| {
                    let db = db_arg.clone();
                    async move { adapter.get_procedures(conn.as_ref(), db.as_deref()).await }
                })
                .await?
                .into_iter()
                .map(|name| ExplorerItem::Procedure { name })
                .collect(),
            FolderKind::Indexes | FolderKind::Triggers | FolderKind::Sequences | FolderKind::Procedures => {
                return Ok(Vec::new())
            }
        };

        if folder.is_cached() {
            self.cache
                .entry(cache_key)
                .or_default()
                .insert(folder, items.clone());
        }
        Ok(items)
    }

    pub async fn get_index_definition(
        &mut self,
        database: Option<&str>,
        name: &str,
        table_name: &str,
    ) -> Result<Option<IndexDefinition>, DatabaseError> {
        if !self.session.adapter().supports_indexes() {
            return Ok(None);
        }
        let db_arg = self.db_arg(database);
        let (name, table_name) = (name.to_string(), table_name.to_string());
        self.run_with_retry(database, move |adapter, conn| {
            let (db, name, table_name) = (db_arg.clone(), name.clone(), table_name.clone());
            async move {
                adapter
                    .get_index_definition(conn.as_ref(), &name, &table_name, db.as_deref())
                    .await
            }
        })
        .await
        .map(Some)
    }

    pub async fn get_trigger_definition(
        &mut self,
        database: Option<&str>,
        name: &str,
        table_name: &str,
    ) -> Result<Option<TriggerDefinition>, DatabaseError> {
        if !self.session.adapter().supports_triggers() {
            return Ok(None);
        }
        let db_arg = self.db_arg(database);
        let (name, table_name) = (name.to_string(), table_name.to_string());
        self.run_with_retry(database, move |adapter, conn| {
            let (db, name, table_name) = (db_arg.clone(), name.clone(), table_name.clone());
            async move {
                adapter
                    .get_trigger_definition(conn.as_ref(), &name, &table_name, db.as_deref())
                    .await
            }
        })
        .await
        .map(Some)
    }

    pub async fn get_sequence_definition(
        &mut self,
        database: Option<&str>,
        name: &str,
    ) -> Result<Option<SequenceDefinition>, DatabaseError> {
        if !self.session.adapter().supports_sequences() {
            return Ok(None);
        }
        let db_arg = self.db_arg(database);
        let name = name.to_string();
        self.run_with_retry(database, move |adapter, conn| {
            let (db, name) = (db_arg.clone(), name.clone());
            async move { adapter.get_sequence_definition(conn.as_ref(), &name, db.as_deref()).await }
        })
        .await
        .map(Some)
    }

    /// Definition shown for a selected index, trigger or sequence node
    pub async fn get_object_definition(
        &mut self,
        item: &ExplorerItem,
        database: Option<&str>,
    ) -> Result<Option<ObjectDefinition>, DatabaseError> {
        Ok(match item {
            ExplorerItem::Index { name, table_name } => self
                .get_index_definition(database, name, table_name)
                .await?
                .map(ObjectDefinition::Index),
            ExplorerItem::Trigger { name, table_name } => self
                .get_trigger_definition(database, name, table_name)
                .await?
                .map(ObjectDefinition::Trigger),
            ExplorerItem::Sequence { name } => self
                .get_sequence_definition(database, name)
                .await?
                .map(ObjectDefinition::Sequence),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config::ConnectionConfig;
    use crate::db::cursor::SqlAdapter;
    use crate::db::dialect::Dialect;
    use crate::db::testing::{init_test_logging, MockConnection, MockDriver, MOCK_DIALECT, MOCK_FLAT_DIALECT};
    use crate::db::traits::CellValue;
    use crate::db::tunnel::DirectTunnels;

    fn s(v: &str) -> CellValue {
        CellValue::String(v.to_string())
    }

    fn tables_connection() -> MockConnection {
        MockConnection::new().with_response(
            "FROM mock_tables",
            &["schema", "name"],
            vec![vec![s("public"), s("orders")], vec![s("public"), s("users")]],
        )
    }

    async fn service_with(
        dialect: &'static Dialect,
        db_type: &str,
        driver: Arc<MockDriver>,
    ) -> SchemaService {
        let adapter: Arc<dyn DatabaseAdapter> = Arc::new(SqlAdapter::new(dialect, driver));
        let config = ConnectionConfig::tcp("work", db_type, "db.local", None, "app", "u", "p");
        let session = ConnectionSession::open(config, adapter, &DirectTunnels).await.unwrap();
        SchemaService::new(session)
    }

    fn count(conn: &MockConnection, pattern: &str) -> usize {
        conn.executed().iter().filter(|(sql, _)| sql.contains(pattern)).count()
    }

    #[test]
    fn test_folder_kind_names() {
        for folder in [FolderKind::Tables, FolderKind::Procedures, FolderKind::Sequences] {
            assert_eq!(FolderKind::parse(folder.as_str()), Some(folder));
        }
        assert_eq!(FolderKind::parse("widgets"), None);
    }

    #[tokio::test]
    async fn test_tables_are_cached_per_database() {
        let driver = Arc::new(MockDriver::scripted(|_| tables_connection()));
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone()).await;

        let first = service.list_folder_items(FolderKind::Tables, Some("app")).await.unwrap();
        assert_eq!(
            first[0],
            ExplorerItem::Table {
                schema: "public".into(),
                name: "orders".into()
            }
        );
        let second = service.list_folder_items(FolderKind::Tables, Some("app")).await.unwrap();
        assert_eq!(first, second);

        let conn = &driver.connections()[0];
        assert_eq!(count(conn, "FROM mock_tables"), 1);

        service.list_folder_items(FolderKind::Tables, None).await.unwrap();
        assert_eq!(count(conn, "FROM mock_tables"), 2);
    }

    #[tokio::test]
    async fn test_indexes_are_not_cached() {
        let driver = Arc::new(MockDriver::scripted(|_| {
            MockConnection::new().with_response(
                "FROM mock_indexes",
                &["name", "t", "uniq"],
                vec![vec![s("idx_email"), s("users"), CellValue::Bool(true)]],
            )
        }));
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone()).await;
        for _ in 0..2 {
            let items = service.list_folder_items(FolderKind::Indexes, None).await.unwrap();
            assert_eq!(
                items,
                vec![ExplorerItem::Index {
                    name: "idx_email".into(),
                    table_name: "users".into()
                }]
            );
        }
        assert_eq!(count(&driver.connections()[0], "FROM mock_indexes"), 2);
    }

    #[tokio::test]
    async fn test_retry_reconnects_once_and_succeeds() {
        init_test_logging();
        let driver = Arc::new(MockDriver::scripted(|attempt| match attempt {
            0 => MockConnection::new().failing("server closed the connection unexpectedly"),
            _ => tables_connection(),
        }));
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone()).await;

        let items = service.list_folder_items(FolderKind::Tables, Some("sales")).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(driver.connect_calls(), 2);
        assert_eq!(driver.connections()[0].close_calls(), 1);
        assert_eq!(driver.configs()[1].database(), "sales");
        assert_eq!(service.session().database(), "sales");
    }

    #[tokio::test]
    async fn test_second_failure_propagates() {
        let driver = Arc::new(MockDriver::scripted(|_| MockConnection::new().failing("permission denied")));
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone()).await;

        let err = service.list_databases().await.unwrap_err();
        assert!(matches!(err, DatabaseError::QueryError(msg) if msg == "permission denied"));
        assert_eq!(driver.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_cleared_only_on_successful_reconnect() {
        let driver = Arc::new(MockDriver::scripted(|_| tables_connection()));
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone()).await;
        service.list_folder_items(FolderKind::Tables, None).await.unwrap();

        // drop the live connection; the next lookup reconnects
        service.session().connection().unwrap().close().unwrap();
        service.list_databases().await.unwrap();
        assert_eq!(driver.connect_calls(), 2);

        service.list_folder_items(FolderKind::Tables, None).await.unwrap();
        assert_eq!(count(&driver.connections()[1], "FROM mock_tables"), 1);
    }

    struct RefuseReconnect;

    #[async_trait::async_trait]
    impl Reconnect for RefuseReconnect {
        async fn reconnect(&self, _: &mut ConnectionSession, _: Option<&str>) -> Result<(), DatabaseError> {
            Err(DatabaseError::ConnectionFailed("host unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_cache_and_original_error() {
        let driver = Arc::new(MockDriver::scripted(|_| tables_connection()));
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone())
            .await
            .with_reconnect(RefuseReconnect);
        let cached = service.list_folder_items(FolderKind::Tables, None).await.unwrap();

        service.session().connection().unwrap().close().unwrap();
        let err = service.list_databases().await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionClosed));

        let again = service.list_folder_items(FolderKind::Tables, None).await.unwrap();
        assert_eq!(again, cached);
        assert_eq!(driver.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_file_sessions_are_not_retried() {
        let driver = Arc::new(MockDriver::scripted(|_| MockConnection::new().failing("database is locked")));
        let adapter: Arc<dyn DatabaseAdapter> = Arc::new(SqlAdapter::new(&MOCK_DIALECT, driver.clone()));
        let config = ConnectionConfig::file("local", "mock", "/tmp/app.db");
        let session = ConnectionSession::open(config, adapter, &DirectTunnels).await.unwrap();
        let mut service = SchemaService::new(session);

        assert!(service.list_databases().await.is_err());
        assert_eq!(driver.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_capabilities_yield_empty_results() {
        let driver = Arc::new(MockDriver::new());
        let mut service = service_with(&MOCK_FLAT_DIALECT, "mock", driver.clone()).await;

        for folder in [
            FolderKind::Indexes,
            FolderKind::Triggers,
            FolderKind::Sequences,
            FolderKind::Procedures,
            FolderKind::Databases,
        ] {
            assert!(service.list_folder_items(folder, None).await.unwrap().is_empty());
        }
        assert!(service.get_index_definition(None, "i", "t").await.unwrap().is_none());
        assert!(service.get_trigger_definition(None, "t", "t").await.unwrap().is_none());
        assert!(service.get_sequence_definition(None, "s").await.unwrap().is_none());
        assert!(driver.connections()[0].executed().is_empty());
    }

    #[tokio::test]
    async fn test_duckdb_refetches_empty_tables() {
        let driver = Arc::new(MockDriver::new());
        let mut service = service_with(&MOCK_DIALECT, "duckdb", driver.clone()).await;

        assert!(service.list_folder_items(FolderKind::Tables, None).await.unwrap().is_empty());
        assert!(service.list_folder_items(FolderKind::Tables, None).await.unwrap().is_empty());
        assert_eq!(count(&driver.connections()[0], "FROM mock_tables"), 2);

        service.list_folder_items(FolderKind::Procedures, None).await.unwrap();
        service.list_folder_items(FolderKind::Procedures, None).await.unwrap();
        assert_eq!(count(&driver.connections()[0], "FROM mock_procedures"), 1);
    }

    #[tokio::test]
    async fn test_db_arg_resolver_and_columns() {
        let driver = Arc::new(MockDriver::scripted(|_| {
            MockConnection::new().with_response(
                "FROM mock_columns",
                &["name", "type"],
                vec![vec![s("id"), s("integer")], vec![s("email"), s("text")]],
            )
        }));
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone())
            .await
            .with_db_arg_resolver(|db| db.filter(|d| *d != "app").map(str::to_string));

        let columns = service.list_columns(Some("app"), None, "users").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].data_type, "text");

        let definition = service.get_sequence_definition(Some("app"), "order_seq").await.unwrap();
        assert_eq!(definition.unwrap().name, "order_seq");
    }

    #[tokio::test]
    async fn test_object_definition_for_selected_node() {
        let driver = Arc::new(MockDriver::new());
        let mut service = service_with(&MOCK_DIALECT, "mock", driver.clone()).await;

        let index = ExplorerItem::Index {
            name: "idx_email".into(),
            table_name: "users".into(),
        };
        let definition = service.get_object_definition(&index, None).await.unwrap().unwrap();
        assert!(matches!(&definition, ObjectDefinition::Index(d) if d.table_name == "users"));
        assert_eq!(definition.name(), "idx_email");

        let sequence = ExplorerItem::Sequence { name: "order_seq".into() };
        let definition = service.get_object_definition(&sequence, None).await.unwrap();
        assert!(matches!(definition, Some(ObjectDefinition::Sequence(_))));

        let table = ExplorerItem::Table {
            schema: "public".into(),
            name: "users".into(),
        };
        assert!(service.get_object_definition(&table, None).await.unwrap().is_none());

        let mut flat = service_with(&MOCK_FLAT_DIALECT, "mock", Arc::new(MockDriver::new())).await;
        assert!(flat.get_object_definition(&index, None).await.unwrap().is_none());
    }
}
