// Cursor-Based Execution
// One adapter implementation shared by every SQL engine. Engine differences
// come from the injected Dialect; I/O comes from the injected Driver.

use crate::db::config::ConnectionConfig;
use crate::db::dialect::{render_catalog_query, CatalogArgs, Dialect};
use crate::db::drivers::first_missing_driver;
use crate::db::schema::{
    dedupe_triggers, ColumnInfo, IndexDefinition, IndexInfo, SequenceDefinition, SequenceInfo,
    TableInfo, TriggerDefinition, TriggerInfo,
};
use crate::db::traits::{
    apply_row_limit, fetch_limit, Capabilities, CellValue, Connection, DatabaseAdapter,
    DatabaseError, Row, RowSet,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cursor-style access to a live connection
#[async_trait::async_trait]
pub trait Cursor: Send + Sync {
    /// Runs `sql` with positional bind values. Reading stops after `limit`
    /// rows when a limit is given.
    async fn fetch(
        &self,
        sql: &str,
        params: &[String],
        limit: Option<usize>,
    ) -> Result<(Vec<String>, Vec<Row>), DatabaseError>;

    /// Runs a mutating statement, committing if the driver needs it, and
    /// returns the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64, DatabaseError>;
}

/// Opens connections for one driver crate
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    async fn connect(
        &self,
        dialect: &'static Dialect,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn Connection>, DatabaseError>;
}

/// Close flag shared by a connection and its in-flight calls. Driver calls
/// run under [`CloseSignal::guard`] so closing the connection from another
/// task aborts them.
#[derive(Debug, Default)]
pub struct CloseSignal {
    closed: AtomicBool,
    token: CancellationToken,
}

impl CloseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the connection closed. True only for the first call.
    pub fn trigger(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        if first {
            self.token.cancel();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn guard<T, F>(&self, fut: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        if self.is_closed() {
            return Err(DatabaseError::ConnectionClosed);
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DatabaseError::ConnectionClosed),
            result = fut => result,
        }
    }
}

/// Adapter for any engine with a cursor-style driver
pub struct SqlAdapter {
    dialect: &'static Dialect,
    driver: Option<Arc<dyn Driver>>,
}

impl SqlAdapter {
    pub fn new(dialect: &'static Dialect, driver: Arc<dyn Driver>) -> Self {
        Self {
            dialect,
            driver: Some(driver),
        }
    }

    /// Adapter for an engine whose driver is not part of this build. It can
    /// build SQL but every connect attempt reports the missing driver.
    pub fn without_driver(dialect: &'static Dialect) -> Self {
        Self { dialect, driver: None }
    }

    pub fn dialect(&self) -> &'static Dialect {
        self.dialect
    }

    fn missing_driver_error(&self) -> DatabaseError {
        let driver = self.dialect.name.to_string();
        let hint = self.dialect.install_hint.to_string();
        if self.dialect.platform_driver {
            DatabaseError::MissingPlatformDriver { driver, hint }
        } else {
            DatabaseError::MissingDriver { driver, hint }
        }
    }

    fn cursor(conn: &dyn Connection) -> Result<&dyn Cursor, DatabaseError> {
        conn.cursor().ok_or(DatabaseError::InvalidConnection)
    }

    async fn catalog_rows(
        &self,
        conn: &dyn Connection,
        template: &str,
        args: &CatalogArgs<'_>,
    ) -> Result<Vec<Row>, DatabaseError> {
        let (sql, params) = render_catalog_query(self.dialect, template, args);
        debug!(adapter = self.dialect.name, sql = %sql, params = ?params, "Running catalog query");
        let (_, rows) = Self::cursor(conn)?.fetch(&sql, &params, None).await?;
        Ok(rows)
    }

    async fn catalog_names(
        &self,
        conn: &dyn Connection,
        template: Option<&str>,
        args: &CatalogArgs<'_>,
    ) -> Result<Vec<String>, DatabaseError> {
        let Some(template) = template else {
            return Ok(Vec::new());
        };
        let rows = self.catalog_rows(conn, template, args).await?;
        Ok(rows.iter().filter_map(|row| text(row, 0)).collect())
    }

    async fn table_listing(
        &self,
        conn: &dyn Connection,
        template: &str,
        database: Option<&str>,
    ) -> Result<Vec<TableInfo>, DatabaseError> {
        let rows = self.catalog_rows(conn, template, &CatalogArgs::database(database)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| Some(TableInfo::new(text(row, 0).unwrap_or_default(), text(row, 1)?)))
            .collect())
    }
}

fn text(row: &Row, idx: usize) -> Option<String> {
    row.get(idx).and_then(CellValue::as_text)
}

fn flag(row: &Row, idx: usize) -> Option<bool> {
    row.get(idx).and_then(CellValue::as_bool)
}

fn number(row: &Row, idx: usize) -> Option<i64> {
    row.get(idx).and_then(CellValue::as_i64)
}

#[async_trait::async_trait]
impl DatabaseAdapter for SqlAdapter {
    fn name(&self) -> &str {
        self.dialect.name
    }

    fn capabilities(&self) -> Capabilities {
        self.dialect.capabilities
    }

    fn default_schema(&self) -> &str {
        self.dialect.default_schema
    }

    fn driver_import_names(&self) -> &[&'static str] {
        self.dialect.driver_import_names
    }

    fn install_hint(&self) -> String {
        self.dialect.install_hint.to_string()
    }

    fn ensure_driver_available(&self) -> Result<(), DatabaseError> {
        if self.driver.is_none() {
            return Err(self.missing_driver_error());
        }
        if let Some(missing) = first_missing_driver(self.dialect.driver_import_names) {
            debug!(adapter = self.dialect.name, component = missing, "Driver component missing");
            return Err(self.missing_driver_error());
        }
        Ok(())
    }

    fn test_query(&self) -> &str {
        self.dialect.test_query
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>, DatabaseError> {
        self.ensure_driver_available()?;
        let driver = self.driver.as_ref().ok_or_else(|| self.missing_driver_error())?;
        let conn = driver.connect(self.dialect, config).await?;
        info!(
            adapter = self.dialect.name,
            connection_id = conn.connection_id(),
            "Connected"
        );
        Ok(conn)
    }

    async fn get_databases(&self, conn: &dyn Connection) -> Result<Vec<String>, DatabaseError> {
        if !self.dialect.capabilities.multiple_databases {
            return Ok(Vec::new());
        }
        self.catalog_names(conn, self.dialect.catalog.databases, &CatalogArgs::default())
            .await
    }

    async fn get_tables(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<TableInfo>, DatabaseError> {
        self.table_listing(conn, self.dialect.catalog.tables, database).await
    }

    async fn get_views(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<TableInfo>, DatabaseError> {
        self.table_listing(conn, self.dialect.catalog.views, database).await
    }

    async fn get_columns(
        &self,
        conn: &dyn Connection,
        table: &str,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let schema = schema
            .filter(|s| !s.is_empty())
            .or(Some(self.dialect.default_schema).filter(|s| !s.is_empty()));
        let args = CatalogArgs::database(database).with_schema(schema).with_table(table);

        let primary_keys: HashSet<String> = self
            .catalog_names(conn, self.dialect.catalog.primary_keys, &args)
            .await?
            .into_iter()
            .collect();

        let rows = self.catalog_rows(conn, self.dialect.catalog.columns, &args).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = text(row, 0)?;
                Some(ColumnInfo {
                    is_primary_key: primary_keys.contains(&name),
                    data_type: text(row, 1).unwrap_or_default(),
                    name,
                })
            })
            .collect())
    }

    async fn get_procedures(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<String>, DatabaseError> {
        if !self.dialect.capabilities.stored_procedures {
            return Ok(Vec::new());
        }
        self.catalog_names(conn, self.dialect.catalog.procedures, &CatalogArgs::database(database))
            .await
    }

    async fn get_indexes(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<IndexInfo>, DatabaseError> {
        let Some(template) = self.dialect.catalog.indexes.filter(|_| self.dialect.capabilities.indexes) else {
            return Ok(Vec::new());
        };
        let rows = self.catalog_rows(conn, template, &CatalogArgs::database(database)).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(IndexInfo {
                    name: text(row, 0)?,
                    table_name: text(row, 1).unwrap_or_default(),
                    is_unique: flag(row, 2).unwrap_or(false),
                })
            })
            .collect())
    }

    async fn get_triggers(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<TriggerInfo>, DatabaseError> {
        let Some(template) = self.dialect.catalog.triggers.filter(|_| self.dialect.capabilities.triggers) else {
            return Ok(Vec::new());
        };
        let rows = self.catalog_rows(conn, template, &CatalogArgs::database(database)).await?;
        let triggers = rows
            .iter()
            .filter_map(|row| {
                Some(TriggerInfo {
                    name: text(row, 0)?,
                    table_name: text(row, 1).unwrap_or_default(),
                })
            })
            .collect();
        Ok(dedupe_triggers(triggers))
    }

    async fn get_sequences(
        &self,
        conn: &dyn Connection,
        database: Option<&str>,
    ) -> Result<Vec<SequenceInfo>, DatabaseError> {
        if !self.dialect.capabilities.sequences {
            return Ok(Vec::new());
        }
        let names = self
            .catalog_names(conn, self.dialect.catalog.sequences, &CatalogArgs::database(database))
            .await?;
        Ok(names.into_iter().map(|name| SequenceInfo { name }).collect())
    }

    async fn get_index_definition(
        &self,
        conn: &dyn Connection,
        index_name: &str,
        table_name: &str,
        database: Option<&str>,
    ) -> Result<IndexDefinition, DatabaseError> {
        let mut definition = IndexDefinition::minimal(index_name, table_name);
        let Some(template) = self.dialect.catalog.index_columns else {
            return Ok(definition);
        };

        let args = CatalogArgs::database(database).with_table(table_name).with_name(index_name);
        let rows = self.catalog_rows(conn, template, &args).await?;
        let Some(first) = rows.first() else {
            return Ok(definition);
        };

        definition.columns = rows.iter().filter_map(|row| text(row, 0)).collect();
        definition.is_unique = flag(first, 1).unwrap_or(false);
        definition.index_type = text(first, 2);
        definition.definition = rows.iter().find_map(|row| text(row, 3));
        if definition.definition.is_none() && !definition.columns.is_empty() {
            definition.definition = Some(definition.synthesize_ddl(|s| self.dialect.quote_identifier(s)));
        }
        Ok(definition)
    }

    async fn get_trigger_definition(
        &self,
        conn: &dyn Connection,
        trigger_name: &str,
        table_name: &str,
        database: Option<&str>,
    ) -> Result<TriggerDefinition, DatabaseError> {
        let mut definition = TriggerDefinition::minimal(trigger_name, table_name);
        let Some(template) = self.dialect.catalog.trigger_definition else {
            return Ok(definition);
        };

        let args = CatalogArgs::database(database).with_table(table_name).with_name(trigger_name);
        let rows = self.catalog_rows(conn, template, &args).await?;
        let Some(first) = rows.first() else {
            return Ok(definition);
        };

        // one row per firing event
        let mut events: Vec<String> = Vec::new();
        for event in rows.iter().filter_map(|row| text(row, 1)) {
            if !events.contains(&event) {
                events.push(event);
            }
        }

        definition.timing = text(first, 0);
        definition.event = Some(events.join(" OR ")).filter(|e| !e.is_empty());
        definition.definition = rows.iter().find_map(|row| text(row, 2));
        definition.infer_from_definition();
        Ok(definition)
    }

    async fn get_sequence_definition(
        &self,
        conn: &dyn Connection,
        sequence_name: &str,
        database: Option<&str>,
    ) -> Result<SequenceDefinition, DatabaseError> {
        let mut definition = SequenceDefinition::minimal(sequence_name);
        let Some(template) = self.dialect.catalog.sequence_definition else {
            return Ok(definition);
        };

        let args = CatalogArgs::database(database).with_name(sequence_name);
        let rows = self.catalog_rows(conn, template, &args).await?;
        if let Some(row) = rows.first() {
            definition.start_value = number(row, 0);
            definition.increment = number(row, 1);
            definition.min_value = number(row, 2);
            definition.max_value = number(row, 3);
            definition.cycle = flag(row, 4);
        }
        Ok(definition)
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn build_select_query(
        &self,
        table: &str,
        limit: usize,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> String {
        self.dialect.build_select_query(table, limit, database, schema)
    }

    async fn execute_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
        max_rows: Option<usize>,
    ) -> Result<RowSet, DatabaseError> {
        let (columns, rows) = Self::cursor(conn)?.fetch(sql, &[], fetch_limit(max_rows)).await?;
        let (rows, truncated) = apply_row_limit(rows, max_rows);
        debug!(
            adapter = self.dialect.name,
            rows = rows.len(),
            truncated,
            "Query finished"
        );
        Ok(RowSet {
            columns,
            rows,
            truncated,
        })
    }

    async fn execute_non_query(&self, conn: &dyn Connection, sql: &str) -> Result<u64, DatabaseError> {
        let affected = Self::cursor(conn)?.execute(sql).await?;
        debug!(adapter = self.dialect.name, affected, "Statement finished");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dialect::{COCKROACHDB, DUCKDB, MYSQL, ORACLE, POSTGRES, SQLITE};
    use crate::db::testing::{MockConnection, MockDriver, MOCK_DIALECT};

    fn s(v: &str) -> CellValue {
        CellValue::String(v.to_string())
    }

    fn adapter(dialect: &'static Dialect) -> SqlAdapter {
        SqlAdapter::new(dialect, Arc::new(MockDriver::new()))
    }

    #[tokio::test]
    async fn test_execute_query_truncation_boundary() {
        let adapter = adapter(&MOCK_DIALECT);
        for n in [0usize, 1, 3] {
            let exact = MockConnection::new().with_rows("SELECT", &["id"], n);
            let result = adapter.execute_query(&exact, "SELECT * FROM t", Some(n)).await.unwrap();
            assert_eq!(result.rows.len(), n);
            assert!(!result.truncated);

            let more = MockConnection::new().with_rows("SELECT", &["id"], n + 5);
            let result = adapter.execute_query(&more, "SELECT * FROM t", Some(n)).await.unwrap();
            assert_eq!(result.rows.len(), n);
            assert!(result.truncated);
            assert_eq!(more.last_limit(), Some(n + 1));
        }

        let all = MockConnection::new().with_rows("SELECT", &["id"], 25);
        let result = adapter.execute_query(&all, "SELECT * FROM t", None).await.unwrap();
        assert_eq!(result.rows.len(), 25);
        assert!(!result.truncated);
        assert_eq!(result.columns, vec!["id".to_string()]);
    }

    #[tokio::test]
    async fn test_postgres_triggers_deduplicated_across_events() {
        let conn = MockConnection::new().with_response(
            "information_schema.triggers",
            &["trigger_name", "event_object_table"],
            vec![
                vec![s("audit_orders"), s("orders")],
                vec![s("audit_orders"), s("orders")],
                vec![s("touch"), s("items")],
            ],
        );
        let triggers = adapter(&POSTGRES).get_triggers(&conn, None).await.unwrap();
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].name, "audit_orders");
        assert_eq!(triggers[1].table_name, "items");
    }

    #[tokio::test]
    async fn test_capability_off_returns_empty_without_querying() {
        let conn = MockConnection::new().failing("catalog should not be queried");
        assert!(adapter(&SQLITE).get_databases(&conn).await.unwrap().is_empty());
        assert!(adapter(&SQLITE).get_procedures(&conn, None).await.unwrap().is_empty());
        assert!(adapter(&SQLITE).get_sequences(&conn, None).await.unwrap().is_empty());
        assert!(adapter(&COCKROACHDB).get_triggers(&conn, None).await.unwrap().is_empty());
        assert_eq!(conn.executed().len(), 0);
    }

    #[tokio::test]
    async fn test_get_columns_merges_primary_keys_and_binds_default_schema() {
        let conn = MockConnection::new()
            .with_response("PRIMARY KEY", &["column_name"], vec![vec![s("id")]])
            .with_response(
                "information_schema.columns",
                &["column_name", "data_type"],
                vec![vec![s("id"), s("integer")], vec![s("email"), s("text")]],
            );
        let columns = adapter(&POSTGRES).get_columns(&conn, "users", None, None).await.unwrap();
        assert_eq!(columns.len(), 2);
        assert!(columns[0].is_primary_key);
        assert!(!columns[1].is_primary_key);
        assert_eq!(columns[1].data_type, "text");

        let executed = conn.executed();
        assert!(executed.iter().all(|(_, params)| params == &vec!["public".to_string(), "users".to_string()]));
    }

    #[tokio::test]
    async fn test_index_definition_synthesized_without_native_ddl() {
        let conn = MockConnection::new().with_response(
            "information_schema.statistics",
            &["column_name", "is_unique", "index_type", "ddl"],
            vec![
                vec![s("email"), CellValue::Int(1), s("BTREE"), CellValue::Null],
                vec![s("tenant"), CellValue::Int(1), s("BTREE"), CellValue::Null],
            ],
        );
        let def = adapter(&MYSQL)
            .get_index_definition(&conn, "idx_email", "users", Some("shop"))
            .await
            .unwrap();
        assert_eq!(def.columns, vec!["email".to_string(), "tenant".to_string()]);
        assert!(def.is_unique);
        assert_eq!(def.index_type.as_deref(), Some("BTREE"));
        assert_eq!(
            def.definition.as_deref(),
            Some("CREATE UNIQUE INDEX `idx_email` ON `users` (`email`, `tenant`)")
        );
    }

    #[tokio::test]
    async fn test_missing_definition_returns_minimal_shape() {
        let conn = MockConnection::new();
        let def = adapter(&POSTGRES)
            .get_sequence_definition(&conn, "order_seq", None)
            .await
            .unwrap();
        assert_eq!(def, SequenceDefinition::minimal("order_seq"));

        let trigger = adapter(&POSTGRES)
            .get_trigger_definition(&conn, "t", "orders", None)
            .await
            .unwrap();
        assert_eq!(trigger, TriggerDefinition::minimal("t", "orders"));
    }

    #[tokio::test]
    async fn test_sequence_definition_parses_text_catalog_values() {
        let conn = MockConnection::new().with_response(
            "information_schema.sequences",
            &["start_value", "increment", "minimum_value", "maximum_value", "cycle_option"],
            vec![vec![s("1"), s("1"), s("1"), s("9223372036854775807"), s("NO")]],
        );
        let def = adapter(&POSTGRES)
            .get_sequence_definition(&conn, "order_seq", None)
            .await
            .unwrap();
        assert_eq!(def.start_value, Some(1));
        assert_eq!(def.max_value, Some(i64::MAX));
        assert_eq!(def.cycle, Some(false));
    }

    #[tokio::test]
    async fn test_trigger_definition_joins_events() {
        let conn = MockConnection::new().with_response(
            "information_schema.triggers",
            &["timing", "event", "ddl"],
            vec![
                vec![s("BEFORE"), s("INSERT"), s("CREATE TRIGGER audit ...")],
                vec![s("BEFORE"), s("UPDATE"), s("CREATE TRIGGER audit ...")],
            ],
        );
        let def = adapter(&POSTGRES)
            .get_trigger_definition(&conn, "audit", "orders", None)
            .await
            .unwrap();
        assert_eq!(def.timing.as_deref(), Some("BEFORE"));
        assert_eq!(def.event.as_deref(), Some("INSERT OR UPDATE"));
    }

    #[tokio::test]
    async fn test_connect_reports_missing_driver_kinds() {
        let oracle = SqlAdapter::without_driver(&ORACLE);
        let err = oracle
            .connect(&ConnectionConfig::tcp("o", "oracle", "h", None, "XE", "u", "p"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DatabaseError::MissingPlatformDriver { .. }));

        let duck = adapter(&DUCKDB);
        let err = duck.ensure_driver_available().unwrap_err();
        match err {
            DatabaseError::MissingDriver { driver, .. } => assert_eq!(driver, "DuckDB"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_uses_driver_and_test_query() {
        let driver = Arc::new(MockDriver::new());
        let adapter = SqlAdapter::new(&MOCK_DIALECT, driver.clone());
        let conn = adapter
            .connect(&ConnectionConfig::file("m", "mock", ":memory:"))
            .await
            .unwrap();
        adapter.execute_test_query(conn.as_ref()).await.unwrap();
        assert_eq!(driver.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_format_table_name_hides_default_schema() {
        let pg = adapter(&POSTGRES);
        assert_eq!(pg.format_table_name("public", "orders"), "orders");
        assert_eq!(pg.format_table_name("sales", "orders"), "sales.orders");
        assert_eq!(adapter(&MYSQL).format_table_name("", "orders"), "orders");
    }

    #[tokio::test]
    async fn test_close_signal_aborts_guarded_future() {
        let signal = Arc::new(CloseSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move {
                signal
                    .guard(async {
                        std::future::pending::<()>().await;
                        Ok::<_, DatabaseError>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(signal.trigger());
        assert!(!signal.trigger());
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(DatabaseError::ConnectionClosed)));
    }
}
