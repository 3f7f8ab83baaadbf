// Connection Session
// Owns one live connection and its adapter. The connection and any SSH
// tunnel are released when the session is closed or dropped.

use crate::db::config::ConnectionConfig;
use crate::db::query::{
    is_select_query, split_statements, ExecutionResult, MultiStatementResult, NonQueryResult,
    QueryResult, StatementResult,
};
use crate::db::registry::ProviderRegistry;
use crate::db::traits::{Connection, DatabaseAdapter, DatabaseError};
use crate::db::tunnel::{stop_tunnel, TunnelHandle, TunnelProvider};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Closes a connection, logging instead of propagating a failure
pub(crate) fn close_quietly(conn: &dyn Connection) {
    if let Err(e) = conn.close() {
        warn!(connection_id = conn.connection_id(), error = %e, "Failed to close connection");
    }
}

pub struct ConnectionSession {
    config: ConnectionConfig,
    adapter: Arc<dyn DatabaseAdapter>,
    connection: Option<Arc<dyn Connection>>,
    tunnel: Option<Box<dyn TunnelHandle>>,
    /// Local end of the tunnel, reused when reconnecting
    forwarded: Option<(String, u16)>,
}

impl ConnectionSession {
    /// Opens a session, starting an SSH tunnel first when the config asks
    /// for one. The adapter then connects to the forwarded local endpoint.
    pub async fn open(
        config: ConnectionConfig,
        adapter: Arc<dyn DatabaseAdapter>,
        tunnels: &dyn TunnelProvider,
    ) -> Result<Self, DatabaseError> {
        // dropping the endpoint stops the tunnel on every early exit
        let mut endpoint = tunnels.create_tunnel(&config).await?;
        let connect_config = endpoint.connect_config(&config)?;
        let forwarded = match (endpoint.is_tunneled(), endpoint.port) {
            (true, Some(port)) => Some((endpoint.host.clone(), port)),
            _ => None,
        };

        let connection = adapter.connect(&connect_config).await?;

        info!(
            name = %config.name,
            db_type = %config.db_type,
            connection_id = connection.connection_id(),
            tunneled = forwarded.is_some(),
            "Session opened"
        );

        Ok(Self {
            config,
            adapter,
            connection: Some(connection),
            tunnel: endpoint.take_handle(),
            forwarded,
        })
    }

    /// Resolves the adapter from the registry, then opens the session
    pub async fn open_with_registry(
        registry: &ProviderRegistry,
        config: ConnectionConfig,
        tunnels: &dyn TunnelProvider,
    ) -> Result<Self, DatabaseError> {
        let adapter = registry.get_adapter(&config.db_type)?;
        Self::open(config, adapter, tunnels).await
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn adapter(&self) -> &Arc<dyn DatabaseAdapter> {
        &self.adapter
    }

    pub fn connection(&self) -> Result<&Arc<dyn Connection>, DatabaseError> {
        self.connection.as_ref().ok_or(DatabaseError::ConnectionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none()
    }

    /// Database the session is currently connected to
    pub fn database(&self) -> &str {
        self.config.database()
    }

    /// Reconnects to another database on the same server, keeping the
    /// tunnel. The old connection is released only once the new one is up.
    pub async fn switch_database(&mut self, database: &str) -> Result<(), DatabaseError> {
        if self.is_closed() {
            return Err(DatabaseError::ConnectionClosed);
        }
        let config = self.config.with_database(database);
        let connect_config = match &self.forwarded {
            Some((host, port)) => config.with_endpoint(host, *port),
            None => config.clone(),
        };

        let connection = self.adapter.connect(&connect_config).await?;
        if let Some(old) = self.connection.replace(connection) {
            close_quietly(old.as_ref());
        }
        self.config = config;
        debug!(database = %database, "Session switched database");
        Ok(())
    }

    /// Replaces the connection with a fresh one to the current database
    pub async fn reconnect(&mut self) -> Result<(), DatabaseError> {
        let database = self.config.database().to_string();
        self.switch_database(&database).await
    }

    /// Runs one statement on the session connection
    pub async fn execute(&self, sql: &str, max_rows: Option<usize>) -> Result<ExecutionResult, DatabaseError> {
        let conn = self.connection()?;
        if is_select_query(sql) {
            let rows = self.adapter.execute_query(conn.as_ref(), sql, max_rows).await?;
            Ok(ExecutionResult::Query(QueryResult::from(rows)))
        } else {
            let rows_affected = self.adapter.execute_non_query(conn.as_ref(), sql).await?;
            Ok(ExecutionResult::NonQuery(NonQueryResult { rows_affected }))
        }
    }

    /// Runs every statement of a script in order, stopping at the first error
    pub async fn execute_script(&self, sql: &str, max_rows: Option<usize>) -> MultiStatementResult {
        let mut summary = MultiStatementResult {
            completed: true,
            ..Default::default()
        };

        for (index, statement) in split_statements(sql).into_iter().enumerate() {
            match self.execute(&statement, max_rows).await {
                Ok(result) => summary.results.push(StatementResult {
                    statement,
                    result: Some(result),
                    error: None,
                }),
                Err(e) => {
                    warn!(index, error = %e, "Script stopped at failing statement");
                    summary.results.push(StatementResult {
                        statement,
                        result: None,
                        error: Some(e.to_string()),
                    });
                    summary.completed = false;
                    summary.error_index = Some(index);
                    break;
                }
            }
        }
        summary
    }

    /// Closes the connection and stops the tunnel. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(conn) = self.connection.take() {
            close_quietly(conn.as_ref());
            debug!(connection_id = conn.connection_id(), "Session closed");
        }
        if let Some(handle) = self.tunnel.take() {
            stop_tunnel(handle);
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}
