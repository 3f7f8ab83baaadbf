// Cancellable Query
// Runs one statement on a dedicated connection that another task can sever
// to abort the statement, whatever driver sits underneath

use crate::db::config::ConnectionConfig;
use crate::db::query::{is_select_query, ExecutionResult, NonQueryResult, QueryResult};
use crate::db::session::close_quietly;
use crate::db::traits::{Connection, DatabaseAdapter, DatabaseError};
use crate::db::tunnel::{stop_tunnel, TunnelHandle, TunnelProvider};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle of a cancellable query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    Created,
    Connecting,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueryState::Completed | QueryState::Failed | QueryState::Cancelled)
    }
}

struct Inner {
    state: QueryState,
    cancelled: bool,
    executing: bool,
    connection: Option<Arc<dyn Connection>>,
    tunnel: Option<Box<dyn TunnelHandle>>,
}

/// A query bound to its own connection so it can be cancelled without
/// touching any connection shared with other work.
///
/// `cancel` fires a cancellation token raced against every await in
/// `execute`, then force-closes the connection so the driver stops too.
pub struct CancellableQuery {
    id: String,
    sql: String,
    config: ConnectionConfig,
    adapter: Arc<dyn DatabaseAdapter>,
    tunnels: Arc<dyn TunnelProvider>,
    inner: Mutex<Inner>,
    token: CancellationToken,
}

/// Releases the connection and tunnel when `execute` returns or its future
/// is dropped
struct CleanupGuard<'a>(&'a CancellableQuery);

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        self.0.cleanup();
    }
}

impl CancellableQuery {
    pub fn new(
        sql: impl Into<String>,
        config: ConnectionConfig,
        adapter: Arc<dyn DatabaseAdapter>,
        tunnels: Arc<dyn TunnelProvider>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sql: sql.into(),
            config,
            adapter,
            tunnels,
            inner: Mutex::new(Inner {
                state: QueryState::Created,
                cancelled: false,
                executing: false,
                connection: None,
                tunnel: None,
            }),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> QueryState {
        self.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn is_executing(&self) -> bool {
        self.lock().executing
    }

    /// Runs the query on a fresh connection, through an SSH tunnel when the
    /// config asks for one. Data queries honor `max_rows`; anything else is
    /// run as a mutating statement. The connection and tunnel are always
    /// released before this returns.
    pub async fn execute(&self, max_rows: Option<usize>) -> Result<ExecutionResult, DatabaseError> {
        {
            let mut inner = self.lock();
            if inner.cancelled {
                return Err(DatabaseError::Cancelled);
            }
            if inner.state != QueryState::Created {
                return Err(DatabaseError::QueryError(
                    "query has already been executed".to_string(),
                ));
            }
            inner.executing = true;
            inner.state = QueryState::Connecting;
        }
        let _cleanup = CleanupGuard(self);

        info!(query_id = %self.id, db_type = %self.config.db_type, max_rows = ?max_rows, "Executing cancellable query");
        let result = self.run(max_rows).await;

        let mut inner = self.lock();
        if inner.cancelled {
            // partial results are discarded
            inner.state = QueryState::Cancelled;
            return Err(DatabaseError::Cancelled);
        }
        inner.state = if result.is_ok() {
            QueryState::Completed
        } else {
            QueryState::Failed
        };
        result
    }

    async fn run(&self, max_rows: Option<usize>) -> Result<ExecutionResult, DatabaseError> {
        let mut endpoint = self.guarded(self.tunnels.create_tunnel(&self.config)).await?;
        let connect_config = endpoint.connect_config(&self.config)?;
        {
            let mut inner = self.lock();
            inner.tunnel = endpoint.take_handle();
            if inner.cancelled {
                return Err(DatabaseError::Cancelled);
            }
        }

        let conn = self.guarded(self.adapter.connect(&connect_config)).await?;
        {
            let mut inner = self.lock();
            if inner.cancelled {
                drop(inner);
                close_quietly(conn.as_ref());
                return Err(DatabaseError::Cancelled);
            }
            inner.connection = Some(conn.clone());
            inner.state = QueryState::Executing;
        }

        if is_select_query(&self.sql) {
            let rows = self
                .guarded(self.adapter.execute_query(conn.as_ref(), &self.sql, max_rows))
                .await?;
            Ok(ExecutionResult::Query(QueryResult::from(rows)))
        } else {
            let rows_affected = self
                .guarded(self.adapter.execute_non_query(conn.as_ref(), &self.sql))
                .await?;
            Ok(ExecutionResult::NonQuery(NonQueryResult { rows_affected }))
        }
    }

    async fn guarded<T, F>(&self, fut: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = Result<T, DatabaseError>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DatabaseError::Cancelled),
            result = fut => result,
        }
    }

    /// Cancels the query from any task or thread. Only the first call has
    /// an effect and returns true; a finished query cannot be cancelled.
    pub fn cancel(&self) -> bool {
        let conn = {
            let mut inner = self.lock();
            if inner.cancelled || inner.state.is_terminal() {
                return false;
            }
            inner.cancelled = true;
            inner.state = QueryState::Cancelled;
            inner.connection.take()
        };
        self.token.cancel();
        info!(query_id = %self.id, had_connection = conn.is_some(), "Query cancelled");

        if let Some(conn) = conn {
            close_quietly(conn.as_ref());
        }
        true
    }

    fn cleanup(&self) {
        let (conn, tunnel) = {
            let mut inner = self.lock();
            inner.executing = false;
            if !inner.state.is_terminal() {
                // execute future dropped mid-flight
                inner.cancelled = true;
                inner.state = QueryState::Cancelled;
            }
            (inner.connection.take(), inner.tunnel.take())
        };
        if let Some(conn) = conn {
            close_quietly(conn.as_ref());
        }
        if let Some(handle) = tunnel {
            stop_tunnel(handle);
        }
        debug!(query_id = %self.id, "Cancellable query cleaned up");
    }
}
