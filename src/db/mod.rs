// Database Module
// Adapters, provider registry, sessions and schema exploration

pub mod cancellable;
pub mod config;
pub mod cursor;
pub mod dialect;
pub mod drivers;
pub mod explorer;
pub mod query;
pub mod registry;
pub mod schema;
pub mod session;
pub mod traits;
pub mod tunnel;

#[cfg(test)]
pub mod testing;

pub use cancellable::{CancellableQuery, QueryState};
pub use config::{ConnectionConfig, Endpoint, FileEndpoint, TcpEndpoint, TunnelConfig};
pub use cursor::{CloseSignal, Cursor, Driver, SqlAdapter};
pub use dialect::Dialect;
pub use explorer::{ExplorerItem, FolderKind, Reconnect, SchemaService};
pub use query::{
    is_select_query, split_statements, ExecutionResult, MultiStatementResult, NonQueryResult, QueryResult,
    StatementResult,
};
pub use registry::{ConnectionSchema, DriverOverrides, FieldType, ProviderRegistry, ProviderSpec, SchemaField};
pub use schema::{
    ColumnInfo, IndexDefinition, IndexInfo, ObjectDefinition, SequenceDefinition, SequenceInfo, TableInfo,
    TriggerDefinition, TriggerInfo,
};
pub use session::ConnectionSession;
pub use traits::{Capabilities, CellValue, Connection, DatabaseAdapter, DatabaseError, Row, RowSet};
pub use tunnel::{DirectTunnels, TunnelEndpoint, TunnelHandle, TunnelProvider};
