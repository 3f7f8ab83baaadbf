// SQL Terminal Core
// Engine adapters, connection provider registry and cancellable execution
// for a terminal SQL client

pub mod db;

pub use db::{
    CancellableQuery, ConnectionConfig, ConnectionSession, DatabaseAdapter, DatabaseError, ProviderRegistry,
    SchemaService,
};
