// Database Drivers
// Cursor implementations for each bundled driver crate, and the adapter
// constructors that pair them with a dialect

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::db::cursor::{Driver, SqlAdapter};
use crate::db::dialect::{
    Dialect, COCKROACHDB, DUCKDB, FIREBIRD, MARIADB, MSSQL, MYSQL, ORACLE, POSTGRES, SQLITE,
    SUPABASE,
};
use crate::db::traits::{DatabaseAdapter, DatabaseError};
use std::sync::Arc;

/// Whether a runtime driver component is compiled into this build
pub fn driver_available(import_name: &str) -> bool {
    match import_name {
        "rusqlite" => cfg!(feature = "sqlite"),
        "tokio-postgres" => cfg!(feature = "postgres"),
        "tiberius" => cfg!(feature = "mssql"),
        "sqlx-mysql" => cfg!(feature = "mysql"),
        _ => false,
    }
}

/// Returns the first import name of `names` missing from this build
pub fn first_missing_driver<'a>(names: &[&'a str]) -> Option<&'a str> {
    names.iter().copied().find(|name| !driver_available(name))
}

#[cfg(feature = "sqlite")]
fn sqlite_driver() -> Option<Arc<dyn Driver>> {
    Some(Arc::new(sqlite::SqliteDriver::new()))
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_driver() -> Option<Arc<dyn Driver>> {
    None
}

#[cfg(feature = "postgres")]
fn postgres_driver() -> Option<Arc<dyn Driver>> {
    Some(Arc::new(postgres::PostgresDriver::new()))
}

#[cfg(not(feature = "postgres"))]
fn postgres_driver() -> Option<Arc<dyn Driver>> {
    None
}

#[cfg(feature = "mssql")]
fn mssql_driver() -> Option<Arc<dyn Driver>> {
    Some(Arc::new(mssql::MssqlDriver::new()))
}

#[cfg(not(feature = "mssql"))]
fn mssql_driver() -> Option<Arc<dyn Driver>> {
    None
}

#[cfg(feature = "mysql")]
fn mysql_driver() -> Option<Arc<dyn Driver>> {
    Some(Arc::new(mysql::MysqlDriver::new()))
}

#[cfg(not(feature = "mysql"))]
fn mysql_driver() -> Option<Arc<dyn Driver>> {
    None
}

fn build(dialect: &'static Dialect, driver: Option<Arc<dyn Driver>>) -> Arc<dyn DatabaseAdapter> {
    match driver {
        Some(driver) => Arc::new(SqlAdapter::new(dialect, driver)),
        None => Arc::new(SqlAdapter::without_driver(dialect)),
    }
}

pub fn mssql_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&MSSQL, mssql_driver())
}

pub fn sqlite_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&SQLITE, sqlite_driver())
}

pub fn postgresql_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&POSTGRES, postgres_driver())
}

pub fn cockroachdb_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&COCKROACHDB, postgres_driver())
}

pub fn supabase_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&SUPABASE, postgres_driver())
}

pub fn mysql_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&MYSQL, mysql_driver())
}

pub fn mariadb_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&MARIADB, mysql_driver())
}

// No bundled driver crates for these engines yet. The adapters still build
// SQL and describe their catalogs.

pub fn oracle_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&ORACLE, None)
}

pub fn duckdb_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&DUCKDB, None)
}

pub fn firebird_adapter() -> Arc<dyn DatabaseAdapter> {
    build(&FIREBIRD, None)
}

/// Maps a driver crate error into the query error variant
pub(crate) fn query_error(e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::QueryError(e.to_string())
}

pub(crate) fn connect_error(e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::ConnectionFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_components_are_unavailable() {
        assert!(!driver_available("oracle"));
        assert!(!driver_available("duckdb"));
        assert_eq!(first_missing_driver(&["duckdb"]), Some("duckdb"));
        assert_eq!(first_missing_driver(&[]), None);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_available_when_feature_enabled() {
        assert!(driver_available("rusqlite"));
        assert!(sqlite_adapter().ensure_driver_available().is_ok());
    }

    #[test]
    fn test_adapters_without_driver_report_missing() {
        let oracle = oracle_adapter();
        assert!(matches!(
            oracle.ensure_driver_available(),
            Err(DatabaseError::MissingPlatformDriver { .. })
        ));
        let firebird = firebird_adapter();
        assert!(matches!(
            firebird.ensure_driver_available(),
            Err(DatabaseError::MissingDriver { .. })
        ));
        assert_eq!(firebird.test_query(), "SELECT 1 FROM rdb$database");
    }

    #[test]
    fn test_family_members_share_sql_building() {
        assert_eq!(
            mariadb_adapter().build_select_query("t", 5, None, None),
            mysql_adapter().build_select_query("t", 5, None, None)
        );
        assert_eq!(supabase_adapter().quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(cockroachdb_adapter().default_schema(), "public");
    }
}
