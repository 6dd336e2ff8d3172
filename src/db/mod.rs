//! Database layer
//!
//! SQLite is the default for single-node deployments; MySQL is available
//! for larger ones. The driver is chosen from configuration and hidden
//! behind the `DatabasePool` trait object.
//!
//! # Usage
//!
//! ```ignore
//! use photosocial::config::DatabaseConfig;
//! use photosocial::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

use sqlx::{mysql::MySqlQueryResult, sqlite::SqliteQueryResult};

/// Run `$body` against the concrete pool behind a `DynDatabasePool`.
///
/// The body is expanded once per driver, so `$pool` is a `&SqlitePool` in
/// one arm and a `&MySqlPool` in the other. Queries that only use `?`
/// placeholders and portable SQL can be written once this way.
///
/// Submodules declared below see it through textual scope.
macro_rules! with_pool {
    ($db:expr, $pool:ident => $body:expr) => {
        match $db.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $pool = $db
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool is not available"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $pool = $db
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool is not available"))?;
                $body
            }
        }
    };
}

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// Uniform access to the id generated by an `INSERT`
pub(crate) trait InsertedId {
    fn inserted_id(&self) -> i64;
}

impl InsertedId for SqliteQueryResult {
    fn inserted_id(&self) -> i64 {
        self.last_insert_rowid()
    }
}

impl InsertedId for MySqlQueryResult {
    fn inserted_id(&self) -> i64 {
        self.last_insert_id() as i64
    }
}
