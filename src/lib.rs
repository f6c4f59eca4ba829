use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

/// Pooled connections to the relational labels store.
pub type DbPool = Pool<SqliteConnectionManager>;

pub mod config;
pub mod helper;
pub mod models;
pub mod setup;
