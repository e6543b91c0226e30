//! # SQLite database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic
//! transaction as the need arises and call through to the functions without any other changes.
use log::info;
use sqlx::{migrate, sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod callback_logs;
pub mod event_log;
pub mod overrides;
pub mod transactions;
pub mod wallets;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), migrate::MigrateError> {
    migrate!("./migrations").run(pool).await?;
    info!("🚀️ Migrations complete");
    Ok(())
}
