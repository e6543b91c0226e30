use log::*;
use rand::Rng;
use settlement_engine::db;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    create_database(url).await;
    run_migrations(url).await;
}

/// Each test gets its own database file so suites can run in parallel.
pub fn random_db_path() -> String {
    let id: u64 = rand::thread_rng().gen();
    format!("sqlite://../data/test_{id:016x}.db")
}

async fn run_migrations(url: &str) {
    let pool = db::new_pool(url, 1).await.expect("Error creating connection to database");
    db::run_migrations(&pool).await.expect("Error running DB migrations");
    pool.close().await;
}

async fn create_database(url: &str) {
    let _ = Sqlite::drop_database(url).await;
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("🚀️ Created {url}");
}
