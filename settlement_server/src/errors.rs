use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize the server. {0}")]
    Initialization(String),
    #[error("Invalid configuration. {0}")]
    Configuration(String),
    #[error("Database error. {0}")]
    Database(String),
}

impl From<sqlx::Error> for ServerError {
    fn from(e: sqlx::Error) -> Self {
        ServerError::Database(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ServerError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        ServerError::Database(e.to_string())
    }
}
