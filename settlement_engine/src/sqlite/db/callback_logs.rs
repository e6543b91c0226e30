use sqlx::SqliteConnection;

use crate::db_types::{CallbackLogEntry, NewCallbackAttempt, TransactionId};

pub async fn insert_attempt(
    attempt: NewCallbackAttempt,
    conn: &mut SqliteConnection,
) -> Result<CallbackLogEntry, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
        INSERT INTO callback_logs (transaction_id, http_status, request_body, response_body)
        VALUES ($1, $2, $3, $4)
        RETURNING *"#,
    )
    .bind(attempt.transaction_id)
    .bind(attempt.http_status)
    .bind(attempt.request_body)
    .bind(attempt.response_body)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_for_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Vec<CallbackLogEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM callback_logs WHERE transaction_id = $1 ORDER BY id")
        .bind(id.as_str())
        .fetch_all(conn)
        .await
}
