use sqlx::SqliteConnection;

use crate::db_types::{NewStatusOverride, StatusOverride, TransactionId, TransactionStatus};

pub async fn insert_override(
    ovr: &NewStatusOverride,
    previous_status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<StatusOverride, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
        INSERT INTO status_overrides (transaction_id, admin_id, previous_status, new_status, justification)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *"#,
    )
    .bind(ovr.transaction_id.as_str())
    .bind(&ovr.admin_id)
    .bind(previous_status)
    .bind(ovr.new_status)
    .bind(&ovr.justification)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_for_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Vec<StatusOverride>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM status_overrides WHERE transaction_id = $1 ORDER BY id")
        .bind(id.as_str())
        .fetch_all(conn)
        .await
}
