use log::trace;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};

use crate::db_types::LogEvent;

/// Appends an event to the log. The partition must have been derived from the key before calling; it is
/// stored with the event and never changes.
pub async fn append(
    topic: &str,
    partition: u32,
    key: &str,
    payload: &str,
    conn: &mut SqliteConnection,
) -> Result<LogEvent, sqlx::Error> {
    let event = sqlx::query_as(
        "INSERT INTO log_events (topic, partition_id, key, payload) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(topic)
    .bind(partition)
    .bind(key)
    .bind(payload)
    .fetch_one(conn)
    .await?;
    Ok(event)
}

/// Returns the first event past the group's committed offset across the given partitions, or `None` when all
/// of them are drained. The offset is not advanced.
pub async fn next_event(
    group: &str,
    topic: &str,
    partitions: &[u32],
    conn: &mut SqliteConnection,
) -> Result<Option<LogEvent>, sqlx::Error> {
    if partitions.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::new(
        r#"
        SELECT e.* FROM log_events e
        LEFT JOIN consumer_offsets o
            ON o.group_id = "#,
    );
    builder.push_bind(group);
    builder.push(" AND o.topic = e.topic AND o.partition_id = e.partition_id WHERE e.topic = ");
    builder.push_bind(topic);
    builder.push(" AND e.seq >= COALESCE(o.next_seq, 1) AND e.partition_id IN (");
    let mut in_list = builder.separated(", ");
    for p in partitions {
        in_list.push_bind(*p);
    }
    builder.push(") ORDER BY e.seq LIMIT 1");
    trace!("📨️ Executing query: {}", builder.sql());
    let event = builder
        .build()
        .fetch_optional(conn)
        .await?
        .map(|row: SqliteRow| LogEvent::from_row(&row))
        .transpose()?;
    Ok(event)
}

/// Upserts the group's cursor for one partition. Used both to advance past a processed event and to rewind
/// for replay.
pub async fn commit_offset(
    group: &str,
    topic: &str,
    partition: u32,
    next_seq: i64,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO consumer_offsets (group_id, topic, partition_id, next_seq)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (group_id, topic, partition_id)
        DO UPDATE SET next_seq = excluded.next_seq, updated_at = CURRENT_TIMESTAMP"#,
    )
    .bind(group)
    .bind(topic)
    .bind(partition)
    .bind(next_seq)
    .execute(conn)
    .await?;
    Ok(())
}
