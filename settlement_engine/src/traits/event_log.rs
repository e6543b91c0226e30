use crate::{db_types::LogEvent, traits::SettlementError};

/// A durable, partitioned, replayable append-only log with consumer-group semantics.
///
/// Delivery is at-least-once: an event stays readable until its group's offset moves past it, so consumers
/// must be idempotent. Ordering is preserved per partition; a partition is owned by exactly one worker of a
/// group at a time.
#[allow(async_fn_in_trait)]
pub trait EventLog {
    /// The number of partitions each topic is divided into.
    fn partition_count(&self) -> u32;

    /// Append an event. The partition is derived from a stable hash of `key` and fixed for the lifetime of
    /// the event.
    async fn append_event(&self, topic: &str, key: &str, payload: String) -> Result<LogEvent, SettlementError>;

    /// Read the first unconsumed event for `group` across the given partitions, or `None` if the partitions
    /// are fully drained. Does not advance the offset.
    fn next_event(
        &self,
        group: &str,
        topic: &str,
        partitions: &[u32],
    ) -> impl std::future::Future<Output = Result<Option<LogEvent>, SettlementError>> + Send;

    /// Advance the group's offset past `event`. Called after the event has been fully processed (or
    /// deliberately skipped).
    fn commit_event(
        &self,
        group: &str,
        event: &LogEvent,
    ) -> impl std::future::Future<Output = Result<(), SettlementError>> + Send;

    /// Move a group's cursor for one partition to `seq`. This is the manual replay hatch for events whose
    /// processing exhausted its retries: the log is durable, so nothing is lost, and rewinding the offset
    /// redelivers from that point.
    async fn rewind(&self, group: &str, topic: &str, partition: u32, seq: i64) -> Result<(), SettlementError>;
}
