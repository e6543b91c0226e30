use blake2::{digest::consts::U32, Blake2b, Digest};

/// Maps an event key (the transaction id) to a log partition.
///
/// Partition assignments are persisted with the event, so the hash must be stable across processes and
/// releases; `DefaultHasher` gives no such guarantee, Blake2b does.
pub fn partition_for_key(key: &str, partition_count: u32) -> u32 {
    assert!(partition_count > 0, "partition_count must be at least 1");
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let prefix = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % partition_count
}
