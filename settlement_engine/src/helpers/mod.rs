mod partitioning;

pub use partitioning::partition_for_key;
