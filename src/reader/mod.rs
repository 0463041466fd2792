pub use cache::PartitionCache;
pub use partition_reader::PartitionReader;
pub use query::{sort_hub_messages, sort_partition_messages, QuerySpec};

mod cache;
mod partition_reader;
mod query;
