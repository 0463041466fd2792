pub use cursor::PartitionCursor;
pub use hub_partition::HubPartition;
pub use info::{HubStats, PartitionInfo};
pub use metadata::PartitionMetadataService;

mod cursor;
mod hub_partition;
mod info;
mod metadata;
