mod hub;
mod message;
mod partition;
mod reader;
mod remote;
mod service;
mod utils;

pub use hub::{hub_id, ConnectionStatus, HubConnection, HubConnectionManager, HubDefinition};
pub use message::{
    body_formats, BodyFormat, BodyRepresentation, EventData, EventMessage, CONTENT_ENCODING,
};
pub use partition::{HubPartition, HubStats, PartitionCursor, PartitionInfo, PartitionMetadataService};
pub use reader::{PartitionCache, PartitionReader, QuerySpec};
pub use remote::{
    HubRuntimeInfo, MemoryConnector, MemoryHub, PartitionReceiver, PartitionRuntimeInfo,
    RemoteLogClient, RemoteLogConnector, RemoteLogError, RemoteResult, StartPosition,
};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, BrowserConfig, BrowserSession,
    ErrorKind, GeneralConfig, LogConfig, ReaderConfig,
};
pub use utils::{fan_out, half_of};
