// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Contract with the broker side of a hub.
//!
//! The cache and query engine never talk to the wire protocol directly. They
//! open receivers, pull bounded batches and ask for runtime metadata through
//! the traits below. [`MemoryHub`] is an in-process implementation used by the
//! tests and by the `browse` command.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::hub::HubDefinition;
use crate::message::EventData;

pub use memory::{MemoryConnector, MemoryHub};

mod memory;

pub type RemoteResult<T> = Result<T, RemoteLogError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteLogError {
    /// another receiver of the same consumer group is attached to the partition
    #[error("receiver in use: {0}")]
    Conflict(String),

    #[error("remote call timed out: {0}")]
    Timeout(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("unknown partition: {0}")]
    UnknownPartition(String),

    #[error("receiver closed: {0}")]
    Closed(String),

    #[error("remote error: {0}")]
    Other(String),
}

/// Where a freshly created receiver starts. Only events strictly after the
/// position are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    StartOfStream,
    AfterSequenceNumber(i64),
}

impl StartPosition {
    pub fn admits(&self, sequence_number: i64) -> bool {
        match self {
            StartPosition::StartOfStream => true,
            StartPosition::AfterSequenceNumber(after) => sequence_number > *after,
        }
    }
}

/// Hub-level runtime information as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubRuntimeInfo {
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub partition_ids: Vec<String>,
}

/// Partition runtime information as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRuntimeInfo {
    pub partition_id: String,
    pub begin_sequence_number: i64,
    pub last_enqueued_sequence_number: i64,
    pub last_enqueued_time: DateTime<Utc>,
    pub last_enqueued_offset: String,
    pub is_empty: bool,
}

/// A cursor-based reader bound to one partition and one consumer group.
#[async_trait]
pub trait PartitionReceiver: Send + Sync {
    fn partition_id(&self) -> &str;

    /// Pulls at most `max_count` events following the receiver's position.
    /// An empty batch means the partition has nothing more to deliver right now.
    async fn receive(&mut self, max_count: usize, timeout: Duration)
        -> RemoteResult<Vec<EventData>>;

    async fn close(&mut self) -> RemoteResult<()>;
}

/// Per-hub handle to the broker.
#[async_trait]
pub trait RemoteLogClient: Send + Sync {
    async fn runtime_info(&self, timeout: Duration) -> RemoteResult<HubRuntimeInfo>;

    async fn partition_runtime_info(
        &self,
        partition_id: &str,
        timeout: Duration,
    ) -> RemoteResult<PartitionRuntimeInfo>;

    /// Opens a receiver. No retry policy is applied: a receiver already attached
    /// under `consumer_group` makes this fail with [`RemoteLogError::Conflict`].
    async fn create_receiver(
        &self,
        consumer_group: &str,
        partition_id: &str,
        start: StartPosition,
    ) -> RemoteResult<Box<dyn PartitionReceiver>>;

    async fn close(&self) -> RemoteResult<()>;
}

/// Builds clients from connection definitions.
#[async_trait]
pub trait RemoteLogConnector: Send + Sync {
    async fn connect(&self, definition: &HubDefinition) -> RemoteResult<Arc<dyn RemoteLogClient>>;
}
