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


use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{
    HubRuntimeInfo, PartitionReceiver, PartitionRuntimeInfo, RemoteLogClient, RemoteLogConnector,
    RemoteLogError, RemoteResult, StartPosition,
};
use crate::hub::{hub_id, HubDefinition};
use crate::message::EventData;

/// An in-process hub: a fixed set of append-only partitions that enforces the
/// one-receiver-per-consumer-group rule the broker applies.
#[derive(Debug, Clone)]
pub struct MemoryHub {
    state: Arc<HubState>,
}

#[derive(Debug)]
struct HubState {
    path: String,
    created_at: DateTime<Utc>,
    partitions: Vec<RwLock<MemoryPartition>>,
    attached: DashSet<(String, String)>,
    receive_calls: AtomicUsize,
    runtime_failure: Mutex<Option<RemoteLogError>>,
    receive_latency: Mutex<Option<Duration>>,
    open_latency: Mutex<Option<Duration>>,
}

#[derive(Debug, Default)]
struct MemoryPartition {
    begin_sequence_number: i64,
    next_offset: i64,
    events: Vec<EventData>,
}

impl MemoryHub {
    pub fn new(path: impl Into<String>, partition_count: usize) -> Self {
        let partitions = (0..partition_count)
            .map(|_| RwLock::new(MemoryPartition::default()))
            .collect();
        Self {
            state: Arc::new(HubState {
                path: path.into(),
                created_at: Utc::now(),
                partitions,
                attached: DashSet::new(),
                receive_calls: AtomicUsize::new(0),
                runtime_failure: Mutex::new(None),
                receive_latency: Mutex::new(None),
                open_latency: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.state.path
    }

    pub fn partition_ids(&self) -> Vec<String> {
        (0..self.state.partitions.len())
            .map(|index| index.to_string())
            .collect()
    }

    /// Appends `draft` to a partition. The hub assigns sequence number and offset;
    /// the draft's enqueued time is kept.
    pub fn publish(&self, partition_id: &str, draft: EventData) -> RemoteResult<EventData> {
        let mut partition = self.state.partition(partition_id)?.write();
        let sequence_number = partition.begin_sequence_number + partition.events.len() as i64;
        let offset = partition.next_offset;
        let body_len = draft.body.as_ref().map_or(0, |body| body.len()) as i64;
        partition.next_offset += body_len.max(1);

        let event = EventData {
            sequence_number,
            offset,
            ..draft
        };
        partition.events.push(event.clone());
        trace!(
            "{} partition {} published sequence number {} at offset {}",
            self.state.path,
            partition_id,
            sequence_number,
            offset
        );
        Ok(event)
    }

    /// Drops every event below `sequence_number`, as retention on the broker would.
    pub fn expire_before(&self, partition_id: &str, sequence_number: i64) -> RemoteResult<()> {
        let mut partition = self.state.partition(partition_id)?.write();
        if sequence_number <= partition.begin_sequence_number {
            return Ok(());
        }
        let drop_count = partition
            .events
            .partition_point(|event| event.sequence_number < sequence_number);
        partition.events.drain(..drop_count);
        partition.begin_sequence_number = sequence_number;
        Ok(())
    }

    /// Number of `receive` calls served so far, across all receivers.
    pub fn receive_calls(&self) -> usize {
        self.state.receive_calls.load(Ordering::SeqCst)
    }

    pub fn attached_receivers(&self) -> usize {
        self.state.attached.len()
    }

    /// Makes every metadata call fail with `failure` until reset with `None`.
    pub fn fail_runtime_info(&self, failure: Option<RemoteLogError>) {
        *self.state.runtime_failure.lock() = failure;
    }

    /// Delays every `receive`. A delay longer than the call's timeout makes it
    /// fail with [`RemoteLogError::Timeout`] instead.
    pub fn set_receive_latency(&self, latency: Option<Duration>) {
        *self.state.receive_latency.lock() = latency;
    }

    /// Delays receiver creation before the partition is attached.
    pub fn set_open_latency(&self, latency: Option<Duration>) {
        *self.state.open_latency.lock() = latency;
    }
}

impl HubState {
    fn partition(&self, partition_id: &str) -> RemoteResult<&RwLock<MemoryPartition>> {
        partition_id
            .parse::<usize>()
            .ok()
            .and_then(|index| self.partitions.get(index))
            .ok_or_else(|| RemoteLogError::UnknownPartition(format!("{}/{}", self.path, partition_id)))
    }

    fn check_failure(&self) -> RemoteResult<()> {
        match self.runtime_failure.lock().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteLogClient for MemoryHub {
    async fn runtime_info(&self, _timeout: Duration) -> RemoteResult<HubRuntimeInfo> {
        self.state.check_failure()?;
        Ok(HubRuntimeInfo {
            path: self.state.path.clone(),
            created_at: self.state.created_at,
            partition_ids: self.partition_ids(),
        })
    }

    async fn partition_runtime_info(
        &self,
        partition_id: &str,
        _timeout: Duration,
    ) -> RemoteResult<PartitionRuntimeInfo> {
        self.state.check_failure()?;
        let partition = self.state.partition(partition_id)?.read();
        let info = match partition.events.last() {
            Some(last) => PartitionRuntimeInfo {
                partition_id: partition_id.to_string(),
                begin_sequence_number: partition.begin_sequence_number,
                last_enqueued_sequence_number: last.sequence_number,
                last_enqueued_time: last.enqueued_time,
                last_enqueued_offset: last.offset.to_string(),
                is_empty: false,
            },
            None => PartitionRuntimeInfo {
                partition_id: partition_id.to_string(),
                begin_sequence_number: partition.begin_sequence_number,
                last_enqueued_sequence_number: partition.begin_sequence_number - 1,
                last_enqueued_time: DateTime::<Utc>::UNIX_EPOCH,
                last_enqueued_offset: "-1".to_string(),
                is_empty: true,
            },
        };
        Ok(info)
    }

    async fn create_receiver(
        &self,
        consumer_group: &str,
        partition_id: &str,
        start: StartPosition,
    ) -> RemoteResult<Box<dyn PartitionReceiver>> {
        self.state.partition(partition_id)?;
        let latency = *self.state.open_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let key = (consumer_group.to_string(), partition_id.to_string());
        if !self.state.attached.insert(key.clone()) {
            return Err(RemoteLogError::Conflict(format!(
                "partition {} of {} already has a receiver in consumer group {}",
                partition_id, self.state.path, consumer_group
            )));
        }
        debug!(
            "{} attached receiver for partition {} in group {}",
            self.state.path, partition_id, consumer_group
        );
        Ok(Box::new(MemoryReceiver {
            state: self.state.clone(),
            key,
            start,
            last_sequence_number: None,
            closed: false,
        }))
    }

    async fn close(&self) -> RemoteResult<()> {
        debug!("{} client closed", self.state.path);
        Ok(())
    }
}

struct MemoryReceiver {
    state: Arc<HubState>,
    key: (String, String),
    start: StartPosition,
    last_sequence_number: Option<i64>,
    closed: bool,
}

impl MemoryReceiver {
    fn admits(&self, sequence_number: i64) -> bool {
        match self.last_sequence_number {
            Some(last) => sequence_number > last,
            None => self.start.admits(sequence_number),
        }
    }

    fn detach(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.attached.remove(&self.key);
        }
    }
}

#[async_trait]
impl PartitionReceiver for MemoryReceiver {
    fn partition_id(&self) -> &str {
        &self.key.1
    }

    async fn receive(
        &mut self,
        max_count: usize,
        timeout: Duration,
    ) -> RemoteResult<Vec<EventData>> {
        if self.closed {
            return Err(RemoteLogError::Closed(self.key.1.clone()));
        }
        self.state.receive_calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.state.receive_latency.lock();
        if let Some(latency) = latency {
            if latency > timeout {
                tokio::time::sleep(timeout).await;
                return Err(RemoteLogError::Timeout(format!(
                    "receive on partition {} of {} after {:?}",
                    self.key.1, self.state.path, timeout
                )));
            }
            tokio::time::sleep(latency).await;
        }

        let batch: Vec<EventData> = {
            let partition = self.state.partition(&self.key.1)?.read();
            let first = partition
                .events
                .partition_point(|event| !self.admits(event.sequence_number));
            partition.events[first..]
                .iter()
                .take(max_count)
                .cloned()
                .collect()
        };
        if let Some(last) = batch.last() {
            self.last_sequence_number = Some(last.sequence_number);
        }
        Ok(batch)
    }

    async fn close(&mut self) -> RemoteResult<()> {
        self.detach();
        Ok(())
    }
}

impl Drop for MemoryReceiver {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Resolves hub definitions against registered [`MemoryHub`]s.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    hubs: DashMap<String, MemoryHub>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hub: MemoryHub) {
        self.hubs.insert(hub.path().to_string(), hub);
    }
}

#[async_trait]
impl RemoteLogConnector for MemoryConnector {
    async fn connect(&self, definition: &HubDefinition) -> RemoteResult<Arc<dyn RemoteLogClient>> {
        if definition.sas_key.is_empty() {
            return Err(RemoteLogError::Unauthorized(definition.sas_key_name.clone()));
        }
        let id = hub_id(&definition.event_hub_namespace, &definition.event_hub_name);
        let hub = self
            .hubs
            .get(&id)
            .map(|hub| hub.value().clone())
            .ok_or_else(|| RemoteLogError::Connection(format!("hub {} is not reachable", id)))?;
        Ok(Arc::new(hub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(body: &str) -> EventData {
        EventData::new(body.as_bytes().to_vec())
    }

    #[test]
    fn test_publish_assigns_positions() {
        let hub = MemoryHub::new("ns/hub", 2);
        let first = hub.publish("0", draft("abc")).unwrap();
        let second = hub.publish("0", draft("de")).unwrap();
        let other = hub.publish("1", draft("x")).unwrap();

        assert_eq!(first.sequence_number, 0);
        assert_eq!(second.sequence_number, 1);
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 3);
        assert_eq!(other.sequence_number, 0);
        assert!(hub.publish("7", draft("x")).is_err());
    }

    #[tokio::test]
    async fn test_receiver_conflict_and_release() {
        let hub = MemoryHub::new("ns/hub", 1);
        let mut receiver = hub
            .create_receiver("$Default", "0", StartPosition::StartOfStream)
            .await
            .unwrap();

        let conflict = hub
            .create_receiver("$Default", "0", StartPosition::StartOfStream)
            .await;
        assert!(matches!(conflict, Err(RemoteLogError::Conflict(_))));

        // other groups are independent
        assert!(hub
            .create_receiver("audit", "0", StartPosition::StartOfStream)
            .await
            .is_ok());

        receiver.close().await.unwrap();
        assert!(hub
            .create_receiver("$Default", "0", StartPosition::StartOfStream)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_receive_continues_from_position() {
        let hub = MemoryHub::new("ns/hub", 1);
        for i in 0..5 {
            hub.publish("0", draft(&i.to_string())).unwrap();
        }
        hub.expire_before("0", 1).unwrap();

        let mut receiver = hub
            .create_receiver("$Default", "0", StartPosition::AfterSequenceNumber(0))
            .await
            .unwrap();
        let timeout = Duration::from_secs(1);

        let batch = receiver.receive(2, timeout).await.unwrap();
        let sequences: Vec<i64> = batch.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2]);

        let batch = receiver.receive(10, timeout).await.unwrap();
        let sequences: Vec<i64> = batch.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![3, 4]);

        assert!(receiver.receive(10, timeout).await.unwrap().is_empty());
        assert_eq!(hub.receive_calls(), 3);
    }

    #[tokio::test]
    async fn test_receive_honors_timeout() {
        let hub = MemoryHub::new("ns/hub", 1);
        for i in 0..3 {
            hub.publish("0", draft(&i.to_string())).unwrap();
        }
        let mut receiver = hub
            .create_receiver("$Default", "0", StartPosition::StartOfStream)
            .await
            .unwrap();

        hub.set_receive_latency(Some(Duration::from_secs(5)));
        let started = tokio::time::Instant::now();
        let result = receiver.receive(10, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(RemoteLogError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1));

        // a timed out call does not move the position
        hub.set_receive_latency(None);
        let batch = receiver.receive(10, Duration::from_secs(1)).await.unwrap();
        let sequences: Vec<i64> = batch.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_empty_partition_runtime_info() {
        let hub = MemoryHub::new("ns/hub", 1);
        let info = hub
            .partition_runtime_info("0", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(info.is_empty);
        assert_eq!(info.begin_sequence_number, 0);
        assert_eq!(info.last_enqueued_sequence_number, -1);
    }
}
