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


use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info, trace, warn};

use super::{sort_hub_messages, sort_partition_messages, PartitionCache, QuerySpec};
use crate::hub::HubConnectionManager;
use crate::message::{BodyFormat, EventMessage};
use crate::partition::{HubPartition, PartitionCursor, PartitionInfo, PartitionMetadataService};
use crate::remote::{RemoteLogError, StartPosition};
use crate::service::ReaderConfig;
use crate::utils::{fan_out, half_of};
use crate::{AppError, AppResult};

type CacheCell = Arc<OnceCell<Arc<PartitionCache>>>;

/// Answers message reads and queries from per-partition caches, catching a
/// cache up with the remote log only as far as a request needs.
///
/// A cache is created on the first request that needs it and lives until its
/// hub is evicted or the reader is closed. Concurrent first requests for the
/// same partition share one creation, so a partition never gets two receivers.
pub struct PartitionReader {
    connections: Arc<HubConnectionManager>,
    metadata: Arc<PartitionMetadataService>,
    caches: DashMap<HubPartition, CacheCell>,
    config: ReaderConfig,
}

impl PartitionReader {
    pub fn new(
        connections: Arc<HubConnectionManager>,
        metadata: Arc<PartitionMetadataService>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            connections,
            metadata,
            caches: DashMap::new(),
            config,
        }
    }

    /// One message by sequence number. A cached message is served without any
    /// remote call; otherwise the partition is read up to `sequence_number`.
    pub async fn get_message(
        &self,
        hub_id: &str,
        partition_id: &str,
        sequence_number: i64,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<EventMessage> {
        let partition = HubPartition::new(hub_id, partition_id);
        let cached = self
            .existing(&partition)
            .and_then(|cache| cache.get(sequence_number));
        let event = match cached {
            Some(event) => event,
            None => {
                let info = self.metadata.partition_info(hub_id, partition_id).await?;
                let target = PartitionCursor::target_from_sequence_number(sequence_number);
                self.catch_up(&partition, &info, &target)
                    .await?
                    .and_then(|cache| cache.get(sequence_number))
                    .ok_or_else(|| AppError::MessageNotFound {
                        partition: partition.to_string(),
                        sequence_number,
                    })?
            }
        };
        Ok(EventMessage::from_event(hub_id, partition_id, &event, formats))
    }

    /// Everything enqueued in the partition so far, newest sequence number first.
    pub async fn get_all_messages(
        &self,
        hub_id: &str,
        partition_id: &str,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<Vec<EventMessage>> {
        let partition = HubPartition::new(hub_id, partition_id);
        let info = self.metadata.partition_info(hub_id, partition_id).await?;
        let events = match self.catch_up(&partition, &info, &info.tail_target()).await? {
            Some(cache) => cache.all(),
            None => Vec::new(),
        };

        let mut messages: Vec<EventMessage> = events
            .iter()
            .map(|event| EventMessage::from_event(hub_id, partition_id, event, formats))
            .collect();
        sort_partition_messages(&mut messages);
        Ok(messages)
    }

    /// Messages of one partition accepted by `spec`, newest sequence number first.
    pub async fn query_partition(
        &self,
        hub_id: &str,
        partition_id: &str,
        spec: &QuerySpec,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<Vec<EventMessage>> {
        let partition = HubPartition::new(hub_id, partition_id);
        let info = self.metadata.partition_info(hub_id, partition_id).await?;
        let target = spec.target(info.last_enqueued_sequence_number);
        let events = match self.catch_up(&partition, &info, &target).await? {
            Some(cache) => cache.select(spec),
            None => Vec::new(),
        };

        let mut messages: Vec<EventMessage> = events
            .iter()
            .map(|event| EventMessage::from_event(hub_id, partition_id, event, formats))
            .collect();
        sort_partition_messages(&mut messages);
        trace!("{} query matched {} messages", partition, messages.len());
        Ok(messages)
    }

    /// Runs `spec` against every partition of the hub concurrently, with half
    /// as many tasks in flight as there are partitions. Results are merged
    /// newest enqueued time first, then newest sequence number.
    pub async fn query_hub(
        self: &Arc<Self>,
        hub_id: &str,
        spec: &QuerySpec,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<Vec<EventMessage>> {
        let partition_ids = self.metadata.partition_ids(hub_id)?;
        let concurrency = half_of(partition_ids.len());
        let spec = spec.clone().with_full_sequence_range();
        let hub = hub_id.to_string();
        let reader = self.clone();
        let formats = formats.clone();

        let partials = fan_out(partition_ids, concurrency, move |partition_id| {
            let reader = reader.clone();
            let hub = hub.clone();
            let spec = spec.clone();
            let formats = formats.clone();
            async move {
                reader
                    .query_partition(&hub, &partition_id, &spec, &formats)
                    .await
            }
        })
        .await?;

        let mut messages: Vec<EventMessage> = partials.into_iter().flatten().collect();
        sort_hub_messages(&mut messages);
        debug!("{} hub query matched {} messages", hub_id, messages.len());
        Ok(messages)
    }

    /// Number of partitions with a live cache.
    pub fn cache_count(&self) -> usize {
        self.caches
            .iter()
            .filter(|cell| cell.value().initialized())
            .count()
    }

    /// Drops every cache of the hub and closes their receivers.
    pub async fn evict_hub(&self, hub_id: &str) {
        let partitions: Vec<HubPartition> = self
            .caches
            .iter()
            .filter(|cell| cell.key().hub_id == hub_id)
            .map(|cell| cell.key().clone())
            .collect();

        let mut closed = 0;
        for partition in partitions {
            let Some((_, cell)) = self.caches.remove(&partition) else {
                continue;
            };
            if let Some(cache) = cell.get() {
                if let Err(err) = cache.close().await {
                    warn!("closing receiver of {} failed: {}", partition, err);
                }
                closed += 1;
            }
        }
        if closed > 0 {
            info!("evicted {} partition caches of {}", closed, hub_id);
        }
    }

    /// Closes every receiver concurrently and drops all caches. Receivers that
    /// do not close within `close_timeout` are logged and left behind.
    pub async fn close_all(&self, close_timeout: Duration) {
        let partitions: Vec<HubPartition> =
            self.caches.iter().map(|cell| cell.key().clone()).collect();
        // remove before inspecting: a cell filled after its removal is closed by its opener
        let caches: Vec<Arc<PartitionCache>> = partitions
            .iter()
            .filter_map(|partition| self.caches.remove(partition))
            .filter_map(|(_, cell)| cell.get().cloned())
            .collect();
        if caches.is_empty() {
            return;
        }
        info!("closing {} partition receivers", caches.len());

        let mut closing = JoinSet::new();
        for cache in caches {
            closing.spawn(async move {
                if let Err(err) = cache.close().await {
                    warn!("closing receiver of {} failed: {}", cache.partition(), err);
                }
            });
        }
        let all_closed = async { while closing.join_next().await.is_some() {} };
        if time::timeout(close_timeout, all_closed).await.is_err() {
            warn!(
                "{} receivers did not close within {:?}",
                closing.len(),
                close_timeout
            );
            closing.detach_all();
        }
    }

    fn existing(&self, partition: &HubPartition) -> Option<Arc<PartitionCache>> {
        self.caches
            .get(partition)
            .and_then(|cell| cell.value().get().cloned())
    }

    /// Brings the partition's cache up to `target`. An empty partition is
    /// never read: whatever is already cached, if anything, is returned as is.
    async fn catch_up(
        &self,
        partition: &HubPartition,
        info: &PartitionInfo,
        target: &PartitionCursor,
    ) -> AppResult<Option<Arc<PartitionCache>>> {
        if info.is_empty {
            trace!("{} is empty, nothing to read", partition);
            return Ok(self.existing(partition));
        }
        let cache = self.cache(partition, info).await?;
        cache
            .advance_to(target, self.config.max_batch, self.config.receive_timeout())
            .await?;
        Ok(Some(cache))
    }

    async fn cache(
        &self,
        partition: &HubPartition,
        info: &PartitionInfo,
    ) -> AppResult<Arc<PartitionCache>> {
        // clone the cell out so no map guard is held across the await
        let cell = self.caches.entry(partition.clone()).or_default().clone();
        let cache = cell
            .get_or_try_init(|| self.open_cache(partition, info.begin_sequence_number))
            .await?
            .clone();

        // the cell may have been evicted while the receiver was opening
        let registered = self
            .caches
            .get(partition)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &cell));
        if !registered {
            debug!("{} was evicted while opening, closing its receiver", partition);
            if let Err(err) = cache.close().await {
                warn!("closing receiver of {} failed: {}", partition, err);
            }
            return Err(AppError::Remote(RemoteLogError::Closed(partition.to_string())));
        }
        Ok(cache)
    }

    async fn open_cache(
        &self,
        partition: &HubPartition,
        begin_sequence_number: i64,
    ) -> AppResult<Arc<PartitionCache>> {
        let client = self.connections.client(&partition.hub_id)?;
        let consumer_group = self
            .connections
            .connection(&partition.hub_id)?
            .consumer_group_name;
        let start = StartPosition::AfterSequenceNumber(begin_sequence_number - 1);
        let timeout = self.config.operation_timeout();

        let receiver = time::timeout(
            timeout,
            client.create_receiver(&consumer_group, &partition.partition_id, start),
        )
        .await
        .map_err(|_| AppError::Timeout(format!("opening receiver on {}", partition)))??;

        debug!(
            "{} receiver opened in group {} at {:?}",
            partition, consumer_group, start
        );
        Ok(Arc::new(PartitionCache::new(
            partition.clone(),
            PartitionCursor::before(begin_sequence_number),
            receiver,
        )))
    }
}
