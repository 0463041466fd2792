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


use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::trace;

use super::{HubPartition, HubStats, PartitionInfo};
use crate::hub::HubConnectionManager;
use crate::remote::RemoteLogClient;
use crate::utils::{fan_out, half_of};
use crate::{AppError, AppResult};

/// Fetches partition runtime metadata. Every call goes to the broker; nothing
/// is cached here.
pub struct PartitionMetadataService {
    connections: Arc<HubConnectionManager>,
    metadata_timeout: Duration,
}

impl PartitionMetadataService {
    pub fn new(connections: Arc<HubConnectionManager>, metadata_timeout: Duration) -> Self {
        Self {
            connections,
            metadata_timeout,
        }
    }

    /// Partition ids known from the hub's last status refresh.
    pub fn partition_ids(&self, hub_id: &str) -> AppResult<Vec<String>> {
        Ok(self.connections.connection(hub_id)?.partition_ids)
    }

    pub async fn partition_info(&self, hub_id: &str, partition_id: &str) -> AppResult<PartitionInfo> {
        let client = self.connections.client(hub_id)?;
        fetch_partition_info(client.as_ref(), hub_id, partition_id, self.metadata_timeout).await
    }

    /// Metadata of every partition, newest last-enqueued partition first.
    pub async fn partition_infos(&self, hub_id: &str) -> AppResult<Vec<PartitionInfo>> {
        let client = self.connections.client(hub_id)?;
        let partition_ids = self.partition_ids(hub_id)?;
        let concurrency = half_of(partition_ids.len());
        let timeout = self.metadata_timeout;
        let hub = hub_id.to_string();

        let mut infos = fan_out(partition_ids, concurrency, move |partition_id| {
            let client = client.clone();
            let hub = hub.clone();
            async move { fetch_partition_info(client.as_ref(), &hub, &partition_id, timeout).await }
        })
        .await?;

        infos.sort_by(|a, b| b.last_enqueued_date_time.cmp(&a.last_enqueued_date_time));
        Ok(infos)
    }

    pub async fn hub_stats(&self, hub_id: &str) -> AppResult<HubStats> {
        let infos = self.partition_infos(hub_id).await?;
        Ok(HubStats::from_partitions(&infos))
    }
}

async fn fetch_partition_info(
    client: &dyn RemoteLogClient,
    hub_id: &str,
    partition_id: &str,
    timeout: Duration,
) -> AppResult<PartitionInfo> {
    let runtime = time::timeout(timeout, client.partition_runtime_info(partition_id, timeout))
        .await
        .map_err(|_| {
            AppError::Timeout(format!(
                "runtime info of {}",
                HubPartition::new(hub_id, partition_id)
            ))
        })??;
    trace!(
        "{}:{} begin {} last {} empty {}",
        hub_id,
        partition_id,
        runtime.begin_sequence_number,
        runtime.last_enqueued_sequence_number,
        runtime.is_empty
    );
    Ok(PartitionInfo::from_runtime(hub_id, runtime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubDefinition;
    use crate::message::EventData;
    use crate::remote::{MemoryConnector, MemoryHub};
    use chrono::{TimeZone, Utc};

    async fn service(hub: &MemoryHub) -> PartitionMetadataService {
        let connector = MemoryConnector::new();
        connector.register(hub.clone());
        let connections = Arc::new(HubConnectionManager::new(
            Arc::new(connector),
            "$Default",
            Duration::from_secs(1),
        ));
        let (namespace, name) = hub.path().split_once('/').unwrap();
        connections
            .create(&HubDefinition {
                sas_key: "key".to_string(),
                event_hub_namespace: namespace.to_string(),
                event_hub_name: name.to_string(),
                consumer_group_name: None,
                sas_key_name: "reader".to_string(),
            })
            .await
            .unwrap();
        PartitionMetadataService::new(connections, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_partition_infos_sorted_newest_first() {
        let hub = MemoryHub::new("ns/orders", 3);
        let at = |s| Utc.timestamp_opt(s, 0).unwrap();
        hub.publish("0", EventData::new("a").with_enqueued_time(at(100))).unwrap();
        hub.publish("0", EventData::new("b").with_enqueued_time(at(200))).unwrap();
        hub.publish("2", EventData::new("c").with_enqueued_time(at(300))).unwrap();

        let service = service(&hub).await;
        let infos = service.partition_infos("ns/orders").await.unwrap();
        let ids: Vec<&str> = infos.iter().map(|info| info.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "0", "1"]);

        let stats = service.hub_stats("ns/orders").await.unwrap();
        assert_eq!(stats.active_events_count, 3);
        assert_eq!(stats.last_enqueued_date_time, Some(at(300)));
    }

    #[tokio::test]
    async fn test_unknown_hub_and_partition() {
        let hub = MemoryHub::new("ns/orders", 1);
        let service = service(&hub).await;

        let missing_hub = service.partition_info("ns/other", "0").await;
        assert!(matches!(missing_hub, Err(AppError::HubNotFound(_))));

        let missing_partition = service.partition_info("ns/orders", "5").await;
        assert!(matches!(missing_partition, Err(AppError::PartitionNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_hub_stats() {
        let hub = MemoryHub::new("ns/quiet", 2);
        let service = service(&hub).await;

        let stats = service.hub_stats("ns/quiet").await.unwrap();
        assert_eq!(stats.active_events_count, 0);
        assert!(stats.last_enqueued_date_time.is_none());
    }
}
