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

use tracing::info;

use super::{AppResult, BrowserConfig};
use crate::hub::{HubConnection, HubConnectionManager, HubDefinition};
use crate::message::{BodyFormat, EventMessage};
use crate::partition::{HubStats, PartitionInfo, PartitionMetadataService};
use crate::reader::{PartitionReader, QuerySpec};
use crate::remote::RemoteLogConnector;

/// One operator's view onto a set of hubs.
///
/// A session owns every hub connection and partition cache it creates. They
/// live until [`BrowserSession::close`], which releases all receivers and hub
/// clients; nothing is shared between sessions.
pub struct BrowserSession {
    config: BrowserConfig,
    connections: Arc<HubConnectionManager>,
    metadata: Arc<PartitionMetadataService>,
    reader: Arc<PartitionReader>,
}

impl BrowserSession {
    pub fn new(config: BrowserConfig, connector: Arc<dyn RemoteLogConnector>) -> Self {
        let connections = Arc::new(HubConnectionManager::new(
            connector,
            config.general.default_consumer_group.clone(),
            config.reader.operation_timeout(),
        ));
        let metadata = Arc::new(PartitionMetadataService::new(
            connections.clone(),
            config.reader.metadata_timeout(),
        ));
        let reader = Arc::new(PartitionReader::new(
            connections.clone(),
            metadata.clone(),
            config.reader.clone(),
        ));
        info!("browser session opened");
        Self {
            config,
            connections,
            metadata,
            reader,
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn reader(&self) -> &Arc<PartitionReader> {
        &self.reader
    }

    pub async fn create_hub(&self, definition: &HubDefinition) -> AppResult<HubConnection> {
        self.connections.create(definition).await
    }

    /// Replaces a hub connection. Its partition caches are dropped first since
    /// their receivers belong to the old client.
    pub async fn update_hub(&self, id: &str, definition: &HubDefinition) -> AppResult<HubConnection> {
        self.reader.evict_hub(id).await;
        self.connections.update(id, definition).await
    }

    pub async fn delete_hub(&self, id: &str) -> bool {
        self.reader.evict_hub(id).await;
        self.connections.delete(id).await
    }

    pub async fn get_hub(&self, id: &str) -> AppResult<HubConnection> {
        self.connections.get(id).await
    }

    pub async fn list_hubs(&self) -> Vec<HubConnection> {
        self.connections.list().await
    }

    pub async fn hub_stats(&self, hub_id: &str) -> AppResult<HubStats> {
        self.metadata.hub_stats(hub_id).await
    }

    pub async fn partitions(&self, hub_id: &str) -> AppResult<Vec<PartitionInfo>> {
        self.metadata.partition_infos(hub_id).await
    }

    pub async fn partition(&self, hub_id: &str, partition_id: &str) -> AppResult<PartitionInfo> {
        self.metadata.partition_info(hub_id, partition_id).await
    }

    pub async fn messages(
        &self,
        hub_id: &str,
        partition_id: &str,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<Vec<EventMessage>> {
        self.reader
            .get_all_messages(hub_id, partition_id, formats)
            .await
    }

    pub async fn message(
        &self,
        hub_id: &str,
        partition_id: &str,
        sequence_number: i64,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<EventMessage> {
        self.reader
            .get_message(hub_id, partition_id, sequence_number, formats)
            .await
    }

    pub async fn query_partition(
        &self,
        hub_id: &str,
        partition_id: &str,
        spec: &QuerySpec,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<Vec<EventMessage>> {
        self.reader
            .query_partition(hub_id, partition_id, spec, formats)
            .await
    }

    pub async fn query_hub(
        &self,
        hub_id: &str,
        spec: &QuerySpec,
        formats: &BTreeSet<BodyFormat>,
    ) -> AppResult<Vec<EventMessage>> {
        self.reader.query_hub(hub_id, spec, formats).await
    }

    /// Closes every partition receiver, bounded by the configured close
    /// timeout, and then every hub client.
    pub async fn close(&self) {
        self.reader
            .close_all(self.config.reader.close_timeout())
            .await;
        self.connections.close_all().await;
        info!("browser session closed");
    }
}
