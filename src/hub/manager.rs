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

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::{ConnectionStatus, HubConnection, HubDefinition};
use crate::remote::{RemoteLogClient, RemoteLogConnector, RemoteLogError};
use crate::{AppError, AppResult};

#[derive(Clone)]
struct HubEntry {
    connection: Arc<RwLock<HubConnection>>,
    client: Arc<dyn RemoteLogClient>,
}

/// Registry of the hubs a session has connected to.
pub struct HubConnectionManager {
    connector: Arc<dyn RemoteLogConnector>,
    hubs: DashMap<String, HubEntry>,
    default_consumer_group: String,
    operation_timeout: Duration,
}

impl HubConnectionManager {
    pub fn new(
        connector: Arc<dyn RemoteLogConnector>,
        default_consumer_group: impl Into<String>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            hubs: DashMap::new(),
            default_consumer_group: default_consumer_group.into(),
            operation_timeout,
        }
    }

    pub async fn create(&self, definition: &HubDefinition) -> AppResult<HubConnection> {
        let id = definition.id();
        if self.hubs.contains_key(&id) {
            return Err(AppError::HubExists(id));
        }

        let client = self.connector.connect(definition).await?;
        let mut connection = HubConnection::new(definition, &self.default_consumer_group);
        self.refresh_status(client.as_ref(), &mut connection).await;

        let entry = HubEntry {
            connection: Arc::new(RwLock::new(connection.clone())),
            client,
        };
        let duplicate = match self.hubs.entry(id.clone()) {
            Entry::Occupied(_) => Some(entry),
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                None
            }
        };
        if let Some(duplicate) = duplicate {
            // lost a race against a concurrent create of the same hub
            if let Err(err) = duplicate.client.close().await {
                warn!("closing duplicate client for {} failed: {}", id, err);
            }
            return Err(AppError::HubExists(id));
        }

        info!("hub connection {} registered: {:?}", id, connection.status);
        Ok(connection)
    }

    pub async fn update(&self, id: &str, definition: &HubDefinition) -> AppResult<HubConnection> {
        if !self.delete(id).await {
            return Err(AppError::HubNotFound(id.to_string()));
        }
        self.create(definition).await
    }

    /// Removes the hub and closes its client. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> bool {
        match self.hubs.remove(id) {
            Some((_, entry)) => {
                Self::close_client(id, entry.client.as_ref()).await;
                true
            }
            None => false,
        }
    }

    /// The connection with a freshly refreshed status.
    pub async fn get(&self, id: &str) -> AppResult<HubConnection> {
        let entry = self.entry(id)?;
        let mut connection = entry.connection.read().clone();
        self.refresh_status(entry.client.as_ref(), &mut connection).await;
        *entry.connection.write() = connection.clone();
        Ok(connection)
    }

    /// Every registered connection, each with a refreshed status. A failing hub
    /// is listed with its failure status.
    pub async fn list(&self) -> Vec<HubConnection> {
        let mut ids: Vec<String> = self.hubs.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();

        let mut connections = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(connection) = self.get(&id).await {
                connections.push(connection);
            }
        }
        connections
    }

    /// The last known connection details, without contacting the broker.
    pub fn connection(&self, id: &str) -> AppResult<HubConnection> {
        Ok(self.entry(id)?.connection.read().clone())
    }

    pub fn client(&self, id: &str) -> AppResult<Arc<dyn RemoteLogClient>> {
        Ok(self.entry(id)?.client)
    }

    pub async fn close_all(&self) {
        let ids: Vec<String> = self.hubs.iter().map(|entry| entry.key().clone()).collect();
        info!("deregistering {} hub connections", ids.len());
        for id in ids {
            self.delete(&id).await;
        }
    }

    fn entry(&self, id: &str) -> AppResult<HubEntry> {
        self.hubs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::HubNotFound(id.to_string()))
    }

    async fn refresh_status(&self, client: &dyn RemoteLogClient, connection: &mut HubConnection) {
        let runtime_info =
            time::timeout(self.operation_timeout, client.runtime_info(self.operation_timeout))
                .await
                .unwrap_or_else(|_| {
                    Err(RemoteLogError::Timeout(format!(
                        "runtime info of {}",
                        connection.id
                    )))
                });

        match runtime_info {
            Ok(info) => {
                connection.status = Some(ConnectionStatus::Connected);
                connection.partition_count = Some(info.partition_ids.len());
                connection.created_date_time = Some(info.created_at);
                connection.partition_ids = info.partition_ids;
                connection.partitions_link = Some(format!("/hubs/{}/partitions", connection.id));
                connection.stats_link = Some(format!("/hubs/{}/stats", connection.id));
            }
            Err(err) => {
                debug!("status refresh of {} failed: {}", connection.id, err);
                connection.status = Some(match err {
                    RemoteLogError::Unauthorized(_) => ConnectionStatus::Unauthorized,
                    RemoteLogError::Timeout(_) => ConnectionStatus::ConnectionTimeout,
                    _ => ConnectionStatus::Failed,
                });
            }
        }
    }

    async fn close_client(id: &str, client: &dyn RemoteLogClient) {
        match client.close().await {
            Ok(()) => info!("client for {} closed", id),
            Err(err) => error!("closing client for {} failed: {}", id, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryConnector, MemoryHub};

    fn definition(name: &str) -> HubDefinition {
        HubDefinition {
            sas_key: "key-value".to_string(),
            event_hub_namespace: "ns".to_string(),
            event_hub_name: name.to_string(),
            consumer_group_name: None,
            sas_key_name: "reader".to_string(),
        }
    }

    fn manager(hubs: &[MemoryHub]) -> HubConnectionManager {
        let connector = MemoryConnector::new();
        for hub in hubs {
            connector.register(hub.clone());
        }
        HubConnectionManager::new(Arc::new(connector), "$Default", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_create_and_duplicate() {
        let manager = manager(&[MemoryHub::new("ns/orders", 4)]);

        let connection = manager.create(&definition("orders")).await.unwrap();
        assert_eq!(connection.status, Some(ConnectionStatus::Connected));
        assert_eq!(connection.partition_count, Some(4));
        assert_eq!(connection.partitions_link.as_deref(), Some("/hubs/ns/orders/partitions"));

        let duplicate = manager.create(&definition("orders")).await;
        assert!(matches!(duplicate, Err(AppError::HubExists(_))));
    }

    #[tokio::test]
    async fn test_unreachable_hub_is_not_registered() {
        let manager = manager(&[]);
        let result = manager.create(&definition("missing")).await;
        assert!(matches!(result, Err(AppError::Remote(RemoteLogError::Connection(_)))));
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_status_classification() {
        let hub = MemoryHub::new("ns/orders", 2);
        let manager = manager(&[hub.clone()]);
        manager.create(&definition("orders")).await.unwrap();

        hub.fail_runtime_info(Some(RemoteLogError::Unauthorized("reader".into())));
        let listed = manager.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, Some(ConnectionStatus::Unauthorized));

        hub.fail_runtime_info(Some(RemoteLogError::Timeout("slow".into())));
        let connection = manager.get("ns/orders").await.unwrap();
        assert_eq!(connection.status, Some(ConnectionStatus::ConnectionTimeout));

        hub.fail_runtime_info(Some(RemoteLogError::Other("boom".into())));
        let connection = manager.get("ns/orders").await.unwrap();
        assert_eq!(connection.status, Some(ConnectionStatus::Failed));

        hub.fail_runtime_info(None);
        let connection = manager.get("ns/orders").await.unwrap();
        assert_eq!(connection.status, Some(ConnectionStatus::Connected));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let manager = manager(&[MemoryHub::new("ns/orders", 1), MemoryHub::new("ns/audit", 1)]);

        let missing = manager.update("ns/orders", &definition("orders")).await;
        assert!(matches!(missing, Err(AppError::HubNotFound(_))));

        manager.create(&definition("orders")).await.unwrap();
        let updated = manager.update("ns/orders", &definition("audit")).await.unwrap();
        assert_eq!(updated.id, "ns/audit");
        assert!(manager.connection("ns/orders").is_err());

        assert!(manager.delete("ns/audit").await);
        assert!(!manager.delete("ns/audit").await);
    }
}
