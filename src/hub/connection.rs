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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hub_id;

/// What an operator supplies to register a hub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubDefinition {
    pub sas_key: String,
    pub event_hub_namespace: String,
    pub event_hub_name: String,
    #[serde(default)]
    pub consumer_group_name: Option<String>,
    pub sas_key_name: String,
}

impl HubDefinition {
    pub fn id(&self) -> String {
        hub_id(&self.event_hub_namespace, &self.event_hub_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Unauthorized,
    ConnectionTimeout,
    Failed,
}

/// A registered hub as shown to callers. The SAS key itself is never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubConnection {
    pub id: String,
    pub event_hub_namespace: String,
    pub event_hub_name: String,
    pub self_link: String,
    pub consumer_group_name: String,
    pub sas_key_name: String,
    pub sas_key_first4_characters: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ConnectionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_link: Option<String>,
    #[serde(skip)]
    pub partition_ids: Vec<String>,
}

impl HubConnection {
    pub fn new(definition: &HubDefinition, default_consumer_group: &str) -> Self {
        let id = definition.id();
        Self {
            self_link: format!("/hubs/{}", id),
            id,
            event_hub_namespace: definition.event_hub_namespace.clone(),
            event_hub_name: definition.event_hub_name.clone(),
            consumer_group_name: definition
                .consumer_group_name
                .clone()
                .unwrap_or_else(|| default_consumer_group.to_string()),
            sas_key_name: definition.sas_key_name.clone(),
            sas_key_first4_characters: definition.sas_key.chars().take(4).collect(),
            status: None,
            partition_count: None,
            created_date_time: None,
            partitions_link: None,
            stats_link: None,
            partition_ids: Vec::new(),
        }
    }
}
