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


use std::collections::{BTreeMap, BTreeSet, HashMap};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::body::{BodyFormat, BodyRepresentation};
use crate::partition::HubPartition;

/// Property the producer sets to announce a compressed body.
pub const CONTENT_ENCODING: &str = "ContentEncoding";

/// One event as received from a partition. Immutable once received.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
    pub sequence_number: i64,
    pub offset: i64,
    pub enqueued_time: DateTime<Utc>,
    pub partition_key: Option<String>,
    pub properties: HashMap<String, Option<String>>,
    pub body: Option<Bytes>,
}

impl EventData {
    /// A draft event carrying `body`, enqueued now. Sequence number and offset
    /// are assigned by the broker when it is published.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::without_body()
        }
    }

    pub fn without_body() -> Self {
        Self {
            sequence_number: -1,
            offset: -1,
            enqueued_time: Utc::now(),
            partition_key: None,
            properties: HashMap::new(),
            body: None,
        }
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), Some(value.into()));
        self
    }

    /// Adds a property that carries no value.
    pub fn with_empty_property(mut self, key: impl Into<String>) -> Self {
        self.properties.insert(key.into(), None);
        self
    }

    pub fn with_enqueued_time(mut self, enqueued_time: DateTime<Utc>) -> Self {
        self.enqueued_time = enqueued_time;
        self
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.properties
            .get(CONTENT_ENCODING)
            .and_then(|value| value.as_deref())
    }
}

/// The caller-facing rendition of an [`EventData`], with the requested body
/// representations decoded on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub sequence_number: i64,
    pub partition_id: String,
    pub enqueued_date_time: DateTime<Utc>,
    pub offset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    pub properties: BTreeMap<String, Option<String>>,
    pub self_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_bytes_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_charset: Option<String>,
}

impl EventMessage {
    pub fn from_event(
        hub_id: &str,
        partition_id: &str,
        event: &EventData,
        formats: &BTreeSet<BodyFormat>,
    ) -> Self {
        let body = BodyRepresentation::decode(
            event.body.as_deref(),
            event.content_encoding(),
            formats,
        );
        Self {
            sequence_number: event.sequence_number,
            partition_id: partition_id.to_string(),
            enqueued_date_time: event.enqueued_time,
            offset: event.offset.to_string(),
            partition_key: event.partition_key.clone(),
            properties: event
                .properties
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            self_link: HubPartition::new(hub_id, partition_id).message_link(event.sequence_number),
            body_bytes_base64: body.base64,
            body_string: body.text,
            body_json: body.json,
            detected_charset: body.charset,
        }
    }
}
