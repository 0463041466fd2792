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
use serde::Serialize;

use super::{HubPartition, PartitionCursor};
use crate::remote::PartitionRuntimeInfo;

/// Snapshot of a partition's runtime metadata. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub id: String,
    pub last_enqueued_sequence_number: i64,
    pub last_enqueued_date_time: DateTime<Utc>,
    pub last_enqueued_offset: String,
    pub begin_sequence_number: i64,
    pub active_events_count: i64,
    pub is_empty: bool,
    pub last_enqueued_link: String,
    pub self_link: String,
    pub messages_link: String,
}

impl PartitionInfo {
    pub fn from_runtime(hub_id: &str, runtime: PartitionRuntimeInfo) -> Self {
        let partition = HubPartition::new(hub_id, runtime.partition_id.as_str());
        let active_events_count = if runtime.is_empty {
            0
        } else {
            runtime.last_enqueued_sequence_number - runtime.begin_sequence_number.max(0) + 1
        };
        Self {
            last_enqueued_link: partition.message_link(runtime.last_enqueued_sequence_number),
            self_link: partition.self_link(),
            messages_link: partition.messages_link(),
            id: runtime.partition_id,
            last_enqueued_sequence_number: runtime.last_enqueued_sequence_number,
            last_enqueued_date_time: runtime.last_enqueued_time,
            last_enqueued_offset: runtime.last_enqueued_offset,
            begin_sequence_number: runtime.begin_sequence_number,
            active_events_count,
            is_empty: runtime.is_empty,
        }
    }

    /// Target covering everything enqueued so far.
    pub fn tail_target(&self) -> PartitionCursor {
        PartitionCursor::target_from_sequence_number(self.last_enqueued_sequence_number)
    }
}

/// Hub-wide figures aggregated over all partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub active_events_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_enqueued_date_time: Option<DateTime<Utc>>,
}

impl HubStats {
    /// `infos` must already be ordered newest partition first.
    pub fn from_partitions(infos: &[PartitionInfo]) -> Self {
        Self {
            active_events_count: infos.iter().map(|info| info.active_events_count).sum(),
            last_enqueued_date_time: infos
                .iter()
                .find(|info| !info.is_empty)
                .map(|info| info.last_enqueued_date_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn runtime(begin: i64, last: i64, is_empty: bool) -> PartitionRuntimeInfo {
        PartitionRuntimeInfo {
            partition_id: "1".to_string(),
            begin_sequence_number: begin,
            last_enqueued_sequence_number: last,
            last_enqueued_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            last_enqueued_offset: "8192".to_string(),
            is_empty,
        }
    }

    #[test]
    fn test_active_events_count() {
        assert_eq!(PartitionInfo::from_runtime("ns/h", runtime(0, 9, false)).active_events_count, 10);
        assert_eq!(PartitionInfo::from_runtime("ns/h", runtime(5, 9, false)).active_events_count, 5);
        assert_eq!(PartitionInfo::from_runtime("ns/h", runtime(-1, 9, false)).active_events_count, 10);
        assert_eq!(PartitionInfo::from_runtime("ns/h", runtime(10, 9, true)).active_events_count, 0);
    }

    #[test]
    fn test_links() {
        let info = PartitionInfo::from_runtime("ns/h", runtime(0, 9, false));
        assert_eq!(info.self_link, "/hubs/ns/h/partitions/1");
        assert_eq!(info.messages_link, "/hubs/ns/h/partitions/1/messages");
        assert_eq!(info.last_enqueued_link, "/hubs/ns/h/partitions/1/messages/9");
        assert_eq!(info.tail_target().sequence_number, 9);
    }

    #[test]
    fn test_stats_of_no_partitions() {
        let stats = HubStats::from_partitions(&[]);
        assert_eq!(stats.active_events_count, 0);
        assert!(stats.last_enqueued_date_time.is_none());
    }
}
