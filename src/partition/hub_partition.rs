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


use std::fmt::{Display, Formatter};

/// Key of one partition of one hub.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HubPartition {
    pub hub_id: String,
    pub partition_id: String,
}

impl Display for HubPartition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hub_id, self.partition_id)
    }
}

impl HubPartition {
    pub fn new(hub_id: impl Into<String>, partition_id: impl Into<String>) -> Self {
        Self {
            hub_id: hub_id.into(),
            partition_id: partition_id.into(),
        }
    }

    pub fn self_link(&self) -> String {
        format!("/hubs/{}/partitions/{}", self.hub_id, self.partition_id)
    }

    pub fn messages_link(&self) -> String {
        format!("{}/messages", self.self_link())
    }

    pub fn message_link(&self, sequence_number: i64) -> String {
        format!("{}/messages/{}", self.self_link(), sequence_number)
    }
}
