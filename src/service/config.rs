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


use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// consumer group used when a hub definition does not name one
    pub default_consumer_group: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_consumer_group: "$Default".to_string(),
        }
    }
}

/// Settings of the partition readers and metadata calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Upper bound on the events pulled by one remote receive.
    pub max_batch: usize,
    pub receive_timeout_ms: u64,
    pub metadata_timeout_ms: u64,
    /// How long session teardown waits for receivers to close.
    pub close_timeout_ms: u64,
    /// Bound on connection-level calls such as hub runtime info and receiver creation.
    pub operation_timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_batch: 500,
            receive_timeout_ms: 20_000,
            metadata_timeout_ms: 10_000,
            close_timeout_ms: 20_000,
            operation_timeout_ms: 30_000,
        }
    }
}

impl ReaderConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            file_prefix: "eventscope.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub general: GeneralConfig,
    pub reader: ReaderConfig,
    pub log: LogConfig,
}

impl BrowserConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<BrowserConfig> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            ))
        })?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let browser_config: BrowserConfig = config.try_deserialize()?;

        Ok(browser_config)
    }
}
