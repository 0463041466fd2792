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


use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Parser;
use eventscope::{
    body_formats, setup_tracing, AppError, AppResult, BodyFormat, BrowserConfig, BrowserSession,
    EventData, EventMessage, HubConnection, HubDefinition, HubStats, MemoryConnector, MemoryHub,
    PartitionInfo, QuerySpec,
};
use serde::{Deserialize, Serialize};
use tokio::runtime;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Command,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    /// print the effective configuration as JSON
    PrintConfig,
    /// load a hub dump into an in-process hub and query it
    Browse {
        /// JSON file holding the hub definition and the events of each partition
        #[arg(long)]
        dump: PathBuf,
        /// query a single partition instead of the whole hub
        #[arg(short, long)]
        partition: Option<String>,
        /// query parameter as key=value, may repeat (e.g. property=status=ok)
        #[arg(short, long = "query")]
        query: Vec<String>,
        #[arg(long)]
        include_body: bool,
        #[arg(long)]
        body_format: Option<BodyFormat>,
    },
}

/// A hub as written to a dump file. Partition ids are the positions in `partitions`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HubDump {
    hub: HubDefinition,
    partitions: Vec<Vec<DumpedEvent>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DumpedEvent {
    enqueued_time: Option<DateTime<Utc>>,
    partition_key: Option<String>,
    #[serde(default)]
    properties: HashMap<String, Option<String>>,
    body: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrowseReport {
    hub: HubConnection,
    stats: HubStats,
    partitions: Vec<PartitionInfo>,
    messages: Vec<EventMessage>,
}

fn main() -> AppResult<()> {
    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let config = if config_path.exists() {
        BrowserConfig::set_up_config(&config_path)?
    } else {
        BrowserConfig::default()
    };

    let level = match commandline.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _log_guard = setup_tracing(&config.log, level)?;

    match commandline.command {
        Command::PrintConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Browse {
            dump,
            partition,
            query,
            include_body,
            body_format,
        } => {
            let rt = runtime::Builder::new_multi_thread()
                .worker_threads(num_cpus::get())
                .enable_all()
                .build()?;
            rt.block_on(browse(
                config,
                &dump,
                partition.as_deref(),
                &query,
                include_body || body_format.is_some(),
                body_format,
            ))
        }
    }
}

async fn browse(
    config: BrowserConfig,
    dump: &Path,
    partition: Option<&str>,
    query: &[String],
    include_body: bool,
    body_format: Option<BodyFormat>,
) -> AppResult<()> {
    let dump: HubDump = serde_json::from_str(&fs::read_to_string(dump)?)?;
    let hub = load_hub(&dump)?;

    let params = query
        .iter()
        .map(|param| {
            param
                .split_once('=')
                .ok_or_else(|| AppError::InvalidQuery(format!("expected key=value: {}", param)))
        })
        .collect::<AppResult<Vec<_>>>()?;
    let spec = QuerySpec::from_params(params)?;
    let formats = body_formats(include_body, body_format);

    let connector = Arc::new(MemoryConnector::new());
    connector.register(hub);
    let session = BrowserSession::new(config, connector);

    let report = async {
        let connection = session.create_hub(&dump.hub).await?;
        let hub_id = connection.id.clone();
        let messages = match partition {
            Some(partition_id) => {
                session
                    .query_partition(&hub_id, partition_id, &spec, &formats)
                    .await?
            }
            None => session.query_hub(&hub_id, &spec, &formats).await?,
        };
        Ok::<_, AppError>(BrowseReport {
            stats: session.hub_stats(&hub_id).await?,
            partitions: session.partitions(&hub_id).await?,
            hub: connection,
            messages,
        })
    }
    .await;
    session.close().await;

    match report {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(err) => {
            warn!("browse failed ({}): {}", err.kind().status_code(), err);
            Err(err)
        }
    }
}

fn load_hub(dump: &HubDump) -> AppResult<MemoryHub> {
    let path = dump.hub.id();
    let hub = MemoryHub::new(path.clone(), dump.partitions.len());
    for (index, events) in dump.partitions.iter().enumerate() {
        let partition_id = index.to_string();
        for dumped in events {
            let mut event = match &dumped.body {
                Some(body) => EventData::new(body.clone()),
                None => EventData::without_body(),
            };
            if let Some(partition_key) = &dumped.partition_key {
                event = event.with_partition_key(partition_key.clone());
            }
            if let Some(enqueued_time) = dumped.enqueued_time {
                event = event.with_enqueued_time(enqueued_time);
            }
            event.properties = dumped.properties.clone();
            hub.publish(&partition_id, event)?;
        }
    }
    info!(
        "loaded {} with {} partitions from dump",
        path,
        dump.partitions.len()
    );
    Ok(hub)
}
