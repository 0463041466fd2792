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


use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, trace};

use super::QuerySpec;
use crate::message::EventData;
use crate::partition::{HubPartition, PartitionCursor};
use crate::remote::{PartitionReceiver, RemoteLogError};
use crate::{AppError, AppResult};

/// Everything read so far from one partition of one hub.
///
/// The cursor and the receiver advance together under one lock, so a single
/// catch-up runs per partition at a time. The message map is append-only:
/// a sequence number, once inserted, is never removed or replaced, and every
/// inserted sequence number has been reached by the cursor.
pub struct PartitionCache {
    partition: HubPartition,
    state: Mutex<ReadState>,
    messages: DashMap<i64, EventData>,
}

struct ReadState {
    cursor: PartitionCursor,
    receiver: Option<Box<dyn PartitionReceiver>>,
}

impl PartitionCache {
    pub fn new(
        partition: HubPartition,
        cursor: PartitionCursor,
        receiver: Box<dyn PartitionReceiver>,
    ) -> Self {
        Self {
            partition,
            state: Mutex::new(ReadState {
                cursor,
                receiver: Some(receiver),
            }),
            messages: DashMap::new(),
        }
    }

    pub fn partition(&self) -> &HubPartition {
        &self.partition
    }

    pub async fn cursor(&self) -> PartitionCursor {
        self.state.lock().await.cursor
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, sequence_number: i64) -> Option<EventData> {
        self.messages
            .get(&sequence_number)
            .map(|event| event.value().clone())
    }

    /// Cached events accepted by `spec`, in no particular order.
    pub fn select(&self, spec: &QuerySpec) -> Vec<EventData> {
        self.messages
            .iter()
            .filter(|event| spec.matches(event.value()))
            .map(|event| event.value().clone())
            .collect()
    }

    /// Every cached event, in no particular order.
    pub fn all(&self) -> Vec<EventData> {
        self.messages
            .iter()
            .map(|event| event.value().clone())
            .collect()
    }

    /// Pulls from the receiver until the cursor reaches `target` or the
    /// partition has nothing more to deliver.
    ///
    /// Each pull asks for at most `max_batch` events and never for more than
    /// the distance to the target's sequence number. Only the gap between the
    /// cursor and the target is requested, so repeating a call with the same or
    /// a lesser target is a no-op. A pull that exceeds `receive_timeout` fails
    /// the call; events cached before the failure stay cached.
    pub async fn advance_to(
        &self,
        target: &PartitionCursor,
        max_batch: usize,
        receive_timeout: Duration,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let ReadState { cursor, receiver } = &mut *state;

        if cursor.reached(target) {
            trace!("{} already at {:?}", self.partition, cursor);
            return Ok(());
        }
        let receiver = receiver.as_mut().ok_or_else(|| {
            AppError::Remote(RemoteLogError::Closed(self.partition.to_string()))
        })?;

        let start = cursor.sequence_number;
        while !cursor.reached(target) {
            let remaining = target
                .sequence_number
                .saturating_sub(cursor.sequence_number)
                .clamp(1, max_batch.max(1) as i64);
            // the receiver enforces receive_timeout itself; this only bounds a stuck call
            let batch = time::timeout(
                receive_timeout.saturating_mul(2),
                receiver.receive(remaining as usize, receive_timeout),
            )
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "receive from {} after sequence number {}",
                    self.partition, cursor.sequence_number
                ))
            })??;

            let Some(last) = batch.last() else {
                trace!("{} exhausted at {}", self.partition, cursor.sequence_number);
                break;
            };
            cursor.advance(last);
            trace!(
                "{} received {} events up to {}",
                self.partition,
                batch.len(),
                cursor.sequence_number
            );
            for event in batch {
                self.messages.entry(event.sequence_number).or_insert(event);
            }
        }

        debug!(
            "{} advanced from {} to {}, {} events cached",
            self.partition,
            start,
            cursor.sequence_number,
            self.messages.len()
        );
        Ok(())
    }

    /// Closes the receiver. Cached events remain readable.
    pub async fn close(&self) -> AppResult<()> {
        let receiver = self.state.lock().await.receiver.take();
        if let Some(mut receiver) = receiver {
            receiver.close().await?;
            debug!(
                "{} receiver on partition {} closed",
                self.partition.hub_id,
                receiver.partition_id()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryHub, RemoteLogClient, StartPosition};
    use chrono::{TimeZone, Utc};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn hub_with_events(count: i64) -> MemoryHub {
        let hub = MemoryHub::new("ns/orders", 1);
        for i in 0..count {
            let event = EventData::new(format!("event-{}", i))
                .with_enqueued_time(Utc.timestamp_opt(1_000 + i, 0).unwrap());
            hub.publish("0", event).unwrap();
        }
        hub
    }

    async fn cache_for(hub: &MemoryHub) -> PartitionCache {
        let receiver = hub
            .create_receiver("$Default", "0", StartPosition::AfterSequenceNumber(-1))
            .await
            .unwrap();
        PartitionCache::new(
            HubPartition::new("ns/orders", "0"),
            PartitionCursor::before(0),
            receiver,
        )
    }

    fn cached_sequences(cache: &PartitionCache) -> Vec<i64> {
        let mut sequences: Vec<i64> = cache.all().iter().map(|e| e.sequence_number).collect();
        sequences.sort_unstable();
        sequences
    }

    #[tokio::test]
    async fn test_advance_pulls_only_the_gap() {
        let hub = hub_with_events(20);
        let cache = cache_for(&hub).await;

        cache
            .advance_to(&PartitionCursor::target_from_sequence_number(9), 4, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(cached_sequences(&cache), (0..=9).collect::<Vec<_>>());
        assert_eq!(cache.cursor().await.sequence_number, 9);
        // 10 events in batches of at most 4
        assert_eq!(hub.receive_calls(), 3);

        cache
            .advance_to(&PartitionCursor::target_from_sequence_number(12), 4, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(cached_sequences(&cache), (0..=12).collect::<Vec<_>>());
        assert_eq!(hub.receive_calls(), 4);
    }

    #[tokio::test]
    async fn test_advance_is_idempotent() {
        let hub = hub_with_events(10);
        let cache = cache_for(&hub).await;
        let target = PartitionCursor::target_from_sequence_number(7);

        cache.advance_to(&target, 500, TIMEOUT).await.unwrap();
        let cursor = cache.cursor().await;
        let calls = hub.receive_calls();

        cache.advance_to(&target, 500, TIMEOUT).await.unwrap();
        cache
            .advance_to(&PartitionCursor::target_from_sequence_number(3), 500, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(cache.cursor().await, cursor);
        assert_eq!(hub.receive_calls(), calls);
        assert_eq!(cache.len(), 8);
    }

    #[tokio::test]
    async fn test_advance_stops_when_log_is_exhausted() {
        let hub = hub_with_events(5);
        let cache = cache_for(&hub).await;

        cache
            .advance_to(&PartitionCursor::target_from_sequence_number(100), 500, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.cursor().await.sequence_number, 4);

        for i in 5..8 {
            hub.publish("0", EventData::new(format!("late-{}", i))).unwrap();
        }
        cache
            .advance_to(&PartitionCursor::target_from_sequence_number(100), 500, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(cached_sequences(&cache), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_timestamp_target_stops_early() {
        let hub = hub_with_events(50);
        let cache = cache_for(&hub).await;

        // the cursor reaches the target once it reads the event enqueued at 1_010
        let target = PartitionCursor::new(49, Utc.timestamp_opt(1_010, 0).unwrap(), i64::MAX);
        cache.advance_to(&target, 2, TIMEOUT).await.unwrap();

        assert_eq!(cache.cursor().await.sequence_number, 11);
        assert_eq!(cache.len(), 12);
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let hub = hub_with_events(3);
        hub.set_receive_latency(Some(Duration::from_millis(500)));
        let cache = cache_for(&hub).await;

        let result = cache
            .advance_to(
                &PartitionCursor::target_from_sequence_number(2),
                500,
                Duration::from_millis(20),
            )
            .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert!(cache.is_empty());
        assert_eq!(cache.cursor().await.sequence_number, -1);

        // the receiver is still usable and nothing was skipped
        hub.set_receive_latency(None);
        cache
            .advance_to(&PartitionCursor::target_from_sequence_number(2), 500, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.cursor().await.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_close_keeps_cached_events() {
        let hub = hub_with_events(3);
        let cache = cache_for(&hub).await;
        cache
            .advance_to(&PartitionCursor::target_from_sequence_number(2), 500, TIMEOUT)
            .await
            .unwrap();

        cache.close().await.unwrap();
        assert_eq!(hub.attached_receivers(), 0);
        assert_eq!(cache.get(1).map(|e| e.sequence_number), Some(1));

        // reached targets still succeed, new ones need the closed receiver
        assert!(cache
            .advance_to(&PartitionCursor::target_from_sequence_number(1), 500, TIMEOUT)
            .await
            .is_ok());
        assert!(cache
            .advance_to(&PartitionCursor::target_from_sequence_number(5), 500, TIMEOUT)
            .await
            .is_err());
    }
}
