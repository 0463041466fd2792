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


use std::cmp::Reverse;
use std::collections::HashMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};

use crate::message::{EventData, EventMessage};
use crate::partition::PartitionCursor;
use crate::{AppError, AppResult};

/// Declarative range and filter over the messages of a partition or hub.
///
/// Every range is inclusive; unspecified bounds span the whole domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub timestamp_range: RangeInclusive<DateTime<Utc>>,
    pub sequence_number_range: RangeInclusive<i64>,
    pub offset_range: RangeInclusive<i64>,
    pub partition_key: Option<String>,
    /// key → expected value; `None` only requires the key to be present
    pub properties: Option<HashMap<String, Option<String>>>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            timestamp_range: DateTime::<Utc>::MIN_UTC..=DateTime::<Utc>::MAX_UTC,
            sequence_number_range: Self::FULL_SEQUENCE_RANGE,
            offset_range: 0..=i64::MAX,
            partition_key: None,
            properties: None,
        }
    }
}

impl QuerySpec {
    const FULL_SEQUENCE_RANGE: RangeInclusive<i64> = -1..=i64::MAX;

    /// Parses query-string pairs. Repeated scalar keys keep their first value;
    /// `property` may repeat and takes `key` or `key=value`. Unknown keys are
    /// ignored.
    pub fn from_params<'a, I>(params: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut first: HashMap<&str, &str> = HashMap::new();
        let mut properties: Option<HashMap<String, Option<String>>> = None;

        for (key, value) in params {
            if key == "property" {
                let (name, expected) = match value.split_once('=') {
                    Some((name, expected)) => (name, Some(expected.to_string())),
                    None => (value, None),
                };
                properties
                    .get_or_insert_with(HashMap::new)
                    .insert(name.to_string(), expected);
            } else {
                first.entry(key).or_insert(value);
            }
        }

        let defaults = Self::default();
        let from_timestamp = parse_timestamp(&first, "fromTimestamp")?
            .unwrap_or(*defaults.timestamp_range.start());
        let to_timestamp =
            parse_timestamp(&first, "toTimestamp")?.unwrap_or(*defaults.timestamp_range.end());
        let from_sequence = parse_integer(&first, "fromSequenceNumber")?
            .unwrap_or(*defaults.sequence_number_range.start());
        let to_sequence = parse_integer(&first, "toSequenceNumber")?
            .unwrap_or(*defaults.sequence_number_range.end());
        let from_offset =
            parse_integer(&first, "fromOffset")?.unwrap_or(*defaults.offset_range.start());
        let to_offset = parse_integer(&first, "toOffset")?.unwrap_or(*defaults.offset_range.end());

        Ok(Self {
            timestamp_range: from_timestamp..=to_timestamp,
            sequence_number_range: from_sequence..=to_sequence,
            offset_range: from_offset..=to_offset,
            partition_key: first.get("partitionKey").map(|key| key.to_string()),
            properties,
        })
    }

    pub fn with_sequence_number_range(mut self, from: i64, to: i64) -> Self {
        self.sequence_number_range = from..=to;
        self
    }

    pub fn with_timestamp_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.timestamp_range = from..=to;
        self
    }

    pub fn with_offset_range(mut self, from: i64, to: i64) -> Self {
        self.offset_range = from..=to;
        self
    }

    pub fn with_partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, expected: Option<&str>) -> Self {
        self.properties
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), expected.map(str::to_string));
        self
    }

    /// Sequence numbers are not comparable across partitions, so a hub-wide
    /// query ignores any sequence bounds.
    pub fn with_full_sequence_range(mut self) -> Self {
        self.sequence_number_range = Self::FULL_SEQUENCE_RANGE;
        self
    }

    /// How far a partition whose newest event is `tail_sequence_number` has to
    /// be read to answer this query.
    pub fn target(&self, tail_sequence_number: i64) -> PartitionCursor {
        PartitionCursor::new(
            (*self.sequence_number_range.end()).min(tail_sequence_number),
            *self.timestamp_range.end(),
            *self.offset_range.end(),
        )
    }

    pub fn matches(&self, event: &EventData) -> bool {
        self.sequence_number_range.contains(&event.sequence_number)
            && self.offset_range.contains(&event.offset)
            && self.timestamp_range.contains(&event.enqueued_time)
            && self
                .partition_key
                .as_ref()
                .map_or(true, |key| event.partition_key.as_ref() == Some(key))
            && self.properties.as_ref().map_or(true, |filters| {
                filters.iter().all(|(key, expected)| {
                    match (event.properties.get(key), expected) {
                        (None, _) => false,
                        (Some(_), None) => true,
                        (Some(actual), Some(expected)) => actual.as_ref() == Some(expected),
                    }
                })
            })
    }
}

/// Single-partition order: newest sequence number first.
pub fn sort_partition_messages(messages: &mut [EventMessage]) {
    messages.sort_by_key(|message| Reverse(message.sequence_number));
}

/// Cross-partition order: newest enqueued time first, then newest sequence
/// number for events enqueued at the same instant.
pub fn sort_hub_messages(messages: &mut [EventMessage]) {
    messages.sort_by_key(|message| {
        (
            Reverse(message.enqueued_date_time),
            Reverse(message.sequence_number),
        )
    });
}

fn parse_timestamp(params: &HashMap<&str, &str>, key: &str) -> AppResult<Option<DateTime<Utc>>> {
    params
        .get(key)
        .map(|value| {
            DateTime::parse_from_rfc3339(value)
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .map_err(|err| AppError::InvalidQuery(format!("{}={}: {}", key, value, err)))
        })
        .transpose()
}

fn parse_integer(params: &HashMap<&str, &str>, key: &str) -> AppResult<Option<i64>> {
    params
        .get(key)
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|err| AppError::InvalidQuery(format!("{}={}: {}", key, value, err)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    fn event(sequence_number: i64) -> EventData {
        EventData {
            sequence_number,
            offset: sequence_number * 100,
            ..EventData::new("body").with_enqueued_time(at(1_000 + sequence_number))
        }
    }

    #[test]
    fn test_defaults_span_the_domain() {
        let spec = QuerySpec::from_params([("includeBody", "true")]).unwrap();
        assert_eq!(spec, QuerySpec::default());
        assert!(spec.matches(&event(0)));
        assert!(spec.matches(&event(1_000_000)));
    }

    #[test]
    fn test_sequence_range_filter() {
        let spec = QuerySpec::from_params([
            ("fromSequenceNumber", "100"),
            ("toSequenceNumber", "200"),
        ])
        .unwrap();
        let matched: Vec<i64> = (50..=300)
            .map(event)
            .filter(|event| spec.matches(event))
            .map(|event| event.sequence_number)
            .collect();
        assert_eq!(matched.len(), 101);
        assert_eq!(matched.first(), Some(&100));
        assert_eq!(matched.last(), Some(&200));
    }

    #[test]
    fn test_timestamp_and_offset_filters() {
        let spec = QuerySpec::from_params([
            ("fromTimestamp", "1970-01-01T00:16:50Z"),
            ("toTimestamp", "1970-01-01T01:16:55+01:00"),
        ])
        .unwrap();
        assert_eq!(spec.timestamp_range, at(1_010)..=at(1_015));
        assert!(!spec.matches(&event(9)));
        assert!(spec.matches(&event(10)));
        assert!(spec.matches(&event(15)));
        assert!(!spec.matches(&event(16)));

        let spec = QuerySpec::default().with_offset_range(250, 400);
        assert!(!spec.matches(&event(2)));
        assert!(spec.matches(&event(3)));
        assert!(spec.matches(&event(4)));
        assert!(!spec.matches(&event(5)));
    }

    #[test]
    fn test_partition_key_filter() {
        let spec = QuerySpec::from_params([("partitionKey", "X")]).unwrap();
        assert!(spec.matches(&event(1).with_partition_key("X")));
        assert!(!spec.matches(&event(1).with_partition_key("Y")));
        assert!(!spec.matches(&event(1)));
    }

    #[rstest]
    #[case(event(1).with_property("status", "ok"), true, true)]
    #[case(event(1).with_property("status", "failed"), false, true)]
    #[case(event(1).with_empty_property("status"), false, true)]
    #[case(event(1).with_property("other", "ok"), false, false)]
    #[case(event(1), false, false)]
    fn test_property_filters(
        #[case] event: EventData,
        #[case] matches_value: bool,
        #[case] matches_presence: bool,
    ) {
        let by_value = QuerySpec::from_params([("property", "status=ok")]).unwrap();
        let by_presence = QuerySpec::from_params([("property", "status")]).unwrap();

        assert_eq!(by_value.matches(&event), matches_value);
        assert_eq!(by_presence.matches(&event), matches_presence);
    }

    #[test]
    fn test_repeated_params() {
        let spec = QuerySpec::from_params([
            ("property", "status=ok"),
            ("property", "region=eu=west"),
            ("partitionKey", "first"),
            ("partitionKey", "second"),
        ])
        .unwrap();
        let properties = spec.properties.as_ref().unwrap();
        assert_eq!(properties.get("region"), Some(&Some("eu=west".to_string())));
        assert_eq!(properties.len(), 2);
        assert_eq!(spec.partition_key.as_deref(), Some("first"));
    }

    #[rstest]
    #[case("fromSequenceNumber", "ten")]
    #[case("toOffset", "1.5")]
    #[case("fromTimestamp", "yesterday")]
    fn test_malformed_params(#[case] key: &str, #[case] value: &str) {
        let result = QuerySpec::from_params([(key, value)]);
        assert!(matches!(result, Err(AppError::InvalidQuery(_))));
    }

    #[test]
    fn test_target() {
        let spec = QuerySpec::default().with_sequence_number_range(0, 50);
        assert_eq!(spec.target(80).sequence_number, 50);
        assert_eq!(spec.target(20).sequence_number, 20);
        assert_eq!(spec.target(20).offset, i64::MAX);

        let spec = QuerySpec::default().with_timestamp_range(at(0), at(10));
        assert_eq!(spec.target(20).timestamp, at(10));
        assert_eq!(
            spec.with_full_sequence_range().sequence_number_range,
            -1..=i64::MAX
        );
    }

    #[test]
    fn test_sort_orders() {
        let message = |sequence_number: i64, seconds: i64, partition: &str| {
            let event = EventData {
                sequence_number,
                ..EventData::new("x").with_enqueued_time(at(seconds))
            };
            EventMessage::from_event("ns/h", partition, &event, &Default::default())
        };

        let mut messages = vec![message(1, 30, "0"), message(3, 10, "0"), message(2, 20, "0")];
        sort_partition_messages(&mut messages);
        let order: Vec<i64> = messages.iter().map(|m| m.sequence_number).collect();
        assert_eq!(order, vec![3, 2, 1]);

        let mut messages = vec![
            message(5, 10, "0"),
            message(1, 20, "1"),
            message(7, 10, "1"),
            message(2, 30, "0"),
        ];
        sort_hub_messages(&mut messages);
        let order: Vec<(i64, &str)> = messages
            .iter()
            .map(|m| (m.sequence_number, m.partition_id.as_str()))
            .collect();
        assert_eq!(order, vec![(2, "0"), (1, "1"), (7, "1"), (5, "0")]);
    }
}
