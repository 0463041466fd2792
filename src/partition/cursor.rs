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


use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::message::EventData;

/// How far a partition has been read, or a position a read must reach.
///
/// Cursors are compared with [`PartitionCursor::compare`], which is *not* a
/// lexicographic order: the result is the maximum of the three per-dimension
/// comparisons. A cursor has therefore reached a target as soon as any one of
/// its sequence number, offset or timestamp meets or exceeds the target's.
/// The relation is not transitive when dimensions disagree, which is why the
/// type deliberately implements neither `Ord` nor `PartialOrd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionCursor {
    pub sequence_number: i64,
    pub timestamp: DateTime<Utc>,
    pub offset: i64,
}

impl Default for PartitionCursor {
    fn default() -> Self {
        Self::before(0)
    }
}

impl PartitionCursor {
    pub fn new(sequence_number: i64, timestamp: DateTime<Utc>, offset: i64) -> Self {
        Self {
            sequence_number,
            timestamp,
            offset,
        }
    }

    /// The position just before the first retained event of a partition.
    pub fn before(begin_sequence_number: i64) -> Self {
        Self::new(begin_sequence_number - 1, DateTime::<Utc>::MIN_UTC, -1)
    }

    /// A target only the sequence dimension can reach: timestamp and offset are
    /// pinned at their maximum.
    pub fn target_from_sequence_number(sequence_number: i64) -> Self {
        Self::new(sequence_number, DateTime::<Utc>::MAX_UTC, i64::MAX)
    }

    /// Maximum of the sequence, offset and timestamp comparisons.
    pub fn compare(&self, other: &PartitionCursor) -> Ordering {
        let by_sequence = self.sequence_number.cmp(&other.sequence_number);
        let by_offset = self.offset.cmp(&other.offset);
        let by_timestamp = self.timestamp.cmp(&other.timestamp);
        by_sequence.max(by_offset).max(by_timestamp)
    }

    pub fn reached(&self, target: &PartitionCursor) -> bool {
        self.compare(target) != Ordering::Less
    }

    /// Moves the cursor onto `event`.
    pub fn advance(&mut self, event: &EventData) {
        self.sequence_number = event.sequence_number;
        self.offset = event.offset;
        self.timestamp = event.enqueued_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    #[test]
    fn test_sequence_target_reached_only_by_sequence() {
        let target = PartitionCursor::target_from_sequence_number(10);

        assert!(!PartitionCursor::new(9, at(5_000_000), 1 << 40).reached(&target));
        assert!(PartitionCursor::new(10, at(0), 0).reached(&target));
        assert!(PartitionCursor::new(11, at(0), 0).reached(&target));
    }

    #[rstest]
    // high sequence, low offset and timestamp
    #[case(PartitionCursor::new(500, at(10), 10), true)]
    // low sequence, high offset
    #[case(PartitionCursor::new(1, at(10), 9_000), true)]
    // low sequence, high timestamp
    #[case(PartitionCursor::new(1, at(9_000), 10), true)]
    // every dimension equal
    #[case(PartitionCursor::new(100, at(1_000), 1_000), true)]
    // every dimension behind
    #[case(PartitionCursor::new(99, at(999), 999), false)]
    fn test_any_dimension_reaches(#[case] cursor: PartitionCursor, #[case] reached: bool) {
        let target = PartitionCursor::new(100, at(1_000), 1_000);
        assert_eq!(cursor.reached(&target), reached);
    }

    #[test]
    fn test_compare_is_not_antisymmetric() {
        let a = PartitionCursor::new(500, at(10), 10);
        let b = PartitionCursor::new(1, at(10), 9_000);

        assert_eq!(a.compare(&b), Ordering::Greater);
        assert_eq!(b.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&a), Ordering::Equal);
    }

    #[test]
    fn test_before_and_advance() {
        let mut cursor = PartitionCursor::before(40);
        assert_eq!(cursor.sequence_number, 39);
        assert!(!cursor.reached(&PartitionCursor::target_from_sequence_number(40)));

        let event = EventData {
            sequence_number: 40,
            offset: 4096,
            ..EventData::new("x").with_enqueued_time(at(77))
        };
        cursor.advance(&event);
        assert_eq!(cursor, PartitionCursor::new(40, at(77), 4096));
        assert!(cursor.reached(&PartitionCursor::target_from_sequence_number(40)));
        assert_eq!(PartitionCursor::default().sequence_number, -1);
    }
}
