//! Per-client counters and the persisted counter table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Submission counters for a single client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCounter {
    /// Unix time (seconds) the current burst window was opened
    #[serde(default)]
    pub last: i64,
    /// Submissions seen in the current burst window
    #[serde(default)]
    pub count: u64,
    /// Windows opened by this client since the entry was created
    #[serde(default)]
    pub total: u64,
}

impl ClientCounter {
    /// Counter for a client seen for the first time.
    pub fn first(now: i64) -> Self {
        Self {
            last: now,
            count: 1,
            total: 1,
        }
    }

    /// Open a new burst window, carrying the lifetime total forward.
    pub fn next_window(&self, now: i64) -> Self {
        Self {
            last: now,
            count: 1,
            total: self.total.saturating_add(1),
        }
    }

    /// Seconds elapsed since the current window opened.
    ///
    /// Negative when `now` is earlier than `last`, e.g. after a clock step.
    pub fn elapsed(&self, now: i64) -> i64 {
        now.saturating_sub(self.last)
    }
}

/// The mapping from client identifier to counters.
///
/// Encoded as a compact JSON object so the stored blob stays readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterTable {
    entries: BTreeMap<String, ClientCounter>,
}

impl CounterTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored blob, falling back to an empty table.
    ///
    /// Anything that is not a JSON object of counter records yields an empty
    /// table. The caller is expected to have applied the size bound already.
    pub fn parse_or_default(raw: &[u8]) -> Self {
        if raw.is_empty() {
            return Self::new();
        }

        match serde_json::from_slice::<CounterTable>(raw) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    error = %e,
                    bytes = raw.len(),
                    "Discarding malformed counter table"
                );
                Self::new()
            }
        }
    }

    /// Encode the table for storage.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn get(&self, client: &str) -> Option<&ClientCounter> {
        self.entries.get(client)
    }

    pub fn insert(&mut self, client: &str, counter: ClientCounter) {
        self.entries.insert(client.to_string(), counter);
    }

    pub fn remove(&mut self, client: &str) -> Option<ClientCounter> {
        self.entries.remove(client)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClientCounter)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_counter() {
        let counter = ClientCounter::first(1_000);
        assert_eq!(
            counter,
            ClientCounter {
                last: 1_000,
                count: 1,
                total: 1
            }
        );
    }

    #[test]
    fn test_next_window_keeps_total() {
        let counter = ClientCounter {
            last: 10,
            count: 4,
            total: 6,
        };
        let next = counter.next_window(90);
        assert_eq!(next.last, 90);
        assert_eq!(next.count, 1);
        assert_eq!(next.total, 7);
    }

    #[test]
    fn test_elapsed_can_be_negative() {
        let counter = ClientCounter::first(100);
        assert_eq!(counter.elapsed(160), 60);
        assert_eq!(counter.elapsed(40), -60);
    }

    #[test]
    fn test_parse_valid_table() {
        let raw = br#"{"10.0.0.1":{"last":5,"count":2,"total":3}}"#;
        let table = CounterTable::parse_or_default(raw);

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get("10.0.0.1"),
            Some(&ClientCounter {
                last: 5,
                count: 2,
                total: 3
            })
        );
    }

    #[test]
    fn test_parse_missing_fields_default_to_zero() {
        let raw = br#"{"10.0.0.1":{"count":2}}"#;
        let table = CounterTable::parse_or_default(raw);

        let counter = table.get("10.0.0.1").unwrap();
        assert_eq!(counter.last, 0);
        assert_eq!(counter.count, 2);
        assert_eq!(counter.total, 0);
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(CounterTable::parse_or_default(b"not json").is_empty());
        assert!(CounterTable::parse_or_default(b"").is_empty());
        assert!(CounterTable::parse_or_default(&[0xff, 0xfe, 0x00]).is_empty());
    }

    #[test]
    fn test_parse_non_object_is_empty() {
        assert!(CounterTable::parse_or_default(b"[1,2,3]").is_empty());
        assert!(CounterTable::parse_or_default(b"\"text\"").is_empty());
        assert!(CounterTable::parse_or_default(b"42").is_empty());
        assert!(CounterTable::parse_or_default(br#"{"1.2.3.4":"oops"}"#).is_empty());
    }

    #[test]
    fn test_encoding_is_compact_json() {
        let mut table = CounterTable::new();
        table.insert("9.9.9.9", ClientCounter::first(70));

        let bytes = table.to_bytes().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"9.9.9.9":{"last":70,"count":1,"total":1}}"#
        );
        assert_eq!(CounterTable::parse_or_default(&bytes), table);
    }

    #[test]
    fn test_remove() {
        let mut table = CounterTable::new();
        table.insert("a", ClientCounter::first(1));
        table.insert("b", ClientCounter::first(2));

        assert!(table.remove("a").is_some());
        assert!(table.remove("a").is_none());
        assert_eq!(table.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["b"]);
    }
}
