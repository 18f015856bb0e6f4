use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use souk_core::AggregateId;

use super::r#trait::{EventJournal, JournalError, StoredRecord, StreamAppend};

/// In-memory append-only event journal.
///
/// One `RwLock` guards the whole stream map, so a multi-stream commit is
/// naturally atomic: all version checks run under the write lock before the
/// first record is pushed.
#[derive(Debug, Default)]
pub struct InMemoryEventJournal {
    streams: RwLock<HashMap<AggregateId, Vec<StoredRecord>>>,
}

impl InMemoryEventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredRecord]) -> u64 {
        stream.last().map(|r| r.sequence_number).unwrap_or(0)
    }

    fn validate_append(append: &StreamAppend) -> Result<AggregateId, JournalError> {
        let Some(aggregate_id) = append.aggregate_id() else {
            return Err(JournalError::InvalidAppend(
                "stream append contains no records".to_string(),
            ));
        };
        let aggregate_type = &append.records[0].aggregate_type;

        for (idx, record) in append.records.iter().enumerate() {
            if record.aggregate_id != aggregate_id {
                return Err(JournalError::InvalidAppend(format!(
                    "append contains multiple aggregate_ids (index {idx})"
                )));
            }
            if record.aggregate_type != *aggregate_type {
                return Err(JournalError::InvalidAppend(format!(
                    "append contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        Ok(aggregate_id)
    }
}

impl EventJournal for InMemoryEventJournal {
    fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredRecord>, JournalError> {
        if appends.is_empty() {
            return Ok(vec![]);
        }

        // Validate batch shape before taking the lock.
        let mut seen = HashSet::new();
        for append in &appends {
            let aggregate_id = Self::validate_append(append)?;
            if !seen.insert(aggregate_id) {
                return Err(JournalError::InvalidAppend(format!(
                    "commit targets stream {aggregate_id} more than once"
                )));
            }
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| JournalError::InvalidAppend("lock poisoned".to_string()))?;

        // Phase 1: every check must pass before anything is written.
        for append in &appends {
            let aggregate_id = append.records[0].aggregate_id;
            let stream = streams.get(&aggregate_id).map(Vec::as_slice).unwrap_or(&[]);
            let current = Self::current_version(stream);

            if !append.expected.matches(current) {
                return Err(JournalError::Conflict(format!(
                    "stream {aggregate_id}: expected {:?}, found {current}",
                    append.expected
                )));
            }

            // Aggregate type is stable across a stream's lifetime.
            if let Some(existing) = stream.first() {
                if existing.aggregate_type != append.records[0].aggregate_type {
                    return Err(JournalError::InvalidAppend(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, append.records[0].aggregate_type
                    )));
                }
            }
        }

        // Phase 2: assign sequence numbers and append.
        let mut committed = Vec::new();
        for append in appends {
            let aggregate_id = append.records[0].aggregate_id;
            let stream = streams.entry(aggregate_id).or_default();
            let mut next = Self::current_version(stream) + 1;

            for record in append.records {
                let stored = StoredRecord {
                    record_id: record.record_id,
                    aggregate_id: record.aggregate_id,
                    aggregate_type: record.aggregate_type,
                    sequence_number: next,
                    event_type: record.event_type,
                    event_version: record.event_version,
                    occurred_at: record.occurred_at,
                    payload: record.payload,
                };
                next += 1;
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredRecord>, JournalError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| JournalError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use souk_core::ExpectedVersion;
    use uuid::Uuid;

    use crate::journal::UncommittedRecord;

    fn record(aggregate_id: AggregateId, event_type: &str) -> UncommittedRecord {
        UncommittedRecord {
            record_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: "test.aggregate".to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({"event_type": event_type}),
        }
    }

    #[test]
    fn commit_assigns_monotonic_sequence_numbers() {
        let journal = InMemoryEventJournal::new();
        let id = AggregateId::new();

        let committed = journal
            .commit(vec![StreamAppend::new(
                ExpectedVersion::Exact(0),
                vec![record(id, "a"), record(id, "b")],
            )])
            .unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[1].sequence_number, 2);

        let committed = journal
            .commit(vec![StreamAppend::new(
                ExpectedVersion::Exact(2),
                vec![record(id, "c")],
            )])
            .unwrap();
        assert_eq!(committed[0].sequence_number, 3);

        let stream = journal.load_stream(id).unwrap();
        assert_eq!(stream.len(), 3);
    }

    #[test]
    fn stale_expected_version_conflicts() {
        let journal = InMemoryEventJournal::new();
        let id = AggregateId::new();

        journal
            .commit(vec![StreamAppend::new(
                ExpectedVersion::Exact(0),
                vec![record(id, "a")],
            )])
            .unwrap();

        let err = journal
            .commit(vec![StreamAppend::new(
                ExpectedVersion::Exact(0),
                vec![record(id, "b")],
            )])
            .unwrap_err();
        assert!(matches!(err, JournalError::Conflict(_)));

        // The conflicting record was not written.
        assert_eq!(journal.load_stream(id).unwrap().len(), 1);
    }

    #[test]
    fn multi_stream_commit_is_all_or_nothing() {
        let journal = InMemoryEventJournal::new();
        let product = AggregateId::new();
        let order = AggregateId::new();

        // Seed the product stream to version 1.
        journal
            .commit(vec![StreamAppend::new(
                ExpectedVersion::Exact(0),
                vec![record(product, "created")],
            )])
            .unwrap();

        // Product append is stale; the order stream must stay untouched even
        // though its own check would have passed.
        let err = journal
            .commit(vec![
                StreamAppend::new(ExpectedVersion::Exact(0), vec![record(product, "deducted")]),
                StreamAppend::new(ExpectedVersion::Exact(0), vec![record(order, "placed")]),
            ])
            .unwrap_err();
        assert!(matches!(err, JournalError::Conflict(_)));
        assert_eq!(journal.load_stream(product).unwrap().len(), 1);
        assert!(journal.load_stream(order).unwrap().is_empty());

        // Correct versions commit both streams together.
        journal
            .commit(vec![
                StreamAppend::new(ExpectedVersion::Exact(1), vec![record(product, "deducted")]),
                StreamAppend::new(ExpectedVersion::Exact(0), vec![record(order, "placed")]),
            ])
            .unwrap();
        assert_eq!(journal.load_stream(product).unwrap().len(), 2);
        assert_eq!(journal.load_stream(order).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_stream_in_one_commit_is_rejected() {
        let journal = InMemoryEventJournal::new();
        let id = AggregateId::new();

        let err = journal
            .commit(vec![
                StreamAppend::new(ExpectedVersion::Exact(0), vec![record(id, "a")]),
                StreamAppend::new(ExpectedVersion::Exact(0), vec![record(id, "b")]),
            ])
            .unwrap_err();
        assert!(matches!(err, JournalError::InvalidAppend(_)));
        assert!(journal.load_stream(id).unwrap().is_empty());
    }

    #[test]
    fn unknown_stream_loads_empty() {
        let journal = InMemoryEventJournal::new();
        assert!(journal.load_stream(AggregateId::new()).unwrap().is_empty());
    }

    #[test]
    fn aggregate_type_drift_is_rejected() {
        let journal = InMemoryEventJournal::new();
        let id = AggregateId::new();

        journal
            .commit(vec![StreamAppend::new(
                ExpectedVersion::Exact(0),
                vec![record(id, "a")],
            )])
            .unwrap();

        let mut drifted = record(id, "b");
        drifted.aggregate_type = "other.aggregate".to_string();
        let err = journal
            .commit(vec![StreamAppend::new(ExpectedVersion::Exact(1), vec![drifted])])
            .unwrap_err();
        assert!(matches!(err, JournalError::InvalidAppend(_)));
    }
}
