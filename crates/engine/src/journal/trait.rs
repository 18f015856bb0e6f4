use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use souk_core::{AggregateId, Event, ExpectedVersion};

/// An event ready to be appended to a stream (no sequence number yet).
///
/// The journal assigns sequence numbers during commit. Build one from a typed
/// domain event with [`UncommittedRecord::from_typed`], which serializes the
/// payload and captures the event metadata needed for later deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncommittedRecord {
    pub record_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl UncommittedRecord {
    /// Convenience constructor from a typed domain event.
    pub fn from_typed<E>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        record_id: Uuid,
        event: &E,
    ) -> Result<Self, JournalError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            JournalError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            record_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A committed event in an append-only stream.
///
/// Sequence numbers are stream-scoped, start at 1, and increase by one per
/// record; they double as the stream version for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record_id: Uuid,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonically increasing position in the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredRecord {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }
}

/// One stream's contribution to an atomic commit.
///
/// All records must target the same aggregate; `expected` is checked against
/// the stream's current version before anything in the batch is written.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamAppend {
    pub expected: ExpectedVersion,
    pub records: Vec<UncommittedRecord>,
}

impl StreamAppend {
    pub fn new(expected: ExpectedVersion, records: Vec<UncommittedRecord>) -> Self {
        Self { expected, records }
    }

    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.records.first().map(|r| r.aggregate_id)
    }
}

/// Journal operation error.
///
/// Infrastructure failures only; domain failures never reach the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Optimistic version check failed for at least one stream in the commit.
    #[error("version conflict: {0}")]
    Conflict(String),

    /// Malformed batch or stream state (mixed aggregates, type drift, ...).
    #[error("invalid append: {0}")]
    InvalidAppend(String),
}

/// Append-only event journal with multi-stream atomic commits.
///
/// Implementations must:
/// - check every append's `ExpectedVersion` before writing anything, and
///   write either the whole commit or none of it
/// - assign sequence numbers monotonically per stream, starting at
///   `current_version + 1`, with no gaps
/// - keep streams append-only (no mutation, no deletion)
/// - serialize concurrent commits touching the same stream
pub trait EventJournal: Send + Sync {
    /// Atomically commit a batch of per-stream appends.
    fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredRecord>, JournalError>;

    /// Load the full stream for an aggregate (empty if it does not exist).
    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredRecord>, JournalError>;
}

impl<S> EventJournal for Arc<S>
where
    S: EventJournal + ?Sized,
{
    fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredRecord>, JournalError> {
        (**self).commit(appends)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredRecord>, JournalError> {
        (**self).load_stream(aggregate_id)
    }
}
