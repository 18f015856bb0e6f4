//! Append-only event journal boundary.
//!
//! Streams are keyed by aggregate id. A commit carries one `StreamAppend` per
//! touched stream and is applied all-or-nothing: this is the atomic
//! unit-of-work the coordinator leans on when an order transition and a stock
//! mutation must land together.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventJournal;
pub use r#trait::{EventJournal, JournalError, StoredRecord, StreamAppend, UncommittedRecord};
