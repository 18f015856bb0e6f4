//! Engine layer: the event journal and the consistency coordinator.
//!
//! The coordinator is the only entry point callers use to mutate orders and
//! product stock. It composes the pure domain aggregates (`souk-orders`,
//! `souk-products`) with the append-only journal, and owns the atomic
//! unit-of-work: every operation commits its order and product changes in one
//! multi-stream append or not at all.

pub mod coordinator;
pub mod journal;
pub mod order_number;
pub mod snapshot;


pub use coordinator::ConsistencyCoordinator;
pub use journal::{EventJournal, InMemoryEventJournal, JournalError, StoredRecord, StreamAppend, UncommittedRecord};
pub use order_number::OrderNumberGenerator;
pub use snapshot::{OrderSnapshot, ProductSnapshot, StockStatusReport};
