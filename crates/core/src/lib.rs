//! `souk-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the shared error taxonomy, and the aggregate/event traits
//! the order and product modules build on.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{CoreError, CoreResult};
pub use event::Event;
pub use id::{AggregateId, UserId};
