//! Orders domain module (event-sourced).
//!
//! This crate contains the order lifecycle state machine, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage). Transition
//! validity is encoded in exactly one place: `OrderStatus::can_transition_to`.

pub mod order;

pub use order::{
    AcceptOrder, CancelOrder, DeliverOrder, FulfillOrder, Order, OrderAccepted, OrderCancelled,
    OrderCommand, OrderDelivered, OrderEvent, OrderFulfilled, OrderId, OrderPlaced, OrderRejected,
    OrderStatus, PlaceOrder, RejectOrder,
};
