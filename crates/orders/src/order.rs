//! Order aggregate and lifecycle state machine.
//!
//! ```text
//! Pending ──> Accepted ──> Fulfilled ──> Delivered (terminal)
//!    │            │
//!    │            └──> Cancelled (terminal, status-only)
//!    ├──> Rejected  (terminal, restores stock)
//!    └──> Cancelled (terminal, restores stock)
//! ```
//!
//! Only creation and the two Pending exits touch stock; the engine owns the
//! actual ledger mutation. Everything here is a pure decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use souk_core::{Aggregate, AggregateId, AggregateRoot, CoreError, Event, UserId};
use souk_products::ProductId;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Rejected,
    Fulfilled,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Delivered | Self::Cancelled)
    }

    /// The entire transition table; no other pair is legal.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Accepted, Fulfilled)
                | (Accepted, Cancelled)
                | (Fulfilled, Delivered)
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Aggregate root: Order.
///
/// Orders are never deleted; cancellation and rejection are transitions, so
/// the full history survives in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    order_number: String,
    product_id: Option<ProductId>,
    seller_id: Option<UserId>,
    buyer_id: Option<UserId>,
    quantity: i64,
    unit_price: u64,
    status: OrderStatus,
    rejection_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    status_changed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            product_id: None,
            seller_id: None,
            buyer_id: None,
            quantity: 0,
            unit_price: 0,
            status: OrderStatus::Pending,
            rejection_reason: None,
            created_at: None,
            status_changed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn seller_id(&self) -> Option<UserId> {
        self.seller_id
    }

    pub fn buyer_id(&self) -> Option<UserId> {
        self.buyer_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn total_amount(&self) -> u64 {
        // Placement rejects overflowing totals, so saturation is unreachable
        // for any order that went through `handle`.
        self.unit_price.saturating_mul(self.quantity.max(0) as u64)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn status_changed_at(&self) -> Option<DateTime<Utc>> {
        self.status_changed_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder (buyer-initiated; the engine deducts stock first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub quantity: i64,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AcceptOrder (seller-initiated, status-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectOrder (seller-initiated; from Pending this restores stock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FulfillOrder (seller-initiated, status-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder (seller-initiated, status-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder (buyer from Pending; seller from Accepted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    AcceptOrder(AcceptOrder),
    RejectOrder(RejectOrder),
    FulfillOrder(FulfillOrder),
    DeliverOrder(DeliverOrder),
    CancelOrder(CancelOrder),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: String,
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub quantity: i64,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderAccepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderFulfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFulfilled {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderAccepted(OrderAccepted),
    OrderRejected(OrderRejected),
    OrderFulfilled(OrderFulfilled),
    OrderDelivered(OrderDelivered),
    OrderCancelled(OrderCancelled),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderAccepted(_) => "orders.order.accepted",
            OrderEvent::OrderRejected(_) => "orders.order.rejected",
            OrderEvent::OrderFulfilled(_) => "orders.order.fulfilled",
            OrderEvent::OrderDelivered(_) => "orders.order.delivered",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderAccepted(e) => e.occurred_at,
            OrderEvent::OrderRejected(e) => e.occurred_at,
            OrderEvent::OrderFulfilled(e) => e.occurred_at,
            OrderEvent::OrderDelivered(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = CoreError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.product_id = Some(e.product_id);
                self.seller_id = Some(e.seller_id);
                self.buyer_id = Some(e.buyer_id);
                self.quantity = e.quantity;
                self.unit_price = e.unit_price;
                self.status = OrderStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.status_changed_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::OrderAccepted(e) => {
                self.status = OrderStatus::Accepted;
                self.status_changed_at = Some(e.occurred_at);
            }
            OrderEvent::OrderRejected(e) => {
                self.status = OrderStatus::Rejected;
                self.rejection_reason = Some(e.reason.clone());
                self.status_changed_at = Some(e.occurred_at);
            }
            OrderEvent::OrderFulfilled(e) => {
                self.status = OrderStatus::Fulfilled;
                self.status_changed_at = Some(e.occurred_at);
            }
            OrderEvent::OrderDelivered(e) => {
                self.status = OrderStatus::Delivered;
                self.status_changed_at = Some(e.occurred_at);
            }
            OrderEvent::OrderCancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.status_changed_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::AcceptOrder(cmd) => self.handle_accept(cmd),
            OrderCommand::RejectOrder(cmd) => self.handle_reject(cmd),
            OrderCommand::FulfillOrder(cmd) => self.handle_fulfill(cmd),
            OrderCommand::DeliverOrder(cmd) => self.handle_deliver(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), CoreError> {
        if self.id != order_id {
            return Err(CoreError::validation("order_id mismatch"));
        }
        Ok(())
    }

    /// Terminal check first (idempotent-retry contract), then the table.
    fn ensure_transition(&self, to: OrderStatus) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::already_terminal(self.status.to_string()));
        }
        if !self.status.can_transition_to(to) {
            return Err(CoreError::invalid_transition(
                self.status.to_string(),
                to.to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_seller(&self, actor_id: UserId) -> Result<(), CoreError> {
        if self.seller_id != Some(actor_id) {
            return Err(CoreError::Unauthorized);
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, CoreError> {
        if self.created {
            return Err(CoreError::validation("order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(CoreError::validation("order_number cannot be empty"));
        }
        if cmd.quantity <= 0 {
            return Err(CoreError::validation("quantity must be positive"));
        }
        if cmd.unit_price == 0 {
            return Err(CoreError::validation("unit_price must be positive"));
        }
        if cmd.unit_price.checked_mul(cmd.quantity as u64).is_none() {
            return Err(CoreError::validation("order total overflows"));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            product_id: cmd.product_id,
            seller_id: cmd.seller_id,
            buyer_id: cmd.buyer_id,
            quantity: cmd.quantity,
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_accept(&self, cmd: &AcceptOrder) -> Result<Vec<OrderEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Accepted)?;
        self.ensure_seller(cmd.actor_id)?;

        Ok(vec![OrderEvent::OrderAccepted(OrderAccepted {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectOrder) -> Result<Vec<OrderEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Rejected)?;
        self.ensure_seller(cmd.actor_id)?;

        Ok(vec![OrderEvent::OrderRejected(OrderRejected {
            order_id: cmd.order_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fulfill(&self, cmd: &FulfillOrder) -> Result<Vec<OrderEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Fulfilled)?;
        self.ensure_seller(cmd.actor_id)?;

        Ok(vec![OrderEvent::OrderFulfilled(OrderFulfilled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &DeliverOrder) -> Result<Vec<OrderEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Delivered)?;
        self.ensure_seller(cmd.actor_id)?;

        Ok(vec![OrderEvent::OrderDelivered(OrderDelivered {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Cancelled)?;

        // From Pending the buyer cancels; once the seller has accepted, only
        // the seller may cancel (stock is already committed to fulfillment).
        let allowed = match self.status {
            OrderStatus::Pending => self.buyer_id == Some(cmd.actor_id),
            OrderStatus::Accepted => self.seller_id == Some(cmd.actor_id),
            _ => false,
        };
        if !allowed {
            return Err(CoreError::Unauthorized);
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
