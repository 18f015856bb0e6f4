//! Order/stock consistency coordination.
//!
//! `ConsistencyCoordinator` is the single entry point for every order
//! transition and stock mutation. Each operation follows the same pipeline:
//!
//! ```text
//! Operation
//!   ↓
//! 1. Acquire the per-product lock (stock-affecting operations only)
//!   ↓
//! 2. Load streams and rehydrate aggregates
//!   ↓
//! 3. Handle commands (pure decision logic, produces events)
//!   ↓
//! 4. Commit all touched streams as one atomic append (version-checked)
//! ```
//!
//! Concurrent stock mutations on one product are totally ordered by lock
//! acquisition; different products never contend. The version checks are kept
//! as a second line of defense: a conflicting commit is retried a bounded
//! number of times and then surfaced as the retryable `Contention` error.
//! Any failure at any step leaves every stream untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use souk_core::{
    Aggregate, AggregateId, AggregateRoot, CoreError, CoreResult, Event, ExpectedVersion, UserId,
};
use souk_orders::{
    AcceptOrder, CancelOrder, DeliverOrder, FulfillOrder, Order, OrderCommand, OrderId,
    OrderStatus, PlaceOrder, RejectOrder,
};
use souk_products::{
    CreateProduct, DeductStock, Product, ProductCommand, ProductId, Restock, RestoreStock,
};

use crate::journal::{EventJournal, JournalError, StreamAppend, UncommittedRecord};
use crate::order_number::OrderNumberGenerator;
use crate::snapshot::{OrderSnapshot, ProductSnapshot, StockStatusReport};

const ORDER_AGGREGATE_TYPE: &str = "orders.order";
const PRODUCT_AGGREGATE_TYPE: &str = "products.product";

/// Commit attempts before a version conflict becomes `Contention`.
const MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Bounded wait for the per-product lock.
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Single entry point combining the order state machine, the stock ledger and
/// the journal under one atomic unit of work per operation.
#[derive(Debug)]
pub struct ConsistencyCoordinator<J> {
    journal: J,
    order_numbers: OrderNumberGenerator,
    // One entry per product for the coordinator's lifetime; entries are never
    // evicted, matching the in-memory journal which also retains every stream.
    product_locks: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
    lock_wait: Duration,
}

impl<J> ConsistencyCoordinator<J> {
    pub fn new(journal: J) -> Self {
        Self {
            journal,
            order_numbers: OrderNumberGenerator::new(),
            product_locks: Mutex::new(HashMap::new()),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Override the bounded lock wait (tests exercising contention).
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }
}

impl<J> ConsistencyCoordinator<J>
where
    J: EventJournal,
{
    /// Create a product owned by `seller_id`; seeds stock and the baseline.
    pub fn create_product(
        &self,
        seller_id: UserId,
        name: &str,
        unit_price: u64,
        initial_stock: i64,
    ) -> CoreResult<ProductSnapshot> {
        let product_id = ProductId::new(AggregateId::new());
        let product = Product::empty(product_id);
        let events = product.handle(&ProductCommand::CreateProduct(CreateProduct {
            product_id,
            seller_id,
            name: name.to_string(),
            unit_price,
            initial_stock,
            occurred_at: Utc::now(),
        }))?;

        let appends = vec![StreamAppend::new(
            ExpectedVersion::Exact(0),
            to_records(product_id.0, PRODUCT_AGGREGATE_TYPE, &events)?,
        )];
        self.journal.commit(appends).map_err(map_journal_error)?;

        let product = applied(product, &events);
        tracing::debug!(%product_id, initial_stock, "product created");
        ProductSnapshot::from_product(&product)
    }

    /// Create an order in `Pending`, deducting stock first. If the deduction
    /// fails, no order comes into existence.
    pub fn create_order(
        &self,
        product_id: ProductId,
        buyer_id: UserId,
        seller_id: UserId,
        quantity: i64,
    ) -> CoreResult<OrderSnapshot> {
        let lock = self.product_lock(product_id)?;
        let _guard = self.acquire(&lock)?;

        self.run_atomic("create_order", || {
            let product = self.load_product(product_id)?;
            if product.seller_id() != Some(seller_id) {
                return Err(CoreError::validation("seller does not own product"));
            }

            let now = Utc::now();
            let deduct_events = product.handle(&ProductCommand::DeductStock(DeductStock {
                product_id,
                quantity,
                occurred_at: now,
            }))?;

            let order_id = OrderId::new(AggregateId::new());
            let order = Order::empty(order_id);
            let order_events = order.handle(&OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                order_number: self.order_numbers.next(now),
                product_id,
                seller_id,
                buyer_id,
                quantity,
                unit_price: product.unit_price(),
                occurred_at: now,
            }))?;

            let appends = vec![
                StreamAppend::new(
                    ExpectedVersion::Exact(product.version()),
                    to_records(product_id.0, PRODUCT_AGGREGATE_TYPE, &deduct_events)?,
                ),
                StreamAppend::new(
                    ExpectedVersion::Exact(0),
                    to_records(order_id.0, ORDER_AGGREGATE_TYPE, &order_events)?,
                ),
            ];

            let order = applied(order, &order_events);
            tracing::debug!(%order_id, %product_id, quantity, "order placed, stock deducted");
            Ok((appends, OrderSnapshot::from_order(&order)?))
        })
    }

    /// Cancel an order. From `Pending` (buyer) this restores the deducted
    /// stock; from `Accepted` (seller) it is status-only. A repeat on an
    /// already-terminal order fails with `AlreadyTerminal` and never touches
    /// the ledger again.
    pub fn cancel_order(&self, order_id: OrderId, actor_id: UserId) -> CoreResult<OrderSnapshot> {
        let product_id = self.product_of(order_id)?;
        let lock = self.product_lock(product_id)?;
        let _guard = self.acquire(&lock)?;

        self.run_atomic("cancel_order", || {
            let order = self.load_order(order_id)?;
            let now = Utc::now();
            let from = order.status();
            let order_events = order.handle(&OrderCommand::CancelOrder(CancelOrder {
                order_id,
                actor_id,
                occurred_at: now,
            }))?;

            let mut appends = vec![StreamAppend::new(
                ExpectedVersion::Exact(order.version()),
                to_records(order_id.0, ORDER_AGGREGATE_TYPE, &order_events)?,
            )];

            // Stock was reserved at creation; only the Pending exit re-credits it.
            if from == OrderStatus::Pending {
                appends.push(self.restore_append(product_id, order.quantity())?);
            }

            let order = applied(order, &order_events);
            tracing::debug!(%order_id, %product_id, restored = (from == OrderStatus::Pending), "order cancelled");
            Ok((appends, OrderSnapshot::from_order(&order)?))
        })
    }

    /// Seller rejection of a pending order; restores the deducted stock.
    pub fn reject_order(
        &self,
        order_id: OrderId,
        actor_id: UserId,
        reason: &str,
    ) -> CoreResult<OrderSnapshot> {
        let product_id = self.product_of(order_id)?;
        let lock = self.product_lock(product_id)?;
        let _guard = self.acquire(&lock)?;

        self.run_atomic("reject_order", || {
            let order = self.load_order(order_id)?;
            let now = Utc::now();
            let order_events = order.handle(&OrderCommand::RejectOrder(RejectOrder {
                order_id,
                actor_id,
                reason: reason.to_string(),
                occurred_at: now,
            }))?;

            // A rejection is only legal from Pending, so it always restores.
            let appends = vec![
                StreamAppend::new(
                    ExpectedVersion::Exact(order.version()),
                    to_records(order_id.0, ORDER_AGGREGATE_TYPE, &order_events)?,
                ),
                self.restore_append(product_id, order.quantity())?,
            ];

            let order = applied(order, &order_events);
            tracing::debug!(%order_id, %product_id, "order rejected, stock restored");
            Ok((appends, OrderSnapshot::from_order(&order)?))
        })
    }

    /// Seller-side progress: `Accepted`, `Fulfilled` or `Delivered`. These are
    /// status-only transitions; the ledger is never involved.
    pub fn advance_order(
        &self,
        order_id: OrderId,
        actor_id: UserId,
        to: OrderStatus,
    ) -> CoreResult<OrderSnapshot> {
        self.run_atomic("advance_order", || {
            let order = self.load_order(order_id)?;
            let now = Utc::now();
            let command = match to {
                OrderStatus::Accepted => OrderCommand::AcceptOrder(AcceptOrder {
                    order_id,
                    actor_id,
                    occurred_at: now,
                }),
                OrderStatus::Fulfilled => OrderCommand::FulfillOrder(FulfillOrder {
                    order_id,
                    actor_id,
                    occurred_at: now,
                }),
                OrderStatus::Delivered => OrderCommand::DeliverOrder(DeliverOrder {
                    order_id,
                    actor_id,
                    occurred_at: now,
                }),
                other => {
                    return Err(CoreError::validation(format!(
                        "advance cannot target {other}"
                    )));
                }
            };
            let order_events = order.handle(&command)?;

            let appends = vec![StreamAppend::new(
                ExpectedVersion::Exact(order.version()),
                to_records(order_id.0, ORDER_AGGREGATE_TYPE, &order_events)?,
            )];

            let order = applied(order, &order_events);
            tracing::debug!(%order_id, status = %order.status(), "order advanced");
            Ok((appends, OrderSnapshot::from_order(&order)?))
        })
    }

    /// Seller-driven restock: resets the stock level and the baseline.
    pub fn restock(
        &self,
        product_id: ProductId,
        actor_id: UserId,
        new_stock_level: i64,
    ) -> CoreResult<ProductSnapshot> {
        let lock = self.product_lock(product_id)?;
        let _guard = self.acquire(&lock)?;

        self.run_atomic("restock", || {
            let product = self.load_product(product_id)?;
            let events = product.handle(&ProductCommand::Restock(Restock {
                product_id,
                seller_id: actor_id,
                new_stock_level,
                occurred_at: Utc::now(),
            }))?;

            let appends = vec![StreamAppend::new(
                ExpectedVersion::Exact(product.version()),
                to_records(product_id.0, PRODUCT_AGGREGATE_TYPE, &events)?,
            )];

            let product = applied(product, &events);
            tracing::debug!(%product_id, new_stock_level, "product restocked, baseline reset");
            Ok((appends, ProductSnapshot::from_product(&product)?))
        })
    }

    /// Derived stock figures for display/alerting. Read-only.
    pub fn stock_status(&self, product_id: ProductId) -> CoreResult<StockStatusReport> {
        let product = self.load_product(product_id)?;
        Ok(StockStatusReport::from_product(&product))
    }

    /// Read-only order projection.
    pub fn order_snapshot(&self, order_id: OrderId) -> CoreResult<OrderSnapshot> {
        let order = self.load_order(order_id)?;
        OrderSnapshot::from_order(&order)
    }

    /// Read-only product projection.
    pub fn product_snapshot(&self, product_id: ProductId) -> CoreResult<ProductSnapshot> {
        let product = self.load_product(product_id)?;
        ProductSnapshot::from_product(&product)
    }

    /// Decide-and-commit loop: the body rebuilds its decision from freshly
    /// loaded state on every attempt, so a retried commit never replays a
    /// stale decision. Deterministic business failures abort immediately.
    fn run_atomic<T>(
        &self,
        op: &'static str,
        mut body: impl FnMut() -> CoreResult<(Vec<StreamAppend>, T)>,
    ) -> CoreResult<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (appends, outcome) = body()?;
            match self.journal.commit(appends) {
                Ok(_) => return Ok(outcome),
                Err(JournalError::Conflict(_)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(op, attempt, "version conflict, retrying");
                }
                Err(JournalError::Conflict(msg)) => {
                    tracing::warn!(op, attempt, "version conflict budget exhausted");
                    return Err(CoreError::contention(msg));
                }
                Err(other) => return Err(CoreError::storage(other.to_string())),
            }
        }
    }

    fn restore_append(&self, product_id: ProductId, quantity: i64) -> CoreResult<StreamAppend> {
        let product = self.load_product(product_id)?;
        let events = product.handle(&ProductCommand::RestoreStock(RestoreStock {
            product_id,
            quantity,
            occurred_at: Utc::now(),
        }))?;
        Ok(StreamAppend::new(
            ExpectedVersion::Exact(product.version()),
            to_records(product_id.0, PRODUCT_AGGREGATE_TYPE, &events)?,
        ))
    }

    fn product_of(&self, order_id: OrderId) -> CoreResult<ProductId> {
        self.load_order(order_id)?
            .product_id()
            .ok_or_else(|| CoreError::storage("order stream missing placement event"))
    }

    fn load_product(&self, product_id: ProductId) -> CoreResult<Product> {
        let records = self
            .journal
            .load_stream(product_id.0)
            .map_err(map_journal_error)?;
        let product = rehydrate(Product::empty(product_id), &records)?;
        if !product.exists() {
            return Err(CoreError::not_found());
        }
        Ok(product)
    }

    fn load_order(&self, order_id: OrderId) -> CoreResult<Order> {
        let records = self
            .journal
            .load_stream(order_id.0)
            .map_err(map_journal_error)?;
        let order = rehydrate(Order::empty(order_id), &records)?;
        if !order.exists() {
            return Err(CoreError::not_found());
        }
        Ok(order)
    }

    pub(crate) fn product_lock(&self, product_id: ProductId) -> CoreResult<Arc<Mutex<()>>> {
        let mut locks = self
            .product_locks
            .lock()
            .map_err(|_| CoreError::storage("product lock registry poisoned"))?;
        Ok(locks.entry(product_id.0).or_default().clone())
    }

    /// Bounded-wait exclusive acquisition of a per-product lock.
    fn acquire<'a>(&self, lock: &'a Mutex<()>) -> CoreResult<MutexGuard<'a, ()>> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            match lock.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(_)) => {
                    return Err(CoreError::storage("product lock poisoned"));
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(CoreError::contention(
                            "timed out waiting for product lock",
                        ));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
            }
        }
    }
}

fn map_journal_error(err: JournalError) -> CoreError {
    match err {
        JournalError::Conflict(msg) => CoreError::contention(msg),
        JournalError::InvalidAppend(msg) => CoreError::storage(msg),
    }
}

fn to_records<E>(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    events: &[E],
) -> CoreResult<Vec<UncommittedRecord>>
where
    E: Event + Serialize,
{
    events
        .iter()
        .map(|event| {
            UncommittedRecord::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), event)
                .map_err(map_journal_error)
        })
        .collect()
}

/// Rehydrate an aggregate from its stored records, in sequence order.
fn rehydrate<A>(mut aggregate: A, records: &[crate::journal::StoredRecord]) -> CoreResult<A>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| r.sequence_number);

    for record in sorted {
        let event: A::Event = serde_json::from_value(record.payload)
            .map_err(|e| CoreError::storage(format!("event deserialization failed: {e}")))?;
        aggregate.apply(&event);
    }

    Ok(aggregate)
}

/// Fold decided events into a copy of the aggregate (post-commit state).
fn applied<A>(mut aggregate: A, events: &[A::Event]) -> A
where
    A: Aggregate,
{
    for event in events {
        aggregate.apply(event);
    }
    aggregate
}
