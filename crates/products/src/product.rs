use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use souk_core::{Aggregate, AggregateId, AggregateRoot, CoreError, Event, UserId};

use crate::status::{self, StockStatus};

/// Application-level ceiling on a single product's stock level.
///
/// Enforced on creation and restock only; `RestoreStock` is unbounded so a
/// cancellation can always return what a creation deducted.
pub const MAX_STOCK_LEVEL: i64 = 1_000_000;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Product.
///
/// Owns the authoritative stock quantity. `stock_level` changes only through
/// the ledger commands (`DeductStock`, `RestoreStock`, `Restock`); the
/// baseline changes only on `Restock`.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    id: ProductId,
    seller_id: Option<UserId>,
    name: String,
    unit_price: u64,
    stock_level: i64,
    initial_stock: i64,
    baseline_stock: i64,
    baseline_updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            seller_id: None,
            name: String::new(),
            unit_price: 0,
            stock_level: 0,
            initial_stock: 0,
            baseline_stock: 0,
            baseline_updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn seller_id(&self) -> Option<UserId> {
        self.seller_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn stock_level(&self) -> i64 {
        self.stock_level
    }

    /// Immutable snapshot of the stock level at creation.
    pub fn initial_stock(&self) -> i64 {
        self.initial_stock
    }

    /// Reference quantity for percentage/status; reset on every restock.
    pub fn baseline_stock(&self) -> i64 {
        self.baseline_stock
    }

    pub fn baseline_updated_at(&self) -> Option<DateTime<Utc>> {
        self.baseline_updated_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Derived, not stored: percentage of baseline currently in stock.
    pub fn stock_percentage(&self) -> f64 {
        status::stock_percentage(self.stock_level, self.baseline_stock)
    }

    /// Derived, not stored: three-tier display/alerting status.
    pub fn stock_status(&self) -> StockStatus {
        status::classify_stock(self.stock_level, self.baseline_stock)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub unit_price: u64,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeductStock (order creation reserves stock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductStock {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreStock (cancellation/rejection returns stock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreStock {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Restock (seller-driven deliberate stock reset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restock {
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub new_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    DeductStock(DeductStock),
    RestoreStock(RestoreStock),
    Restock(Restock),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub unit_price: u64,
    pub initial_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockDeducted. One signed delta of `-quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDeducted {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockRestored. One signed delta of `+quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRestored {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRestocked. Resets both stock level and baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRestocked {
    pub product_id: ProductId,
    pub new_stock_level: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    StockDeducted(StockDeducted),
    StockRestored(StockRestored),
    ProductRestocked(ProductRestocked),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::StockDeducted(_) => "products.product.stock_deducted",
            ProductEvent::StockRestored(_) => "products.product.stock_restored",
            ProductEvent::ProductRestocked(_) => "products.product.restocked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::StockDeducted(e) => e.occurred_at,
            ProductEvent::StockRestored(e) => e.occurred_at,
            ProductEvent::ProductRestocked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = CoreError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.seller_id = Some(e.seller_id);
                self.name = e.name.clone();
                self.unit_price = e.unit_price;
                self.stock_level = e.initial_stock;
                self.initial_stock = e.initial_stock;
                self.baseline_stock = e.initial_stock;
                self.baseline_updated_at = Some(e.occurred_at);
                self.created = true;
            }
            ProductEvent::StockDeducted(e) => {
                self.stock_level -= e.quantity;
            }
            ProductEvent::StockRestored(e) => {
                self.stock_level += e.quantity;
            }
            ProductEvent::ProductRestocked(e) => {
                self.stock_level = e.new_stock_level;
                self.baseline_stock = e.new_stock_level;
                self.baseline_updated_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::DeductStock(cmd) => self.handle_deduct(cmd),
            ProductCommand::RestoreStock(cmd) => self.handle_restore(cmd),
            ProductCommand::Restock(cmd) => self.handle_restock(cmd),
        }
    }
}

impl Product {
    fn ensure_seller(&self, seller_id: UserId) -> Result<(), CoreError> {
        if self.seller_id != Some(seller_id) {
            return Err(CoreError::Unauthorized);
        }
        Ok(())
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), CoreError> {
        if self.id != product_id {
            return Err(CoreError::validation("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, CoreError> {
        if self.created {
            return Err(CoreError::validation("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(CoreError::validation("name cannot be empty"));
        }
        if cmd.unit_price == 0 {
            return Err(CoreError::validation("unit_price must be positive"));
        }
        if cmd.initial_stock < 0 {
            return Err(CoreError::validation("initial_stock cannot be negative"));
        }
        if cmd.initial_stock > MAX_STOCK_LEVEL {
            return Err(CoreError::validation("initial_stock exceeds the ceiling"));
        }

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            seller_id: cmd.seller_id,
            name: cmd.name.clone(),
            unit_price: cmd.unit_price,
            initial_stock: cmd.initial_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deduct(&self, cmd: &DeductStock) -> Result<Vec<ProductEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(CoreError::validation("quantity must be positive"));
        }

        // stock_level >= 0 is guarded here, never downstream.
        if self.stock_level < cmd.quantity {
            return Err(CoreError::insufficient_stock(self.stock_level, cmd.quantity));
        }

        Ok(vec![ProductEvent::StockDeducted(StockDeducted {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreStock) -> Result<Vec<ProductEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity <= 0 {
            return Err(CoreError::validation("quantity must be positive"));
        }

        Ok(vec![ProductEvent::StockRestored(StockRestored {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restock(&self, cmd: &Restock) -> Result<Vec<ProductEvent>, CoreError> {
        if !self.created {
            return Err(CoreError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;
        self.ensure_seller(cmd.seller_id)?;

        if cmd.new_stock_level < 0 {
            return Err(CoreError::validation("new_stock_level cannot be negative"));
        }
        if cmd.new_stock_level > MAX_STOCK_LEVEL {
            return Err(CoreError::validation("new_stock_level exceeds the ceiling"));
        }

        Ok(vec![ProductEvent::ProductRestocked(ProductRestocked {
            product_id: cmd.product_id,
            new_stock_level: cmd.new_stock_level,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use souk_core::AggregateId;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_seller_id() -> UserId {
        UserId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_product(stock: i64) -> (Product, ProductId, UserId) {
        let product_id = test_product_id();
        let seller_id = test_seller_id();
        let mut product = Product::empty(product_id);
        let cmd = CreateProduct {
            product_id,
            seller_id,
            name: "Clay teapot".to_string(),
            unit_price: 2_500,
            initial_stock: stock,
            occurred_at: test_time(),
        };
        let events = product
            .handle(&ProductCommand::CreateProduct(cmd))
            .unwrap();
        product.apply(&events[0]);
        (product, product_id, seller_id)
    }

    #[test]
    fn create_sets_stock_and_baseline_from_initial_stock() {
        let (product, _, _) = created_product(50);
        assert_eq!(product.stock_level(), 50);
        assert_eq!(product.initial_stock(), 50);
        assert_eq!(product.baseline_stock(), 50);
        assert!(product.baseline_updated_at().is_some());
        assert_eq!(product.stock_status(), StockStatus::High);
    }

    #[test]
    fn deduct_reduces_stock_without_touching_baseline() {
        let (mut product, product_id, _) = created_product(50);
        let cmd = DeductStock {
            product_id,
            quantity: 20,
            occurred_at: test_time(),
        };
        let events = product.handle(&ProductCommand::DeductStock(cmd)).unwrap();
        product.apply(&events[0]);

        assert_eq!(product.stock_level(), 30);
        assert_eq!(product.baseline_stock(), 50);
        assert_eq!(product.stock_percentage(), 60.0);
        assert_eq!(product.stock_status(), StockStatus::Moderate);
    }

    #[test]
    fn deduct_more_than_available_fails_with_insufficient_stock() {
        let (product, product_id, _) = created_product(5);
        let cmd = DeductStock {
            product_id,
            quantity: 10,
            occurred_at: test_time(),
        };
        let err = product
            .handle(&ProductCommand::DeductStock(cmd))
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                available: 5,
                requested: 10
            }
        );
        // Rejected command leaves state untouched.
        assert_eq!(product.stock_level(), 5);
    }

    #[test]
    fn deduct_exact_stock_drains_to_zero() {
        let (mut product, product_id, _) = created_product(5);
        let cmd = DeductStock {
            product_id,
            quantity: 5,
            occurred_at: test_time(),
        };
        let events = product.handle(&ProductCommand::DeductStock(cmd)).unwrap();
        product.apply(&events[0]);
        assert_eq!(product.stock_level(), 0);
        assert_eq!(product.stock_status(), StockStatus::Low);
    }

    #[test]
    fn restore_returns_stock_and_may_exceed_baseline() {
        let (mut product, product_id, _) = created_product(10);
        let cmd = RestoreStock {
            product_id,
            quantity: 15,
            occurred_at: test_time(),
        };
        let events = product.handle(&ProductCommand::RestoreStock(cmd)).unwrap();
        product.apply(&events[0]);

        assert_eq!(product.stock_level(), 25);
        assert!(product.stock_percentage() > 100.0);
        assert_eq!(product.stock_status(), StockStatus::High);
    }

    #[test]
    fn restock_resets_baseline_and_stock() {
        let (mut product, product_id, seller_id) = created_product(50);

        // Sell down to 10 first.
        let deduct = DeductStock {
            product_id,
            quantity: 40,
            occurred_at: test_time(),
        };
        let events = product.handle(&ProductCommand::DeductStock(deduct)).unwrap();
        product.apply(&events[0]);
        assert_eq!(product.stock_level(), 10);
        assert_eq!(product.baseline_stock(), 50);

        let restock = Restock {
            product_id,
            seller_id,
            new_stock_level: 80,
            occurred_at: test_time(),
        };
        let events = product.handle(&ProductCommand::Restock(restock)).unwrap();
        product.apply(&events[0]);

        assert_eq!(product.stock_level(), 80);
        assert_eq!(product.baseline_stock(), 80);
        assert_eq!(product.stock_percentage(), 100.0);
        assert_eq!(product.stock_status(), StockStatus::High);
    }

    #[test]
    fn restock_by_non_owner_is_unauthorized() {
        let (product, product_id, _) = created_product(50);
        let cmd = Restock {
            product_id,
            seller_id: test_seller_id(),
            new_stock_level: 80,
            occurred_at: test_time(),
        };
        let err = product.handle(&ProductCommand::Restock(cmd)).unwrap_err();
        assert_eq!(err, CoreError::Unauthorized);
    }

    #[test]
    fn zero_or_negative_quantities_are_rejected() {
        let (product, product_id, _) = created_product(50);
        for quantity in [0, -3] {
            let deduct = DeductStock {
                product_id,
                quantity,
                occurred_at: test_time(),
            };
            assert!(matches!(
                product.handle(&ProductCommand::DeductStock(deduct)),
                Err(CoreError::Validation(_))
            ));
            let restore = RestoreStock {
                product_id,
                quantity,
                occurred_at: test_time(),
            };
            assert!(matches!(
                product.handle(&ProductCommand::RestoreStock(restore)),
                Err(CoreError::Validation(_))
            ));
        }
    }

    #[test]
    fn ledger_commands_on_missing_product_are_not_found() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let cmd = DeductStock {
            product_id,
            quantity: 1,
            occurred_at: test_time(),
        };
        assert_eq!(
            product.handle(&ProductCommand::DeductStock(cmd)).unwrap_err(),
            CoreError::NotFound
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: handle() never mutates state, only apply() does.
            #[test]
            fn handle_is_pure(stock in 1i64..1000, qty in 1i64..1000) {
                let (product, product_id, _) = created_product(stock);
                let before = product.clone();
                let cmd = ProductCommand::DeductStock(DeductStock {
                    product_id,
                    quantity: qty,
                    occurred_at: test_time(),
                });
                let first = product.handle(&cmd);
                let second = product.handle(&cmd);
                prop_assert_eq!(&product, &before);
                prop_assert_eq!(first, second);
            }

            /// Property: stock never goes negative through any accepted deduct.
            #[test]
            fn deducts_never_drive_stock_negative(
                stock in 0i64..200,
                quantities in proptest::collection::vec(1i64..50, 0..20),
            ) {
                let (mut product, product_id, _) = created_product(stock);
                for quantity in quantities {
                    let cmd = ProductCommand::DeductStock(DeductStock {
                        product_id,
                        quantity,
                        occurred_at: test_time(),
                    });
                    if let Ok(events) = product.handle(&cmd) {
                        for event in &events {
                            product.apply(event);
                        }
                    }
                    prop_assert!(product.stock_level() >= 0);
                }
            }

            /// Property: conservation — final stock equals initial stock plus
            /// the sum of applied signed deltas.
            #[test]
            fn applied_deltas_are_conserved(
                stock in 0i64..500,
                ops in proptest::collection::vec((proptest::bool::ANY, 1i64..50), 0..30),
            ) {
                let (mut product, product_id, _) = created_product(stock);
                let mut expected = stock;
                for (restore, quantity) in ops {
                    let cmd = if restore {
                        ProductCommand::RestoreStock(RestoreStock {
                            product_id,
                            quantity,
                            occurred_at: test_time(),
                        })
                    } else {
                        ProductCommand::DeductStock(DeductStock {
                            product_id,
                            quantity,
                            occurred_at: test_time(),
                        })
                    };
                    if let Ok(events) = product.handle(&cmd) {
                        for event in &events {
                            product.apply(event);
                        }
                        expected += if restore { quantity } else { -quantity };
                    }
                }
                prop_assert_eq!(product.stock_level(), expected);
            }
        }
    }
}
