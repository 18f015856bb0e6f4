//! Products domain module (event-sourced).
//!
//! This crate contains business rules for marketplace products and their stock
//! ledger, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage). `Product.stock_level` is mutated only through the ledger
//! commands defined here.

pub mod product;
pub mod status;

pub use product::{
    CreateProduct, DeductStock, Product, ProductCommand, ProductCreated, ProductEvent, ProductId,
    ProductRestocked, Restock, RestoreStock, StockDeducted, StockRestored, MAX_STOCK_LEVEL,
};
pub use status::{classify, classify_stock, stock_percentage, StockStatus};
