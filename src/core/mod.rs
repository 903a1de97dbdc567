//! Core domain types and the seams to external collaborators

pub mod alert;
pub mod cache;
pub mod config;
pub mod log;
pub mod price;
pub mod transaction;

// Re-export main types for cleaner imports
pub use alert::AlertSink;
pub use cache::PriceCache;
pub use price::{Price, PriceLoader, PriceProvider};
pub use transaction::{Transaction, TransactionStore};
