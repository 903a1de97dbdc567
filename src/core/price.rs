//! Pricing abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// A loaded quote for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub price: f64,
    pub currency: String,
    pub short_name: Option<String>,
}

/// Fetches a single price from a remote source.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price(&self, identifier: &str) -> Result<Price>;
}

/// Issues price loads on behalf of the coordinator.
///
/// Calling `load` issues the request; the returned future resolves once the
/// load settles. Implementations must not borrow from `self` in the future so
/// it can be driven on its own task.
pub trait PriceLoader: Send + Sync {
    fn load(&self, identifier: &str) -> BoxFuture<'static, Result<Price>>;
}
