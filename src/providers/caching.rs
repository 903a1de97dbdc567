use crate::core::cache::PriceCache;
use crate::core::price::{Price, PriceLoader, PriceProvider};
use anyhow::Result;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

/// Loads prices through a provider and stores every success in the cache.
#[derive(Clone)]
pub struct CachingPriceLoader<T: PriceProvider> {
    inner: Arc<T>,
    cache: Arc<PriceCache>,
}

impl<T: PriceProvider> CachingPriceLoader<T> {
    pub fn new(inner: Arc<T>, cache: Arc<PriceCache>) -> Self {
        Self { inner, cache }
    }
}

impl<T: PriceProvider + 'static> PriceLoader for CachingPriceLoader<T> {
    fn load(&self, identifier: &str) -> BoxFuture<'static, Result<Price>> {
        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        let identifier = identifier.to_string();
        debug!("Issuing price load for {}", identifier);
        async move {
            let price = inner.fetch_price(&identifier).await?;
            cache.put(identifier, price.clone());
            Ok(price)
        }
        .boxed()
    }
}
