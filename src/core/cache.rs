use crate::core::price::Price;
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use tracing::debug;

/// Observable mapping from identifier to its last loaded price.
pub struct PriceCache {
    inner: watch::Sender<HashMap<String, Price>>,
}

impl PriceCache {
    pub fn new() -> Self {
        let (inner, _) = watch::channel(HashMap::new());
        Self { inner }
    }

    pub fn get(&self, identifier: &str) -> Option<Price> {
        let value = self.inner.borrow().get(identifier).cloned();
        if value.is_some() {
            debug!("Cache HIT for {}", identifier);
        } else {
            debug!("Cache MISS for {}", identifier);
        }
        value
    }

    pub fn put(&self, identifier: String, price: Price) {
        debug!("Cache PUT for {}", identifier);
        self.inner.send_modify(|prices| {
            prices.insert(identifier, price);
        });
    }

    /// Identifiers that currently have a price.
    pub fn identifiers(&self) -> HashSet<String> {
        self.inner.borrow().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> HashMap<String, Price> {
        self.inner.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, Price>> {
        self.inner.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}
