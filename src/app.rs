//! Wires the transaction store, price cache, coordinator and flow together.

use crate::coordinator::{LoadOutcome, PriceLoadCoordinator};
use crate::core::alert::AlertSink;
use crate::core::cache::PriceCache;
use crate::core::config::AppConfig;
use crate::core::price::{Price, PriceLoader};
use crate::core::transaction::{Transaction, TransactionStore};
use crate::flow::PriceUpdateFlow;
use crate::providers::{CachingPriceLoader, YahooFinanceProvider};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Current view of one instrument across all its transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRow {
    pub identifier: String,
    pub units: f64,
    pub price: Option<Price>,
    pub outcome: Option<LoadOutcome>,
}

impl PriceRow {
    pub fn value(&self) -> Option<f64> {
        self.price.as_ref().map(|p| p.price * self.units)
    }
}

pub struct App {
    store: TransactionStore,
    cache: Arc<PriceCache>,
    coordinator: Arc<PriceLoadCoordinator>,
    flow: PriceUpdateFlow,
}

impl App {
    /// Starts the flow with prices loaded from Yahoo Finance.
    pub fn start(config: &AppConfig, alerts: Arc<dyn AlertSink>) -> Result<Self> {
        let provider = Arc::new(YahooFinanceProvider::with_config(&config.providers.yahoo)?);
        let cache = Arc::new(PriceCache::new());
        let loader = Arc::new(CachingPriceLoader::new(provider, Arc::clone(&cache)));
        Ok(Self::with_loader(config, cache, loader, alerts))
    }

    pub fn with_loader(
        config: &AppConfig,
        cache: Arc<PriceCache>,
        loader: Arc<dyn PriceLoader>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let store = TransactionStore::new(config.transactions.clone());
        let coordinator = Arc::new(PriceLoadCoordinator::new(loader, config.stale_completions));
        let flow = PriceUpdateFlow::start(
            &store,
            Arc::clone(&cache),
            Arc::clone(&coordinator),
            alerts,
        );
        debug!(
            transactions = config.transactions.len(),
            "Price update flow started"
        );

        Self {
            store,
            cache,
            coordinator,
            flow,
        }
    }

    pub fn transactions(&self) -> &TransactionStore {
        &self.store
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn coordinator(&self) -> &PriceLoadCoordinator {
        &self.coordinator
    }

    /// Replaces the transactions and waits until the flow has evaluated them
    /// or a later list.
    ///
    /// Returns false when the list is unchanged.
    pub async fn replace_transactions(&self, transactions: Vec<Transaction>) -> bool {
        if self.store.transactions() == transactions {
            return false;
        }
        let revision = self.store.replace(transactions);
        self.flow.wait_for_revision(revision).await;
        true
    }

    /// Waits until the initial transaction list has been evaluated. Loads it
    /// started may still be in flight.
    pub async fn evaluated(&self) {
        self.flow.wait_for_revision(0).await;
    }

    /// Waits for the initial evaluation and for every load it started.
    pub async fn ready(&self) {
        self.evaluated().await;
        self.coordinator.settled().await;
    }

    pub fn rows(&self) -> Vec<PriceRow> {
        let mut units: BTreeMap<String, f64> = BTreeMap::new();
        for transaction in self.store.transactions() {
            *units.entry(transaction.identifier).or_default() += transaction.units;
        }

        units
            .into_iter()
            .map(|(identifier, units)| PriceRow {
                price: self.cache.get(&identifier),
                outcome: self.coordinator.outcome(&identifier),
                identifier,
                units,
            })
            .collect()
    }

    /// Stops the flow. Alerts for failures recorded before this call are
    /// delivered first.
    pub async fn shutdown(self) {
        self.flow.shutdown().await;
    }
}
