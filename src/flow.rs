//! Keeps the price cache populated as the transaction list changes and turns
//! load failures into user alerts.

use crate::coordinator::{ErrorState, PriceLoadCoordinator};
use crate::core::alert::{AlertSink, PRICE_ALERT_MESSAGE, PRICE_ALERT_TITLE};
use crate::core::cache::PriceCache;
use crate::core::transaction::{TransactionList, TransactionStore, identifiers_of};
use crate::detector::missing_identifiers;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// A running subscription. The task is aborted when the handle is closed or
/// dropped.
pub struct Subscription {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    fn spawn<F>(name: &'static str, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            handle: Some(tokio::spawn(task)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn close(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
            debug!(subscription = self.name, "Subscription closed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub struct PriceUpdateFlow {
    load_trigger: Subscription,
    alert_trigger: Subscription,
    evaluated: watch::Receiver<Option<u64>>,
    errors: watch::Receiver<ErrorState>,
    alerted: watch::Receiver<u64>,
}

impl PriceUpdateFlow {
    /// Subscribes to the transaction list and the coordinator's error state.
    ///
    /// The current transaction list is evaluated right away. The error state
    /// present at this point is not reported, only later transitions into an
    /// error are.
    pub fn start(
        transactions: &TransactionStore,
        cache: Arc<PriceCache>,
        coordinator: Arc<PriceLoadCoordinator>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let (evaluated_tx, evaluated) = watch::channel(None);

        let load_trigger = Subscription::spawn(
            "load-trigger",
            trigger_loads(
                transactions.subscribe(),
                cache,
                Arc::clone(&coordinator),
                evaluated_tx,
            ),
        );

        let errors = coordinator.subscribe_errors();
        let seen = errors.borrow().raised;
        let (alerted_tx, alerted) = watch::channel(seen);
        let alert_trigger = Subscription::spawn(
            "alert-trigger",
            trigger_alerts(errors.clone(), alerts, alerted_tx),
        );

        Self {
            load_trigger,
            alert_trigger,
            evaluated,
            errors,
            alerted,
        }
    }

    pub fn is_active(&self) -> bool {
        self.load_trigger.is_active() && self.alert_trigger.is_active()
    }

    /// Revision of the last transaction list the load trigger evaluated.
    pub fn evaluated_revision(&self) -> Option<u64> {
        *self.evaluated.borrow()
    }

    /// Waits until a transaction list at `revision` or later was evaluated.
    pub async fn wait_for_revision(&self, revision: u64) {
        let mut evaluated = self.evaluated.clone();
        // Fails only once the load trigger is gone.
        let _ = evaluated
            .wait_for(|r| r.is_some_and(|r| r >= revision))
            .await;
    }

    /// Stops reacting to transaction changes, delivers every error transition
    /// raised so far to the alert sink, then releases both subscriptions.
    pub async fn shutdown(self) {
        self.load_trigger.close().await;

        let raised = self.errors.borrow().raised;
        let mut alerted = self.alerted.clone();
        if alerted.wait_for(|n| *n >= raised).await.is_err() {
            debug!("Alert trigger already stopped");
        }
        self.alert_trigger.close().await;
    }
}

async fn trigger_loads(
    mut transactions: watch::Receiver<TransactionList>,
    cache: Arc<PriceCache>,
    coordinator: Arc<PriceLoadCoordinator>,
    evaluated: watch::Sender<Option<u64>>,
) {
    loop {
        let (revision, identifiers) = {
            let list = transactions.borrow_and_update();
            (list.revision, identifiers_of(&list))
        };
        let missing = missing_identifiers(&identifiers, &cache.identifiers());
        if missing.is_empty() {
            debug!(revision, "No missing prices");
        } else {
            debug!(revision, ?missing, "Missing prices");
            coordinator.load_prices(&missing);
        }
        evaluated.send_replace(Some(revision));

        if transactions.changed().await.is_err() {
            debug!("Transaction store closed");
            break;
        }
    }
}

async fn trigger_alerts(
    mut errors: watch::Receiver<ErrorState>,
    alerts: Arc<dyn AlertSink>,
    alerted: watch::Sender<u64>,
) {
    while errors.changed().await.is_ok() {
        let raised = errors.borrow_and_update().raised;
        let seen = *alerted.borrow();
        for _ in seen..raised {
            alerts.notify(PRICE_ALERT_TITLE, PRICE_ALERT_MESSAGE);
        }
        alerted.send_replace(raised.max(seen));
    }
}
