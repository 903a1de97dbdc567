//! Fans out one price load per identifier and aggregates failures.

use crate::core::config::StaleCompletionPolicy;
use crate::core::price::{Price, PriceLoader};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to load price for {identifier}: {reason}")]
pub struct LoadFailure {
    pub identifier: String,
    pub reason: String,
    pub batch: u64,
}

/// Aggregate failure flag for the most recent batch.
///
/// `raised` counts every transition from no failure to a failure over the
/// coordinator's lifetime, so observers that miss intermediate values can
/// still tell how many transitions happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorState {
    pub failure: Option<LoadFailure>,
    pub raised: u64,
}

impl ErrorState {
    pub fn has_error(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Pending,
    Loaded,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct LoadProgress {
    /// Id of the most recently issued batch, starting at 1.
    pub batch: u64,
    pub in_flight: usize,
    pub outcomes: HashMap<String, LoadOutcome>,
}

struct Shared {
    latest_batch: AtomicU64,
    policy: StaleCompletionPolicy,
    error: watch::Sender<ErrorState>,
    progress: watch::Sender<LoadProgress>,
}

impl Shared {
    fn complete(&self, batch: u64, identifier: String, result: Result<Price>) {
        let outcome = match result {
            Ok(price) => {
                debug!(%identifier, batch, price = price.price, "Price loaded");
                LoadOutcome::Loaded
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(%identifier, batch, %reason, "Price load failed");
                self.record_failure(LoadFailure {
                    identifier: identifier.clone(),
                    reason: reason.clone(),
                    batch,
                });
                LoadOutcome::Failed(reason)
            }
        };

        self.progress.send_modify(|progress| {
            progress.in_flight = progress.in_flight.saturating_sub(1);
            progress.outcomes.insert(identifier, outcome);
        });
    }

    // Only writer of ErrorState besides the reset in `load_prices`.
    fn record_failure(&self, failure: LoadFailure) {
        self.error.send_if_modified(|state| {
            if self.policy == StaleCompletionPolicy::IgnoreSuperseded
                && failure.batch != self.latest_batch.load(Ordering::SeqCst)
            {
                debug!(batch = failure.batch, "Ignoring failure from superseded batch");
                return false;
            }
            if state.failure.is_some() {
                return false;
            }
            state.failure = Some(failure);
            state.raised += 1;
            true
        });
    }
}

/// Drives price loads and reports whether any of them failed.
///
/// Every load runs on its own tokio task, so `load_prices` must be called
/// from within a runtime.
pub struct PriceLoadCoordinator {
    loader: Arc<dyn PriceLoader>,
    shared: Arc<Shared>,
}

impl PriceLoadCoordinator {
    pub fn new(loader: Arc<dyn PriceLoader>, policy: StaleCompletionPolicy) -> Self {
        let (error, _) = watch::channel(ErrorState::default());
        let (progress, _) = watch::channel(LoadProgress::default());
        Self {
            loader,
            shared: Arc::new(Shared {
                latest_batch: AtomicU64::new(0),
                policy,
                error,
                progress,
            }),
        }
    }

    /// Clears the error state and issues one load per identifier, in order.
    ///
    /// Returns the batch id without waiting for any load to settle. Loads
    /// from earlier batches keep running.
    pub fn load_prices(&self, identifiers: &[String]) -> u64 {
        let batch = self.shared.latest_batch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.error.send_if_modified(|state| state.failure.take().is_some());
        debug!(batch, ?identifiers, "Loading prices");

        self.shared.progress.send_modify(|progress| {
            progress.batch = batch;
            progress.in_flight += identifiers.len();
            for identifier in identifiers {
                progress
                    .outcomes
                    .insert(identifier.clone(), LoadOutcome::Pending);
            }
        });

        for identifier in identifiers {
            let load = self.loader.load(identifier);
            let shared = Arc::clone(&self.shared);
            let identifier = identifier.clone();
            tokio::spawn(async move {
                let result = load.await;
                shared.complete(batch, identifier, result);
            });
        }

        batch
    }

    pub fn error(&self) -> Option<LoadFailure> {
        self.shared.error.borrow().failure.clone()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<ErrorState> {
        self.shared.error.subscribe()
    }

    pub fn progress(&self) -> LoadProgress {
        self.shared.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<LoadProgress> {
        self.shared.progress.subscribe()
    }

    pub fn outcome(&self, identifier: &str) -> Option<LoadOutcome> {
        self.shared.progress.borrow().outcomes.get(identifier).cloned()
    }

    /// Waits until no load is in flight.
    pub async fn settled(&self) {
        let mut rx = self.shared.progress.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|progress| progress.in_flight == 0).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    type Request = (String, Option<oneshot::Sender<Result<Price>>>);

    /// Records every load and lets the test settle each one by index.
    #[derive(Default)]
    pub(crate) struct LoaderSpy {
        requests: Mutex<Vec<Request>>,
    }

    impl LoaderSpy {
        pub(crate) fn requested(&self) -> Vec<String> {
            let requests = self.requests.lock().unwrap();
            requests.iter().map(|(id, _)| id.clone()).collect()
        }

        fn settle(&self, index: usize, result: Result<Price>) {
            let sender = self.requests.lock().unwrap()[index]
                .1
                .take()
                .expect("load already completed");
            let _ = sender.send(result);
        }

        pub(crate) fn complete(&self, index: usize) {
            self.settle(index, Ok(any_price()));
        }

        pub(crate) fn fail(&self, index: usize) {
            self.settle(index, Err(anyhow!("network unreachable")));
        }
    }

    impl PriceLoader for LoaderSpy {
        fn load(&self, identifier: &str) -> BoxFuture<'static, Result<Price>> {
            let (tx, rx) = oneshot::channel();
            self.requests
                .lock()
                .unwrap()
                .push((identifier.to_string(), Some(tx)));
            async move { rx.await.unwrap_or_else(|_| Err(anyhow!("load abandoned"))) }.boxed()
        }
    }

    pub(crate) fn any_price() -> Price {
        Price {
            price: 0.0,
            currency: "USD".to_string(),
            short_name: None,
        }
    }

    pub(crate) fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn make_sut(policy: StaleCompletionPolicy) -> (PriceLoadCoordinator, Arc<LoaderSpy>) {
        let loader = Arc::new(LoaderSpy::default());
        let sut = PriceLoadCoordinator::new(loader.clone(), policy);
        (sut, loader)
    }

    async fn wait_settled(sut: &PriceLoadCoordinator, identifier: &str) {
        let mut rx = sut.subscribe_progress();
        rx.wait_for(|p| {
            !matches!(
                p.outcomes.get(identifier),
                Some(LoadOutcome::Pending) | None
            )
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_init_does_not_request_loader() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);

        assert!(loader.requested().is_empty());
        assert!(sut.error().is_none());
        assert_eq!(sut.progress().batch, 0);
    }

    #[tokio::test]
    async fn test_load_prices_requests_loader_in_order() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);

        sut.load_prices(&ids(&["AAA", "BBB"]));
        sut.load_prices(&ids(&["CCC"]));

        assert_eq!(loader.requested(), ids(&["AAA", "BBB", "CCC"]));
        assert_eq!(sut.progress().in_flight, 3);
        assert_eq!(sut.progress().batch, 2);
    }

    #[tokio::test]
    async fn test_empty_batch_resets_error_without_loading() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);

        sut.load_prices(&ids(&["AAA"]));
        loader.fail(0);
        wait_settled(&sut, "AAA").await;
        assert!(sut.error().is_some());

        sut.load_prices(&[]);

        assert!(sut.error().is_none());
        assert_eq!(loader.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_delivers_error_when_one_load_in_batch_fails() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);

        sut.load_prices(&ids(&["AAA", "BBB", "CCC", "DDD", "EEE"]));
        loader.complete(0);
        loader.complete(1);
        wait_settled(&sut, "BBB").await;
        assert!(sut.error().is_none());

        loader.fail(2);
        wait_settled(&sut, "CCC").await;
        let failure = sut.error().expect("error after failed load");
        assert_eq!(failure.identifier, "CCC");
        assert_eq!(failure.batch, 1);

        loader.complete(3);
        loader.complete(4);
        sut.settled().await;
        assert!(sut.error().is_some());
        assert_eq!(sut.outcome("AAA"), Some(LoadOutcome::Loaded));
        assert_eq!(sut.outcome("EEE"), Some(LoadOutcome::Loaded));
        assert!(matches!(sut.outcome("CCC"), Some(LoadOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn test_no_error_on_successful_batch_after_failed_batch() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);

        sut.load_prices(&ids(&["AAA", "BBB"]));
        loader.fail(0);
        loader.complete(1);
        sut.settled().await;
        assert!(sut.error().is_some());

        sut.load_prices(&ids(&["CCC", "DDD"]));
        loader.complete(2);
        loader.complete(3);
        sut.settled().await;

        assert!(sut.error().is_none());
    }

    #[tokio::test]
    async fn test_later_failures_in_same_batch_keep_first_reason() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);
        let errors = sut.subscribe_errors();

        sut.load_prices(&ids(&["AAA", "BBB", "CCC"]));
        loader.fail(1);
        wait_settled(&sut, "BBB").await;
        loader.fail(0);
        loader.fail(2);
        sut.settled().await;

        let state = errors.borrow().clone();
        assert_eq!(state.raised, 1);
        assert_eq!(state.failure.unwrap().identifier, "BBB");
    }

    #[tokio::test]
    async fn test_success_does_not_clear_error() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);

        sut.load_prices(&ids(&["AAA", "BBB"]));
        loader.fail(0);
        wait_settled(&sut, "AAA").await;
        loader.complete(1);
        sut.settled().await;

        assert!(sut.error().is_some());
    }

    #[tokio::test]
    async fn test_reset_without_error_does_not_publish() {
        let (sut, _loader) = make_sut(StaleCompletionPolicy::Apply);
        let mut errors = sut.subscribe_errors();

        sut.load_prices(&[]);

        assert!(!errors.has_changed().unwrap());
        assert!(!errors.borrow_and_update().has_error());
    }

    #[tokio::test]
    async fn test_late_failure_from_superseded_batch_is_applied_by_default() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::Apply);

        sut.load_prices(&ids(&["AAA"]));
        sut.load_prices(&ids(&["BBB"]));
        loader.complete(1);
        loader.fail(0);
        sut.settled().await;

        let failure = sut.error().expect("stale failure applied");
        assert_eq!(failure.batch, 1);
    }

    #[tokio::test]
    async fn test_late_failure_from_superseded_batch_can_be_ignored() {
        let (sut, loader) = make_sut(StaleCompletionPolicy::IgnoreSuperseded);

        sut.load_prices(&ids(&["AAA"]));
        sut.load_prices(&ids(&["BBB"]));
        loader.complete(1);
        loader.fail(0);
        sut.settled().await;

        assert!(sut.error().is_none());
        assert!(matches!(sut.outcome("AAA"), Some(LoadOutcome::Failed(_))));

        // Failures from the current batch still count
        sut.load_prices(&ids(&["CCC"]));
        loader.fail(2);
        sut.settled().await;
        assert_eq!(sut.error().unwrap().batch, 3);
    }

    #[tokio::test]
    async fn test_settled_returns_immediately_when_idle() {
        let (sut, _loader) = make_sut(StaleCompletionPolicy::Apply);
        sut.settled().await;
        sut.load_prices(&[]);
        sut.settled().await;
    }
}
