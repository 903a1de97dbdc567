use super::prices;
use crate::app::App;
use crate::core::config::AppConfig;
use anyhow::Result;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prints current prices, then reloads transactions from `config_path` every
/// `interval_secs` until Ctrl-C.
pub async fn run(app: &App, config_path: &Path, interval_secs: u64) -> Result<()> {
    run_until(app, config_path, interval_secs, ctrl_c()).await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Watches the config file until `shutdown` completes. Loads still in flight
/// at that point do not hold the watch open.
pub async fn run_until<S>(
    app: &App,
    config_path: &Path,
    interval_secs: u64,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown => {
            info!("Stopping watch");
            Ok(())
        }
        result = watch_config(app, config_path, interval_secs) => result,
    }
}

async fn watch_config(app: &App, config_path: &Path, interval_secs: u64) -> Result<()> {
    prices::run(app).await?;

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let config = match AppConfig::load_from_path(config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Keeping previous transactions");
                continue;
            }
        };
        if app.replace_transactions(config.transactions).await {
            debug!("Transactions changed");
            prices::wait_with_progress(app.coordinator()).await;
            println!("{}", prices::display_as_table(&app.rows()));
        }
    }
}
