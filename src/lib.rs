pub mod app;
pub mod cli;
pub mod coordinator;
pub mod core;
pub mod detector;
pub mod flow;
pub mod providers;

use crate::core::config::AppConfig;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Prices,
    Watch,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("pricewatch starting...");

    let path = match config_path {
        Some(path) => PathBuf::from(path),
        None => AppConfig::default_config_path()?,
    };
    let config = AppConfig::load_from_path(&path)?;
    debug!("Loaded config: {config:#?}");

    let app = app::App::start(&config, Arc::new(cli::ui::ConsoleAlertSink))?;

    let result = match command {
        AppCommand::Prices => cli::prices::run(&app).await,
        AppCommand::Watch => cli::watch::run(&app, &path, config.watch_interval_secs).await,
    };

    app.shutdown().await;
    result
}
