pub mod application;
pub mod bus;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod error;
pub mod graphics;
pub mod layout;
pub mod models;
pub mod services;
pub mod store;

use log::{error, info};

use crate::application::{init_logging, Application};
use crate::config::AppConfig;
use crate::error::RunError;

/// Load config, bring the installation up and keep it running until ctrl-c.
pub fn run() -> Result<(), RunError> {
    let config = AppConfig::load()?;
    init_logging(config.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let app = Application::new(&config).await?;
        app.startup().await?;

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[app] couldn't listen for ctrl-c: {e}");
        }
        info!("[app] interrupted, shutting down");
        app.shutdown().await;
        Ok::<(), RunError>(())
    })
}
