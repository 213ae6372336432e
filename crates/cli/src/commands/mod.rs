//! CLI Commands

pub mod generate;
pub mod pipeline;
pub mod scenario;

use anyhow::{Context, Result};
use stagewise_common::HarnessConfig;
use stagewise_e2e::{sign_in, ApiClient, PlaywrightConfig, PlaywrightSession};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Authenticate against the configured API
pub async fn connect(config: &HarnessConfig) -> Result<ApiClient> {
    ApiClient::connect(&config.api)
        .await
        .with_context(|| format!("Cannot connect to {}", config.base_url()))
}

/// Start a browser and sign in to the UI
pub async fn open_browser(config: &HarnessConfig) -> Result<PlaywrightSession> {
    let session = PlaywrightSession::launch(PlaywrightConfig::from(config))
        .await
        .context("Failed to start the browser")?;
    sign_in(&session, &config.locators, &config.api, config.browser.explicit_timeout())
        .await
        .context("UI sign-in failed")?;
    Ok(session)
}

/// Token that is cancelled on the first Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, aborting the run");
                trigger.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });
    token
}
