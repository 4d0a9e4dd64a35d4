//! Run command: the long-lived presence monitor.

use anyhow::{Context, Result};
use at_core::{SystemClock, UserDirectory};
use at_db::Database;
use at_gateway::GatewayClient;
use tokio::sync::watch;

use crate::Config;
use crate::monitor::{PresenceMonitor, RunSummary};

/// Loads the whitelist and gateway settings, then polls until SIGINT/SIGTERM.
///
/// Missing configuration fails here, before the loop starts.
pub fn run(mut db: Database, config: &Config) -> Result<RunSummary> {
    let directory = UserDirectory::load(&config.whitelist_path).context("failed to load whitelist")?;
    if directory.is_empty() {
        tracing::warn!(path = %config.whitelist_path.display(), "whitelist is empty");
    }
    let gateway_config = config.gateway_config()?;
    db.set_merge_threshold(config.merge_threshold()?)
        .context("invalid merge threshold")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(async {
        let gateway = GatewayClient::connect(
            &config.gateway_host,
            config.request_timeout(),
            gateway_config,
        )
        .context("failed to create gateway client")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            tracing::info!("shutdown requested; finishing current tick");
            let _ = shutdown_tx.send(true);
        });

        let mut monitor = PresenceMonitor::new(
            gateway,
            db,
            SystemClock,
            directory,
            config.monitor_settings(),
        );
        Ok::<_, anyhow::Error>(monitor.run(shutdown_rx).await)
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(err) => tracing::warn!(error = %err, "failed to install SIGTERM handler"),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
