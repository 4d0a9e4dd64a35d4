//! The presence monitor loop.
//!
//! Each tick lists the gateway's connected devices, resolves them to
//! whitelisted users, and records one observation per online user. Ticks run
//! one at a time on a fixed cadence; a failed tick is followed by a shorter
//! backoff. Shutdown is only observed between ticks, so a tick in progress
//! always completes.

use std::future::Future;
use std::time::Duration;

use at_core::{Clock, Device, UserDirectory};
use at_db::{Database, DbError, PresenceUpdate};
use at_gateway::{GatewayClient, GatewayError, GatewayTransport};
use chrono::NaiveDateTime;
use tokio::sync::watch;

/// Source of the devices currently connected to the network.
pub trait DeviceSource {
    fn list_online_devices(&mut self) -> impl Future<Output = Result<Vec<Device>, GatewayError>>;
}

impl<T: GatewayTransport> DeviceSource for GatewayClient<T> {
    fn list_online_devices(&mut self) -> impl Future<Output = Result<Vec<Device>, GatewayError>> {
        Self::list_online_devices(self)
    }
}

/// Persistent interval store.
pub trait PresenceStore {
    fn record_presence(
        &mut self,
        name: &str,
        now: NaiveDateTime,
    ) -> Result<PresenceUpdate, DbError>;
}

impl PresenceStore for Database {
    fn record_presence(
        &mut self,
        name: &str,
        now: NaiveDateTime,
    ) -> Result<PresenceUpdate, DbError> {
        Self::record_presence(self, name, now)
    }
}

/// Loop cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub observed_at: NaiveDateTime,
    /// Online users in whitelist order.
    pub online: Vec<String>,
    /// Users whose observation could not be stored this tick.
    pub failed: Vec<String>,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub failed_ticks: u64,
}

pub struct PresenceMonitor<S, P, C> {
    source: S,
    store: P,
    clock: C,
    directory: UserDirectory,
    settings: MonitorSettings,
}

impl<S, P, C> PresenceMonitor<S, P, C>
where
    S: DeviceSource,
    P: PresenceStore,
    C: Clock,
{
    pub const fn new(
        source: S,
        store: P,
        clock: C,
        directory: UserDirectory,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            store,
            clock,
            directory,
            settings,
        }
    }

    pub const fn store(&self) -> &P {
        &self.store
    }

    /// Runs one poll: list devices, resolve users, record each observation.
    ///
    /// A storage failure only drops that user's observation; the remaining
    /// users are still recorded. A gateway failure fails the whole tick.
    pub async fn tick(&mut self) -> Result<TickSummary, GatewayError> {
        let devices = self.source.list_online_devices().await?;
        let online = self.directory.resolve_online(&devices);
        let observed_at = self.clock.now();

        let mut failed = Vec::new();
        for name in &online {
            match self.store.record_presence(name, observed_at) {
                Ok(update) => {
                    tracing::debug!(user = %name, transition = %update.transition, "presence recorded");
                }
                Err(err) => {
                    tracing::error!(user = %name, error = %err, "failed to record presence; observation dropped");
                    failed.push(name.clone());
                }
            }
        }

        tracing::info!(
            devices = devices.len(),
            online = online.len(),
            users = %online.join(", "),
            "tick complete"
        );
        Ok(TickSummary {
            observed_at,
            online,
            failed,
        })
    }

    /// Ticks until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        tracing::info!(
            users = self.directory.names().len(),
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "presence monitor started"
        );
        let mut summary = RunSummary::default();
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            summary.ticks += 1;
            let pause = match self.tick().await {
                Ok(_) => self.settings.poll_interval,
                Err(err) => {
                    summary.failed_ticks += 1;
                    tracing::error!(
                        error = %err,
                        backoff_secs = self.settings.error_backoff.as_secs(),
                        "tick failed"
                    );
                    self.settings.error_backoff
                }
            };

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::info!("shutdown channel closed");
                        break;
                    }
                }
            }
        }
        tracing::info!(
            ticks = summary.ticks,
            failed_ticks = summary.failed_ticks,
            "presence monitor stopped"
        );
        summary
    }
}
