use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{error::ZenError, remote::ZenRemote, utils::clock::Clock};

use super::store::SessionStore;

/// Fetches the session log once and hands it to the [SessionStore].
#[derive(Clone)]
pub struct Poller {
    remote: Arc<dyn ZenRemote>,
    store: SessionStore,
    shutdown: CancellationToken,
}

impl Poller {
    pub fn new(remote: Arc<dyn ZenRemote>, store: SessionStore, shutdown: CancellationToken) -> Self {
        Self {
            remote,
            store,
            shutdown,
        }
    }

    /// Returns whether the result made it into the store. A result is dropped when a poll issued
    /// later has already been applied, or when the engine was torn down while waiting.
    pub async fn poll_once(&self) -> Result<bool, ZenError> {
        let generation = self.store.issue_generation();
        debug!(generation, "Polling session log");

        let result = self.remote.fetch_sessions().await;

        if self.shutdown.is_cancelled() {
            debug!(generation, "Engine stopped while polling, discarding result");
            return Ok(false);
        }

        match result {
            Ok(sessions) => {
                let count = sessions.len();
                let applied = self.store.apply_poll(generation, sessions);
                if applied {
                    debug!(generation, count, "Applied session log");
                }
                Ok(applied)
            }
            Err(e) => {
                warn!(generation, "Failed to poll session log {e}");
                self.store.record_poll_error(generation, &e);
                Err(e)
            }
        }
    }

    /// Polls after `delay` without blocking the caller.
    pub fn refresh_after(&self, delay: Duration, clock: Arc<dyn Clock>) {
        let poller = self.clone();
        tokio::spawn(async move {
            clock.sleep(delay).await;
            if poller.shutdown.is_cancelled() {
                return;
            }
            // Failures are already recorded in the store.
            let _ = poller.poll_once().await;
        });
    }
}

/// Fixed period poll loop. The first poll fires immediately.
///
/// Polls are not serialized: when a fetch outlives its period the next one is started anyway, and
/// the store's generation check keeps the newest issued poll authoritative. Requests have no
/// timeout, so at most `max_in_flight` polls are outstanding at once and ticks beyond that are
/// skipped. This keeps a hung service from piling up blocking threads that toggles and settings
/// updates also need.
pub struct PollingScheduler {
    poller: Poller,
    clock: Arc<dyn Clock>,
    period: Duration,
    max_in_flight: usize,
    shutdown: CancellationToken,
}

impl PollingScheduler {
    pub fn new(
        poller: Poller,
        clock: Arc<dyn Clock>,
        period: Duration,
        max_in_flight: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            poller,
            clock,
            period,
            max_in_flight: max_in_flight.max(1),
            shutdown,
        }
    }

    pub async fn run(self) -> Result<()> {
        info!(period_ms = self.period.as_millis() as u64, "Starting poll loop");
        let mut in_flight = JoinSet::new();
        let mut poll_point = self.clock.instant();
        loop {
            poll_point += self.period;

            if in_flight.len() >= self.max_in_flight {
                warn!(pending = in_flight.len(), "Polls still outstanding, skipping tick");
            } else {
                let poller = self.poller.clone();
                in_flight.spawn(async move {
                    // Failures are already recorded in the store.
                    let _ = poller.poll_once().await;
                });
            }

            loop {
                tokio::select! {
                    // In-flight polls are left to finish on their own, they see the cancelled
                    // token and turn into no-ops.
                    _ = self.shutdown.cancelled() => {
                        info!(pending = in_flight.len(), "Stopping poll loop");
                        in_flight.detach_all();
                        return Ok(());
                    }
                    Some(finished) = in_flight.join_next() => {
                        if let Err(e) = finished {
                            error!("Poll task failed {e:?}");
                        }
                    }
                    _ = self.clock.sleep_until(poll_point) => break,
                }
            }
        }
    }
}
