use std::{fmt::Display, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::utils::{clock::Clock, time::format_clock};

use super::store::{SessionStore, StoreSnapshot};

/// What the elapsed-time display currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerDisplay {
    #[default]
    Idle,
    Running {
        started_at: DateTime<Utc>,
        elapsed_secs: i64,
    },
}

impl TimerDisplay {
    pub fn running(started_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::Running {
            started_at,
            elapsed_secs: (now - started_at).num_seconds().max(0),
        }
    }

    pub fn elapsed_secs(&self) -> i64 {
        match self {
            TimerDisplay::Idle => 0,
            TimerDisplay::Running { elapsed_secs, .. } => *elapsed_secs,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TimerDisplay::Running { .. })
    }
}

impl Display for TimerDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_clock(self.elapsed_secs()))
    }
}

/// Elapsed-time display for the open session.
///
/// While idle it only waits for the store to change. While running it recomputes the elapsed time
/// from the wall clock every tick and re-reads the open session each time, so a poll that replaces
/// the session is picked up on the following tick. It shares no lock with the poll loop.
pub struct LiveTimer {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    tick: Duration,
    shutdown: CancellationToken,
    output: watch::Sender<TimerDisplay>,
}

impl LiveTimer {
    pub fn new(
        store: SessionStore,
        clock: Arc<dyn Clock>,
        tick: Duration,
        shutdown: CancellationToken,
    ) -> (Self, watch::Receiver<TimerDisplay>) {
        let (output, receiver) = watch::channel(TimerDisplay::Idle);
        (
            Self {
                store,
                clock,
                tick,
                shutdown,
                output,
            },
            receiver,
        )
    }

    pub async fn run(self) -> Result<()> {
        let mut changes = self.store.subscribe();
        loop {
            let open = changes.borrow_and_update().open_session().cloned();
            match open {
                None => {
                    self.output.send_if_modified(|display| {
                        let changed = display.is_running();
                        *display = TimerDisplay::Idle;
                        changed
                    });
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Ok(()),
                        changed = changes.changed() => {
                            if changed.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
                Some(session) => {
                    info!(started_at = %session.start, "Timer running");
                    if !self.run_ticks(session.start, &mut changes).await {
                        return Ok(());
                    }
                    info!("Timer idle");
                }
            }
        }
    }

    /// Ticks until the open session disappears. Returns false when the timer should stop
    /// altogether.
    async fn run_ticks(
        &self,
        mut anchor: DateTime<Utc>,
        changes: &mut watch::Receiver<Arc<StoreSnapshot>>,
    ) -> bool {
        let mut tick_point = self.clock.instant();
        loop {
            self.output
                .send_replace(TimerDisplay::running(anchor, self.clock.time()));

            tick_point += self.tick;
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = self.clock.sleep_until(tick_point) => (),
            }

            let snapshot = changes.borrow_and_update().clone();
            match snapshot.open_session() {
                Some(session) if session.start != anchor => {
                    debug!(from = %anchor, to = %session.start, "Re-anchoring timer");
                    anchor = session.start;
                }
                Some(_) => (),
                None => return true,
            }
        }
    }
}
