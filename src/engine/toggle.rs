use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{config::TogglePolicy, error::ZenError, remote::ZenRemote, utils::clock::Clock};

use super::{scheduler::Poller, store::SessionStore};

/// Starts or ends a zen session on request of the user.
///
/// A failed request is not rolled back. The poll scheduled after every request, failed or not,
/// replaces any optimistic flag with whatever the remote log says.
#[derive(Clone)]
pub struct ToggleController {
    remote: Arc<dyn ZenRemote>,
    store: SessionStore,
    poller: Poller,
    clock: Arc<dyn Clock>,
    policy: TogglePolicy,
    refresh_delay: Duration,
    pending: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

/// Marks a toggle as in flight for as long as it is alive, including when the toggle future is
/// dropped halfway.
struct PendingGuard(Arc<AtomicBool>);

impl PendingGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ToggleController {
    pub fn new(
        remote: Arc<dyn ZenRemote>,
        store: SessionStore,
        poller: Poller,
        clock: Arc<dyn Clock>,
        policy: TogglePolicy,
        refresh_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            remote,
            store,
            poller,
            clock,
            policy,
            refresh_delay,
            pending: Arc::new(AtomicBool::new(false)),
            shutdown,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Flips zen mode and returns the state that was requested.
    pub async fn toggle(&self) -> Result<bool, ZenError> {
        if self.shutdown.is_cancelled() {
            return Err(ZenError::Shutdown);
        }
        let _pending = PendingGuard::acquire(&self.pending).ok_or(ZenError::TogglePending)?;

        let turn_on = !self.store.snapshot().is_zen_mode();
        if self.policy == TogglePolicy::Optimistic {
            self.store.set_optimistic(Some(turn_on));
        }
        info!(turn_on, policy = ?self.policy, "Toggling zen mode");

        let result = if turn_on {
            self.remote.device_connected().await
        } else {
            self.remote.device_disconnected().await
        };

        if self.shutdown.is_cancelled() {
            debug!("Engine stopped while toggling, ignoring the response");
            return result.map(|_| turn_on);
        }

        match &result {
            Ok(()) => {
                if !turn_on {
                    self.store.award_point();
                }
                info!(turn_on, "Toggle confirmed by remote");
            }
            Err(e) => {
                warn!(turn_on, "Toggle request failed {e}");
                self.store.record_error(e);
            }
        }

        self.poller.refresh_after(self.refresh_delay, self.clock.clone());
        result.map(|_| turn_on)
    }
}
