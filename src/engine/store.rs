use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ZenError;

use super::{
    aggregation::Aggregator,
    model::{open_session, DerivedZenState, PointsLedger, Session, Settings},
};

/// Immutable view of everything the engine knows at one point in time. Readers always get a whole
/// snapshot, never a half-applied update.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Sorted by start time.
    pub sessions: Arc<[Session]>,
    pub settings: Settings,
    pub points: PointsLedger,
    pub derived: DerivedZenState,
    /// Zen mode as requested by a toggle that the remote log has not confirmed yet.
    pub optimistic_zen: Option<bool>,
    pub last_error: Option<String>,
    /// Generation of the last poll whose result was applied.
    pub poll_generation: u64,
}

impl StoreSnapshot {
    pub fn is_zen_mode(&self) -> bool {
        self.optimistic_zen.unwrap_or(self.derived.is_zen_mode)
    }

    pub fn open_session(&self) -> Option<&Session> {
        open_session(&self.sessions)
    }

    /// Whether to nag about zen time. Never while zen mode is on, including an unconfirmed toggle.
    pub fn reminder_due(&self) -> bool {
        self.derived.reminder_due && !self.is_zen_mode()
    }

    /// Sessions for the history list, most recent first.
    pub fn history(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().rev()
    }
}

/// Single source of truth for sessions, settings and status flags.
///
/// Every mutation swaps the whole [StoreSnapshot] and recomputes the derived state, subscribers
/// are notified through a [watch] channel. The store never polls or talks to the network itself.
#[derive(Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<Arc<StoreSnapshot>>>,
    aggregator: Arc<dyn Aggregator>,
    generations: Arc<AtomicU64>,
}

impl SessionStore {
    pub fn new(aggregator: Arc<dyn Aggregator>) -> Self {
        let settings = Settings::default();
        let points = PointsLedger::default();
        let derived = aggregator.derive(&[], &settings, &points);
        let (sender, _) = watch::channel(Arc::new(StoreSnapshot {
            sessions: Arc::from(Vec::new()),
            settings,
            points,
            derived,
            optimistic_zen: None,
            last_error: None,
            poll_generation: 0,
        }));
        Self {
            sender: Arc::new(sender),
            aggregator,
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.sender.subscribe()
    }

    pub fn open_session(&self) -> Option<Session> {
        self.snapshot().open_session().cloned()
    }

    pub fn settings(&self) -> Settings {
        self.snapshot().settings.clone()
    }

    pub fn derived(&self) -> DerivedZenState {
        self.snapshot().derived.clone()
    }

    /// Swaps both the session log and the settings. Any optimistic zen flag and the recorded
    /// error are dropped, the remote log is authoritative.
    ///
    /// Counts as the newest poll: results of polls issued before it are dropped when they land.
    pub fn replace(&self, sessions: Vec<Session>, settings: Settings) {
        let generation = self.issue_generation();
        let sessions = normalize_sessions(sessions);
        self.publish(|current| {
            Some(StoreSnapshot {
                sessions,
                settings,
                optimistic_zen: None,
                last_error: None,
                poll_generation: generation.max(current.poll_generation),
                ..current.clone()
            })
        });
    }

    /// Hands out the generation a poll has to present when it wants its result applied.
    pub fn issue_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Applies a polled session log unless a poll issued later has already been applied. Settings
    /// are carried over untouched. Returns whether the result was applied.
    pub fn apply_poll(&self, generation: u64, sessions: Vec<Session>) -> bool {
        let sessions = normalize_sessions(sessions);
        self.publish(|current| {
            if generation <= current.poll_generation {
                debug!(
                    generation,
                    applied = current.poll_generation,
                    "Dropping stale poll result"
                );
                return None;
            }
            Some(StoreSnapshot {
                sessions,
                optimistic_zen: None,
                last_error: None,
                poll_generation: generation,
                ..current.clone()
            })
        })
    }

    /// Records a failed poll unless a newer poll already succeeded.
    pub fn record_poll_error(&self, generation: u64, error: &ZenError) -> bool {
        let message = error.to_string();
        self.publish(|current| {
            (generation > current.poll_generation).then(|| StoreSnapshot {
                last_error: Some(message),
                ..current.clone()
            })
        })
    }

    pub fn replace_settings(&self, settings: Settings) {
        self.publish(|current| {
            Some(StoreSnapshot {
                settings,
                ..current.clone()
            })
        });
    }

    pub fn set_optimistic(&self, zen: Option<bool>) {
        self.publish(|current| {
            (current.optimistic_zen != zen).then(|| StoreSnapshot {
                optimistic_zen: zen,
                ..current.clone()
            })
        });
    }

    pub fn record_error(&self, error: &ZenError) {
        let message = error.to_string();
        self.publish(|current| {
            Some(StoreSnapshot {
                last_error: Some(message),
                ..current.clone()
            })
        });
    }

    pub fn award_point(&self) {
        let today = self.aggregator.today();
        self.publish(|current| {
            let mut points = current.points;
            points.award(today);
            Some(StoreSnapshot {
                points,
                ..current.clone()
            })
        });
    }

    /// Runs `update` against the current snapshot and, if it produced a new one, recomputes the
    /// derived state and swaps it in.
    fn publish(&self, update: impl FnOnce(&StoreSnapshot) -> Option<StoreSnapshot>) -> bool {
        self.sender.send_if_modified(|current| match update(&**current) {
            Some(mut next) => {
                next.derived = self
                    .aggregator
                    .derive(&next.sessions, &next.settings, &next.points);
                *current = Arc::new(next);
                true
            }
            None => false,
        })
    }
}

fn normalize_sessions(mut sessions: Vec<Session>) -> Arc<[Session]> {
    sessions.sort_by_key(|session| session.start);

    let open = sessions.iter().filter(|session| session.is_open()).count();
    let latest_open = sessions.last().is_some_and(|session| session.is_open());
    if open > 1 || (open == 1 && !latest_open) {
        warn!(
            open,
            latest_open, "Remote log has open sessions besides the latest one, ignoring them"
        );
    }
    Arc::from(sessions)
}
