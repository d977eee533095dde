//! Client-side synchronization engine. [ZenEngine] wires the [SessionStore] to the poll loop, the
//! live timer and the toggle controller, and is the only thing the display layer talks to.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::TimeZone;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{config::EngineConfig, error::ZenError, remote::ZenRemote, utils::clock::Clock};

use aggregation::ZonedAggregator;
use model::{DerivedZenState, Settings, SettingsPatch};
use scheduler::{Poller, PollingScheduler};
use store::{SessionStore, StoreSnapshot};
use timer::{LiveTimer, TimerDisplay};
use toggle::ToggleController;

pub mod aggregation;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod timer;
pub mod toggle;

#[cfg(test)]
pub(crate) mod testing;

pub struct ZenEngine {
    store: SessionStore,
    remote: Arc<dyn ZenRemote>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    poller: Poller,
    toggler: ToggleController,
    shutdown: CancellationToken,
    timer: Mutex<Option<LiveTimer>>,
    timer_display: watch::Receiver<TimerDisplay>,
    tasks: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl ZenEngine {
    /// Calendar dates and weekdays are evaluated in `tz`.
    pub fn new<Tz>(
        config: EngineConfig,
        remote: Arc<dyn ZenRemote>,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self
    where
        Tz: TimeZone + Send + Sync + 'static,
        Tz::Offset: Send + Sync,
    {
        let shutdown = CancellationToken::new();
        let store = SessionStore::new(Arc::new(ZonedAggregator::new(clock.clone(), tz)));
        let poller = Poller::new(remote.clone(), store.clone(), shutdown.clone());
        let toggler = ToggleController::new(
            remote.clone(),
            store.clone(),
            poller.clone(),
            clock.clone(),
            config.toggle_policy,
            config.refresh_delay,
            shutdown.clone(),
        );
        let (timer, timer_display) = LiveTimer::new(
            store.clone(),
            clock.clone(),
            config.tick_interval,
            shutdown.clone(),
        );

        Self {
            store,
            remote,
            clock,
            config,
            poller,
            toggler,
            shutdown,
            timer: Mutex::new(Some(timer)),
            timer_display,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the poll loop and the live timer. Calling it again is a no-op.
    pub fn start(&self) {
        let Some(timer) = self.timer.lock().ok().and_then(|mut timer| timer.take()) else {
            warn!("Engine already started");
            return;
        };
        info!(api = %self.config.api_url, "Starting engine");
        let scheduler = PollingScheduler::new(
            self.poller.clone(),
            self.clock.clone(),
            self.config.poll_interval,
            self.config.max_in_flight_polls,
            self.shutdown.clone(),
        );
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(tokio::spawn(scheduler.run()));
            tasks.push(tokio::spawn(timer.run()));
        }
    }

    /// Stops both periodic tasks. Requests that are still in flight are left to finish and have
    /// no effect.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Engine task failed {e:?}"),
                Err(e) => error!("Engine task panicked {e:?}"),
            }
        }
        info!("Engine stopped");
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.store.subscribe()
    }

    pub fn derived(&self) -> DerivedZenState {
        self.store.derived()
    }

    pub fn settings(&self) -> Settings {
        self.store.settings()
    }

    /// Zen mode including a toggle that has not been confirmed yet.
    pub fn is_zen_mode(&self) -> bool {
        self.store.snapshot().is_zen_mode()
    }

    pub fn last_error(&self) -> Option<String> {
        self.store.snapshot().last_error.clone()
    }

    /// Display of the running [LiveTimer]. Stays [TimerDisplay::Idle] until [ZenEngine::start].
    pub fn timer(&self) -> watch::Receiver<TimerDisplay> {
        self.timer_display.clone()
    }

    /// Elapsed time of the open session read straight from the store and the clock, for callers
    /// that never start the live timer.
    pub fn timer_now(&self) -> TimerDisplay {
        self.store
            .open_session()
            .map_or(TimerDisplay::Idle, |session| {
                TimerDisplay::running(session.start, self.clock.time())
            })
    }

    /// Polls right away, outside of the regular schedule.
    pub async fn refresh(&self) -> Result<bool, ZenError> {
        self.poller.poll_once().await
    }

    pub async fn toggle(&self) -> Result<bool, ZenError> {
        self.toggler.toggle().await
    }

    pub fn is_toggle_pending(&self) -> bool {
        self.toggler.is_pending()
    }

    /// Loads the user's settings. On failure the current settings stay in place.
    pub async fn load_config(&self) -> Result<Settings, ZenError> {
        let result = self
            .remote
            .fetch_config()
            .await
            .and_then(|config| config.merge_into(&self.store.settings()));
        match result {
            Ok(settings) => {
                self.store.replace_settings(settings.clone());
                info!(daily_target = settings.daily_target_minutes, "Loaded settings");
                Ok(settings)
            }
            Err(e) => {
                warn!("Failed to load settings {e}");
                self.store.record_error(&e);
                Err(e)
            }
        }
    }

    /// Validates and merges `patch`, pushes it to the remote service and only then applies it
    /// locally.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, ZenError> {
        if self.shutdown.is_cancelled() {
            return Err(ZenError::Shutdown);
        }
        let result = self.push_settings(patch).await;
        match &result {
            Ok(settings) => {
                self.store.replace_settings(settings.clone());
                info!(?settings, "Updated settings");
            }
            Err(e) => {
                warn!("Failed to update settings {e}");
                self.store.record_error(e);
            }
        }
        result
    }

    pub async fn set_daily_target(&self, minutes: u32) -> Result<Settings, ZenError> {
        self.update_settings(SettingsPatch::daily_target(minutes))
            .await
    }

    async fn push_settings(&self, patch: SettingsPatch) -> Result<Settings, ZenError> {
        let current = self.store.settings();
        let target_changed = patch
            .daily_target_minutes
            .is_some_and(|target| target != current.daily_target_minutes);
        let mut next = current.apply(patch)?;

        if target_changed {
            let targets = self
                .remote
                .put_daily_target(next.daily_target_minutes)
                .await?;
            next.daily_target_minutes = targets.daily_target;
            if let Some(weekly) = targets.weekly_target {
                next.weekly_target_minutes = weekly;
            }
        }
        self.remote.put_settings(&next).await?;
        Ok(next)
    }
}

#[cfg(test)]
mod engine_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone, Utc, Weekday};

    use super::{
        model::{Session, SettingsPatch},
        testing::FakeRemote,
        timer::TimerDisplay,
        ZenEngine,
    };
    use crate::{
        config::EngineConfig,
        error::ZenError,
        remote::{MockZenRemote, Targets, UserConfig, ZenRemote},
        utils::{clock::TestClock, logging::TEST_LOGGING},
    };

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    /// Friday 2024-04-05 09:30 at +02:00.
    fn start() -> DateTime<Utc> {
        tz().with_ymd_and_hms(2024, 4, 5, 9, 30, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn engine(remote: Arc<dyn ZenRemote>) -> ZenEngine {
        ZenEngine::new(
            EngineConfig::default(),
            remote,
            Arc::new(TestClock::starting_at(start())),
            tz(),
        )
    }

    /// Runs the whole engine for a while against a fake service: a closed session from this
    /// morning, then the user starts zen mode and ends it again.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_engine() -> Result<()> {
        *TEST_LOGGING;
        let morning = tz().with_ymd_and_hms(2024, 4, 5, 9, 0, 0).unwrap();
        let earlier = Session::closed(morning.with_timezone(&Utc), ChronoDuration::seconds(600));
        let remote = Arc::new(FakeRemote::with_sessions(vec![earlier.clone()]));
        let engine = engine(remote.clone());
        engine.start();
        engine.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let derived = engine.derived();
        assert_eq!(derived.today_zen_minutes, 10);
        assert_eq!(derived.daily_progress().percent, 8);
        assert!(!engine.is_zen_mode());
        assert_eq!(engine.timer().borrow().to_string(), "00:00:00");

        assert!(engine.toggle().await?);
        assert!(engine.is_zen_mode());
        remote.set_sessions(vec![earlier.clone(), Session::open(start())]);

        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(engine.derived().is_zen_mode);
        let elapsed = engine.timer().borrow().elapsed_secs();
        assert!((124..=126).contains(&elapsed), "{elapsed}");

        assert!(!engine.toggle().await?);
        remote.set_sessions(vec![
            earlier,
            Session::closed(start(), ChronoDuration::seconds(125)),
        ]);
        tokio::time::sleep(Duration::from_secs(6)).await;
        let derived = engine.derived();
        assert!(!derived.is_zen_mode);
        assert_eq!(derived.today_zen_minutes, 12);
        assert_eq!(derived.zen_points, 1);
        assert_eq!(*engine.timer().borrow(), TimerDisplay::Idle);

        engine.shutdown().await;
        let fetches = remote.fetch_count();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(remote.fetch_count(), fetches);
        assert!(matches!(engine.toggle().await, Err(ZenError::Shutdown)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_status_shows_elapsed_time() -> Result<()> {
        let remote = Arc::new(FakeRemote::with_sessions(vec![Session::open(
            start() - ChronoDuration::seconds(125),
        )]));
        let engine = engine(remote);
        engine.refresh().await?;

        let timer = engine.timer_now();
        assert_eq!(timer.to_string(), "00:02:05");
        let status = crate::cli::render::status(&engine.snapshot(), &timer);
        assert!(status.contains("Elapsed    00:02:05"), "{status}");

        // The live timer was never started.
        assert_eq!(*engine.timer().borrow(), TimerDisplay::Idle);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn load_config_replaces_defaults() -> Result<()> {
        let remote = Arc::new(FakeRemote::default());
        remote.set_config(serde_json::from_str::<UserConfig>(
            r#"{"dailyTarget": 60, "weeklyTarget": 420, "settings": {"autoReminder": false, "zenDays": ["Sunday"]}}"#,
        )?);
        let engine = engine(remote);
        let settings = engine.load_config().await?;
        assert_eq!(settings.daily_target_minutes, 60);
        assert!(!settings.auto_reminder);
        assert_eq!(engine.settings().zen_days.days(), &[Weekday::Sun]);
        assert_eq!(engine.derived().weekly_data[0].target_minutes, 60);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn daily_target_goes_through_its_endpoint() -> Result<()> {
        let remote = Arc::new(FakeRemote::default());
        let engine = engine(remote.clone());
        let settings = engine.set_daily_target(90).await?;
        assert_eq!(settings.daily_target_minutes, 90);
        assert_eq!(settings.weekly_target_minutes, 630);
        assert_eq!(remote.saved_settings(), Some(settings.clone()));
        assert_eq!(engine.derived().daily_target_minutes, 90);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn settings_failure_leaves_settings_unchanged() -> Result<()> {
        let mut remote = MockZenRemote::new();
        remote.expect_put_daily_target().times(0);
        remote
            .expect_put_settings()
            .times(1)
            .returning(|_| Err(ZenError::Transport("connection reset".into())));
        let engine = engine(Arc::new(remote));
        let before = engine.settings();

        let result = engine
            .update_settings(SettingsPatch {
                auto_reminder: Some(false),
                zen_hours: Some("07:00-09:00".parse()?),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ZenError::Transport(_))));
        assert_eq!(engine.settings(), before);
        assert!(engine.last_error().is_some());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_patch_never_reaches_the_remote() -> Result<()> {
        let mut remote = MockZenRemote::new();
        remote.expect_put_daily_target().times(0);
        remote.expect_put_settings().times(0);
        let engine = engine(Arc::new(remote));

        let result = engine.set_daily_target(0).await;
        assert!(matches!(result, Err(ZenError::InvalidSettings(_))));
        assert_eq!(engine.settings().daily_target_minutes, 120);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn remote_decides_the_daily_target() -> Result<()> {
        let mut remote = MockZenRemote::new();
        remote
            .expect_put_daily_target()
            .withf(|minutes| *minutes == 45)
            .times(1)
            .returning(|_| {
                Ok(Targets {
                    daily_target: 60,
                    weekly_target: None,
                })
            });
        remote.expect_put_settings().times(1).returning(|_| Ok(()));
        let engine = engine(Arc::new(remote));

        let settings = engine.set_daily_target(45).await?;
        assert_eq!(settings.daily_target_minutes, 60);
        assert_eq!(settings.weekly_target_minutes, 840);
        Ok(())
    }
}
