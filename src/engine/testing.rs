use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    engine::model::{Session, Settings},
    error::ZenError,
    remote::{Targets, UserConfig, ZenRemote},
};

/// One scripted answer to a session fetch.
pub struct Scripted {
    delay: Duration,
    result: Result<Vec<Session>, ZenError>,
}

impl Scripted {
    pub fn delayed(delay: Duration, sessions: Vec<Session>) -> Self {
        Self {
            delay,
            result: Ok(sessions),
        }
    }

    pub fn failure(error: ZenError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(error),
        }
    }
}

/// Hand written remote for tests that need latency, which mockall expectations can't express.
#[derive(Default)]
pub struct FakeRemote {
    sessions: Mutex<Vec<Session>>,
    scripted: Mutex<VecDeque<Scripted>>,
    toggle_delay: Mutex<Duration>,
    toggle_error: Mutex<Option<ZenError>>,
    config: Mutex<UserConfig>,
    saved_settings: Mutex<Option<Settings>>,
    fetches: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeRemote {
    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        let remote = Self::default();
        remote.set_sessions(sessions);
        remote
    }

    pub fn set_sessions(&self, sessions: Vec<Session>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn script(&self, scripted: Scripted) {
        self.scripted.lock().unwrap().push_back(scripted);
    }

    pub fn delay_toggles(&self, delay: Duration) {
        *self.toggle_delay.lock().unwrap() = delay;
    }

    pub fn fail_toggles(&self, error: ZenError) {
        *self.toggle_error.lock().unwrap() = Some(error);
    }

    pub fn set_config(&self, config: UserConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn saved_settings(&self) -> Option<Settings> {
        self.saved_settings.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    async fn toggle(&self, counter: &AtomicUsize) -> Result<(), ZenError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let delay = *self.toggle_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        match self.toggle_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ZenRemote for FakeRemote {
    async fn fetch_sessions(&self) -> Result<Vec<Session>, ZenError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted { delay, result }) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => Ok(self.sessions.lock().unwrap().clone()),
        }
    }

    async fn fetch_config(&self) -> Result<UserConfig, ZenError> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn put_daily_target(&self, minutes: u32) -> Result<Targets, ZenError> {
        Ok(Targets {
            daily_target: minutes,
            weekly_target: Some(minutes * 7),
        })
    }

    async fn put_settings(&self, settings: &Settings) -> Result<(), ZenError> {
        *self.saved_settings.lock().unwrap() = Some(settings.clone());
        Ok(())
    }

    async fn device_connected(&self) -> Result<(), ZenError> {
        self.toggle(&self.connects).await
    }

    async fn device_disconnected(&self) -> Result<(), ZenError> {
        self.toggle(&self.disconnects).await
    }
}
