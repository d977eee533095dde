use std::time::Duration;

use clap::ValueEnum;

pub const DEFAULT_API_URL: &str = "http://localhost:8182/api";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_IN_FLIGHT_POLLS: usize = 3;

/// When a toggle becomes visible to readers of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TogglePolicy {
    /// Flip zen mode locally before the request is sent.
    #[default]
    Optimistic,
    /// Leave zen mode alone until a poll reports the new session state.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_url: String,
    pub poll_interval: Duration,
    /// Ticks are skipped while this many polls are still waiting for the service.
    pub max_in_flight_polls: usize,
    pub tick_interval: Duration,
    pub toggle_policy: TogglePolicy,
    /// Wait between a finished toggle request and the poll that reconciles it.
    pub refresh_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_in_flight_polls: DEFAULT_MAX_IN_FLIGHT_POLLS,
            tick_interval: DEFAULT_TICK_INTERVAL,
            toggle_policy: TogglePolicy::default(),
            refresh_delay: Duration::ZERO,
        }
    }
}
