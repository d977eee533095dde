use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeZone;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::{
    engine::model::{Session, Settings},
    error::ZenError,
};

use super::{
    wire::{decode_sessions, ConfigUpdate, DailyTargetUpdate, Targets, UserConfig},
    ZenRemote,
};

/// [ZenRemote] over HTTP/JSON. Requests are blocking `ureq` calls moved onto tokio's blocking pool
/// and carry no timeout, a hung request only stalls its own caller.
pub struct HttpRemote<Tz: TimeZone> {
    agent: ureq::Agent,
    base_url: Arc<str>,
    /// Timezone used for naive timestamps in the session log.
    tz: Tz,
}

impl<Tz: TimeZone> HttpRemote<Tz> {
    pub fn new(base_url: &str, tz: Tz) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(None)
            .build()
            .into();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').into(),
            tz,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_text(&self, path: &str) -> Result<String, ZenError> {
        let agent = self.agent.clone();
        let url = self.url(path);
        run_blocking(move || {
            let mut body = agent.get(&url).call()?.into_body();
            Ok(body.read_to_string()?)
        })
        .await
    }

    async fn get_json<T: DeserializeOwned + Send + 'static>(&self, path: &str) -> Result<T, ZenError> {
        let text = self.get_text(path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn post_empty(&self, path: &str) -> Result<(), ZenError> {
        let agent = self.agent.clone();
        let url = self.url(path);
        run_blocking(move || {
            agent.post(&url).send_empty()?;
            Ok(())
        })
        .await
    }

    /// Returns the response body as text. Any 2xx status counts as accepted.
    async fn put_json<B>(&self, path: &str, body: B) -> Result<String, ZenError>
    where
        B: serde::Serialize + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = self.url(path);
        run_blocking(move || {
            let mut response = agent.put(&url).send_json(&body)?.into_body();
            Ok(response.read_to_string()?)
        })
        .await
    }
}

async fn run_blocking<T, F>(request: F) -> Result<T, ZenError>
where
    F: FnOnce() -> Result<T, ZenError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(request)
        .await
        .map_err(|e| ZenError::Transport(format!("request task failed: {e}")))?
}

#[async_trait]
impl<Tz> ZenRemote for HttpRemote<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    #[instrument(skip(self), level = "debug")]
    async fn fetch_sessions(&self) -> Result<Vec<Session>, ZenError> {
        let body = self.get_text("/device/stats").await?;
        let sessions = decode_sessions(&body, &self.tz)?;
        debug!(count = sessions.len(), "Fetched sessions");
        Ok(sessions)
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_config(&self) -> Result<UserConfig, ZenError> {
        self.get_json("/user/config").await
    }

    #[instrument(skip(self), level = "debug")]
    async fn put_daily_target(&self, minutes: u32) -> Result<Targets, ZenError> {
        let text = self
            .put_json(
                "/user/daily-target",
                DailyTargetUpdate {
                    daily_target: minutes,
                },
            )
            .await?;
        if text.trim().is_empty() {
            return Err(ZenError::malformed("daily target update returned no targets"));
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// The acknowledgement body is not inspected, the service has stored the settings once it
    /// answers with a success status.
    #[instrument(skip_all, level = "debug")]
    async fn put_settings(&self, settings: &Settings) -> Result<(), ZenError> {
        let ack = self
            .put_json("/user/config", ConfigUpdate::from(settings))
            .await?;
        debug!(ack_len = ack.len(), "Settings stored");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn device_connected(&self) -> Result<(), ZenError> {
        self.post_empty("/device/connected").await
    }

    #[instrument(skip(self), level = "debug")]
    async fn device_disconnected(&self) -> Result<(), ZenError> {
        self.post_empty("/device/disconnected").await
    }
}
