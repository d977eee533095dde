//! JSON shapes exchanged with the Zenbox service and their conversion into engine types.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    engine::model::{Session, Settings, ZenDays},
    error::ZenError,
};

/// Naive formats the service has been seen to emit. `%.f` also matches a missing fraction.
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatsBody {
    Bare(Vec<WireSession>),
    Envelope(StatsEnvelope),
}

/// `/device/stats` may carry precomputed fields (`isZenMode`, `todayZenTime`, ...). The engine
/// derives those itself and only looks at the sessions.
#[derive(Debug, Deserialize)]
struct StatsEnvelope {
    #[serde(default)]
    sessions: Option<Vec<WireSession>>,
}

#[derive(Debug, Deserialize)]
struct WireSession {
    start: String,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

/// Decodes a `/device/stats` body. Naive timestamps are read as wall-clock time in `tz`.
pub fn decode_sessions<Tz: TimeZone>(body: &str, tz: &Tz) -> Result<Vec<Session>, ZenError> {
    let value: Value = serde_json::from_str(body)?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    let sessions = match serde_json::from_value::<StatsBody>(value)? {
        StatsBody::Bare(sessions) => sessions,
        StatsBody::Envelope(envelope) => envelope.sessions.unwrap_or_default(),
    };
    sessions
        .into_iter()
        .map(|session| session.into_session(tz))
        .collect()
}

impl WireSession {
    fn into_session<Tz: TimeZone>(self, tz: &Tz) -> Result<Session, ZenError> {
        let start = parse_timestamp(&self.start, tz)?;
        let end = self
            .end
            .as_deref()
            .filter(|end| !end.trim().is_empty())
            .map(|end| parse_timestamp(end, tz))
            .transpose()?;

        let duration = match (self.duration, end) {
            (Some(seconds), _) if !seconds.is_finite() || seconds < 0. => {
                return Err(ZenError::malformed(format!(
                    "session starting {} has duration {seconds}",
                    self.start
                )))
            }
            (Some(seconds), _) => Duration::seconds(seconds.floor() as i64),
            (None, Some(end)) => end - start,
            (None, None) => Duration::zero(),
        };

        Ok(Session {
            start,
            end,
            duration,
        })
    }
}

/// Parses RFC 3339 timestamps, or naive ones interpreted in `tz`.
pub fn parse_timestamp<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<DateTime<Utc>, ZenError> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| ZenError::malformed(format!("unrecognized timestamp {value:?}")))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| ZenError::malformed(format!("timestamp {value:?} does not exist locally")))
}

/// `/user/config` response. Every field is optional, missing ones keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(default)]
    pub daily_target: Option<u32>,
    #[serde(default)]
    pub weekly_target: Option<u32>,
    #[serde(default)]
    pub settings: Option<WireSettings>,
}

impl UserConfig {
    pub fn merge_into(self, base: &Settings) -> Result<Settings, ZenError> {
        let mut settings = base.clone();
        if let Some(daily) = self.daily_target.filter(|v| *v > 0) {
            settings.daily_target_minutes = daily;
        }
        if let Some(weekly) = self.weekly_target.filter(|v| *v > 0) {
            settings.weekly_target_minutes = weekly;
        }
        if let Some(wire) = self.settings {
            if let Some(v) = wire.auto_reminder {
                settings.auto_reminder = v;
            }
            if let Some(v) = wire.call_filtering {
                settings.call_filtering = v;
            }
            if let Some(v) = wire.zen_hours {
                settings.zen_hours = v.parse().map_err(|e: ZenError| ZenError::malformed(e.to_string()))?;
            }
            if let Some(v) = wire.zen_days {
                settings.zen_days =
                    ZenDays::parse_names(&v).map_err(|e| ZenError::malformed(e.to_string()))?;
            }
        }
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_reminder: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_filtering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zen_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zen_days: Option<Vec<String>>,
}

impl From<&Settings> for WireSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            auto_reminder: Some(settings.auto_reminder),
            call_filtering: Some(settings.call_filtering),
            zen_hours: Some(settings.zen_hours.to_string()),
            zen_days: Some(
                settings
                    .zen_days
                    .days()
                    .iter()
                    .map(|day| crate::engine::model::weekday_name(*day).to_string())
                    .collect(),
            ),
        }
    }
}

/// `PUT /user/config` body. The weekly target sits next to `settings`, the same place
/// `/user/config` reports it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub weekly_target: u32,
    pub settings: WireSettings,
}

impl From<&Settings> for ConfigUpdate {
    fn from(settings: &Settings) -> Self {
        Self {
            weekly_target: settings.weekly_target_minutes,
            settings: WireSettings::from(settings),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTargetUpdate {
    pub daily_target: u32,
}

/// Targets as confirmed by the service after a daily target change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Targets {
    pub daily_target: u32,
    #[serde(default)]
    pub weekly_target: Option<u32>,
}
