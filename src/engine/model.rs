use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::ZenError, utils::progress::Progress};

pub const DEFAULT_DAILY_TARGET_MINUTES: u32 = 120;
pub const DAYS_IN_WEEK: usize = 7;

/// One contiguous interval between a connect and a disconnect event. Sessions are produced by the
/// remote service and only ever read locally.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub start: DateTime<Utc>,
    /// Absent while the box still holds the phone.
    pub end: Option<DateTime<Utc>>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

impl Session {
    pub fn closed(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            end: Some(start + duration),
            duration,
        }
    }

    pub fn open(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            duration: Duration::zero(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn whole_minutes(&self) -> i64 {
        self.duration.num_seconds().div_euclid(60)
    }
}

/// Returns the last session by start time if it is still open. Earlier open sessions are never
/// considered current.
pub fn open_session(sessions: &[Session]) -> Option<&Session> {
    sessions
        .iter()
        .max_by_key(|session| session.start)
        .filter(|session| session.is_open())
}

mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(s))
    }
}

/// Daily window during which the user intends to be in zen mode, written as `HH:MM-HH:MM`. The
/// window may wrap past midnight (`22:00-06:00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZenHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ZenHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl Default for ZenHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl FromStr for ZenHours {
    type Err = ZenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ZenError::invalid_settings(format!("zen hours {s:?} must be HH:MM-HH:MM")))?;
        let parse = |value: &str| {
            NaiveTime::parse_from_str(value.trim(), "%H:%M")
                .map_err(|e| ZenError::invalid_settings(format!("zen hours {s:?}: {e}")))
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }
}

impl Display for ZenHours {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl Serialize for ZenHours {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZenHours {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

pub const WEEKDAYS: [Weekday; DAYS_IN_WEEK] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Set of weekdays, always kept in Monday to Sunday order without duplicates. Serialized as full
/// English names; short names are accepted when parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZenDays(Vec<Weekday>);

impl ZenDays {
    pub fn new(days: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days = days.into_iter().collect::<Vec<_>>();
        days.sort_by_key(|day| day.num_days_from_monday());
        days.dedup();
        Self(days)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&day)
    }

    pub fn days(&self) -> &[Weekday] {
        &self.0
    }

    pub fn parse_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ZenError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref().trim();
                name.parse::<Weekday>()
                    .map_err(|_| ZenError::invalid_settings(format!("unknown weekday {name:?}")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

impl Default for ZenDays {
    fn default() -> Self {
        Self::new(WEEKDAYS[..5].iter().copied())
    }
}

impl FromStr for ZenDays {
    type Err = ZenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names = s
            .split(',')
            .filter(|name| !name.trim().is_empty())
            .collect::<Vec<_>>();
        Self::parse_names(&names)
    }
}

impl Display for ZenDays {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.0.iter().map(|day| day.to_string()).collect::<Vec<_>>();
        write!(f, "{}", names.join(","))
    }
}

impl Serialize for ZenDays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|day| weekday_name(*day)))
    }
}

impl<'de> Deserialize<'de> for ZenDays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Self::parse_names(&names).map_err(de::Error::custom)
    }
}

/// User preferences. Only ever changed by an explicit settings update, never by polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub daily_target_minutes: u32,
    pub weekly_target_minutes: u32,
    pub auto_reminder: bool,
    pub call_filtering: bool,
    pub zen_hours: ZenHours,
    pub zen_days: ZenDays,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_target_minutes: DEFAULT_DAILY_TARGET_MINUTES,
            weekly_target_minutes: DEFAULT_DAILY_TARGET_MINUTES * DAYS_IN_WEEK as u32,
            auto_reminder: true,
            call_filtering: true,
            zen_hours: ZenHours::default(),
            zen_days: ZenDays::default(),
        }
    }
}

impl Settings {
    /// Produces the settings that would result from applying `patch`. Nothing is changed when the
    /// patch is rejected.
    pub fn apply(&self, patch: SettingsPatch) -> Result<Settings, ZenError> {
        let daily_target_minutes = match patch.daily_target_minutes {
            Some(0) => return Err(ZenError::invalid_settings("daily target must be positive")),
            Some(v) => v,
            None => self.daily_target_minutes,
        };
        let weekly_target_minutes = match patch.weekly_target_minutes {
            Some(0) => return Err(ZenError::invalid_settings("weekly target must be positive")),
            Some(v) => v,
            None => self.weekly_target_minutes,
        };
        Ok(Settings {
            daily_target_minutes,
            weekly_target_minutes,
            auto_reminder: patch.auto_reminder.unwrap_or(self.auto_reminder),
            call_filtering: patch.call_filtering.unwrap_or(self.call_filtering),
            zen_hours: patch.zen_hours.unwrap_or(self.zen_hours),
            zen_days: patch.zen_days.unwrap_or_else(|| self.zen_days.clone()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub daily_target_minutes: Option<u32>,
    pub weekly_target_minutes: Option<u32>,
    pub auto_reminder: Option<bool>,
    pub call_filtering: Option<bool>,
    pub zen_hours: Option<ZenHours>,
    pub zen_days: Option<ZenDays>,
}

impl SettingsPatch {
    pub fn daily_target(minutes: u32) -> Self {
        Self {
            daily_target_minutes: Some(minutes),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Points earned by finishing sessions. Kept in memory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointsLedger {
    pub total: u64,
    today: u64,
    day: Option<NaiveDate>,
}

impl PointsLedger {
    pub fn award(&mut self, today: NaiveDate) {
        self.total += 1;
        if self.day == Some(today) {
            self.today += 1;
        } else {
            self.day = Some(today);
            self.today = 1;
        }
    }

    /// Points earned on `today`. Yesterday's count is not carried past midnight.
    pub fn today(&self, today: NaiveDate) -> u64 {
        if self.day == Some(today) {
            self.today
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub weekday: Weekday,
    pub zen_minutes: i64,
    pub target_minutes: u32,
}

impl DailyAggregate {
    pub fn label(&self) -> String {
        self.weekday.to_string()
    }

    pub fn progress(&self) -> Progress {
        Progress::of(self.zen_minutes, self.target_minutes)
    }
}

/// Everything the display layer shows. Recomputed from sessions and settings as a whole, never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedZenState {
    pub is_zen_mode: bool,
    pub today_zen_minutes: i64,
    pub zen_points: u64,
    pub today_points: u64,
    pub daily_target_minutes: u32,
    /// Monday first.
    pub weekly_data: Vec<DailyAggregate>,
    pub reminder_due: bool,
}

impl DerivedZenState {
    pub fn daily_progress(&self) -> Progress {
        Progress::of(self.today_zen_minutes, self.daily_target_minutes)
    }

    pub fn weekly_total(&self) -> i64 {
        self.weekly_data.iter().map(|day| day.zen_minutes).sum()
    }

    pub fn weekly_average(&self) -> i64 {
        (self.weekly_total() as f64 / DAYS_IN_WEEK as f64).round() as i64
    }
}

#[cfg(test)]
mod model_tests {
    use anyhow::Result;
    use chrono::{NaiveTime, TimeZone, Utc, Weekday};

    use super::*;

    #[test]
    fn zen_hours_parse_and_wrap() -> Result<()> {
        let evening: ZenHours = "20:00-22:00".parse()?;
        assert_eq!(evening.to_string(), "20:00-22:00");
        assert!(evening.contains(NaiveTime::from_hms_opt(21, 30, 0).unwrap()));
        assert!(!evening.contains(NaiveTime::from_hms_opt(22, 0, 0).unwrap()));

        let night: ZenHours = "22:00 - 06:30".parse()?;
        assert!(night.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(night.contains(NaiveTime::from_hms_opt(5, 0, 0).unwrap()));
        assert!(!night.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));

        assert!("20:00".parse::<ZenHours>().is_err());
        assert!("25:00-26:00".parse::<ZenHours>().is_err());
        Ok(())
    }

    #[test]
    fn zen_days_accept_short_and_long_names() -> Result<()> {
        let days: ZenDays = "sun,Monday,Mon, wed".parse()?;
        assert_eq!(days.days(), &[Weekday::Mon, Weekday::Wed, Weekday::Sun]);
        assert_eq!(serde_json::to_string(&days)?, r#"["Monday","Wednesday","Sunday"]"#);
        assert!("Someday".parse::<ZenDays>().is_err());
        Ok(())
    }

    #[test]
    fn settings_use_camel_case_on_the_wire() -> Result<()> {
        let json = serde_json::to_value(Settings::default())?;
        assert_eq!(json["dailyTargetMinutes"], 120);
        assert_eq!(json["zenHours"], "20:00-22:00");
        assert_eq!(json["zenDays"][4], "Friday");
        Ok(())
    }

    #[test]
    fn rejected_patch_leaves_nothing_half_applied() {
        let settings = Settings::default();
        let patch = SettingsPatch {
            daily_target_minutes: Some(0),
            auto_reminder: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            settings.apply(patch),
            Err(ZenError::InvalidSettings(_))
        ));
        assert!(settings.auto_reminder);
    }

    #[test]
    fn patch_merges_over_current_settings() -> Result<()> {
        let settings = Settings::default();
        let next = settings.apply(SettingsPatch {
            call_filtering: Some(false),
            zen_days: Some("Sat,Sun".parse()?),
            ..Default::default()
        })?;
        assert!(!next.call_filtering);
        assert_eq!(next.zen_days.days(), &[Weekday::Sat, Weekday::Sun]);
        assert_eq!(next.daily_target_minutes, settings.daily_target_minutes);
        Ok(())
    }

    #[test]
    fn points_reset_after_midnight() {
        let monday = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let tuesday = monday.succ_opt().unwrap();
        let mut points = PointsLedger::default();
        points.award(monday);
        points.award(monday);
        assert_eq!(points.today(monday), 2);
        assert_eq!(points.today(tuesday), 0);
        points.award(tuesday);
        assert_eq!(points.total, 3);
        assert_eq!(points.today(tuesday), 1);
    }

    #[test]
    fn only_latest_session_can_be_open() {
        let start = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
        let stale_open = Session::open(start);
        let closed = Session::closed(start + Duration::hours(1), Duration::minutes(5));
        let sessions = vec![stale_open.clone(), closed];
        assert_eq!(open_session(&sessions), None);

        let current = Session::open(start + Duration::hours(2));
        let sessions = vec![stale_open, current.clone()];
        assert_eq!(open_session(&sessions), Some(&current));
        assert_eq!(open_session(&[]), None);
    }
}
