use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};

use crate::utils::clock::Clock;

use super::model::{
    open_session, DailyAggregate, DerivedZenState, PointsLedger, Session, Settings, WEEKDAYS,
};

/// Turns the raw session log into everything the display layer needs.
pub trait Aggregator: Send + Sync {
    fn derive(
        &self,
        sessions: &[Session],
        settings: &Settings,
        points: &PointsLedger,
    ) -> DerivedZenState;

    /// Calendar date used to decide which points belong to today.
    fn today(&self) -> NaiveDate;
}

/// [Aggregator] that reads the current time from a [Clock] and buckets sessions by the calendar of
/// `tz`.
pub struct ZonedAggregator<Tz: TimeZone> {
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl<Tz: TimeZone> ZonedAggregator<Tz> {
    pub fn new(clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self { clock, tz }
    }

    fn now(&self) -> DateTime<Tz> {
        self.clock.time().with_timezone(&self.tz)
    }
}

impl<Tz> Aggregator for ZonedAggregator<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    fn derive(
        &self,
        sessions: &[Session],
        settings: &Settings,
        points: &PointsLedger,
    ) -> DerivedZenState {
        derive(sessions, settings, points, &self.now())
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Computes [DerivedZenState] for the moment `now`. The timezone of `now` decides calendar days
/// and weekdays.
///
/// Weekly buckets group sessions by the weekday they started on across the whole log, so sessions
/// from different weeks that share a weekday are added together.
pub fn derive<Tz: TimeZone>(
    sessions: &[Session],
    settings: &Settings,
    points: &PointsLedger,
    now: &DateTime<Tz>,
) -> DerivedZenState {
    let tz = now.timezone();
    let today = now.date_naive();

    let mut today_seconds = 0i64;
    let mut weekly_data = WEEKDAYS
        .iter()
        .map(|weekday| DailyAggregate {
            weekday: *weekday,
            zen_minutes: 0,
            target_minutes: settings.daily_target_minutes,
        })
        .collect::<Vec<_>>();

    for session in sessions {
        let start = session.start.with_timezone(&tz);
        if start.date_naive() == today {
            today_seconds += session.duration.num_seconds();
        }
        let bucket = start.weekday().num_days_from_monday() as usize;
        weekly_data[bucket].zen_minutes += session.whole_minutes();
    }

    let is_zen_mode = open_session(sessions).is_some();
    let local_time = now.time();

    DerivedZenState {
        is_zen_mode,
        today_zen_minutes: today_seconds.div_euclid(60),
        zen_points: points.total,
        today_points: points.today(today),
        daily_target_minutes: settings.daily_target_minutes,
        weekly_data,
        reminder_due: settings.auto_reminder
            && !is_zen_mode
            && settings.zen_days.contains(now.weekday())
            && settings.zen_hours.contains(local_time),
    }
}
