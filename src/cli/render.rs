use ansi_term::Colour::{Green, Purple, Red, Yellow};
use chrono::Local;

use crate::{
    engine::{
        model::{Session, Settings},
        store::StoreSnapshot,
        timer::TimerDisplay,
    },
    utils::{
        progress::Progress,
        time::{format_duration, format_minutes, format_session_start},
    },
};

const BAR_CELLS: usize = 20;

fn bar(progress: Progress) -> String {
    let filled = progress.bar_width as usize * BAR_CELLS / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_CELLS - filled))
}

fn zen_label(snapshot: &StoreSnapshot) -> String {
    let label = if snapshot.is_zen_mode() {
        Green.bold().paint("In Zen Mode")
    } else {
        Yellow.paint("Out of Box")
    };
    if snapshot.optimistic_zen.is_some() {
        format!("{label} (waiting for device)")
    } else {
        label.to_string()
    }
}

/// Full status block printed by `zenbox status`.
pub fn status(snapshot: &StoreSnapshot, timer: &TimerDisplay) -> String {
    let derived = &snapshot.derived;
    let today = derived.daily_progress();
    let mut lines = vec![
        format!("Zen mode   {}", zen_label(snapshot)),
        format!("Elapsed    {timer}"),
        format!(
            "Today      {} of {}  {}  {today}",
            format_minutes(derived.today_zen_minutes),
            format_minutes(derived.daily_target_minutes as i64),
            bar(today),
        ),
        format!(
            "Points     {} (+{} today)",
            Purple.bold().paint(derived.zen_points.to_string()),
            derived.today_points
        ),
        String::new(),
    ];

    for day in &derived.weekly_data {
        let progress = day.progress();
        lines.push(format!(
            "{}  {:>8}  {}  {progress}",
            day.label(),
            format_minutes(day.zen_minutes),
            bar(progress)
        ));
    }
    lines.push(format!(
        "Week       {} total, {} per day",
        format_minutes(derived.weekly_total()),
        format_minutes(derived.weekly_average())
    ));

    if snapshot.reminder_due() {
        lines.push(String::new());
        lines.push(Yellow.paint("Put your phone in the box, it's zen time!").to_string());
    }
    if let Some(error) = &snapshot.last_error {
        lines.push(Red.paint(format!("Error: {error}")).to_string());
    }
    lines.join("\n")
}

/// Single line redrawn in place by `zenbox watch`.
pub fn status_line(snapshot: &StoreSnapshot, timer: &TimerDisplay) -> String {
    let derived = &snapshot.derived;
    let mut line = format!(
        "{}  {timer}  today {} ({})  points {} (+{})",
        zen_label(snapshot),
        format_minutes(derived.today_zen_minutes),
        derived.daily_progress(),
        derived.zen_points,
        derived.today_points,
    );
    if let Some(error) = &snapshot.last_error {
        line.push_str(&format!("  {}", Red.paint(error.as_str())));
    }
    line
}

pub fn session_line(index: usize, session: &Session) -> String {
    let start = format_session_start(&session.start.with_timezone(&Local));
    let length = if session.is_open() {
        Green.paint("in progress").to_string()
    } else {
        format_duration(session.duration.num_seconds())
    };
    format!("#{:<3} {start:<20} {length}", index + 1)
}

pub fn settings(settings: &Settings) -> String {
    [
        format!(
            "Daily target     {}",
            format_minutes(settings.daily_target_minutes as i64)
        ),
        format!(
            "Weekly target    {}",
            format_minutes(settings.weekly_target_minutes as i64)
        ),
        format!("Auto reminder    {}", settings.auto_reminder),
        format!("Call filtering   {}", settings.call_filtering),
        format!("Zen hours        {}", settings.zen_hours),
        format!("Zen days         {}", settings.zen_days),
    ]
    .join("\n")
}
