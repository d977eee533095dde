use std::fmt::Display;

use serde::Serialize;

/// Progress of some amount of zen minutes against a target.
///
/// `percent` is the rounded ratio and is allowed to go past 100, while `bar_width` is the same
/// value clamped into `0..=100` so it can be used directly as the width of a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub percent: i64,
    pub bar_width: u8,
}

impl Progress {
    pub fn of(minutes: i64, target_minutes: u32) -> Self {
        let percent = if target_minutes == 0 {
            0
        } else {
            (minutes as f64 / target_minutes as f64 * 100.).round() as i64
        };
        Self {
            percent,
            bar_width: percent.clamp(0, 100) as u8,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100
    }
}

impl Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.percent)
    }
}
