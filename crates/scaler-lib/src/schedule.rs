//! Day/night classification of the host clock
//!
//! Uses host local time with no timezone parameter; the scaler runs from a
//! single-region cron table.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

/// First hour that still counts as night in the morning
const MORNING_EDGE: u32 = 5;
/// First hour that counts as night in the evening
const EVENING_EDGE: u32 = 18;

/// Operating regime derived from the wall-clock hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Day,
    Night,
}

impl TimePeriod {
    /// `Day` when the hour is strictly between 5 and 18, otherwise `Night`
    pub fn from_hour(hour: u32) -> Self {
        if MORNING_EDGE < hour && hour < EVENING_EDGE {
            TimePeriod::Day
        } else {
            TimePeriod::Night
        }
    }

    /// Classify the current host local time
    pub fn now() -> Self {
        Self::from_hour(current_hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Day => "day",
            TimePeriod::Night => "night",
        }
    }
}

impl std::fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hour of the host local clock (0-23)
pub fn current_hour() -> u32 {
    chrono::Local::now().hour()
}
