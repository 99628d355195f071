//! Cyclical time features for listening sessions.
//!
//! Day-of-week and time-of-day are periodic, so each one is mapped onto the
//! unit circle. Sunday sits next to Monday and 23:59 next to 00:01 under plain
//! Euclidean distance, which is what the clustering step relies on.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

pub const DAYS_PER_WEEK: u32 = 7;
pub const MINUTES_PER_DAY: u32 = 1440;

/// Point in the 4-dimensional feature space the clustering runs in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub dow_sin: f64,
    pub dow_cos: f64,
    pub time_sin: f64,
    pub time_cos: f64,
}

impl FeatureVector {
    /// Encode a day index (Monday = 0) and minutes since midnight.
    ///
    /// Out-of-range inputs wrap around their period.
    #[must_use]
    pub fn from_parts(day_of_week: u32, minute_of_day: u32) -> Self {
        let day = f64::from(day_of_week % DAYS_PER_WEEK);
        let minute = f64::from(minute_of_day % MINUTES_PER_DAY);

        let day_angle = TAU * day / f64::from(DAYS_PER_WEEK);
        let time_angle = TAU * minute / f64::from(MINUTES_PER_DAY);

        Self {
            dow_sin: day_angle.sin(),
            dow_cos: day_angle.cos(),
            time_sin: time_angle.sin(),
            time_cos: time_angle.cos(),
        }
    }

    #[must_use]
    pub const fn as_array(&self) -> [f64; 4] {
        [self.dow_sin, self.dow_cos, self.time_sin, self.time_cos]
    }

    #[must_use]
    pub const fn from_array(values: [f64; 4]) -> Self {
        Self {
            dow_sin: values[0],
            dow_cos: values[1],
            time_sin: values[2],
            time_cos: values[3],
        }
    }

    /// Recover the day index (Monday = 0) encoded in this vector.
    #[must_use]
    pub fn day_of_week(&self) -> u32 {
        decode_angle(self.dow_sin, self.dow_cos, DAYS_PER_WEEK)
    }

    /// Recover minutes since midnight encoded in this vector.
    #[must_use]
    pub fn minute_of_day(&self) -> u32 {
        decode_angle(self.time_sin, self.time_cos, MINUTES_PER_DAY)
    }

    #[must_use]
    pub fn distance_sq(&self, other: &Self) -> f64 {
        self.as_array()
            .iter()
            .zip(other.as_array().iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum()
    }

    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_sq(other).sqrt()
    }

    /// Bit-exact key, used to count distinct points.
    #[must_use]
    pub fn bits(&self) -> [u64; 4] {
        self.as_array().map(f64::to_bits)
    }
}

/// Map an angle given as (sin, cos) back onto `0..period`.
fn decode_angle(sin: f64, cos: f64, period: u32) -> u32 {
    let period_f = f64::from(period);
    let mut position = sin.atan2(cos) * period_f / TAU;
    if position < 0.0 {
        position += period_f;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = position.round() as u32;
    rounded % period
}

/// Encode a timestamp in whatever zone it carries.
#[must_use]
pub fn transform<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> FeatureVector {
    let day = timestamp.weekday().num_days_from_monday();
    let minute = timestamp.hour() * 60 + timestamp.minute();
    FeatureVector::from_parts(day, minute)
}

/// Shift a UTC instant into the listener's wall-clock zone, daylight saving
/// included.
#[must_use]
pub fn to_local(timestamp: &DateTime<Utc>, zone: Tz) -> DateTime<Tz> {
    timestamp.with_timezone(&zone)
}

/// Weekday for an index where Monday = 0. Wraps modulo 7.
#[must_use]
pub const fn weekday_from_index(index: u32) -> Weekday {
    match index % DAYS_PER_WEEK {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

#[must_use]
pub const fn day_name(day: Weekday) -> &'static str {
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

/// `HH:MM` for minutes since midnight.
#[must_use]
pub fn format_minutes(minutes: u32) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
