//! Human-readable labels for temporal clusters.
//!
//! Everything here is a pure function of a cluster's members: the same
//! members always produce the same day, window and name.

use crate::error::{Error, Result};
use crate::features::{self, FeatureVector, MINUTES_PER_DAY};
use crate::track::Track;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;

/// Lower and upper percentile of the displayed time window.
const WINDOW_PERCENTILES: (f64, f64) = (0.10, 0.90);
/// Percentiles whose distance decides whether a cluster spans the day.
const SPREAD_PERCENTILES: (f64, f64) = (0.05, 0.95);

/// Start minutes of each part of the day, plus the window width from which
/// a cluster counts as "all day".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeOfDayBoundaries {
    pub morning: u32,
    pub afternoon: u32,
    pub evening: u32,
    pub late_night: u32,
    pub all_day_span: u32,
}

impl Default for TimeOfDayBoundaries {
    fn default() -> Self {
        Self {
            morning: 5 * 60,
            afternoon: 12 * 60,
            evening: 17 * 60,
            late_night: 22 * 60,
            all_day_span: 20 * 60,
        }
    }
}

impl TimeOfDayBoundaries {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] unless the boundaries are strictly
    /// increasing and inside one day.
    pub fn validate(&self) -> Result<()> {
        let ordered = self.morning < self.afternoon
            && self.afternoon < self.evening
            && self.evening < self.late_night
            && self.late_night < MINUTES_PER_DAY;
        if !ordered {
            return Err(Error::configuration(
                "time-of-day boundaries must increase from morning to late night within one day",
            ));
        }
        if self.all_day_span == 0 || self.all_day_span > MINUTES_PER_DAY {
            return Err(Error::configuration("all-day span must be within 1..=1440 minutes"));
        }
        Ok(())
    }

    /// Bucket a cluster by the midpoint of its window. `spread` is the
    /// 5th–95th percentile width of its members around the clock, which
    /// decides "all day".
    #[must_use]
    pub fn classify(&self, window: TimeRange, spread: u32) -> TimeOfDay {
        if spread >= self.all_day_span {
            return TimeOfDay::AllDay;
        }
        match window.midpoint() {
            m if (self.morning..self.afternoon).contains(&m) => TimeOfDay::Morning,
            m if (self.afternoon..self.evening).contains(&m) => TimeOfDay::Afternoon,
            m if (self.evening..self.late_night).contains(&m) => TimeOfDay::Evening,
            _ => TimeOfDay::LateNight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    LateNight,
    AllDay,
}

impl TimeOfDay {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::LateNight => "late night",
            Self::AllDay => "all day",
        }
    }

    #[must_use]
    pub const fn moods(self) -> &'static [&'static str] {
        match self {
            Self::Morning => &["mellow", "hopeful", "slow", "quiet", "cozy", "fresh"],
            Self::Afternoon => &["sunny", "focused", "lazy", "casual", "bright", "wandering"],
            Self::Evening => &["chill", "moody", "breezy", "romantic", "cool", "hazy"],
            Self::LateNight => &["restless", "chaotic", "soft", "dreamy", "lonely", "electric"],
            Self::AllDay => &["flowy", "familiar", "nostalgic", "rhythmic", "mixed", "steady"],
        }
    }
}

/// Window of the day in minutes since midnight. `end` may be smaller than
/// `start` when the window wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

impl TimeRange {
    /// Length in minutes, going forward from `start`.
    #[must_use]
    pub const fn span(&self) -> u32 {
        (self.end + MINUTES_PER_DAY - self.start) % MINUTES_PER_DAY
    }

    #[must_use]
    pub const fn midpoint(&self) -> u32 {
        (self.start + self.span() / 2) % MINUTES_PER_DAY
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}–{}",
            features::format_minutes(self.start),
            features::format_minutes(self.end)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub dominant_day: Weekday,
    pub time_range: TimeRange,
    pub time_of_day: TimeOfDay,
    /// e.g. "Friday breezy evening"
    pub name: String,
    pub session_count: usize,
}

/// Label one cluster from its member feature points.
#[must_use]
pub fn summarize(cluster_id: usize, members: &[FeatureVector], boundaries: &TimeOfDayBoundaries) -> ClusterSummary {
    let dominant_day = dominant_day(members.iter().map(FeatureVector::day_of_week));
    let minutes = members.iter().map(FeatureVector::minute_of_day).collect::<Vec<_>>();
    let (time_range, spread) = central_window(&minutes);
    let time_of_day = boundaries.classify(time_range, spread);

    let moods = time_of_day.moods();
    let mood = moods[cluster_id % moods.len()];
    let name = format!("{} {} {}", features::day_name(dominant_day), mood, time_of_day.label());

    ClusterSummary {
        cluster_id,
        dominant_day,
        time_range,
        time_of_day,
        name,
        session_count: members.len(),
    }
}

/// Most frequent weekday; ties go to the earliest day of the week.
fn dominant_day(days: impl Iterator<Item = u32>) -> Weekday {
    let mut counts = [0usize; 7];
    for day in days {
        counts[(day % 7) as usize] += 1;
    }

    let mut best = 0;
    for (day, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = day;
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    let best = best as u32;
    features::weekday_from_index(best)
}

/// 10th–90th percentile window of the given minutes, measured on the circle,
/// together with their 5th–95th percentile spread. A few stray plays at the
/// far ends of the day move neither.
///
/// The day is cut opposite the circular mean, so a cluster centred on
/// midnight gets a window like 23:10–00:50 instead of spanning the day.
fn central_window(minutes: &[u32]) -> (TimeRange, u32) {
    if minutes.is_empty() {
        return (TimeRange { start: 0, end: 0 }, 0);
    }

    let (sin_sum, cos_sum) = minutes.iter().fold((0.0, 0.0), |(s, c), &m| {
        let angle = TAU * f64::from(m) / f64::from(MINUTES_PER_DAY);
        (s + angle.sin(), c + angle.cos())
    });
    let center = FeatureVector::from_array([0.0, 1.0, sin_sum, cos_sum]).minute_of_day();
    let cut = (center + MINUTES_PER_DAY / 2) % MINUTES_PER_DAY;

    let mut offsets = minutes
        .iter()
        .map(|&m| (m + MINUTES_PER_DAY - cut) % MINUTES_PER_DAY)
        .collect::<Vec<_>>();
    offsets.sort_unstable();

    let low = offsets[percentile_index(offsets.len(), WINDOW_PERCENTILES.0)];
    let high = offsets[percentile_index(offsets.len(), WINDOW_PERCENTILES.1)];

    let spread = offsets[percentile_index(offsets.len(), SPREAD_PERCENTILES.1)]
        - offsets[percentile_index(offsets.len(), SPREAD_PERCENTILES.0)];

    let window = TimeRange {
        start: (low + cut) % MINUTES_PER_DAY,
        end: (high + cut) % MINUTES_PER_DAY,
    };
    (window, spread)
}

/// Nearest-rank index into a sorted slice of length `len > 0`.
fn percentile_index(len: usize, percentile: f64) -> usize {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let index = ((len - 1) as f64 * percentile).round() as usize;
    index.min(len - 1)
}

/// A track and how many of a cluster's sessions played it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongCount {
    pub track: Arc<Track>,
    pub listens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCount {
    pub artist: String,
    pub listens: usize,
}

/// Most played tracks among a cluster's sessions (one entry per session).
#[must_use]
pub fn top_songs(plays: &[Arc<Track>], n: usize) -> Vec<SongCount> {
    let mut counts: HashMap<&str, SongCount> = HashMap::new();
    for track in plays {
        counts
            .entry(track.uri.as_str())
            .or_insert_with(|| SongCount {
                track: Arc::clone(track),
                listens: 0,
            })
            .listens += 1;
    }

    let mut songs = counts.into_values().collect::<Vec<_>>();
    songs.sort_by(|a, b| {
        b.listens
            .cmp(&a.listens)
            .then_with(|| a.track.uri.cmp(&b.track.uri))
    });
    songs.truncate(n);
    songs
}

/// Most played artists among a cluster's sessions.
#[must_use]
pub fn top_artists(plays: &[Arc<Track>], n: usize) -> Vec<ArtistCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for track in plays {
        *counts.entry(track.artist.as_str()).or_default() += 1;
    }

    let mut artists = counts
        .into_iter()
        .map(|(artist, listens)| ArtistCount {
            artist: artist.to_string(),
            listens,
        })
        .collect::<Vec<_>>();
    artists.sort_by(|a, b| b.listens.cmp(&a.listens).then_with(|| a.artist.cmp(&b.artist)));
    artists.truncate(n);
    artists
}
