//! Typed records handed over by the session aggregator.
//!
//! Everything downstream of this module assumes the records were validated
//! here, at the boundary.

use crate::error::{Error, Result};
use crate::features::{self, FeatureVector};
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Aggregated listening statistics for one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Primary key.
    pub uri: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub play_count: u32,
    pub minutes_listened: f64,
    pub skip_count: u32,
}

impl Track {
    /// Reject records the scorer cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrack`] for an empty uri or a negative or
    /// non-finite `minutes_listened`.
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(Error::InvalidTrack {
                uri: self.uri.clone(),
                reason: "uri must not be empty".to_string(),
            });
        }
        if !self.minutes_listened.is_finite() || self.minutes_listened < 0.0 {
            return Err(Error::InvalidTrack {
                uri: self.uri.clone(),
                reason: format!("minutes listened must be finite and >= 0, got {}", self.minutes_listened),
            });
        }
        Ok(())
    }
}

/// A single play as reported by the session source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayEvent {
    pub track_uri: String,
    pub played_at: DateTime<Utc>,
}

/// A play event resolved against the catalog and placed in feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub track_uri: String,
    pub played_at: DateTime<Utc>,
    /// Monday = 0, in the listener's local time.
    pub day_of_week: u32,
    pub minute_of_day: u32,
    pub features: FeatureVector,
}

impl Session {
    #[must_use]
    pub fn from_event(event: &PlayEvent, zone: Tz) -> Self {
        let local = features::to_local(&event.played_at, zone);
        Self {
            track_uri: event.track_uri.clone(),
            played_at: event.played_at,
            day_of_week: local.weekday().num_days_from_monday(),
            minute_of_day: local.hour() * 60 + local.minute(),
            features: features::transform(&local),
        }
    }
}

/// Output of a session source: track aggregates plus the raw plays.
#[derive(Debug, Clone, Default)]
pub struct ListeningLog {
    pub tracks: Vec<Track>,
    pub events: Vec<PlayEvent>,
}

/// Outcome of resolving play events against the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub resolved: usize,
    /// Sessions dropped because their track is unknown.
    pub unresolved: usize,
    pub missing_uris: BTreeSet<String>,
}

/// Validated, uri-indexed track set shared by every cluster.
#[derive(Debug, Clone, Default)]
pub struct TrackCatalog {
    tracks: HashMap<String, Arc<Track>>,
}

impl TrackCatalog {
    /// Build a catalog, validating every record.
    ///
    /// Uri uniqueness is assumed; on a duplicate the first record is kept.
    ///
    /// # Errors
    ///
    /// Fails on the first record that does not pass [`Track::validate`].
    pub fn new(tracks: impl IntoIterator<Item = Track>) -> Result<Self> {
        let mut index = HashMap::new();
        for track in tracks {
            track.validate()?;
            if index.contains_key(&track.uri) {
                debug!("Duplicate track uri {}, keeping the first record", track.uri);
                continue;
            }
            index.insert(track.uri.clone(), Arc::new(track));
        }
        Ok(Self { tracks: index })
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&Arc<Track>> {
        self.tracks.get(uri)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Track>> {
        self.tracks.values()
    }

    /// Turn play events into sessions, dropping (and counting) the ones
    /// whose track is not in the catalog.
    #[must_use]
    pub fn resolve(&self, events: &[PlayEvent], zone: Tz) -> (Vec<Session>, ResolutionReport) {
        let mut report = ResolutionReport::default();
        let sessions = events
            .iter()
            .filter(|event| {
                let known = self.tracks.contains_key(&event.track_uri);
                if !known {
                    report.unresolved += 1;
                    report.missing_uris.insert(event.track_uri.clone());
                }
                known
            })
            .map(|event| Session::from_event(event, zone))
            .collect::<Vec<_>>();
        report.resolved = sessions.len();

        if report.unresolved > 0 {
            warn!(
                "{} sessions reference {} unknown tracks and were excluded",
                report.unresolved,
                report.missing_uris.len()
            );
        }

        (sessions, report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn track(uri: &str, artist: &str, plays: u32, minutes: f64, skips: u32) -> Track {
        Track {
            uri: uri.to_string(),
            artist: artist.to_string(),
            title: format!("Title of {uri}"),
            album: format!("Album by {artist}"),
            play_count: plays,
            minutes_listened: minutes,
            skip_count: skips,
        }
    }

    fn utc_zone() -> Tz {
        chrono_tz::UTC
    }

    #[test]
    fn test_validation_rejects_bad_records() {
        assert!(track("a", "x", 1, 1.0, 0).validate().is_ok());
        assert!(matches!(
            track("  ", "x", 1, 1.0, 0).validate(),
            Err(Error::InvalidTrack { .. })
        ));
        assert!(track("b", "x", 1, -0.5, 0).validate().is_err());
        assert!(track("c", "x", 1, f64::NAN, 0).validate().is_err());
        assert!(TrackCatalog::new(vec![track("d", "x", 1, f64::INFINITY, 0)]).is_err());
    }

    #[test]
    fn test_catalog_keeps_first_duplicate() {
        let catalog = TrackCatalog::new(vec![
            track("a", "first", 1, 1.0, 0),
            track("a", "second", 9, 9.0, 0),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().artist, "first");
    }

    #[test]
    fn test_resolution_counts_unknown_tracks() {
        let catalog = TrackCatalog::new(vec![track("known", "x", 1, 1.0, 0)]).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 3, 18, 30, 0).unwrap();
        let events = vec![
            PlayEvent { track_uri: "known".into(), played_at: at },
            PlayEvent { track_uri: "ghost".into(), played_at: at },
            PlayEvent { track_uri: "ghost".into(), played_at: at },
        ];

        let (sessions, report) = catalog.resolve(&events, utc_zone());

        assert_eq!(sessions.len(), 1);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.missing_uris.len(), 1);
        // 2024-01-03 is a Wednesday.
        assert_eq!(sessions[0].day_of_week, 2);
        assert_eq!(sessions[0].minute_of_day, 18 * 60 + 30);
        assert_eq!(sessions[0].features.day_of_week(), 2);
    }

    #[test]
    fn test_session_uses_local_wall_clock_year_round() {
        let zone = chrono_tz::America::New_York;
        let session = |at| {
            Session::from_event(&PlayEvent { track_uri: "a".into(), played_at: at }, zone)
        };

        // Friday 23:30 EST.
        let winter = session(Utc.with_ymd_and_hms(2024, 1, 6, 4, 30, 0).unwrap());
        assert_eq!((winter.day_of_week, winter.minute_of_day), (4, 23 * 60 + 30));

        // Saturday 00:30 EDT, not Friday 23:30.
        let summer = session(Utc.with_ymd_and_hms(2024, 7, 6, 4, 30, 0).unwrap());
        assert_eq!((summer.day_of_week, summer.minute_of_day), (5, 30));
        assert_eq!(summer.features.day_of_week(), 5);
    }
}
