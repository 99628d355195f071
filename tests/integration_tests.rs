//! # Integration Tests for smartlist
//!
//! End-to-end tests from a streaming-history export on disk to playlists,
//! through the library and through the `smartlist` binary.

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Weekday offset from Monday 2024-03-04, hour, minute, and a tag per habit.
const HABITS: [(i64, u32, &str); 3] = [(0, 8, "commute"), (2, 19, "dinner"), (5, 23, "party")];
const TRACKS_PER_HABIT: usize = 40;
const WEEKS: i64 = 4;

/// Write a two-file export with three clear listening habits plus some
/// podcast records without a track uri.
fn create_history_export(dir: &Path) -> Result<()> {
    let monday = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    let mut files = vec![Vec::new(), Vec::new()];

    for week in 0..WEEKS {
        for (day, hour, tag) in HABITS {
            for i in 0..TRACKS_PER_HABIT {
                let ts = monday
                    + Duration::days(week * 7 + day)
                    + Duration::hours(i64::from(hour))
                    + Duration::minutes(i as i64);
                let skipped = i % 7 == 0;
                let ms_played = if skipped { 15_000 } else { 180_000 + i * 1_000 };
                files[week as usize % 2].push(format!(
                    r#"{{"ts": "{}", "ms_played": {ms_played},
                        "master_metadata_track_name": "{tag} song {i}",
                        "master_metadata_album_artist_name": "{tag} artist {i}",
                        "master_metadata_album_album_name": "{tag} album",
                        "spotify_track_uri": "spotify:track:{tag}{i}",
                        "skipped": {skipped}, "shuffle": false}}"#,
                    ts.format("%Y-%m-%dT%H:%M:%SZ")
                ));
            }
        }
        files[0].push(format!(
            r#"{{"ts": "2024-03-0{}T12:00:00Z", "ms_played": 1800000, "spotify_track_uri": null,
                "master_metadata_track_name": null}}"#,
            week + 4
        ));
    }

    for (n, records) in files.iter().enumerate() {
        fs::write(
            dir.join(format!("Streaming_History_Audio_{n}.json")),
            format!("[{}]", records.join(",")),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod library_tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use smartlist::clustering::KMeansConfig;
    use smartlist::engine::{EngineOptions, SmartList};
    use smartlist::history::{SessionSource, StreamingHistoryDir};
    use smartlist::sampler::Stage;
    use smartlist::summary::TimeOfDay;
    use smartlist::{db, Error};

    fn utc_engine() -> SmartList {
        let options = EngineOptions {
            timezone: chrono_tz::UTC,
            ..EngineOptions::default()
        };
        SmartList::with_kmeans(options, KMeansConfig::default()).unwrap()
    }

    #[test]
    fn test_history_to_playlist() -> Result<()> {
        let dir = TempDir::new()?;
        create_history_export(dir.path())?;

        let log = StreamingHistoryDir::new(dir.path()).load()?;
        assert_eq!(log.tracks.len(), 3 * TRACKS_PER_HABIT);
        assert_eq!(log.events.len(), 3 * TRACKS_PER_HABIT * WEEKS as usize);

        let engine = utc_engine();
        let snapshot = engine.build_clusters(&log, 3)?;
        assert!(snapshot.silhouette_score().unwrap() > 0.5);

        let mut kinds = snapshot
            .clusters
            .iter()
            .map(|c| c.summary.time_of_day)
            .collect::<Vec<_>>();
        kinds.sort_by_key(|k| format!("{k:?}"));
        assert_eq!(kinds, vec![TimeOfDay::Evening, TimeOfDay::LateNight, TimeOfDay::Morning]);

        for cluster in &snapshot.clusters {
            assert_eq!(cluster.sessions.len(), TRACKS_PER_HABIT * WEEKS as usize);
            assert_eq!(cluster.track_pool.len(), TRACKS_PER_HABIT);

            let playlist = engine.generate_playlist(cluster.id, 10.0, &mut StdRng::seed_from_u64(1))?;
            assert!(playlist.len() <= 30);
            let uris = playlist.uris().collect::<HashSet<_>>();
            assert_eq!(uris.len(), playlist.len());
            assert_eq!(playlist.stages.len(), 3);
            assert_eq!(playlist.stages[0].stage, Stage::CuratedFavorites);
            assert_eq!(playlist.stages[0].drawn, 10);
        }
        Ok(())
    }

    #[test]
    fn test_snapshot_survives_the_store() -> Result<()> {
        let dir = TempDir::new()?;
        create_history_export(dir.path())?;
        let log = StreamingHistoryDir::new(dir.path()).load()?;

        let engine = utc_engine();
        let built = engine.build_clusters(&log, 3)?;
        let db_path = dir.path().join("smartlist.db");
        db::save_snapshot(&mut db::connect(&db_path)?, &built)?;

        let reader = utc_engine();
        let loaded = db::load_snapshot(&db::connect(&db_path)?, reader.options())?.expect("saved");
        reader.publish(loaded);

        for cluster in &built.clusters {
            let before = engine.get_cluster_summary(cluster.id)?;
            let after = reader.get_cluster_summary(cluster.id)?;
            assert_eq!(before, after);

            let a = engine.generate_playlist(cluster.id, 10.0, &mut StdRng::seed_from_u64(9))?;
            let b = reader.generate_playlist(cluster.id, 10.0, &mut StdRng::seed_from_u64(9))?;
            assert_eq!(a, b);
        }
        Ok(())
    }

    #[test]
    fn test_unknown_cluster_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        create_history_export(dir.path())?;
        let engine = utc_engine();
        engine.build_clusters(&StreamingHistoryDir::new(dir.path()).load()?, 3)?;

        let err = engine
            .generate_playlist(3, 10.0, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownCluster(3)));
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    struct Workspace {
        _dir: TempDir,
        history: PathBuf,
        db: PathBuf,
        config: PathBuf,
    }

    fn workspace() -> Result<Workspace> {
        let dir = TempDir::new()?;
        let history = dir.path().join("history");
        fs::create_dir(&history)?;
        create_history_export(&history)?;

        let config = dir.path().join("config.json");
        fs::write(&config, r#"{ "timezone": "UTC", "clustering": { "k": 3 } }"#)?;

        Ok(Workspace {
            db: dir.path().join("smartlist.db"),
            history,
            config,
            _dir: dir,
        })
    }

    fn smartlist(ws: &Workspace, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_smartlist"))
            .arg("--db")
            .arg(&ws.db)
            .arg("--config")
            .arg(&ws.config)
            .args(args)
            .output()
            .expect("Failed to run smartlist")
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new(env!("CARGO_BIN_EXE_smartlist"))
            .arg("--help")
            .output()
            .expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success());
        assert!(stdout.contains("smartlist"));
        assert!(stdout.contains("playlist"));
    }

    #[test]
    fn test_commands_before_build_fail() -> Result<()> {
        let ws = workspace()?;
        let output = smartlist(&ws, &["clusters"]);
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("No clusters built yet"));
        Ok(())
    }

    #[test]
    fn test_build_then_browse() -> Result<()> {
        let ws = workspace()?;
        let history = ws.history.to_string_lossy().to_string();

        let build = smartlist(&ws, &["build", &history]);
        assert!(build.status.success(), "{}", String::from_utf8_lossy(&build.stderr));
        let stdout = String::from_utf8_lossy(&build.stdout);
        assert!(stdout.contains("Built 3 clusters"));
        assert!(stdout.contains("Silhouette score"));

        let clusters = smartlist(&ws, &["clusters"]);
        assert!(clusters.status.success());
        let stdout = String::from_utf8_lossy(&clusters.stdout);
        for day in ["Monday", "Wednesday", "Saturday"] {
            assert!(stdout.contains(day), "missing {day} in:\n{stdout}");
        }

        let summary = smartlist(&ws, &["summary", "0"]);
        assert!(summary.status.success());
        let stdout = String::from_utf8_lossy(&summary.stdout);
        assert!(stdout.contains("Top songs"));
        assert!(stdout.contains("Scores:"), "missing score line in:\n{stdout}");

        let missing = smartlist(&ws, &["summary", "99"]);
        assert!(!missing.status.success());
        Ok(())
    }

    #[test]
    fn test_playlist_json_output() -> Result<()> {
        let ws = workspace()?;
        let history = ws.history.to_string_lossy().to_string();
        assert!(smartlist(&ws, &["build", &history]).status.success());

        let output = smartlist(&ws, &["playlist", "1", "--seed", "3", "--size", "12", "--json"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let playlist: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        let entries = playlist["entries"].as_array().expect("entries array");
        assert!(!entries.is_empty());
        assert!(entries.len() <= 12);

        let uris = entries
            .iter()
            .map(|e| e["track"]["uri"].as_str().unwrap_or_default().to_string())
            .collect::<HashSet<_>>();
        assert_eq!(uris.len(), entries.len());

        let again = smartlist(&ws, &["playlist", "1", "--seed", "3", "--size", "12", "--json"]);
        assert_eq!(output.stdout, again.stdout);
        Ok(())
    }
}
