//! SQLite persistence for cluster snapshots.
//!
//! Only what a clustering run produced is stored: tracks, sessions with
//! their cluster, centroids and run metadata. Summaries, ranked pools and
//! top lists are recomputed on load.

use crate::engine::{self, ClusterSnapshot, EngineOptions, SnapshotMeta};
use crate::features::FeatureVector;
use crate::track::{Session, Track, TrackCatalog};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, trace};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

/// Open (or create) the database at `path` and make sure the schema exists.
///
/// # Errors
///
/// Fails if the file cannot be opened or the schema cannot be created.
pub fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// # Errors
///
/// Fails on invalid SQL or a read-only database.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tracks (
            uri              TEXT    PRIMARY KEY,
            artist           TEXT    NOT NULL,
            title            TEXT    NOT NULL,
            album            TEXT    NOT NULL,
            play_count       INTEGER NOT NULL,
            minutes_listened REAL    NOT NULL,
            skip_count       INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sessions (
            id            INTEGER PRIMARY KEY,
            track_uri     TEXT    NOT NULL,
            played_at     TEXT    NOT NULL,
            day_of_week   INTEGER NOT NULL,
            minute_of_day INTEGER NOT NULL,
            dow_sin       REAL    NOT NULL,
            dow_cos       REAL    NOT NULL,
            time_sin      REAL    NOT NULL,
            time_cos      REAL    NOT NULL,
            cluster_id    INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS centroids (
            cluster_id INTEGER PRIMARY KEY,
            dow_sin    REAL NOT NULL,
            dow_cos    REAL NOT NULL,
            time_sin   REAL NOT NULL,
            time_cos   REAL NOT NULL
        );
        CREATE TABLE IF NOT EXISTS snapshot_meta (
            id   INTEGER PRIMARY KEY CHECK (id = 1),
            meta TEXT    NOT NULL
        );",
    )
    .context("Failed to create database schema")
}

/// Replace whatever is stored with `snapshot`, in one transaction.
///
/// # Errors
///
/// Fails on any SQL error; the previous snapshot is kept in that case.
pub fn save_snapshot(conn: &mut Connection, snapshot: &ClusterSnapshot) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        "DELETE FROM tracks; DELETE FROM sessions; DELETE FROM centroids; DELETE FROM snapshot_meta;",
    )
    .context("Failed to clear previous snapshot")?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO tracks (uri, artist, title, album, play_count, minutes_listened, skip_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for track in snapshot.catalog.iter() {
            stmt.execute((
                &track.uri,
                &track.artist,
                &track.title,
                &track.album,
                track.play_count,
                track.minutes_listened,
                track.skip_count,
            ))
            .with_context(|| format!("Failed to store track {}", track.uri))?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO sessions (track_uri, played_at, day_of_week, minute_of_day,
                                   dow_sin, dow_cos, time_sin, time_cos, cluster_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for (session, cluster_id) in snapshot.assignments() {
            let f = session.features;
            stmt.execute((
                &session.track_uri,
                session.played_at.to_rfc3339(),
                session.day_of_week,
                session.minute_of_day,
                f.dow_sin,
                f.dow_cos,
                f.time_sin,
                f.time_cos,
                cluster_id,
            ))
            .with_context(|| format!("Failed to store session of {}", session.track_uri))?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO centroids (cluster_id, dow_sin, dow_cos, time_sin, time_cos)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for cluster in &snapshot.clusters {
            let c = cluster.centroid;
            stmt.execute((cluster.id, c.dow_sin, c.dow_cos, c.time_sin, c.time_cos))
                .with_context(|| format!("Failed to store centroid {}", cluster.id))?;
        }
    }

    if let Some(meta) = &snapshot.meta {
        let json = serde_json::to_string(meta).context("Failed to serialize snapshot metadata")?;
        tx.execute("INSERT INTO snapshot_meta (id, meta) VALUES (1, ?1)", [json])
            .context("Failed to store snapshot metadata")?;
    }

    tx.commit().context("Committing snapshot transaction failed")?;
    info!(
        "Stored snapshot with {} clusters and {} tracks",
        snapshot.clusters.len(),
        snapshot.catalog.len()
    );
    Ok(())
}

/// Load the stored snapshot, or `None` if nothing was ever built.
///
/// # Errors
///
/// Fails on SQL errors, unreadable rows, or sessions that point at a
/// cluster without a centroid.
pub fn load_snapshot(conn: &Connection, options: &EngineOptions) -> Result<Option<ClusterSnapshot>> {
    let meta: Option<String> = conn
        .query_row("SELECT meta FROM snapshot_meta WHERE id = 1", [], |row| row.get(0))
        .optional()
        .context("Failed to read snapshot metadata")?;
    let Some(meta) = meta else {
        debug!("No stored snapshot");
        return Ok(None);
    };
    let meta: SnapshotMeta = serde_json::from_str(&meta).context("Failed to parse snapshot metadata")?;

    let catalog = TrackCatalog::new(load_tracks(conn)?)?;
    let (sessions, assignments) = load_sessions(conn)?;
    let centroids = load_centroids(conn)?;

    if let Some(&bad) = assignments.iter().find(|&&cluster| cluster >= centroids.len()) {
        anyhow::bail!(
            "Stored session references cluster {bad}, but only {} centroids exist",
            centroids.len()
        );
    }

    trace!("Reassembling {} sessions into {} clusters", sessions.len(), centroids.len());
    let snapshot = engine::assemble_snapshot(catalog, sessions, &assignments, &centroids, meta, options);
    Ok(Some(snapshot))
}

fn load_tracks(conn: &Connection) -> Result<Vec<Track>> {
    let mut stmt = conn.prepare(
        "SELECT uri, artist, title, album, play_count, minutes_listened, skip_count FROM tracks",
    )?;
    let tracks = stmt
        .query_map([], |row| {
            Ok(Track {
                uri: row.get(0)?,
                artist: row.get(1)?,
                title: row.get(2)?,
                album: row.get(3)?,
                play_count: row.get(4)?,
                minutes_listened: row.get(5)?,
                skip_count: row.get(6)?,
            })
        })
        .context("Cannot query tracks")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read stored tracks")?;
    Ok(tracks)
}

fn load_sessions(conn: &Connection) -> Result<(Vec<Session>, Vec<usize>)> {
    let mut stmt = conn.prepare(
        "SELECT track_uri, played_at, day_of_week, minute_of_day,
                dow_sin, dow_cos, time_sin, time_cos, cluster_id
         FROM sessions ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let played_at: String = row.get(1)?;
            let played_at = DateTime::parse_from_rfc3339(&played_at)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                .with_timezone(&Utc);
            let session = Session {
                track_uri: row.get(0)?,
                played_at,
                day_of_week: row.get(2)?,
                minute_of_day: row.get(3)?,
                features: FeatureVector::from_array([row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?]),
            };
            Ok((session, row.get::<_, usize>(8)?))
        })
        .context("Cannot query sessions")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read stored sessions")?;
    Ok(rows.into_iter().unzip())
}

fn load_centroids(conn: &Connection) -> Result<Vec<FeatureVector>> {
    let mut stmt =
        conn.prepare("SELECT dow_sin, dow_cos, time_sin, time_cos FROM centroids ORDER BY cluster_id")?;
    let centroids = stmt
        .query_map([], |row| {
            Ok(FeatureVector::from_array([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?]))
        })
        .context("Cannot query centroids")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read stored centroids")?;
    Ok(centroids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::KMeansConfig;
    use crate::engine::SmartList;
    use crate::track::tests::track;
    use crate::track::{ListeningLog, PlayEvent};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn options() -> EngineOptions {
        EngineOptions {
            timezone: chrono_tz::UTC,
            ..EngineOptions::default()
        }
    }

    fn log() -> ListeningLog {
        let tracks = (0..8u32)
            .map(|i| track(&format!("t{i}"), &format!("a{i}"), i + 1, f64::from(i) * 2.5, i % 2))
            .collect();
        let events = (0..8u32)
            .flat_map(|i| {
                (0..4u32).map(move |d| PlayEvent {
                    track_uri: format!("t{i}"),
                    played_at: Utc.with_ymd_and_hms(2024, 2, 5 + d, 6 + 2 * i, 15, 0).unwrap(),
                })
            })
            .collect();
        ListeningLog { tracks, events }
    }

    #[test]
    fn test_empty_database_has_no_snapshot() -> Result<()> {
        let dir = TempDir::new()?;
        let conn = connect(&dir.path().join("smartlist.db"))?;
        assert!(load_snapshot(&conn, &options())?.is_none());
        Ok(())
    }

    #[test]
    fn test_snapshot_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("smartlist.db");

        let engine = SmartList::with_kmeans(options(), KMeansConfig::default())?;
        let built = engine.build_clusters(&log(), 3)?;

        let mut conn = connect(&path)?;
        save_snapshot(&mut conn, &built)?;
        drop(conn);

        let conn = connect(&path)?;
        let loaded = load_snapshot(&conn, &options())?.expect("snapshot was saved");

        assert_eq!(loaded.meta, built.meta);
        assert_eq!(loaded.catalog.len(), built.catalog.len());
        assert_eq!(loaded.clusters.len(), built.clusters.len());
        for (a, b) in loaded.clusters.iter().zip(&built.clusters) {
            assert_eq!(a.summary, b.summary);
            assert_eq!(a.centroid, b.centroid);
            assert_eq!(a.sessions, b.sessions);
            assert_eq!(a.track_pool, b.track_pool);
            assert_eq!(a.top_artists, b.top_artists);
        }
        Ok(())
    }

    #[test]
    fn test_meta_floats_survive_exactly() -> Result<()> {
        let dir = TempDir::new()?;
        let engine = SmartList::with_kmeans(options(), KMeansConfig::default())?;
        let mut snapshot = (*engine.build_clusters(&log(), 3)?).clone();
        if let Some(meta) = snapshot.meta.as_mut() {
            meta.inertia = 3886.078_393_068_316_5;
            meta.silhouette_score = Some(0.1 + 0.2);
        }

        let mut conn = connect(&dir.path().join("smartlist.db"))?;
        save_snapshot(&mut conn, &snapshot)?;
        let loaded = load_snapshot(&conn, &options())?.expect("snapshot was saved");

        let meta = loaded.meta.expect("meta was saved");
        assert_eq!(meta.inertia.to_bits(), 3886.078_393_068_316_5_f64.to_bits());
        assert_eq!(meta.silhouette_score.map(f64::to_bits), Some((0.1_f64 + 0.2).to_bits()));
        Ok(())
    }

    #[test]
    fn test_save_replaces_previous_snapshot() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = connect(&dir.path().join("smartlist.db"))?;
        let engine = SmartList::with_kmeans(options(), KMeansConfig::default())?;

        save_snapshot(&mut conn, &*engine.build_clusters(&log(), 4)?)?;
        save_snapshot(&mut conn, &*engine.build_clusters(&log(), 2)?)?;

        let loaded = load_snapshot(&conn, &options())?.expect("snapshot was saved");
        assert_eq!(loaded.clusters.len(), 2);
        let sessions: usize = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        assert_eq!(sessions, 32);
        Ok(())
    }
}
