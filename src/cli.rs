//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `smartlist` binary.
//!
//! ## Commands
//!
//! - `build`: Ingest a streaming-history export, cluster it and store the snapshot
//! - `clusters`: Overview of every cluster, grouped by dominant day
//! - `summary`: Details of one cluster
//! - `playlist`: Sample a playlist from one cluster
//! - `completion`: Shell completion scripts
//!
//! ## Examples
//!
//! ```bash
//! smartlist build ~/Downloads/my_spotify_data --clusters 40
//! smartlist clusters
//! smartlist playlist 12 --min-popularity 5
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "smartlist")]
#[command(about = "smartlist: playlists shaped by when you listen")]
#[command(version)]
pub struct Args {
    /// Snapshot database to use instead of the default location
    #[arg(long, global = true, env = "SMARTLIST_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true, env = "SMARTLIST_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Cluster a streaming-history export and store the result
    ///
    /// Reads every `*.json` file in the export directory, folds the plays
    /// into per-track statistics, groups listening sessions by weekday and
    /// time of day, and replaces the stored snapshot.
    Build {
        /// Directory holding the streaming-history JSON files
        #[arg(value_hint = clap::ValueHint::DirPath)]
        history: PathBuf,

        /// Number of clusters to build
        ///
        /// Defaults to the value in the settings file (50).
        #[arg(short = 'k', long)]
        clusters: Option<usize>,

        /// Seed for k-means initialisation
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List all clusters, grouped by dominant day
    ///
    /// Within a day, clusters are ordered by the start of their time window.
    Clusters,

    /// Show one cluster in detail
    ///
    /// Prints the cluster's name, time window, size, the clustering's
    /// silhouette score, and its top artists and songs.
    Summary {
        /// Cluster id as shown by `clusters`
        id: usize,
    },

    /// Sample a playlist from one cluster
    ///
    /// Draws from three pools in turn: the cluster's most played tracks,
    /// its best scored tracks, and any track above the popularity floor.
    /// No track or artist appears twice.
    Playlist {
        /// Cluster id as shown by `clusters`
        id: usize,

        /// Popularity floor for the contextual fill stage
        #[arg(short, long)]
        min_popularity: Option<f64>,

        /// Number of tracks to aim for
        #[arg(short, long)]
        size: Option<usize>,

        /// Seed for a reproducible playlist
        #[arg(long)]
        seed: Option<u64>,

        /// Print the playlist as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    ///
    /// Outputs completion script for the specified shell. Redirect to
    /// the appropriate file for your shell.
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_playlist_arguments() {
        let args = Args::try_parse_from([
            "smartlist", "--db", "/tmp/x.db", "playlist", "4", "--min-popularity", "2.5", "--size", "12", "--json",
        ])
        .unwrap();

        assert_eq!(args.db, Some(PathBuf::from("/tmp/x.db")));
        match args.command {
            Command::Playlist { id, min_popularity, size, seed, json } => {
                assert_eq!(id, 4);
                assert_eq!(min_popularity, Some(2.5));
                assert_eq!(size, Some(12));
                assert_eq!(seed, None);
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_build_arguments() {
        let args = Args::try_parse_from(["smartlist", "build", "history", "-k", "20", "--seed", "7"]).unwrap();
        match args.command {
            Command::Build { history, clusters, seed } => {
                assert_eq!(history, PathBuf::from("history"));
                assert_eq!(clusters, Some(20));
                assert_eq!(seed, Some(7));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
