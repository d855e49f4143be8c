//! # Snapshot Persistence
//!
//! The whole engine model is written as one JSON document and loaded back
//! wholesale at startup. Writes go to a temporary file in the destination
//! directory which then replaces the old snapshot, so a crash mid-write
//! never leaves a truncated model behind.
//!
//! Every field defaults to empty, so snapshots written by older or newer
//! builds with fewer or extra fields still load.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::catalog::{ArtistId, TrackId, UserId};
use crate::error::SnapshotError;
use crate::graph::TransitionGraph;
use crate::rank::RankMap;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized engine model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub version: u32,
    pub track_graph: TransitionGraph<TrackId>,
    pub artist_graph: TransitionGraph<ArtistId>,
    pub track_ranks: RankMap,
    pub listen_times: HashMap<TrackId, Vec<f64>>,
    pub durations: HashMap<TrackId, f64>,
    pub user_history: HashMap<UserId, Vec<TrackId>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            track_graph: TransitionGraph::new(),
            artist_graph: TransitionGraph::new(),
            track_ranks: RankMap::new(),
            listen_times: HashMap::new(),
            durations: HashMap::new(),
            user_history: HashMap::new(),
        }
    }
}

impl Snapshot {
    /// Read and decode a snapshot file.
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::Missing`] if nothing exists at `path`
    /// - [`SnapshotError::Io`] if the file cannot be opened
    /// - [`SnapshotError::Decode`] if it is not a valid snapshot document
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            return Err(SnapshotError::Missing(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Self = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            SnapshotError::Decode { path: path.to_path_buf(), source }
        })?;
        if snapshot.version > SNAPSHOT_VERSION {
            warn!(
                "Snapshot {} has version {}, newer than {}; unknown fields are ignored",
                path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }
        Ok(snapshot)
    }

    /// Load a snapshot, or start empty when it is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(snapshot) => {
                info!(
                    "Loaded snapshot {} ({} nodes, {} edges, {} users)",
                    path.display(),
                    snapshot.track_graph.node_count(),
                    snapshot.track_graph.edge_count(),
                    snapshot.user_history.len()
                );
                snapshot
            }
            Err(SnapshotError::Missing(_)) => {
                info!("No snapshot at {}, starting with an empty model", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Snapshot unreadable, starting with an empty model: {e}");
                Self::default()
            }
        }
    }

    /// Write the snapshot atomically, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Io`] when the directory, the temporary file or the
    /// final rename fails, [`SnapshotError::Encode`] when serialization
    /// fails. The previous snapshot at `path` is left intact in both cases.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source: std::io::Error| SnapshotError::Io { path: dir.clone(), source };

        fs::create_dir_all(&dir).map_err(io_err)?;
        let temp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, self).map_err(SnapshotError::Encode)?;
            writer.flush().map_err(io_err)?;
        }
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(path).map_err(|e| SnapshotError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        info!(
            "Saved snapshot {} ({} nodes, {} edges)",
            path.display(),
            self.track_graph.node_count(),
            self.track_graph.edge_count()
        );
        Ok(())
    }
}
