//! # Track Catalog
//!
//! Read-only lookups for track and artist records. In production the
//! records live in an external key-value store; the engine only depends on
//! the [`Catalog`] trait. [`InMemoryCatalog`] backs the CLI and the tests
//! and reads the one-JSON-object-per-line catalog dump:
//!
//! ```text
//! {"track": 17, "artist": 3, "duration": 212.0, "title": "..."}
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub type TrackId = u64;
pub type ArtistId = u64;
pub type UserId = u64;

/// Immutable catalog record for one track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "track")]
    pub id: TrackId,
    #[serde(rename = "artist")]
    pub artist_id: ArtistId,
    #[serde(rename = "duration", default)]
    pub duration_seconds: f64,
}

/// Lookup interface the engine needs from the catalog.
///
/// Absence is a normal answer (`None`), not an error.
pub trait Catalog: Send + Sync {
    fn track(&self, id: TrackId) -> Option<Track>;

    fn artist_tracks(&self, artist: ArtistId) -> Option<Vec<TrackId>>;

    /// Every known track id.
    fn track_ids(&self) -> Vec<TrackId>;

    fn is_empty(&self) -> bool {
        self.track_ids().is_empty()
    }
}

/// Catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    tracks: HashMap<TrackId, Track>,
    artists: HashMap<ArtistId, Vec<TrackId>>,
}

impl InMemoryCatalog {
    /// Catalog with no tracks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from track records. Later duplicates replace earlier ones.
    pub fn from_tracks(tracks: impl IntoIterator<Item = Track>) -> Self {
        let mut catalog = Self::new();
        for track in tracks {
            catalog.insert(track);
        }
        catalog
    }

    /// Read a JSONL catalog dump. Blank lines are skipped.
    ///
    /// # Arguments
    ///
    /// * `path` - File with one `{"track", "artist", "duration"}` object per line
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The file cannot be opened or read ([`CatalogError::Read`])
    /// - A line is not a valid track record ([`CatalogError::Parse`], with its line number)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use muse_graph::InMemoryCatalog;
    ///
    /// let catalog = InMemoryCatalog::from_jsonl(Path::new("catalog.jsonl"))?;
    /// println!("{} tracks", catalog.len());
    /// # Ok::<(), muse_graph::error::CatalogError>(())
    /// ```
    pub fn from_jsonl(path: &Path) -> Result<Self, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut catalog = Self::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| CatalogError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let track: Track = serde_json::from_str(&line).map_err(|source| CatalogError::Parse {
                line: index + 1,
                source,
            })?;
            catalog.insert(track);
        }

        info!(
            "Loaded {} tracks by {} artists from {}",
            catalog.tracks.len(),
            catalog.artists.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, track: Track) {
        if let Some(previous) = self.tracks.insert(track.id, track) {
            debug!("Replacing catalog record for track {}", track.id);
            if let Some(list) = self.artists.get_mut(&previous.artist_id) {
                list.retain(|&id| id != track.id);
            }
        }
        self.artists.entry(track.artist_id).or_default().push(track.id);
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}

impl Catalog for InMemoryCatalog {
    fn track(&self, id: TrackId) -> Option<Track> {
        self.tracks.get(&id).copied()
    }

    fn artist_tracks(&self, artist: ArtistId) -> Option<Vec<TrackId>> {
        self.artists.get(&artist).cloned()
    }

    fn track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
