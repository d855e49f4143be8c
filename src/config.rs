//! # Configuration Module
//!
//! This module holds every tunable of the graph engine and knows where the
//! engine keeps its data by default.
//!
//! ## Data Storage
//!
//! The snapshot lives in the platform-standard data directory:
//! - Linux: `~/.local/share/muse-graph/graph_model.json`
//! - macOS: `~/Library/Application Support/muse-graph/graph_model.json`
//! - Windows: `%APPDATA%\muse-graph\graph_model.json`
//!
//! ## Config Files
//!
//! [`EngineConfig`] can be read from a JSON file. Every field has a
//! default, so a file only needs to name the values it changes:
//!
//! ```json
//! { "history_limit": 80, "maintenance": { "every_events": 500 } }
//! ```

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::TrackId;
use crate::error::ConfigError;

/// Name of the data subdirectory and of the default snapshot file.
const DATA_DIR_NAME: &str = "muse-graph";
const SNAPSHOT_FILE_NAME: &str = "graph_model.json";

/// Returns the platform-appropriate data directory, creating it if needed.
pub fn get_data_dir() -> Result<PathBuf, ConfigError> {
    let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
    let dir = data_dir.join(DATA_DIR_NAME);
    fs::create_dir_all(&dir).map_err(|source| ConfigError::Read { path: dir.clone(), source })?;
    Ok(dir)
}

/// Returns the default snapshot path inside [`get_data_dir`].
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path to `graph_model.json`, which may not exist yet
/// * `Err(ConfigError)` - If the data directory cannot be determined or created
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The muse-graph subdirectory cannot be created
///
/// # Examples
///
/// ```no_run
/// use muse_graph::config::get_snapshot_path;
///
/// let path = get_snapshot_path()?;
/// println!("Snapshot location: {}", path.display());
/// # Ok::<(), muse_graph::error::ConfigError>(())
/// ```
pub fn get_snapshot_path() -> Result<PathBuf, ConfigError> {
    Ok(get_data_dir()?.join(SNAPSHOT_FILE_NAME))
}

/// When the background worker re-ranks the graph and writes a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceTrigger {
    /// Each qualifying event triggers with this probability.
    Probabilistic(f64),
    /// Every n-th qualifying event triggers.
    EveryEvents(u64),
    /// Only [`crate::engine::GraphEngine::refresh_now`] triggers.
    Manual,
}

impl Default for MaintenanceTrigger {
    fn default() -> Self {
        Self::EveryEvents(100)
    }
}

/// Weights of the candidate score `w_edge * weight + w_rank * rank + w_listen * avg_listen`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub edge: f64,
    pub rank: f64,
    pub listen: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { edge: 0.3, rank: 0.3, listen: 0.4 }
    }
}

/// Every tunable of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Snapshot location; `None` keeps the engine purely in memory.
    pub snapshot_path: Option<PathBuf>,

    /// Fraction of a track that counts as a full listen.
    pub expected_listen_fraction: f64,
    pub quality_cap: f64,
    /// Listen quality at or above this reinforces the graph.
    pub strong_quality: f64,

    /// Listen ratio below this sends the request to the low-engagement tier.
    pub low_engagement_ratio: f64,
    /// Same-artist tracks need at least this listen ratio to be redirected to.
    pub good_listen_ratio: f64,
    /// Duration assumed for tracks never seen in the catalog.
    pub default_duration_seconds: f64,

    pub history_limit: usize,
    pub listen_sample_limit: usize,
    /// Number of most recent history entries excluded from candidate sets.
    pub recent_window: usize,

    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Ranking needs strictly more nodes than this.
    pub min_rank_nodes: usize,
    pub current_track_boost: f64,
    pub recency_window: usize,

    pub score_weights: ScoreWeights,
    pub diversity_low: f64,
    pub diversity_high: f64,
    pub top_rank_limit: usize,

    /// Returned when no track is known at all.
    pub sentinel_track: TrackId,
    pub maintenance: MaintenanceTrigger,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            expected_listen_fraction: 0.6,
            quality_cap: 1.5,
            strong_quality: 0.8,
            low_engagement_ratio: 0.15,
            good_listen_ratio: 0.5,
            default_duration_seconds: 180.0,
            history_limit: 50,
            listen_sample_limit: 100,
            recent_window: 3,
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1.0e-6,
            min_rank_nodes: 5,
            current_track_boost: 2.0,
            recency_window: 5,
            score_weights: ScoreWeights::default(),
            diversity_low: 0.8,
            diversity_high: 1.2,
            top_rank_limit: 20,
            sentinel_track: 0,
            maintenance: MaintenanceTrigger::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file and validate it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`] naming `path`, or the
    /// [`ConfigError::Invalid`] returned by [`EngineConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with an explicit snapshot path.
    pub fn with_snapshot_path(snapshot_path: PathBuf) -> Self {
        Self { snapshot_path: Some(snapshot_path), ..Self::default() }
    }

    /// Range the candidate score jitter is drawn from.
    pub fn diversity_range(&self) -> Range<f64> {
        self.diversity_low..self.diversity_high
    }

    /// Check every tunable the engine divides by, samples from or compares against.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field:
    /// - a non-finite scalar tunable
    /// - damping outside `[0, 1)`
    /// - an empty, non-positive or unbounded diversity range
    /// - zero-sized histories or a zero iteration cap
    /// - a maintenance probability outside `[0, 1]`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scalars = [
            ("expected_listen_fraction", self.expected_listen_fraction),
            ("quality_cap", self.quality_cap),
            ("strong_quality", self.strong_quality),
            ("low_engagement_ratio", self.low_engagement_ratio),
            ("good_listen_ratio", self.good_listen_ratio),
            ("default_duration_seconds", self.default_duration_seconds),
            ("tolerance", self.tolerance),
            ("current_track_boost", self.current_track_boost),
        ];
        for (field, value) in scalars {
            if !value.is_finite() {
                return Err(ConfigError::Invalid { field, reason: format!("{value} is not finite") });
            }
        }
        if !(0.0..1.0).contains(&self.damping) {
            return Err(ConfigError::Invalid {
                field: "damping",
                reason: format!("{} is outside [0, 1)", self.damping),
            });
        }
        let range = self.diversity_range();
        if range.is_empty() || range.start <= 0.0 || !range.end.is_finite() {
            return Err(ConfigError::Invalid {
                field: "diversity_low",
                reason: format!(
                    "range {}..{} must be non-empty and positive",
                    self.diversity_low, self.diversity_high
                ),
            });
        }
        if self.history_limit == 0 || self.listen_sample_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "history_limit",
                reason: "bounded histories need room for at least one entry".to_string(),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if let MaintenanceTrigger::Probabilistic(p) = self.maintenance {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid {
                    field: "maintenance",
                    reason: format!("probability {p} is outside [0, 1]"),
                });
            }
        }
        Ok(())
    }
}
