//! # Error Types
//!
//! Library modules return the typed errors below. None of them reach the
//! caller of [`crate::engine::GraphEngine::recommend_next`]: the engine
//! matches on them, logs the condition, and moves to the next fallback
//! tier. The binary wraps everything in `anyhow` for reporting.

use std::path::PathBuf;

use crate::catalog::{ArtistId, TrackId};

/// Errors raised while reading a catalog file.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while loading or writing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot {0} does not exist")]
    Missing(PathBuf),

    #[error("I/O error on snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot {path} could not be decoded: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to replace {path} with the new snapshot: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the iterative rank solve.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RankError {
    #[error("graph has {nodes} nodes, at least {required} needed")]
    TooFewNodes { nodes: usize, required: usize },

    #[error("personalization vector has no mass on graph nodes")]
    EmptyPersonalization,

    #[error("power iteration did not converge after {iterations} iterations (residual {residual:.3e})")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("rank vector became non-finite")]
    NonFinite,
}

/// Errors from reading an engine configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine the platform data directory")]
    NoDataDir,

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Why a recommendation left the graph path.
///
/// Attached to every degraded [`crate::engine::Recommendation`] so callers
/// and logs can tell a normal cold-start fallback from missing data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Degradation {
    #[error("no previous track supplied")]
    NoPreviousTrack,

    #[error("track {0} is not in the catalog")]
    MissingTrack(TrackId),

    #[error("artist {0} is not in the catalog")]
    MissingArtist(ArtistId),

    #[error("listen ratio {ratio:.3} is below the low-engagement threshold")]
    LowEngagement { ratio: f64 },

    #[error("track {0} has no graph successors")]
    NoSuccessors(TrackId),

    #[error("candidate set for {stage} was empty")]
    EmptyCandidateSet { stage: &'static str },

    #[error("rank solve failed: {0}")]
    RankSolveFailure(RankError),

    #[error("catalog is empty")]
    CatalogEmpty,
}
