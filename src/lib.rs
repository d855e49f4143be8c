//! Graph-based sequential music recommendation.
//!
//! Given the track a user just played and how long they listened, pick the
//! next track. Strong plays reinforce a weighted transition graph between
//! tracks (and a parallel one between artists); a PageRank over that graph,
//! personalized per user when possible, ranks candidate successors. When the
//! graph has nothing to say a chain of fallbacks takes over, so a
//! recommendation is always produced.
//!
//! Core modules:
//! - [`engine`] - `GraphEngine`, the per-request entry point and lifecycle
//! - [`graph`] - Transition graphs and edge reinforcement
//! - [`rank`] - Global and personalized PageRank
//! - [`selector`] - Candidate scoring and weighted sampling
//! - [`fallback`] - Degraded strategies, tried in order
//!
//! ### Supporting Modules
//!
//! - [`catalog`] - Track and artist lookups, JSONL catalog loading
//! - [`listen`] - Listen quality and ratio signals
//! - [`profile`] - Per-user history and preferences, listen statistics
//! - [`snapshot`] - Whole-model persistence
//! - [`worker`] - Background re-rank and save thread
//! - [`recommender`] - The `Recommender` trait and the random baseline
//! - [`config`] - Engine tunables and data directory management
//! - [`error`] - Error types
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use muse_graph::{EngineConfig, GraphEngine, InMemoryCatalog};
//!
//! let catalog = InMemoryCatalog::from_jsonl("catalog.jsonl".as_ref())?;
//! let config = EngineConfig::with_snapshot_path(muse_graph::config::get_snapshot_path()?);
//! let engine = GraphEngine::open(config, Arc::new(catalog));
//!
//! // User 7 listened to 150 s of track 12
//! let next = engine.recommend_next(7, Some(12), 150.0);
//! println!("Play {next} next");
//!
//! engine.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Listen Signals
//!
//! - Quality is `listened / (0.6 * duration)`, capped at 1.5. A play with
//!   quality of at least 0.8 is strong and adds `1 + quality` to the edge
//!   from the user's previous track.
//! - A play covering less than 15% of the track redirects to same-artist
//!   tracks other listeners usually finish.
//!
//! ## Fallback Order
//!
//! Graph successors, then same artist, top ranked, uniform over the
//! catalog, the previous track itself, and finally a configured sentinel
//! id when the catalog is empty.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod graph;
pub mod listen;
pub mod profile;
pub mod rank;
pub mod recommender;
pub mod selector;
pub mod snapshot;
pub mod worker;

pub use catalog::{ArtistId, Catalog, InMemoryCatalog, Track, TrackId, UserId};
pub use config::{EngineConfig, MaintenanceTrigger};
pub use engine::{EngineStats, GraphEngine, Recommendation, Source};
pub use error::Degradation;
pub use fallback::FallbackTier;
pub use recommender::{RandomRecommender, Recommender};
pub use snapshot::Snapshot;
