//! # Graph Engine
//!
//! [`GraphEngine`] owns the whole model: transition graphs, user profiles,
//! listen statistics and the published global rank. One call to
//! [`GraphEngine::recommend`] does the per-request work:
//!
//! 1. score the previous play and update history, preferences, listen
//!    samples and (for strong plays) the observed transition;
//! 2. redirect barely-played tracks to well-listened tracks by the same artist;
//! 3. sample a graph successor of the previous track;
//! 4. otherwise walk the [`FallbackTier`] chain down to the identity or
//!    sentinel answer.
//!
//! Mutations take the state write lock briefly. Scoring runs under the read
//! lock against the global rank loaded from an [`ArcSwap`], which the
//! maintenance worker replaces after each full re-rank. Nothing in the
//! request path returns an error to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use rand::Rng;

use crate::catalog::{Catalog, Track, TrackId, UserId};
use crate::config::{EngineConfig, MaintenanceTrigger};
use crate::error::Degradation;
use crate::fallback::{self, FallbackContext, FallbackTier};
use crate::graph::TransitionStore;
use crate::listen;
use crate::profile::{ListenStats, UserProfiles};
use crate::rank::{self, RankMap};
use crate::recommender::Recommender;
use crate::selector;
use crate::snapshot::Snapshot;
use crate::worker::MaintenanceWorker;

/// Where a recommendation came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// Sampled from the previous track's graph successors.
    Graph,
    /// Sampled from graph successors scored against the global rank,
    /// because the personalized solve failed.
    GlobalRank { reason: Degradation },
    /// Produced by a fallback tier, with the condition that sent it there.
    Fallback { tier: FallbackTier, reason: Degradation },
}

/// A recommended track and how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub track: TrackId,
    pub source: Source,
}

impl Recommendation {
    fn graph(track: TrackId) -> Self {
        Self { track, source: Source::Graph }
    }

    fn fallback(track: TrackId, tier: FallbackTier, reason: Degradation) -> Self {
        debug!("Recommending {track} via {tier} fallback: {reason}");
        Self { track, source: Source::Fallback { tier, reason } }
    }

    pub fn is_degraded(&self) -> bool {
        !matches!(self.source, Source::Graph)
    }

    pub fn tier(&self) -> Option<FallbackTier> {
        match &self.source {
            Source::Graph | Source::GlobalRank { .. } => None,
            Source::Fallback { tier, .. } => Some(*tier),
        }
    }
}

/// Counts for diagnostics and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub track_nodes: usize,
    pub track_edges: usize,
    pub artist_nodes: usize,
    pub artist_edges: usize,
    /// Users with a live profile.
    pub users: usize,
    /// Size of the published global rank; 0 until the first re-rank.
    pub ranked_tracks: usize,
    /// Plays of catalog tracks seen since startup.
    pub events: u64,
}

/// Mutable model guarded by one lock.
#[derive(Debug)]
struct EngineState {
    store: TransitionStore,
    profiles: UserProfiles,
    listens: ListenStats,
}

impl EngineState {
    fn from_snapshot(snapshot: Snapshot, config: &EngineConfig) -> Self {
        Self {
            store: TransitionStore::from_parts(
                snapshot.track_graph,
                snapshot.artist_graph,
                snapshot.durations,
            ),
            profiles: UserProfiles::from_histories(snapshot.user_history, config.history_limit),
            listens: ListenStats::from_samples(snapshot.listen_times, config.listen_sample_limit),
        }
    }

    fn listen_time_ratio(&self, track: TrackId, config: &EngineConfig) -> f64 {
        listen::listen_time_ratio(self.listens.average(track), self.store.duration(track), config)
    }
}

/// State shared between request handlers and the maintenance worker.
struct Shared {
    config: EngineConfig,
    catalog: Arc<dyn Catalog>,
    state: RwLock<EngineState>,
    ranks: ArcSwap<RankMap>,
    events: AtomicU64,
}

impl Shared {
    /// Full re-rank, then snapshot write. Failures are logged and the
    /// previous rank stays published.
    fn refresh(&self) {
        let biased = {
            let state = self.state.read();
            rank::listen_biased(&state.store.tracks, |track| state.listen_time_ratio(track, &self.config))
        };

        match rank::global_rank(&biased, &self.config) {
            Ok(ranks) => {
                info!("Published global rank over {} tracks", ranks.len());
                self.ranks.store(Arc::new(ranks));
            }
            Err(e) => warn!("Global re-rank skipped, keeping previous rank: {e}"),
        }

        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.config.snapshot_path else {
            return;
        };
        if let Err(e) = self.snapshot().save(path) {
            warn!("Snapshot save failed, continuing in memory: {e}");
        }
    }

    fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            track_graph: state.store.tracks.clone(),
            artist_graph: state.store.artists.clone(),
            track_ranks: RankMap::clone(&self.ranks.load()),
            listen_times: state.listens.to_samples(),
            durations: state.store.durations().clone(),
            user_history: state.profiles.histories(),
            ..Snapshot::default()
        }
    }
}

/// Online graph-based next-track recommender.
pub struct GraphEngine {
    shared: Arc<Shared>,
    worker: Option<MaintenanceWorker>,
}

impl GraphEngine {
    /// Load the configured snapshot (or start empty) and start the
    /// maintenance worker. Never fails: unreadable snapshots are logged.
    pub fn open(config: EngineConfig, catalog: Arc<dyn Catalog>) -> Self {
        let snapshot = match &config.snapshot_path {
            Some(path) => Snapshot::load_or_default(path),
            None => Snapshot::default(),
        };
        Self::from_snapshot(snapshot, config, catalog)
    }

    /// Engine without persistence, whatever the config says.
    pub fn in_memory(config: EngineConfig, catalog: Arc<dyn Catalog>) -> Self {
        let config = EngineConfig { snapshot_path: None, ..config };
        Self::from_snapshot(Snapshot::default(), config, catalog)
    }

    /// Engine restored from an already loaded snapshot.
    ///
    /// A config that fails [`EngineConfig::validate`] is replaced by the
    /// defaults, keeping only its snapshot path.
    pub fn from_snapshot(snapshot: Snapshot, config: EngineConfig, catalog: Arc<dyn Catalog>) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Invalid engine config, using defaults: {e}");
                EngineConfig { snapshot_path: config.snapshot_path, ..EngineConfig::default() }
            }
        };
        let ranks = ArcSwap::from_pointee(snapshot.track_ranks.clone());
        let state = EngineState::from_snapshot(snapshot, &config);
        let shared = Arc::new(Shared {
            config,
            catalog,
            state: RwLock::new(state),
            ranks,
            events: AtomicU64::new(0),
        });

        let task = Arc::clone(&shared);
        let worker = match MaintenanceWorker::spawn(move || task.refresh()) {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!("Could not start maintenance worker, refreshing inline: {e}");
                None
            }
        };

        Self { shared, worker }
    }

    /// The configuration in effect, after validation.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Next track for `user`. Total: always returns a track id.
    pub fn recommend_next(&self, user: UserId, prev_track: Option<TrackId>, prev_track_time: f64) -> TrackId {
        self.recommend(user, prev_track, prev_track_time).track
    }

    /// Next track for `user`, with its source.
    ///
    /// # Arguments
    ///
    /// * `user` - Listener the recommendation is for
    /// * `prev_track` - Track that just ended, `None` at the start of a session
    /// * `prev_track_time` - How much of it was played, in the same unit as
    ///   catalog durations. Negative and non-finite values count as 0.
    ///
    /// # Returns
    ///
    /// Always a [`Recommendation`]; conditions that stop the graph path are
    /// carried in its [`Source`] instead of being returned as errors.
    pub fn recommend(&self, user: UserId, prev_track: Option<TrackId>, prev_track_time: f64) -> Recommendation {
        self.recommend_with_rng(&mut rand::thread_rng(), user, prev_track, prev_track_time)
    }

    /// [`GraphEngine::recommend`] with a caller-supplied random source.
    pub fn recommend_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        user: UserId,
        prev_track: Option<TrackId>,
        prev_track_time: f64,
    ) -> Recommendation {
        let config = &self.shared.config;
        let catalog = self.shared.catalog.as_ref();
        let prev_track_time = if prev_track_time.is_finite() { prev_track_time.max(0.0) } else { 0.0 };

        let Some(prev_id) = prev_track else {
            return match fallback::uniform_random(rng, catalog, None) {
                Some(track) => {
                    Recommendation::fallback(track, FallbackTier::UniformRandom, Degradation::NoPreviousTrack)
                }
                None => self.sentinel(),
            };
        };

        let prev = catalog.track(prev_id);
        let quality = match &prev {
            Some(track) => Some(self.observe_play(rng, user, track, prev_track_time)),
            None => {
                debug!("Previous track {prev_id} missing from catalog, skipping bookkeeping");
                None
            }
        };

        if let Some(track) = &prev {
            let ratio = listen::listen_ratio(prev_track_time, track.duration_seconds);
            if ratio < config.low_engagement_ratio {
                let state = self.shared.state.read();
                let ranks = self.shared.ranks.load();
                let ctx = self.fallback_context(&state, &ranks, user);
                if let Some(next) = fallback::low_engagement_redirect(rng, &ctx, track) {
                    return Recommendation::fallback(
                        next,
                        FallbackTier::LowEngagement,
                        Degradation::LowEngagement { ratio },
                    );
                }
            }
        }

        let global = self.shared.ranks.load_full();
        let picked = {
            let state = self.shared.state.read();
            if state.store.tracks.successors(prev_id).is_empty() {
                None
            } else {
                let (ranks, rank_failure) =
                    match rank::personalized_rank(&state.store.tracks, state.profiles.get(user), prev_id, &global, config)
                    {
                        Ok(ranks) => (ranks, None),
                        Err(e) => {
                            warn!("Personalized rank for user {user} at track {prev_id} failed, using global rank: {e}");
                            (Arc::clone(&global), Some(e))
                        }
                    };
                let recent = state.profiles.recent_set(user, config.recent_window);
                let next = selector::select_successor(
                    rng,
                    &state.store.tracks,
                    prev_id,
                    &recent,
                    &ranks,
                    &state.listens,
                    config,
                );
                Some((next, rank_failure))
            }
        };

        let reason = match picked {
            Some((Some(next), rank_failure)) => {
                if let (Some(prev), Some(quality)) = (&prev, quality) {
                    self.reinforce(prev, next, quality);
                }
                return match rank_failure {
                    None => Recommendation::graph(next),
                    Some(e) => {
                        let reason = Degradation::RankSolveFailure(e);
                        debug!("Recommending {next} from graph successors on the global rank: {reason}");
                        Recommendation { track: next, source: Source::GlobalRank { reason } }
                    }
                };
            }
            Some((None, _)) => Degradation::EmptyCandidateSet { stage: "graph successors" },
            None => match &prev {
                Some(_) => Degradation::NoSuccessors(prev_id),
                None => Degradation::MissingTrack(prev_id),
            },
        };

        self.fallback_chain(rng, user, prev_id, prev.as_ref(), reason)
    }

    /// Tiers after the graph path: same artist (when the track has no
    /// successors), top rank, uniform random, identity, sentinel.
    fn fallback_chain<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        user: UserId,
        prev_id: TrackId,
        prev: Option<&Track>,
        mut reason: Degradation,
    ) -> Recommendation {
        let catalog = self.shared.catalog.as_ref();
        let state = self.shared.state.read();
        let ranks = self.shared.ranks.load();
        let ctx = self.fallback_context(&state, &ranks, user);

        let no_successors = matches!(reason, Degradation::NoSuccessors(_));
        if let (Some(track), true) = (prev, no_successors) {
            if catalog.artist_tracks(track.artist_id).is_none() {
                debug!("Artist {} missing from catalog", track.artist_id);
                reason = Degradation::MissingArtist(track.artist_id);
            } else if let Some(next) = fallback::same_artist(rng, &ctx, track) {
                return Recommendation::fallback(next, FallbackTier::SameArtist, reason);
            }
        }

        if let Some(next) = fallback::top_rank(rng, &ctx) {
            return Recommendation::fallback(next, FallbackTier::TopRank, reason);
        }

        if let Some(next) = fallback::uniform_random(rng, catalog, Some(prev_id)) {
            return Recommendation::fallback(next, FallbackTier::UniformRandom, reason);
        }

        if catalog.is_empty() && state.store.tracks.is_empty() {
            return self.sentinel();
        }
        Recommendation::fallback(prev_id, FallbackTier::Identity, reason)
    }

    fn fallback_context<'a>(
        &'a self,
        state: &'a EngineState,
        ranks: &'a RankMap,
        user: UserId,
    ) -> FallbackContext<'a> {
        let config = &self.shared.config;
        FallbackContext {
            catalog: self.shared.catalog.as_ref(),
            store: &state.store,
            listens: &state.listens,
            ranks,
            config,
            recent: state.profiles.recent_set(user, config.recent_window),
            history: state.profiles.recent_set(user, config.history_limit),
        }
    }

    fn sentinel(&self) -> Recommendation {
        let track = self.shared.config.sentinel_track;
        warn!("Catalog is empty, returning sentinel track {track}");
        Recommendation { track, source: Source::Fallback { tier: FallbackTier::Sentinel, reason: Degradation::CatalogEmpty } }
    }

    /// Bookkeeping for one play of `track`. Returns its listen quality.
    fn observe_play<R: Rng + ?Sized>(&self, rng: &mut R, user: UserId, track: &Track, listened: f64) -> f64 {
        let config = &self.shared.config;
        let quality = listen::listen_quality(listened, track.duration_seconds, config);
        let catalog = self.shared.catalog.as_ref();

        {
            let mut state = self.shared.state.write();
            state.store.observe(track);

            let last = state.profiles.get(user).and_then(|profile| profile.last_track());
            if let Some(last) = last.filter(|&last| last != track.id) {
                match catalog.track(last) {
                    Some(last_track) => {
                        state.store.record_transition(&last_track, track, quality, config);
                    }
                    None => debug!("Track {last} left the catalog, transition to {} not recorded", track.id),
                }
            }

            state.listens.push_listen_time(track.id, listened);
            state.profiles.push_history(user, track.id);
            state.profiles.bump_preference(user, track.id, track.artist_id, quality);
        }

        self.maybe_schedule_maintenance(rng);
        quality
    }

    /// Reinforce the edge the graph path just recommended.
    fn reinforce(&self, prev: &Track, next: TrackId, quality: f64) {
        let Some(next_track) = self.shared.catalog.track(next) else {
            debug!("Recommended track {next} missing from catalog, edge not reinforced");
            return;
        };
        let mut state = self.shared.state.write();
        state.store.record_transition(prev, &next_track, quality, &self.shared.config);
    }

    fn maybe_schedule_maintenance<R: Rng + ?Sized>(&self, rng: &mut R) {
        let count = self.shared.events.fetch_add(1, Ordering::Relaxed) + 1;
        let due = match self.shared.config.maintenance {
            MaintenanceTrigger::Probabilistic(p) => p > 0.0 && rng.gen_bool(p.min(1.0)),
            MaintenanceTrigger::EveryEvents(n) => n > 0 && count % n == 0,
            MaintenanceTrigger::Manual => false,
        };
        if !due {
            return;
        }
        match &self.worker {
            Some(worker) => {
                worker.request_refresh();
            }
            None => self.shared.refresh(),
        }
    }

    /// Re-rank and save on the calling thread.
    pub fn refresh_now(&self) {
        self.shared.refresh();
    }

    /// Write the snapshot now, if a path is configured.
    pub fn save_now(&self) {
        self.shared.save();
    }

    /// Current model in snapshot form.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot()
    }

    /// Currently published global rank.
    pub fn global_rank(&self) -> Arc<RankMap> {
        self.shared.ranks.load_full()
    }

    /// Rank used for `user` at `current`; the global rank when it cannot be personalized.
    pub fn personalized_rank(&self, user: UserId, current: TrackId) -> Arc<RankMap> {
        let global = self.shared.ranks.load_full();
        let state = self.shared.state.read();
        rank::personalized_rank(&state.store.tracks, state.profiles.get(user), current, &global, &self.shared.config)
            .unwrap_or_else(|e| {
                warn!("Personalized rank for user {user} failed, using global rank: {e}");
                global
            })
    }

    /// Weight of the track edge `source → dest`, if present.
    pub fn edge_weight(&self, source: TrackId, dest: TrackId) -> Option<f64> {
        self.shared.state.read().store.tracks.weight(source, dest)
    }

    /// The user's history, most recent last.
    pub fn history(&self, user: UserId) -> Vec<TrackId> {
        self.shared
            .state
            .read()
            .profiles
            .get(user)
            .map(|profile| profile.history().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Session end: forget everything about `user`.
    pub fn end_session(&self, user: UserId) {
        if self.shared.state.write().profiles.remove(user) {
            debug!("Session ended for user {user}");
        }
    }

    /// Current graph, profile and rank sizes.
    pub fn stats(&self) -> EngineStats {
        let state = self.shared.state.read();
        EngineStats {
            track_nodes: state.store.tracks.node_count(),
            track_edges: state.store.tracks.edge_count(),
            artist_nodes: state.store.artists.node_count(),
            artist_edges: state.store.artists.edge_count(),
            users: state.profiles.len(),
            ranked_tracks: self.shared.ranks.load().len(),
            events: self.shared.events.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker, then write a final snapshot.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.shared.save();
        info!("Graph engine shut down");
    }
}

impl Recommender for GraphEngine {
    fn recommend_next(&self, user: UserId, prev_track: Option<TrackId>, prev_track_time: f64) -> TrackId {
        GraphEngine::recommend_next(self, user, prev_track, prev_track_time)
    }
}
