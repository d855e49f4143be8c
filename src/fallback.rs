//! # Fallback Chain
//!
//! Degraded strategies used when the graph path has nothing to offer. The
//! engine walks them in [`FallbackTier`] order and stops at the first one
//! that yields a track. Each tier returns `None` for an empty candidate
//! set instead of failing, so the chain always reaches the identity or
//! sentinel tier in the worst case.

use std::collections::HashSet;
use std::fmt;

use log::trace;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::{Catalog, Track, TrackId};
use crate::config::EngineConfig;
use crate::graph::TransitionStore;
use crate::listen;
use crate::profile::ListenStats;
use crate::rank::RankMap;
use crate::selector::{exclude_recent, weighted_choice};

/// Fallback strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FallbackTier {
    /// Previous track was barely played: same artist, well-listened tracks.
    LowEngagement,
    /// Previous track has no graph successors: same artist, by listen time.
    SameArtist,
    /// Highest globally ranked tracks.
    TopRank,
    /// Anything in the catalog.
    UniformRandom,
    /// The previous track itself.
    Identity,
    /// Nothing is known at all.
    Sentinel,
}

impl FallbackTier {
    pub const ALL: [FallbackTier; 6] = [
        FallbackTier::LowEngagement,
        FallbackTier::SameArtist,
        FallbackTier::TopRank,
        FallbackTier::UniformRandom,
        FallbackTier::Identity,
        FallbackTier::Sentinel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FallbackTier::LowEngagement => "low-engagement",
            FallbackTier::SameArtist => "same-artist",
            FallbackTier::TopRank => "top-rank",
            FallbackTier::UniformRandom => "uniform-random",
            FallbackTier::Identity => "identity",
            FallbackTier::Sentinel => "sentinel",
        }
    }
}

impl fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of engine state shared by the tiers.
pub struct FallbackContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub store: &'a TransitionStore,
    pub listens: &'a ListenStats,
    pub ranks: &'a RankMap,
    pub config: &'a EngineConfig,
    /// The user's last `recent_window` tracks.
    pub recent: HashSet<TrackId>,
    /// The user's whole bounded history.
    pub history: HashSet<TrackId>,
}

impl FallbackContext<'_> {
    pub fn listen_time_ratio(&self, track: TrackId) -> f64 {
        listen::listen_time_ratio(self.listens.average(track), self.store.duration(track), self.config)
    }

    fn artist_candidates(&self, prev: &Track) -> Vec<TrackId> {
        let tracks = self.catalog.artist_tracks(prev.artist_id).unwrap_or_default();
        exclude_recent(tracks, &self.recent)
            .into_iter()
            .filter(|&track| track != prev.id)
            .collect()
    }
}

/// Same-artist tracks that listeners usually get through, weighted by that ratio.
pub fn low_engagement_redirect<R: Rng + ?Sized>(
    rng: &mut R,
    ctx: &FallbackContext<'_>,
    prev: &Track,
) -> Option<TrackId> {
    let good: Vec<(TrackId, f64)> = ctx
        .artist_candidates(prev)
        .into_iter()
        .map(|track| (track, ctx.listen_time_ratio(track)))
        .filter(|&(_, ratio)| ratio >= ctx.config.good_listen_ratio)
        .collect();
    trace!("Low-engagement redirect from {} has {} candidates", prev.id, good.len());
    weighted_choice(rng, &good)
}

/// Same-artist tracks weighted by `1 + average listen time`.
pub fn same_artist<R: Rng + ?Sized>(
    rng: &mut R,
    ctx: &FallbackContext<'_>,
    prev: &Track,
) -> Option<TrackId> {
    let weighted: Vec<(TrackId, f64)> = ctx
        .artist_candidates(prev)
        .into_iter()
        .map(|track| (track, 1.0 + ctx.listens.average(track)))
        .collect();
    trace!("Same-artist fallback from {} has {} candidates", prev.id, weighted.len());
    weighted_choice(rng, &weighted)
}

/// Top globally ranked tracks not in the user's history, weighted by
/// `rank * (1 + average listen time)`.
pub fn top_rank<R: Rng + ?Sized>(rng: &mut R, ctx: &FallbackContext<'_>) -> Option<TrackId> {
    let top: Vec<TrackId> =
        ctx.ranks.top(ctx.config.top_rank_limit).into_iter().map(|(track, _)| track).collect();
    let weighted: Vec<(TrackId, f64)> = exclude_recent(top, &ctx.history)
        .into_iter()
        .map(|track| (track, ctx.ranks.get(track) * (1.0 + ctx.listens.average(track))))
        .collect();
    weighted_choice(rng, &weighted)
}

/// Any catalog track other than `exclude`.
pub fn uniform_random<R: Rng + ?Sized>(
    rng: &mut R,
    catalog: &dyn Catalog,
    exclude: Option<TrackId>,
) -> Option<TrackId> {
    let tracks: Vec<TrackId> =
        catalog.track_ids().into_iter().filter(|&track| Some(track) != exclude).collect();
    tracks.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::from_tracks((1..=5).map(|id| Track {
            id,
            artist_id: if id <= 4 { 10 } else { 20 },
            duration_seconds: 100.0,
        }))
    }

    fn store_for(catalog: &InMemoryCatalog) -> TransitionStore {
        let mut store = TransitionStore::new();
        for id in catalog.track_ids() {
            if let Some(track) = catalog.track(id) {
                store.observe(&track);
            }
        }
        store
    }

    fn context<'a>(
        catalog: &'a InMemoryCatalog,
        store: &'a TransitionStore,
        listens: &'a ListenStats,
        ranks: &'a RankMap,
        config: &'a EngineConfig,
        recent: &[TrackId],
    ) -> FallbackContext<'a> {
        FallbackContext {
            catalog,
            store,
            listens,
            ranks,
            config,
            recent: recent.iter().copied().collect(),
            history: recent.iter().copied().collect(),
        }
    }

    #[test]
    fn test_low_engagement_requires_good_ratio() {
        let catalog = catalog();
        let store = store_for(&catalog);
        let config = EngineConfig::default();
        let ranks = RankMap::new();
        let mut listens = ListenStats::new(100);
        listens.push_listen_time(2, 90.0);
        listens.push_listen_time(3, 20.0);
        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[1]);
        let prev = catalog.track(1).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            assert_eq!(low_engagement_redirect(&mut rng, &ctx, &prev), Some(2));
        }
    }

    #[test]
    fn test_low_engagement_falls_through_without_good_tracks() {
        let catalog = catalog();
        let store = store_for(&catalog);
        let config = EngineConfig::default();
        let ranks = RankMap::new();
        let listens = ListenStats::new(100);
        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[]);
        let prev = catalog.track(1).unwrap();
        assert_eq!(low_engagement_redirect(&mut StdRng::seed_from_u64(1), &ctx, &prev), None);
    }

    #[test]
    fn test_same_artist_excludes_previous_and_recent() {
        let catalog = catalog();
        let store = store_for(&catalog);
        let config = EngineConfig::default();
        let ranks = RankMap::new();
        let listens = ListenStats::new(100);
        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[2, 3]);
        let prev = catalog.track(1).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            assert_eq!(same_artist(&mut rng, &ctx, &prev), Some(4));
        }
        // Only the previous track itself by this artist
        let lonely = catalog.track(5).unwrap();
        assert_eq!(same_artist(&mut rng, &ctx, &lonely), None);
    }

    #[test]
    fn test_top_rank_skips_history_unless_empty() {
        let catalog = catalog();
        let store = store_for(&catalog);
        let config = EngineConfig::default();
        let ranks = RankMap::from_iter([(1, 0.6), (2, 0.4)]);
        let listens = ListenStats::new(100);
        let mut rng = StdRng::seed_from_u64(2);

        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[1]);
        assert_eq!(top_rank(&mut rng, &ctx), Some(2));

        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[1, 2]);
        assert!(matches!(top_rank(&mut rng, &ctx), Some(1) | Some(2)));

        let empty = RankMap::new();
        let ctx = context(&catalog, &store, &listens, &empty, &config, &[]);
        assert_eq!(top_rank(&mut rng, &ctx), None);
    }

    /// How often `pick` returns `track` over `draws` seeded draws.
    fn frequency(draws: usize, track: TrackId, mut pick: impl FnMut(&mut StdRng) -> Option<TrackId>) -> f64 {
        let mut rng = StdRng::seed_from_u64(17);
        let hits = (0..draws).filter(|_| pick(&mut rng) == Some(track)).count();
        hits as f64 / draws as f64
    }

    #[test]
    fn test_same_artist_weights_by_average_listen() {
        let catalog = catalog();
        let store = store_for(&catalog);
        let config = EngineConfig::default();
        let ranks = RankMap::new();
        let mut listens = ListenStats::new(100);
        listens.push_listen_time(2, 1000.0);
        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[]);
        let prev = catalog.track(1).unwrap();

        // 1001 against 1 and 1
        let share = frequency(500, 2, |rng| same_artist(rng, &ctx, &prev));
        assert!(share > 0.9, "track 2 share {share}");
    }

    #[test]
    fn test_low_engagement_weights_by_listen_ratio() {
        let catalog = catalog();
        let store = store_for(&catalog);
        let config = EngineConfig::default();
        let ranks = RankMap::new();
        let mut listens = ListenStats::new(100);
        listens.push_listen_time(2, 100.0);
        listens.push_listen_time(3, 50.0);
        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[]);
        let prev = catalog.track(1).unwrap();

        // Ratios 1.0 and 0.5; track 4 is never heard and filtered out
        let share = frequency(3000, 2, |rng| low_engagement_redirect(rng, &ctx, &prev));
        assert!((0.6..0.73).contains(&share), "track 2 share {share}");
        assert_eq!(frequency(200, 4, |rng| low_engagement_redirect(rng, &ctx, &prev)), 0.0);
    }

    #[test]
    fn test_top_rank_weights_by_rank_and_listen() {
        let catalog = catalog();
        let store = store_for(&catalog);
        let config = EngineConfig::default();
        let ranks = RankMap::from_iter([(1, 0.5), (2, 0.5)]);
        let mut listens = ListenStats::new(100);
        listens.push_listen_time(2, 9.0);
        let ctx = context(&catalog, &store, &listens, &ranks, &config, &[]);

        // 0.5 * (1 + 9) against 0.5 * 1
        let share = frequency(2000, 2, |rng| top_rank(rng, &ctx));
        assert!(share > 0.85, "track 2 share {share}");
        assert!(frequency(2000, 1, |rng| top_rank(rng, &ctx)) > 0.0);
    }

    #[test]
    fn test_uniform_random_excludes_previous() {
        let catalog = InMemoryCatalog::from_tracks([
            Track { id: 1, artist_id: 1, duration_seconds: 1.0 },
            Track { id: 2, artist_id: 1, duration_seconds: 1.0 },
        ]);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            assert_eq!(uniform_random(&mut rng, &catalog, Some(1)), Some(2));
        }
        assert_eq!(uniform_random(&mut rng, &InMemoryCatalog::new(), None), None);
    }

    #[test]
    fn test_tier_order() {
        let mut sorted = FallbackTier::ALL;
        sorted.sort();
        assert_eq!(sorted, FallbackTier::ALL);
        assert_eq!(FallbackTier::TopRank.to_string(), "top-rank");
    }
}
