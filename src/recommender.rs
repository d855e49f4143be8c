//! # Recommenders
//!
//! The next-track interface shared by every recommender.
//!
//! [`crate::engine::GraphEngine`] is the graph-based implementation;
//! [`RandomRecommender`] is the catalog-uniform baseline it is compared
//! against in replays.

use std::sync::Arc;

use log::warn;
use rand::seq::SliceRandom;

use crate::catalog::{Catalog, TrackId, UserId};

/// Something that picks the next track for a user.
///
/// Implementations are total: they always return a track id, using a
/// sentinel when nothing is known.
pub trait Recommender: Send + Sync {
    fn recommend_next(&self, user: UserId, prev_track: Option<TrackId>, prev_track_time: f64) -> TrackId;
}

/// Uniform pick over the catalog, ignoring all context.
pub struct RandomRecommender {
    catalog: Arc<dyn Catalog>,
    sentinel: TrackId,
}

impl RandomRecommender {
    pub fn new(catalog: Arc<dyn Catalog>, sentinel: TrackId) -> Self {
        Self { catalog, sentinel }
    }
}

impl Recommender for RandomRecommender {
    fn recommend_next(&self, _user: UserId, _prev_track: Option<TrackId>, _prev_track_time: f64) -> TrackId {
        match self.catalog.track_ids().choose(&mut rand::thread_rng()) {
            Some(&track) => track,
            None => {
                warn!("Catalog is empty, returning sentinel track {}", self.sentinel);
                self.sentinel
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, Track};

    #[test]
    fn test_random_recommender_stays_in_catalog() {
        let catalog = Arc::new(InMemoryCatalog::from_tracks(
            (1..=4).map(|id| Track { id, artist_id: 1, duration_seconds: 60.0 }),
        ));
        let recommender = RandomRecommender::new(catalog, 0);
        for _ in 0..50 {
            assert!((1..=4).contains(&recommender.recommend_next(1, Some(2), 30.0)));
        }
    }

    #[test]
    fn test_random_recommender_empty_catalog() {
        let recommender = RandomRecommender::new(Arc::new(InMemoryCatalog::new()), 7);
        assert_eq!(recommender.recommend_next(1, None, 0.0), 7);
    }
}
