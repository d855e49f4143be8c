//! # Candidate Selection
//!
//! Scoring and sampling over graph successors.
//!
//! Each successor of the current track is scored by
//! `0.3 * edge weight + 0.3 * rank + 0.4 * average listen time`, jittered by
//! a uniform factor from the diversity range so repeated requests do not
//! always pick the same edge, and sampled proportionally to the result.

use std::collections::HashSet;

use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::catalog::TrackId;
use crate::config::EngineConfig;
use crate::graph::TransitionGraph;
use crate::profile::ListenStats;
use crate::rank::RankMap;

/// A successor with its jittered score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub track: TrackId,
    pub score: f64,
}

/// Sample one item proportionally to its weight.
///
/// Falls back to a uniform pick when the weights carry no usable mass
/// (all zero, negative or non-finite). `None` only for an empty slice.
pub fn weighted_choice<R: Rng + ?Sized>(rng: &mut R, items: &[(TrackId, f64)]) -> Option<TrackId> {
    if items.is_empty() {
        return None;
    }
    let usable = items.iter().all(|(_, w)| w.is_finite() && *w >= 0.0);
    if usable {
        if let Ok(dist) = WeightedIndex::new(items.iter().map(|(_, w)| *w)) {
            return Some(items[dist.sample(rng)].0);
        }
    }
    items.choose(rng).map(|(track, _)| *track)
}

/// Drop recently played tracks unless that would leave nothing.
pub fn exclude_recent(candidates: Vec<TrackId>, recent: &HashSet<TrackId>) -> Vec<TrackId> {
    let filtered: Vec<TrackId> =
        candidates.iter().copied().filter(|track| !recent.contains(track)).collect();
    if filtered.is_empty() {
        candidates
    } else {
        filtered
    }
}

/// Multiplicative score noise; 1.0 when the configured range cannot be sampled.
fn diversity_factor<R: Rng + ?Sized>(rng: &mut R, config: &EngineConfig) -> f64 {
    let range = config.diversity_range();
    if range.is_empty() || !range.start.is_finite() || !range.end.is_finite() {
        return 1.0;
    }
    rng.gen_range(range)
}

/// Score every eligible successor of `current`.
pub fn score_candidates<R: Rng + ?Sized>(
    rng: &mut R,
    graph: &TransitionGraph<TrackId>,
    current: TrackId,
    recent: &HashSet<TrackId>,
    ranks: &RankMap,
    listens: &ListenStats,
    config: &EngineConfig,
) -> Vec<ScoredCandidate> {
    let weights = config.score_weights;
    exclude_recent(graph.successors(current), recent)
        .into_iter()
        .map(|track| {
            let edge = graph.weight(current, track).unwrap_or(0.0);
            let base =
                weights.edge * edge + weights.rank * ranks.get(track) + weights.listen * listens.average(track);
            let jitter = diversity_factor(rng, config);
            ScoredCandidate { track, score: base * jitter }
        })
        .collect()
}

/// Pick the next track among graph successors, `None` when there are none.
pub fn select_successor<R: Rng + ?Sized>(
    rng: &mut R,
    graph: &TransitionGraph<TrackId>,
    current: TrackId,
    recent: &HashSet<TrackId>,
    ranks: &RankMap,
    listens: &ListenStats,
    config: &EngineConfig,
) -> Option<TrackId> {
    let scored: Vec<(TrackId, f64)> =
        score_candidates(rng, graph, current, recent, ranks, listens, config)
            .into_iter()
            .map(|c| (c.track, c.score))
            .collect();
    weighted_choice(rng, &scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn fan(from: TrackId, to: &[TrackId]) -> TransitionGraph<TrackId> {
        let mut graph = TransitionGraph::new();
        for &dest in to {
            graph.reinforce(from, dest, 1.0);
        }
        graph
    }

    #[test]
    fn test_weighted_choice_respects_zero_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(weighted_choice(&mut rng, &[(1, 0.0), (2, 3.0)]), Some(2));
        }
    }

    #[test]
    fn test_weighted_choice_all_zero_is_uniform() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(weighted_choice(&mut rng, &[(1, 0.0), (2, 0.0)]).unwrap());
        }
        assert_eq!(seen.len(), 2);
        assert_eq!(weighted_choice(&mut rng, &[]), None);
    }

    #[test]
    fn test_exclude_recent_keeps_set_when_everything_is_recent() {
        let recent = HashSet::from([1, 2]);
        assert_eq!(exclude_recent(vec![1, 2, 3], &recent), vec![3]);
        assert_eq!(exclude_recent(vec![1, 2], &recent), vec![1, 2]);
    }

    #[test]
    fn test_scores_combine_signals_within_noise_bounds() {
        let config = EngineConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let graph = fan(1, &[2]);
        let ranks = RankMap::from_iter([(2, 0.5)]);
        let mut listens = ListenStats::new(100);
        listens.push_listen_time(2, 10.0);

        let scored = score_candidates(&mut rng, &graph, 1, &HashSet::new(), &ranks, &listens, &config);
        let base = 0.3 * 1.0 + 0.3 * 0.5 + 0.4 * 10.0;
        assert_eq!(scored.len(), 1);
        assert!(scored[0].score >= base * 0.8 && scored[0].score < base * 1.2);
    }

    #[test]
    fn test_empty_diversity_range_scores_without_noise() {
        let config = EngineConfig { diversity_low: 1.0, diversity_high: 1.0, ..EngineConfig::default() };
        let mut rng = StdRng::seed_from_u64(1);
        let graph = fan(1, &[2]);

        let scored =
            score_candidates(&mut rng, &graph, 1, &HashSet::new(), &RankMap::new(), &ListenStats::new(100), &config);
        assert_eq!(scored, vec![ScoredCandidate { track: 2, score: 0.3 }]);

        let config = EngineConfig { diversity_low: f64::NAN, ..EngineConfig::default() };
        assert_eq!(diversity_factor(&mut rng, &config), 1.0);
    }

    #[test]
    fn test_select_successor_skips_recent_tracks() {
        let config = EngineConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let graph = fan(1, &[2, 3]);
        let recent = HashSet::from([2]);
        for _ in 0..50 {
            let pick = select_successor(&mut rng, &graph, 1, &recent, &RankMap::new(), &ListenStats::new(100), &config);
            assert_eq!(pick, Some(3));
        }
        assert_eq!(
            select_successor(&mut rng, &graph, 9, &recent, &RankMap::new(), &ListenStats::new(100), &config),
            None
        );
    }
}
