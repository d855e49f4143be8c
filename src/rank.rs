//! # Ranking Engine
//!
//! Weighted PageRank over the track transition graph, solved by power
//! iteration with damping. The global rank is recomputed from scratch by the
//! background worker; the personalized rank is solved per request from a
//! user's preference and recency vector and falls back to the global map
//! whenever it cannot be computed.
//!
//! ## Algorithm
//!
//! ```text
//! x'[v] = d * Σ_{u→v} x[u] * w(u,v) / out(u)
//!       + (d * Σ_{dangling u} x[u] + (1 - d)) * p[v]
//! ```
//!
//! `p` is the personalization vector (uniform for the global rank) and also
//! receives the mass of dangling nodes. Iteration stops when the L1 change
//! drops below `n * tolerance`; not converging within `max_iterations` is an
//! error and the caller keeps its previous map.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::TrackId;
use crate::config::EngineConfig;
use crate::error::RankError;
use crate::graph::TransitionGraph;
use crate::profile::UserProfile;

/// Normalized importance score per track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankMap {
    scores: HashMap<TrackId, f64>,
}

impl RankMap {
    /// Empty map; every track scores 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Score of `track`, 0 when it is not ranked.
    pub fn get(&self, track: TrackId) -> f64 {
        self.scores.get(&track).copied().unwrap_or(0.0)
    }

    /// Number of ranked tracks.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Total mass; 1 for a solved rank, 0 for an empty one.
    pub fn sum(&self) -> f64 {
        self.scores.values().sum()
    }

    /// The `n` highest ranked tracks, ties broken by ascending id.
    pub fn top(&self, n: usize) -> Vec<(TrackId, f64)> {
        let mut ranked: Vec<(TrackId, f64)> = self.scores.iter().map(|(&t, &r)| (t, r)).collect();
        ranked.sort_by(|(ta, ra), (tb, rb)| {
            rb.partial_cmp(ra).unwrap_or(std::cmp::Ordering::Equal).then(ta.cmp(tb))
        });
        ranked.truncate(n);
        ranked
    }

    /// `(track, score)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (TrackId, f64)> + '_ {
        self.scores.iter().map(|(&t, &r)| (t, r))
    }
}

impl FromIterator<(TrackId, f64)> for RankMap {
    fn from_iter<I: IntoIterator<Item = (TrackId, f64)>>(iter: I) -> Self {
        Self { scores: iter.into_iter().collect() }
    }
}

/// Solver parameters, taken from [`EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    pub damping: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl From<&EngineConfig> for RankParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            damping: config.damping,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

/// Weighted PageRank over every node of `graph`.
///
/// `personalization` entries for ids outside the graph are ignored; the
/// rest are renormalized. `None` means uniform.
pub fn pagerank(
    graph: &TransitionGraph<TrackId>,
    personalization: Option<&HashMap<TrackId, f64>>,
    params: RankParams,
) -> Result<RankMap, RankError> {
    let mut nodes: Vec<TrackId> = graph.nodes().collect();
    nodes.sort_unstable();
    let n = nodes.len();
    if n == 0 {
        return Err(RankError::TooFewNodes { nodes: 0, required: 1 });
    }
    let index: HashMap<TrackId, usize> = nodes.iter().enumerate().map(|(i, &t)| (t, i)).collect();

    // Column view: for each node, the incoming (source index, normalized weight) pairs.
    let mut incoming: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut dangling = Vec::new();
    for (u, &node) in nodes.iter().enumerate() {
        let out_weight: f64 = graph.out_edges(node).map(|(_, w)| w).sum();
        if out_weight <= 0.0 {
            dangling.push(u);
            continue;
        }
        for (dest, weight) in graph.out_edges(node) {
            incoming[index[&dest]].push((u, weight / out_weight));
        }
    }

    let p: Vec<f64> = match personalization {
        Some(vector) => {
            let raw: Vec<f64> =
                nodes.iter().map(|t| vector.get(t).copied().unwrap_or(0.0).max(0.0)).collect();
            let total: f64 = raw.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                return Err(RankError::EmptyPersonalization);
            }
            raw.into_iter().map(|v| v / total).collect()
        }
        None => vec![1.0 / n as f64; n],
    };

    let damping = params.damping;
    let threshold = n as f64 * params.tolerance;
    let mut x = vec![1.0 / n as f64; n];
    let mut residual = f64::INFINITY;

    for iteration in 1..=params.max_iterations {
        let dangling_mass: f64 = dangling.iter().map(|&u| x[u]).sum();
        let teleport = damping * dangling_mass + (1.0 - damping);

        let next: Vec<f64> = incoming
            .par_iter()
            .zip(p.par_iter())
            .map(|(edges, &pv)| {
                let flow: f64 = edges.iter().map(|&(u, w)| x[u] * w).sum();
                damping * flow + teleport * pv
            })
            .collect();

        residual = next.par_iter().zip(x.par_iter()).map(|(a, b)| (a - b).abs()).sum();
        if !residual.is_finite() {
            return Err(RankError::NonFinite);
        }
        x = next;

        if residual < threshold {
            debug!("Rank solve over {n} nodes converged after {iteration} iterations");
            return Ok(normalize(&nodes, &x));
        }
    }

    Err(RankError::NotConverged { iterations: params.max_iterations, residual })
}

fn normalize(nodes: &[TrackId], x: &[f64]) -> RankMap {
    let total: f64 = x.iter().sum();
    nodes
        .iter()
        .zip(x)
        .map(|(&t, &v)| (t, if total > 0.0 { v.max(0.0) / total } else { 0.0 }))
        .collect()
}

/// Copy of `graph` with each edge scaled by `1 + listen_ratio(source)`.
///
/// The stored graph is left untouched, so repeated re-ranks do not compound.
pub fn listen_biased(
    graph: &TransitionGraph<TrackId>,
    listen_ratio: impl Fn(TrackId) -> f64,
) -> TransitionGraph<TrackId> {
    let mut biased = TransitionGraph::new();
    for edge in graph.edges() {
        let factor = 1.0 + listen_ratio(edge.source).clamp(0.0, 1.0);
        biased.reinforce(edge.source, edge.dest, edge.weight * factor);
    }
    biased
}

/// Global rank over a graph already passed through [`listen_biased`].
pub fn global_rank(biased: &TransitionGraph<TrackId>, config: &EngineConfig) -> Result<RankMap, RankError> {
    let nodes = biased.node_count();
    if nodes <= config.min_rank_nodes {
        return Err(RankError::TooFewNodes { nodes, required: config.min_rank_nodes + 1 });
    }
    pagerank(biased, None, RankParams::from(config))
}

/// Seed distribution for one user: preferences, a boost on the current
/// track, and decaying boosts on the most recent history. Sums to 1.
pub fn personalization_vector(
    profile: &UserProfile,
    current: TrackId,
    graph: &TransitionGraph<TrackId>,
    config: &EngineConfig,
) -> HashMap<TrackId, f64> {
    let mut vector: HashMap<TrackId, f64> = profile.track_preferences().clone();

    if graph.contains(current) {
        *vector.entry(current).or_insert(0.0) += config.current_track_boost;
    }
    for (position, track) in profile.recent(config.recency_window).enumerate() {
        if graph.contains(track) {
            *vector.entry(track).or_insert(0.0) += 1.0 / (position as f64 + 1.0);
        }
    }

    let total: f64 = vector.values().sum();
    if total > 0.0 {
        vector.values_mut().for_each(|v| *v /= total);
    }
    vector
}

/// Rank biased towards one user.
///
/// # Arguments
///
/// * `graph` - Track transition graph, unbiased
/// * `profile` - The user's profile, if they have one
/// * `current` - Track the user is on, boosted in the seed distribution
/// * `global` - Cached global rank
///
/// # Returns
///
/// * `Ok` with a clone of `global` when the graph has at most
///   `min_rank_nodes` nodes or the user has no preferences yet
/// * `Ok` with a fresh map when the personalized solve succeeds
///
/// # Errors
///
/// The [`RankError`] of a failed personalized solve. Callers fall back to
/// `global` themselves so the failure can be reported.
pub fn personalized_rank(
    graph: &TransitionGraph<TrackId>,
    profile: Option<&UserProfile>,
    current: TrackId,
    global: &Arc<RankMap>,
    config: &EngineConfig,
) -> Result<Arc<RankMap>, RankError> {
    if graph.node_count() <= config.min_rank_nodes {
        return Ok(Arc::clone(global));
    }
    let Some(profile) = profile.filter(|p| !p.track_preferences().is_empty()) else {
        return Ok(Arc::clone(global));
    };

    let vector = personalization_vector(profile, current, graph, config);
    pagerank(graph, Some(&vector), RankParams::from(config)).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::UserProfiles;
    use proptest::prelude::*;

    fn ring(n: u64) -> TransitionGraph<TrackId> {
        let mut graph = TransitionGraph::new();
        for i in 0..n {
            graph.reinforce(i, (i + 1) % n, 1.0);
        }
        graph
    }

    #[test]
    fn test_symmetric_ring_ranks_uniformly() {
        let ranks = pagerank(&ring(6), None, RankParams::from(&EngineConfig::default())).unwrap();
        assert_eq!(ranks.len(), 6);
        for (_, r) in ranks.iter() {
            assert!((r - 1.0 / 6.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hub_outranks_leaves() {
        let mut graph = TransitionGraph::new();
        for leaf in 1..=6 {
            graph.reinforce(leaf, 0, 2.0);
            graph.reinforce(0, leaf, 0.5);
        }
        let ranks = pagerank(&graph, None, RankParams::from(&EngineConfig::default())).unwrap();
        assert_eq!(ranks.top(1)[0].0, 0);
        assert!((ranks.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dangling_nodes_keep_mass() {
        let mut graph = TransitionGraph::new();
        graph.reinforce(1, 2, 1.0);
        graph.reinforce(2, 3, 1.0);
        let ranks = pagerank(&graph, None, RankParams::from(&EngineConfig::default())).unwrap();
        assert!((ranks.sum() - 1.0).abs() < 1e-6);
        assert!(ranks.get(3) > ranks.get(1));
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let params = RankParams { damping: 0.85, max_iterations: 1, tolerance: 1e-12 };
        let mut graph = ring(6);
        graph.reinforce(0, 3, 5.0);
        assert!(matches!(
            pagerank(&graph, None, params),
            Err(RankError::NotConverged { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_global_rank_needs_more_than_min_nodes() {
        let config = EngineConfig::default();
        assert!(matches!(
            global_rank(&ring(5), &config),
            Err(RankError::TooFewNodes { nodes: 5, required: 6 })
        ));
        assert!(global_rank(&listen_biased(&ring(6), |_| 0.3), &config).is_ok());
    }

    #[test]
    fn test_listen_bias_does_not_touch_source_graph() {
        let graph = ring(3);
        let biased = listen_biased(&graph, |t| if t == 0 { 0.5 } else { 0.0 });
        assert_eq!(biased.weight(0, 1), Some(1.5));
        assert_eq!(biased.weight(1, 2), Some(1.0));
        assert_eq!(graph.weight(0, 1), Some(1.0));
    }

    #[test]
    fn test_personalization_vector_boosts_current_and_recent() {
        let config = EngineConfig::default();
        let graph = ring(8);
        let mut profiles = UserProfiles::new(50);
        profiles.push_history(1, 3);
        profiles.push_history(1, 4);
        profiles.bump_preference(1, 4, 9, 1.0);

        let vector = personalization_vector(profiles.get(1).unwrap(), 4, &graph, &config);
        // raw: track 4 = 1 (pref) + 2 (current) + 1 (most recent), track 3 = 0.5
        assert!((vector[&4] - 4.0 / 4.5).abs() < 1e-12);
        assert!((vector[&3] - 0.5 / 4.5).abs() < 1e-12);
        assert!((vector.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_personalized_rank_returns_global_for_small_graphs() {
        let config = EngineConfig::default();
        let global = Arc::new(RankMap::from_iter([(1, 1.0)]));
        let mut profiles = UserProfiles::new(50);
        profiles.bump_preference(1, 2, 9, 1.0);

        let ranks = personalized_rank(&ring(4), profiles.get(1), 2, &global, &config).unwrap();
        assert!(Arc::ptr_eq(&ranks, &global));
    }

    #[test]
    fn test_personalized_rank_without_preferences_is_global() {
        let config = EngineConfig::default();
        let global = Arc::new(RankMap::new());
        let ranks = personalized_rank(&ring(10), None, 2, &global, &config).unwrap();
        assert!(Arc::ptr_eq(&ranks, &global));
    }

    #[test]
    fn test_personalized_rank_favours_preferred_track() {
        let config = EngineConfig::default();
        let graph = ring(10);
        let global = Arc::new(pagerank(&graph, None, RankParams::from(&config)).unwrap());
        let mut profiles = UserProfiles::new(50);
        profiles.bump_preference(1, 7, 9, 5.0);

        let ranks = personalized_rank(&graph, profiles.get(1), 2, &global, &config).unwrap();
        assert!(!Arc::ptr_eq(&ranks, &global));
        assert!(ranks.get(7) > global.get(7));
        assert!((ranks.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_personalized_rank_reports_solve_failure() {
        let config = EngineConfig { max_iterations: 1, tolerance: 1e-12, ..EngineConfig::default() };
        let global = Arc::new(RankMap::new());
        let mut profiles = UserProfiles::new(50);
        profiles.bump_preference(1, 7, 9, 5.0);

        let result = personalized_rank(&ring(10), profiles.get(1), 2, &global, &config);
        assert!(matches!(result, Err(RankError::NotConverged { iterations: 1, .. })));
    }

    proptest! {
        #[test]
        fn ranks_sum_to_one(edges in prop::collection::vec((0u64..12, 0u64..12, 0.1f64..10.0), 1..60)) {
            let mut graph = TransitionGraph::new();
            for (source, dest, weight) in edges {
                graph.reinforce(source, dest, weight);
            }
            let params = RankParams { damping: 0.85, max_iterations: 1000, tolerance: 1e-9 };
            let ranks = pagerank(&graph, None, params).unwrap();
            prop_assert!((ranks.sum() - 1.0).abs() < 1e-6);
            prop_assert!(ranks.iter().all(|(_, r)| r >= 0.0));
        }
    }
}
