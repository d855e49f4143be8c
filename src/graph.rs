//! # Transition Graph Store
//!
//! Two weighted directed graphs built from playback: track → track and
//! artist → artist. Edges are only ever reinforced; nodes and edges are
//! never removed during normal operation. Graphs serialize as plain edge
//! lists so snapshots stay readable.

use std::collections::HashMap;
use std::hash::Hash;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::catalog::{ArtistId, Track, TrackId};
use crate::config::EngineConfig;
use crate::listen;

/// One directed, weighted edge in snapshot form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge<K> {
    pub source: K,
    pub dest: K,
    pub weight: f64,
}

/// Weighted directed graph keyed by node id.
///
/// Every node that appears in an edge has an adjacency entry, so sink
/// nodes count towards [`TransitionGraph::node_count`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Edge<K>>", into = "Vec<Edge<K>>")]
#[serde(bound(
    serialize = "K: Copy + Eq + Hash + Ord + Serialize",
    deserialize = "K: Copy + Eq + Hash + Ord + Deserialize<'de>"
))]
pub struct TransitionGraph<K: Copy + Eq + Hash + Ord> {
    adjacency: HashMap<K, HashMap<K, f64>>,
}

impl<K: Copy + Eq + Hash + Ord> TransitionGraph<K> {
    /// Graph with no nodes.
    pub fn new() -> Self {
        Self { adjacency: HashMap::new() }
    }

    /// Add `amount` to the edge weight, creating nodes and edge as needed.
    pub fn reinforce(&mut self, source: K, dest: K, amount: f64) -> f64 {
        self.adjacency.entry(dest).or_default();
        let weight = self.adjacency.entry(source).or_default().entry(dest).or_insert(0.0);
        *weight += amount.max(0.0);
        *weight
    }

    /// Whether `node` appears in any edge.
    pub fn contains(&self, node: K) -> bool {
        self.adjacency.contains_key(&node)
    }

    /// Weight of `source → dest`, `None` when there is no such edge.
    pub fn weight(&self, source: K, dest: K) -> Option<f64> {
        self.adjacency.get(&source).and_then(|out| out.get(&dest)).copied()
    }

    /// Successors of `node`, sorted by id so callers iterate deterministically.
    pub fn successors(&self, node: K) -> Vec<K> {
        let mut out: Vec<K> = self
            .adjacency
            .get(&node)
            .map(|edges| edges.keys().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Outgoing edges of `node` with weights.
    pub fn out_edges(&self, node: K) -> impl Iterator<Item = (K, f64)> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|(&dest, &weight)| (dest, weight)))
    }

    /// Every node, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = K> + '_ {
        self.adjacency.keys().copied()
    }

    /// Number of nodes, sinks included.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of distinct directed edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Edge list sorted by (source, dest).
    pub fn edges(&self) -> Vec<Edge<K>> {
        let mut edges: Vec<Edge<K>> = self
            .adjacency
            .iter()
            .flat_map(|(&source, out)| {
                out.iter().map(move |(&dest, &weight)| Edge { source, dest, weight })
            })
            .collect();
        edges.sort_unstable_by(|a, b| (a.source, a.dest).cmp(&(b.source, b.dest)));
        edges
    }
}

impl<K: Copy + Eq + Hash + Ord> From<Vec<Edge<K>>> for TransitionGraph<K> {
    fn from(edges: Vec<Edge<K>>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.reinforce(edge.source, edge.dest, edge.weight);
        }
        graph
    }
}

impl<K: Copy + Eq + Hash + Ord> From<TransitionGraph<K>> for Vec<Edge<K>> {
    fn from(graph: TransitionGraph<K>) -> Self {
        graph.edges()
    }
}

/// Track graph, artist graph and the duration cache, mutated together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionStore {
    pub tracks: TransitionGraph<TrackId>,
    pub artists: TransitionGraph<ArtistId>,
    durations: HashMap<TrackId, f64>,
}

impl TransitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        tracks: TransitionGraph<TrackId>,
        artists: TransitionGraph<ArtistId>,
        durations: HashMap<TrackId, f64>,
    ) -> Self {
        Self { tracks, artists, durations }
    }

    pub fn durations(&self) -> &HashMap<TrackId, f64> {
        &self.durations
    }

    /// Cache a track's duration the first time it is seen. Never overwrites.
    pub fn observe(&mut self, track: &Track) {
        self.durations.entry(track.id).or_insert(track.duration_seconds);
    }

    pub fn duration(&self, track: TrackId) -> Option<f64> {
        self.durations.get(&track).copied()
    }

    /// Reinforce `prev → next` (and the matching artist edge) when the listen
    /// quality is strong. Returns whether the graphs changed.
    pub fn record_transition(
        &mut self,
        prev: &Track,
        next: &Track,
        quality: f64,
        config: &EngineConfig,
    ) -> bool {
        self.observe(prev);
        self.observe(next);

        if !listen::is_strong(quality, config) {
            trace!("Transition {} -> {} too weak (quality {quality:.3})", prev.id, next.id);
            return false;
        }

        let amount = 1.0 + quality;
        let weight = self.tracks.reinforce(prev.id, next.id, amount);
        self.artists.reinforce(prev.artist_id, next.artist_id, amount);
        trace!("Edge {} -> {} now weighs {weight:.3}", prev.id, next.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: TrackId, artist_id: ArtistId) -> Track {
        Track { id, artist_id, duration_seconds: 200.0 }
    }

    #[test]
    fn test_strong_transition_creates_edges_on_both_graphs() {
        let config = EngineConfig::default();
        let mut store = TransitionStore::new();
        assert!(store.record_transition(&track(1, 10), &track(2, 20), 1.25, &config));

        assert_eq!(store.tracks.weight(1, 2), Some(2.25));
        assert_eq!(store.artists.weight(10, 20), Some(2.25));
        assert!(store.tracks.contains(2));
        assert_eq!(store.tracks.node_count(), 2);
        assert_eq!(store.tracks.successors(2), Vec::<TrackId>::new());
    }

    #[test]
    fn test_weak_transition_only_caches_durations() {
        let config = EngineConfig::default();
        let mut store = TransitionStore::new();
        assert!(!store.record_transition(&track(1, 10), &track(2, 20), 0.79, &config));
        assert!(store.tracks.is_empty());
        assert!(store.artists.is_empty());
        assert_eq!(store.duration(2), Some(200.0));
    }

    #[test]
    fn test_repeated_transitions_never_decrease_weight() {
        let config = EngineConfig::default();
        let mut store = TransitionStore::new();
        let mut last = 0.0;
        for quality in [0.8, 1.5, 0.9, 0.1, 1.0] {
            store.record_transition(&track(1, 10), &track(2, 10), quality, &config);
            let weight = store.tracks.weight(1, 2).unwrap_or(0.0);
            assert!(weight >= last);
            last = weight;
        }
        assert!((last - (1.8 + 2.5 + 1.9 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_durations_are_never_overwritten() {
        let mut store = TransitionStore::new();
        store.observe(&track(1, 10));
        store.observe(&Track { id: 1, artist_id: 10, duration_seconds: 5.0 });
        assert_eq!(store.duration(1), Some(200.0));
    }

    #[test]
    fn test_edge_list_serialization() {
        let mut graph: TransitionGraph<TrackId> = TransitionGraph::new();
        graph.reinforce(2, 3, 1.5);
        graph.reinforce(1, 2, 2.0);

        let json = serde_json::to_string(&graph).unwrap();
        assert_eq!(
            json,
            r#"[{"source":1,"dest":2,"weight":2.0},{"source":2,"dest":3,"weight":1.5}]"#
        );
        let restored: TransitionGraph<TrackId> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, graph);
    }
}
