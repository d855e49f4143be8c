//! # User State Tracker
//!
//! Bounded per-user listening history, per-user preference counters and
//! per-track listen-time samples. Every push trims to a fixed cap, so all
//! operations are O(1) amortized and memory stays bounded however long the
//! process runs.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::catalog::{ArtistId, TrackId, UserId};

/// Everything the engine remembers about one user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfile {
    /// Most recent last.
    history: VecDeque<TrackId>,
    track_pref: HashMap<TrackId, f64>,
    artist_pref: HashMap<ArtistId, f64>,
}

impl UserProfile {
    /// Bounded play history, most recent last.
    pub fn history(&self) -> &VecDeque<TrackId> {
        &self.history
    }

    pub fn last_track(&self) -> Option<TrackId> {
        self.history.back().copied()
    }

    /// The last `n` tracks, most recent first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = TrackId> + '_ {
        self.history.iter().rev().take(n).copied()
    }

    /// Accumulated listen quality per track.
    pub fn track_preferences(&self) -> &HashMap<TrackId, f64> {
        &self.track_pref
    }

    /// Accumulated listen quality per artist.
    pub fn artist_preferences(&self) -> &HashMap<ArtistId, f64> {
        &self.artist_pref
    }
}

/// Profiles for every user seen since startup (or restored from a snapshot).
#[derive(Debug, Clone)]
pub struct UserProfiles {
    profiles: HashMap<UserId, UserProfile>,
    history_limit: usize,
}

impl UserProfiles {
    pub fn new(history_limit: usize) -> Self {
        Self { profiles: HashMap::new(), history_limit }
    }

    /// Restore profiles from persisted histories. Preferences start empty.
    pub fn from_histories(histories: HashMap<UserId, Vec<TrackId>>, history_limit: usize) -> Self {
        let profiles = histories
            .into_iter()
            .map(|(user, history)| {
                let skip = history.len().saturating_sub(history_limit);
                let history = history.into_iter().skip(skip).collect();
                (user, UserProfile { history, ..UserProfile::default() })
            })
            .collect();
        Self { profiles, history_limit }
    }

    /// Histories in snapshot form.
    pub fn histories(&self) -> HashMap<UserId, Vec<TrackId>> {
        self.profiles
            .iter()
            .map(|(&user, profile)| (user, profile.history.iter().copied().collect()))
            .collect()
    }

    pub fn get(&self, user: UserId) -> Option<&UserProfile> {
        self.profiles.get(&user)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Append to the user's history, keeping only the newest `history_limit` entries.
    pub fn push_history(&mut self, user: UserId, track: TrackId) {
        let limit = self.history_limit;
        let history = &mut self.profiles.entry(user).or_default().history;
        history.push_back(track);
        while history.len() > limit {
            history.pop_front();
        }
    }

    pub fn bump_preference(&mut self, user: UserId, track: TrackId, artist: ArtistId, amount: f64) {
        let profile = self.profiles.entry(user).or_default();
        *profile.track_pref.entry(track).or_insert(0.0) += amount;
        *profile.artist_pref.entry(artist).or_insert(0.0) += amount;
    }

    /// Set of the user's last `n` tracks.
    pub fn recent_set(&self, user: UserId, n: usize) -> HashSet<TrackId> {
        self.get(user)
            .map(|profile| profile.recent(n).collect())
            .unwrap_or_default()
    }

    /// Forget a user entirely (session end).
    pub fn remove(&mut self, user: UserId) -> bool {
        self.profiles.remove(&user).is_some()
    }
}

/// Recent listen durations per track.
#[derive(Debug, Clone)]
pub struct ListenStats {
    samples: HashMap<TrackId, VecDeque<f64>>,
    sample_limit: usize,
}

impl ListenStats {
    pub fn new(sample_limit: usize) -> Self {
        Self { samples: HashMap::new(), sample_limit }
    }

    pub fn from_samples(samples: HashMap<TrackId, Vec<f64>>, sample_limit: usize) -> Self {
        let samples = samples
            .into_iter()
            .map(|(track, values)| {
                let skip = values.len().saturating_sub(sample_limit);
                (track, values.into_iter().skip(skip).collect())
            })
            .collect();
        Self { samples, sample_limit }
    }

    pub fn to_samples(&self) -> HashMap<TrackId, Vec<f64>> {
        self.samples
            .iter()
            .map(|(&track, values)| (track, values.iter().copied().collect()))
            .collect()
    }

    /// Record one listen of `track`, dropping the oldest sample past the cap.
    ///
    /// Negative and non-finite durations are stored as 0 so averages stay finite.
    pub fn push_listen_time(&mut self, track: TrackId, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let limit = self.sample_limit;
        let values = self.samples.entry(track).or_default();
        values.push_back(seconds);
        while values.len() > limit {
            values.pop_front();
        }
    }

    pub fn samples(&self, track: TrackId) -> Option<&VecDeque<f64>> {
        self.samples.get(&track)
    }

    /// Mean of the stored samples, 0 for tracks never heard.
    pub fn average(&self, track: TrackId) -> f64 {
        match self.samples.get(&track) {
            Some(values) if !values.is_empty() => values.iter().sum::<f64>() / values.len() as f64,
            _ => 0.0,
        }
    }
}
