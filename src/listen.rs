//! # Listen Signals
//!
//! Turns "how long was the previous track played" into the two scalars the
//! engine uses: the bounded listen quality that gates graph reinforcement,
//! and the plain listen ratio that routes low-engagement requests.

use crate::config::EngineConfig;

/// Smallest expected listen time, keeps zero-length tracks from dividing by zero.
const MIN_EXPECTED_SECONDS: f64 = 0.1;

/// Bounded engagement score for one play, in `[0, quality_cap]`.
///
/// `listened / max(duration * expected_fraction, 0.1)`, capped.
#[must_use]
pub fn listen_quality(listened: f64, duration: f64, config: &EngineConfig) -> f64 {
    let expected = (duration * config.expected_listen_fraction).max(MIN_EXPECTED_SECONDS);
    let quality = listened / expected;
    if quality.is_nan() {
        return 0.0;
    }
    quality.clamp(0.0, config.quality_cap)
}

/// Whether a play is strong enough to reinforce the transition graph.
#[must_use]
pub fn is_strong(quality: f64, config: &EngineConfig) -> bool {
    quality >= config.strong_quality
}

/// `listened / duration`, or 0 when the duration is unknown or zero.
#[must_use]
pub fn listen_ratio(listened: f64, duration: f64) -> f64 {
    if duration > 0.0 && listened.is_finite() {
        (listened / duration).max(0.0)
    } else {
        0.0
    }
}

/// How much of a track listeners get through on average, in `[0, 1]`.
///
/// Unknown durations use the configured default; zero durations give 0.
#[must_use]
pub fn listen_time_ratio(average_listen: f64, duration: Option<f64>, config: &EngineConfig) -> f64 {
    let duration = duration.unwrap_or(config.default_duration_seconds);
    if duration > 0.0 {
        (average_listen / duration).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
