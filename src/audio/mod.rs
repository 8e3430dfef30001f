//! Audio feature feed and beat estimation
//!
//! Feature extraction is pluggable; the BPM smoothing policy and the kick
//! edge detector live here and feed the render loop each tick.

mod beat;
mod features;
mod feed;

pub use beat::{BpmEstimator, KickDetector};
pub use features::{BasicExtractor, FeatureExtractor, FeatureSet};
pub use feed::{AudioFeed, FeatureAssignment, TempoState};
