use std::collections::BTreeSet;

use tracing::debug;

use crate::{
    audio::features::FeatureSet,
    module::{ParamValue, ModuleRuntime},
    store::ControlValueStore,
};

/// Routing of one audio feature to one module parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureAssignment {
    pub feature: String,
    pub module_name: String,
    pub param: String,
}

/// The per-tick bridge between audio analysis and module parameters
///
/// Holds the set of features modules have declared a dependency on and the
/// committed list of feature-to-parameter assignments. Each tick, every
/// assignment becomes one validating write into the control-value store.
#[derive(Debug, Default)]
pub struct AudioFeed {
    requested: BTreeSet<String>,
    assignments: Vec<FeatureAssignment>,
}

impl AudioFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature so the extractor starts computing it
    pub fn register_feature(&mut self, name: impl Into<String>) {
        self.requested.insert(name.into());
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.iter().cloned().collect()
    }

    pub fn assign(&mut self, assignment: FeatureAssignment) {
        // Replace an existing assignment for the same target
        self.assignments.retain(|a| {
            !(a.module_name == assignment.module_name && a.param == assignment.param)
        });
        self.assignments.push(assignment);
    }

    pub fn unassign(&mut self, module_name: &str, param: &str) {
        self.assignments
            .retain(|a| !(a.module_name == module_name && a.param == param));
    }

    pub fn clear_module(&mut self, module_name: &str) {
        self.assignments.retain(|a| a.module_name != module_name);
    }

    pub fn assignments(&self) -> &[FeatureAssignment] {
        &self.assignments
    }

    /// Turn this tick's feature values into pending parameter writes
    ///
    /// An assignment whose feature is missing, or whose module is gone, is
    /// skipped without affecting the others.
    pub fn apply_assignments(
        &self,
        store: &ControlValueStore,
        runtime: &ModuleRuntime,
        features: &FeatureSet,
    ) {
        for assignment in &self.assignments {
            let Some(value) = features.get(&assignment.feature) else {
                continue;
            };

            if let Err(err) = store.request_write(
                runtime,
                &assignment.module_name,
                &assignment.param,
                ParamValue::Float(value),
                None,
            ) {
                debug!(
                    module = %assignment.module_name,
                    param = %assignment.param,
                    "assignment write skipped: {}",
                    err
                );
            }
        }
    }
}

/// Shared tempo state fed by the beat estimator or tapped by the user
#[derive(Debug, Clone)]
pub struct TempoState {
    bpm: f64,
    detect: bool,
}

impl Default for TempoState {
    fn default() -> Self {
        Self { bpm: 120.0, detect: true }
    }
}

impl TempoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn detect(&self) -> bool {
        self.detect
    }

    /// Manually set the tempo (tap tempo, UI)
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    pub fn set_detect(&mut self, detect: bool) {
        self.detect = detect;
    }

    /// Commit a detected estimate, reporting a change only when the rounded
    /// value differs from the stored tempo
    pub fn update_detected(&mut self, estimate: f64) -> Option<u32> {
        if estimate <= 0.0 || !self.detect {
            return None;
        }

        let rounded = estimate.round();
        if self.bpm.round() != rounded {
            self.bpm = rounded;
            Some(rounded as u32)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_estimate_emits_nothing() {
        let mut tempo = TempoState::new();
        tempo.set_bpm(128.0);

        assert_eq!(tempo.update_detected(128.2), None);
        assert_eq!(tempo.bpm(), 128.0);
    }

    #[test]
    fn test_changed_estimate_emits_rounded_value() {
        let mut tempo = TempoState::new();
        tempo.set_bpm(120.0);

        assert_eq!(tempo.update_detected(127.6), Some(128));
        assert_eq!(tempo.bpm(), 128.0);

        // Same estimate again is suppressed
        assert_eq!(tempo.update_detected(127.6), None);
    }

    #[test]
    fn test_detection_disabled_suppresses_updates() {
        let mut tempo = TempoState::new();
        tempo.set_detect(false);

        assert_eq!(tempo.update_detected(140.0), None);
        assert_eq!(tempo.bpm(), 120.0);
    }

    #[test]
    fn test_zero_estimate_is_ignored() {
        let mut tempo = TempoState::new();
        assert_eq!(tempo.update_detected(0.0), None);
    }

    #[test]
    fn test_assignment_replaces_same_target() {
        let mut feed = AudioFeed::new();
        feed.assign(FeatureAssignment {
            feature: "rms".to_string(),
            module_name: "Fill".to_string(),
            param: "level".to_string(),
        });
        feed.assign(FeatureAssignment {
            feature: "energy".to_string(),
            module_name: "Fill".to_string(),
            param: "level".to_string(),
        });

        assert_eq!(feed.assignments().len(), 1);
        assert_eq!(feed.assignments()[0].feature, "energy");
    }

    #[test]
    fn test_requested_features_are_deduplicated() {
        let mut feed = AudioFeed::new();
        feed.register_feature("rms");
        feed.register_feature("rms");

        assert_eq!(feed.requested(), vec!["rms".to_string()]);
    }
}
