use std::collections::VecDeque;

/// Streaming BPM estimator fed by the per-tick spectrum
///
/// Onsets are detected from spectral flux against an adaptive threshold;
/// inter-onset intervals are folded into the configured BPM window and
/// smoothed into a rolling estimate. The estimator also tracks low-band
/// energy for the kick detector.
pub struct BpmEstimator {
    min_bpm: f64,
    max_bpm: f64,
    sensitivity: f32,

    prev_magnitude: Vec<f32>,
    flux_history: VecDeque<f32>,
    clock: f64,
    last_onset: Option<f64>,
    intervals: VecDeque<f64>,
    bpm: f64,
    bass_energy: f32,
}

const FLUX_HISTORY: usize = 43;
const INTERVAL_HISTORY: usize = 8;

impl BpmEstimator {
    pub fn new(min_bpm: f64, max_bpm: f64, sensitivity: f32) -> Self {
        Self {
            min_bpm,
            max_bpm,
            sensitivity,
            prev_magnitude: Vec::new(),
            flux_history: VecDeque::with_capacity(FLUX_HISTORY),
            clock: 0.0,
            last_onset: None,
            intervals: VecDeque::with_capacity(INTERVAL_HISTORY),
            bpm: 0.0,
            bass_energy: 0.0,
        }
    }

    /// Consume one tick of elapsed time and the frame's real spectrum
    pub fn process(&mut self, delta_secs: f64, spectrum_real: &[f32]) {
        self.clock += delta_secs;

        if spectrum_real.is_empty() {
            return;
        }

        let magnitudes: Vec<f32> = spectrum_real.iter().map(|v| v.abs()).collect();

        let bass_bins = (magnitudes.len() / 16).max(1);
        self.bass_energy = magnitudes[..bass_bins].iter().sum();

        if self.prev_magnitude.len() != magnitudes.len() {
            self.prev_magnitude = magnitudes;
            return;
        }

        // Positive spectral flux against the previous frame
        let flux: f32 = magnitudes
            .iter()
            .zip(self.prev_magnitude.iter())
            .map(|(current, previous)| (current - previous).max(0.0))
            .sum();
        self.prev_magnitude = magnitudes;

        let threshold = if self.flux_history.is_empty() {
            0.0
        } else {
            let mean: f32 =
                self.flux_history.iter().sum::<f32>() / self.flux_history.len() as f32;
            mean * (1.0 + self.sensitivity)
        };

        let is_onset = !self.flux_history.is_empty() && flux > threshold && flux > 0.0;

        self.flux_history.push_back(flux);
        if self.flux_history.len() > FLUX_HISTORY {
            self.flux_history.pop_front();
        }

        if !is_onset {
            return;
        }

        // Refractory window: onsets cannot come faster than the max BPM
        let min_interval = 60.0 / self.max_bpm;
        if let Some(last) = self.last_onset {
            let interval = self.clock - last;
            if interval < min_interval {
                return;
            }

            self.last_onset = Some(self.clock);
            self.fold_interval(interval);
        } else {
            self.last_onset = Some(self.clock);
        }
    }

    /// Fold an inter-onset interval into the BPM window and update the
    /// smoothed estimate
    fn fold_interval(&mut self, interval: f64) {
        let mut candidate = 60.0 / interval;
        while candidate < self.min_bpm {
            candidate *= 2.0;
        }
        while candidate > self.max_bpm {
            candidate /= 2.0;
        }

        if candidate < self.min_bpm {
            return;
        }

        self.intervals.push_back(candidate);
        if self.intervals.len() > INTERVAL_HISTORY {
            self.intervals.pop_front();
        }

        let mut sorted: Vec<f64> = self.intervals.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let median = sorted[sorted.len() / 2];

        if self.bpm == 0.0 {
            self.bpm = median;
        } else {
            self.bpm = self.bpm * 0.9 + median * 0.1;
        }
    }

    /// Current smoothed estimate; 0.0 until enough onsets have been seen
    pub fn win_bpm(&self) -> f64 {
        self.bpm
    }

    pub fn bass_energy(&self) -> f32 {
        self.bass_energy
    }
}

/// Bass-band kick detector derived from the estimator's internal envelope
///
/// Produces an edge flag: true only on the tick where the low band first
/// rises above its running average.
#[derive(Debug)]
pub struct KickDetector {
    average: f32,
    threshold: f32,
    was_above: bool,
    kick: bool,
}

impl KickDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            average: 0.0,
            threshold,
            was_above: false,
            kick: false,
        }
    }

    /// Recompute the kick flag for this tick from the estimator's state
    pub fn process(&mut self, estimator: &BpmEstimator) -> bool {
        let level = estimator.bass_energy();

        if self.average == 0.0 {
            self.average = level;
        }

        let above = level > self.average * (1.0 + self.threshold);
        self.kick = above && !self.was_above;
        self.was_above = above;

        self.average = self.average * 0.95 + level * 0.05;
        self.kick
    }

    pub fn is_kick(&self) -> bool {
        self.kick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f64 = 1.0 / 60.0;

    /// Bursted spectra: a loud frame every `period` ticks, silence otherwise
    fn feed_bursts(estimator: &mut BpmEstimator, period: usize, ticks: usize) {
        let quiet = vec![0.0f32; 33];
        let loud = vec![4.0f32; 33];

        for tick in 0..ticks {
            let frame = if tick % period == 0 { &loud } else { &quiet };
            estimator.process(TICK, frame);
        }
    }

    #[test]
    fn test_estimate_tracks_burst_period() {
        let mut estimator = BpmEstimator::new(85.0, 169.0, 0.7);

        // A burst every 30 ticks at 60 ticks/sec is 0.5 s, i.e. 120 BPM
        feed_bursts(&mut estimator, 30, 600);

        let bpm = estimator.win_bpm();
        assert!((bpm - 120.0).abs() < 2.0, "estimated {}", bpm);
    }

    #[test]
    fn test_slow_bursts_fold_into_window() {
        let mut estimator = BpmEstimator::new(85.0, 169.0, 0.7);

        // One burst per second is 60 BPM, folded to 120
        feed_bursts(&mut estimator, 60, 1200);

        let bpm = estimator.win_bpm();
        assert!((bpm - 120.0).abs() < 2.0, "estimated {}", bpm);
    }

    #[test]
    fn test_no_estimate_without_onsets() {
        let mut estimator = BpmEstimator::new(85.0, 169.0, 0.7);

        for _ in 0..120 {
            estimator.process(TICK, &[0.0; 33]);
        }

        assert_eq!(estimator.win_bpm(), 0.0);
    }

    #[test]
    fn test_kick_fires_on_rising_edge_only() {
        let mut estimator = BpmEstimator::new(85.0, 169.0, 0.7);
        let mut kick = KickDetector::new(0.5);

        // Establish a quiet envelope
        for _ in 0..30 {
            estimator.process(TICK, &[0.1; 33]);
            assert!(!kick.process(&estimator));
        }

        // Rising edge
        estimator.process(TICK, &[2.0; 33]);
        assert!(kick.process(&estimator));

        // Sustained level is no longer an edge
        estimator.process(TICK, &[2.0; 33]);
        assert!(!kick.process(&estimator));
    }
}
