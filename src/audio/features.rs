use std::collections::HashMap;

use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Per-tick audio feature values handed to modules and assignments
///
/// Scalar features are keyed by name; the real component of the complex
/// spectrum is carried separately for the beat estimator.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    scalars: HashMap<String, f64>,
    pub spectrum_real: Vec<f32>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.scalars.insert(name.into(), value);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scalars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scalars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty()
    }
}

/// Source of per-tick audio features
///
/// The extractor receives the set of requested feature names and the tick's
/// raw sample frame, and produces the features plus the spectrum the beat
/// estimator consumes. Implementations live outside the core; a basic
/// FFT-backed one is provided for headless use.
pub trait FeatureExtractor: Send {
    fn extract(&mut self, requested: &[String], samples: &[f32], sample_rate: u32) -> FeatureSet;
}

/// FFT-backed extractor computing the common scalar features
pub struct BasicExtractor {
    fft: Arc<dyn RealToComplex<f32>>,
    window_size: usize,
    input: Vec<f32>,
    output: Vec<rustfft::num_complex::Complex<f32>>,
}

impl BasicExtractor {
    pub fn new(window_size: usize) -> Self {
        let mut planner = RealFftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();

        Self { fft, window_size, input, output }
    }
}

impl FeatureExtractor for BasicExtractor {
    fn extract(&mut self, requested: &[String], samples: &[f32], sample_rate: u32) -> FeatureSet {
        let mut features = FeatureSet::new();

        // Latest window, zero-padded when the tick delivered fewer samples
        self.input.fill(0.0);
        let take = samples.len().min(self.window_size);
        let start = samples.len() - take;
        self.input[self.window_size - take..].copy_from_slice(&samples[start..]);

        // RMS energy over the window
        let energy: f32 = self.input.iter().map(|&x| x * x).sum();
        let rms = (energy / self.window_size as f32).sqrt();

        // Zero crossing rate
        let zero_crossings = self
            .input
            .windows(2)
            .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
            .count();
        let zcr = zero_crossings as f32 / self.window_size as f32;

        if self.fft.process(&mut self.input, &mut self.output).is_ok() {
            features.spectrum_real = self.output.iter().map(|c| c.re).collect();

            if requested.iter().any(|f| f == "spectralCentroid") {
                let mut weighted = 0.0f64;
                let mut total = 0.0f64;
                let bin_hz = sample_rate as f64 / self.window_size as f64;

                for (bin, value) in self.output.iter().enumerate() {
                    let magnitude = value.norm() as f64;
                    weighted += bin as f64 * bin_hz * magnitude;
                    total += magnitude;
                }

                let centroid = if total > 0.0 { weighted / total } else { 0.0 };
                features.insert("spectralCentroid", centroid);
            }
        }

        for name in requested {
            match name.as_str() {
                "rms" => features.insert("rms", rms as f64),
                "energy" => features.insert("energy", energy as f64),
                "zcr" => features.insert("zcr", zcr as f64),
                _ => {}
            }
        }

        features
    }
}
