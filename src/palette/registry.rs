use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use crate::palette::palette::{Color, ReturnFormat};
use crate::palette::worker::{PaletteEvent, PaletteOptions, PaletteWorker};

/// Engine-side mirror of one palette's state
///
/// The worker owns the authoritative animation state; this mirror carries the
/// configuration and the last observed step for the UI and for snapshots.
#[derive(Debug, Clone)]
pub struct PaletteEntry {
    pub module_name: String,
    pub variable: String,
    pub colors: Vec<Color>,
    pub duration: f64,
    pub use_bpm: bool,
    pub bpm_division: f64,
    pub return_format: ReturnFormat,
    pub current_color: usize,
    pub current_step: String,
}

/// Owns the palette worker handle and the per-palette mirrors
pub struct PaletteRegistry {
    palettes: HashMap<String, PaletteEntry>,
    worker: PaletteWorker,
}

impl PaletteRegistry {
    /// Create the registry and spawn its worker; must be called within a
    /// tokio runtime
    pub fn new(tick_rate: f64) -> Self {
        Self {
            palettes: HashMap::new(),
            worker: PaletteWorker::spawn(tick_rate),
        }
    }

    /// Create a palette bound to a module parameter
    ///
    /// Creating an id that already exists is a no-op returning the existing
    /// entry.
    pub fn create_palette(
        &mut self,
        id: impl Into<String>,
        colors: Vec<Color>,
        duration: Option<f64>,
        return_format: ReturnFormat,
        module_name: impl Into<String>,
        variable: impl Into<String>,
    ) -> &PaletteEntry {
        let id = id.into();

        if !self.palettes.contains_key(&id) {
            self.worker
                .create_palette(id.clone(), colors.clone(), duration, return_format);

            self.palettes.insert(
                id.clone(),
                PaletteEntry {
                    module_name: module_name.into(),
                    variable: variable.into(),
                    colors,
                    duration: duration.unwrap_or(300.0),
                    use_bpm: false,
                    bpm_division: 16.0,
                    return_format,
                    current_color: 0,
                    current_step: String::new(),
                },
            );
        }

        &self.palettes[&id]
    }

    pub fn remove_palette(&mut self, id: &str) {
        self.worker.remove_palette(id);
        self.palettes.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.palettes.contains_key(id)
    }

    pub fn entry(&self, id: &str) -> Option<&PaletteEntry> {
        self.palettes.get(id)
    }

    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    /// The module parameter a palette id drives
    pub fn binding(&self, id: &str) -> Option<(String, String)> {
        self.palettes
            .get(id)
            .map(|entry| (entry.module_name.clone(), entry.variable.clone()))
    }

    pub fn update_colors(&mut self, id: &str, colors: Vec<Color>) {
        self.worker.set_palette(
            id,
            PaletteOptions { colors: Some(colors.clone()), ..Default::default() },
        );

        if let Some(entry) = self.palettes.get_mut(id) {
            entry.colors = colors;
        }
    }

    pub fn update_duration(&mut self, id: &str, duration: f64) {
        self.worker.set_palette(
            id,
            PaletteOptions { time_period: Some(duration), ..Default::default() },
        );

        if let Some(entry) = self.palettes.get_mut(id) {
            entry.duration = duration;
        }
    }

    pub fn update_use_bpm(&mut self, id: &str, use_bpm: bool) {
        self.worker.set_palette(
            id,
            PaletteOptions { use_bpm: Some(use_bpm), ..Default::default() },
        );

        if let Some(entry) = self.palettes.get_mut(id) {
            entry.use_bpm = use_bpm;
        }
    }

    pub fn update_bpm_division(&mut self, id: &str, bpm_division: f64) {
        self.worker.set_palette(
            id,
            PaletteOptions { bpm_division: Some(bpm_division), ..Default::default() },
        );

        if let Some(entry) = self.palettes.get_mut(id) {
            entry.bpm_division = bpm_division;
        }
    }

    /// Broadcast a new tempo to every palette
    pub fn update_bpm(&mut self, bpm: f64) {
        for id in self.palettes.keys() {
            self.worker
                .set_palette(id.clone(), PaletteOptions { bpm: Some(bpm), ..Default::default() });
        }
    }

    pub fn start_loop(&self) {
        self.worker.start_loop();
    }

    pub fn stop_loop(&self) {
        self.worker.stop_loop();
    }

    /// Pull pending worker events and refresh the mirrors
    ///
    /// Returns the drained events so the caller can route updates into the
    /// control-value store.
    pub fn drain_events(&mut self) -> Vec<PaletteEvent> {
        let events = self.worker.drain_events();

        for event in &events {
            match event {
                PaletteEvent::Created { id } => {
                    debug!(palette = %id, "palette created");
                }
                PaletteEvent::Update { id, current_step, current_color } => {
                    if let Some(entry) = self.palettes.get_mut(id) {
                        entry.current_step = current_step.clone();
                        entry.current_color = *current_color;
                    }
                }
            }
        }

        events
    }

    /// Snapshot palette state for the named modules
    pub fn snapshot(&self, module_names: &[String]) -> serde_json::Value {
        let mut data = serde_json::Map::new();

        for (id, entry) in &self.palettes {
            if !module_names.contains(&entry.module_name) {
                continue;
            }

            data.insert(
                id.clone(),
                json!({
                    "moduleName": entry.module_name,
                    "variable": entry.variable,
                    "colors": entry.colors,
                    "duration": entry.duration,
                    "useBpm": entry.use_bpm,
                    "bpmDivision": entry.bpm_division,
                    "currentColor": entry.current_color,
                    "currentStep": entry.current_step,
                }),
            );
        }

        serde_json::Value::Object(data)
    }
}
