use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::{
    audio::{AudioFeed, BpmEstimator, FeatureExtractor, KickDetector, TempoState},
    composition::compositor::render_layers,
    config::Config,
    error::Result,
    layer::LayerStack,
    module::{FrameContext, GroupSlot, MetaWrite, ModuleRuntime, ParamValue},
    palette::{PaletteEvent, PaletteRegistry},
    store::ControlValueStore,
    surface::{CompositeOp, Surface},
};

/// Future returned by a frame sink's publish call
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// External muxing/output step the composited frame is handed to
///
/// The preview repaint never reads the output surface before the returned
/// future resolves.
pub trait FrameSink: Send {
    fn publish<'a>(&'a mut self, frame: &'a Surface) -> SinkFuture<'a>;
}

/// Sink that accepts every frame immediately; useful headless and in tests
pub struct NullSink;

impl FrameSink for NullSink {
    fn publish<'a>(&'a mut self, _frame: &'a Surface) -> SinkFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// The audio-reactive compositing engine
///
/// Owns every subsystem and exposes the single per-tick entry point the
/// render scheduler drives. All mutation of committed module state funnels
/// through the control-value store's commit at the start of a tick.
pub struct Engine {
    config: Config,
    runtime: ModuleRuntime,
    store: ControlValueStore,
    layers: LayerStack,
    feed: AudioFeed,
    tempo: TempoState,
    extractor: Box<dyn FeatureExtractor>,
    estimator: BpmEstimator,
    kick_detector: KickDetector,
    kick: bool,
    palettes: PaletteRegistry,
    feedback: Surface,
    output: Surface,
    preview: Surface,
    sink: Box<dyn FrameSink>,
    video_frame: Option<Surface>,
}

impl Engine {
    /// Build an engine; must be called within a tokio runtime so the
    /// palette worker can spawn
    pub fn new(
        config: Config,
        extractor: Box<dyn FeatureExtractor>,
        sink: Box<dyn FrameSink>,
    ) -> Result<Self> {
        config.validate()?;

        let width = config.render.width;
        let height = config.render.height;
        let preview_width = config.render.preview.x + config.render.preview.width;
        let preview_height = config.render.preview.y + config.render.preview.height;

        let estimator = BpmEstimator::new(
            config.audio.min_bpm,
            config.audio.max_bpm,
            config.audio.beat_sensitivity,
        );
        let palettes = PaletteRegistry::new(config.palette.tick_rate);

        Ok(Self {
            config,
            runtime: ModuleRuntime::new(),
            store: ControlValueStore::new(),
            layers: LayerStack::new(),
            feed: AudioFeed::new(),
            tempo: TempoState::new(),
            extractor,
            estimator,
            kick_detector: KickDetector::new(0.5),
            kick: false,
            palettes,
            feedback: Surface::new(width, height),
            output: Surface::new(width, height),
            preview: Surface::new(preview_width.max(1), preview_height.max(1)),
            sink,
            video_frame: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut ModuleRuntime {
        &mut self.runtime
    }

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut LayerStack {
        &mut self.layers
    }

    pub fn store(&self) -> &ControlValueStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ControlValueStore {
        &mut self.store
    }

    pub fn feed_mut(&mut self) -> &mut AudioFeed {
        &mut self.feed
    }

    pub fn palettes(&self) -> &PaletteRegistry {
        &self.palettes
    }

    pub fn palettes_mut(&mut self) -> &mut PaletteRegistry {
        &mut self.palettes
    }

    pub fn tempo(&self) -> &TempoState {
        &self.tempo
    }

    pub fn tempo_mut(&mut self) -> &mut TempoState {
        &mut self.tempo
    }

    pub fn output(&self) -> &Surface {
        &self.output
    }

    pub fn preview(&self) -> &Surface {
        &self.preview
    }

    pub fn kick(&self) -> bool {
        self.kick
    }

    /// Set the shared video input frame modules may sample from
    pub fn set_video_frame(&mut self, frame: Option<Surface>) {
        self.video_frame = frame;
    }

    pub fn add_layer(&mut self) -> usize {
        self.layers.add_layer(self.config.render.width, self.config.render.height)
    }

    /// Remove a layer and tear down every module instance it held
    pub fn remove_layer(&mut self, index: usize) -> Result<()> {
        let module_names = self.layers.remove_layer(index)?;
        for name in module_names {
            self.runtime.remove(&name, &mut self.layers, &mut self.palettes)?;
        }
        Ok(())
    }

    /// Instantiate a registered definition and place it in a layer
    pub fn add_module_to_layer(
        &mut self,
        definition_name: &str,
        layer_index: usize,
        position: usize,
        enabled: bool,
    ) -> Result<String> {
        let name = self.runtime.instantiate(
            definition_name,
            enabled,
            None,
            false,
            &mut self.palettes,
            &mut self.feed,
            &mut self.feedback,
        )?;

        if let Err(err) = self.layers.add_module_to_layer(&name, layer_index, position) {
            // Roll the instance back so a bad layer index leaves no orphan
            self.runtime.remove(&name, &mut self.layers, &mut self.palettes)?;
            return Err(err);
        }

        Ok(name)
    }

    /// Remove an active module instance; removing an unknown name is a
    /// no-op
    pub fn remove_module(&mut self, name: &str) -> Result<()> {
        self.runtime.remove(name, &mut self.layers, &mut self.palettes)
    }

    /// Validating parameter write; the value lands at the next commit
    pub fn update_prop(
        &self,
        module_name: &str,
        param: &str,
        value: ParamValue,
        slot: Option<GroupSlot>,
    ) -> Result<()> {
        self.store.request_write(&self.runtime, module_name, param, value, slot)
    }

    /// Queue a metadata write; applied at the next commit
    pub fn update_meta(&self, module_name: &str, write: MetaWrite) {
        self.store.queue_meta(module_name, write);
    }

    /// Queue every schema default back through the validating write path
    pub fn reset_module(&self, name: &str) -> Result<()> {
        let Some(module) = self.runtime.active(name) else {
            return Ok(());
        };

        let definition = module.state.definition.clone();
        for (key, schema) in &definition.props {
            if let Some(default) = schema.default.clone() {
                self.store.request_write(&self.runtime, name, key, default, None)?;
            }
        }
        Ok(())
    }

    pub fn grow(&mut self, name: &str, group: &str) -> Result<()> {
        self.runtime.grow(name, group)
    }

    pub fn shrink(&mut self, name: &str, group: &str) -> Result<()> {
        self.runtime.shrink(name, group)
    }

    /// Resize every core-owned surface
    pub fn resize(&mut self, width: u32, height: u32, dpr: f64) {
        let scaled_width = ((width as f64 * dpr) as u32).max(1);
        let scaled_height = ((height as f64 * dpr) as u32).max(1);

        self.config.render.width = scaled_width;
        self.config.render.height = scaled_height;
        self.feedback.resize(scaled_width, scaled_height);
        self.output.resize(scaled_width, scaled_height);
        self.layers.resize_all(width, height, dpr);

        info!(width = scaled_width, height = scaled_height, "engine resized");
    }

    /// Persistable view of modules, layers and palettes
    pub fn snapshot(&self) -> serde_json::Value {
        let module_names: Vec<String> = self
            .runtime
            .active_names()
            .into_iter()
            .filter(|name| !name.contains("-gallery"))
            .collect();

        serde_json::json!({
            "modules": self.runtime.snapshot(),
            "layers": self.layers.snapshot(),
            "palettes": self.palettes.snapshot(&module_names),
        })
    }

    /// One render tick
    ///
    /// Ordering per tick: audio features and beat state update, queued
    /// palette updates and assignments become pending writes, the commit
    /// drains every queue, the layer walk runs over committed state only,
    /// and the preview repaints strictly after the mux step resolves.
    pub async fn tick(&mut self, delta_ms: f64, samples: &[f32]) -> Result<()> {
        self.store.set_delta(delta_ms);

        let requested = self.feed.requested();
        let features =
            self.extractor.extract(&requested, samples, self.config.audio.sample_rate);

        self.feed.apply_assignments(&self.store, &self.runtime, &features);

        self.estimator.process(delta_ms / 1000.0, &features.spectrum_real);
        self.kick = self.kick_detector.process(&self.estimator);

        if let Some(bpm) = self.tempo.update_detected(self.estimator.win_bpm()) {
            debug!(bpm, "detected tempo committed");
            self.palettes.update_bpm(bpm as f64);
        }

        // Palette updates arrive asynchronously; route them through the
        // validating write path like any other producer
        for event in self.palettes.drain_events() {
            if let PaletteEvent::Update { id, current_step, .. } = event {
                if let Some((module_name, variable)) = self.palettes.binding(&id) {
                    if let Err(err) = self.store.request_write(
                        &self.runtime,
                        &module_name,
                        &variable,
                        ParamValue::Text(current_step),
                        None,
                    ) {
                        debug!(palette = %id, "palette write skipped: {}", err);
                    }
                }
            }
        }

        self.store.commit(&mut self.runtime);

        let ctx = FrameContext {
            features: &features,
            delta: delta_ms,
            bpm: self.tempo.bpm(),
            kick: self.kick,
            video_frame: self.video_frame.as_ref(),
        };

        render_layers(
            &mut self.layers,
            &mut self.runtime,
            &mut self.feedback,
            &self.output,
            &ctx,
        );

        self.runtime.poll_backends();

        self.output.clear();
        for layer in self.layers.iter() {
            if layer.draw_to_output && layer.enabled {
                self.output.composite(&layer.surface, layer.alpha, CompositeOp::Normal);
            }
        }

        // The preview repaint must never observe the output mid-mux
        self.sink.publish(&self.output).await?;

        self.preview.clear();
        let viewport = &self.config.render.preview;
        self.preview.draw_scaled(
            &self.output,
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
        );

        Ok(())
    }
}

/// Cooperative single-threaded render scheduler
///
/// Drives one tick per host frame signal; no tick overlaps another, and the
/// only suspension points are the frame signal and the engine's mux await.
/// A failed tick is reported and the loop keeps scheduling.
pub struct RenderScheduler {
    frame: Duration,
}

impl RenderScheduler {
    pub fn new(fps: f64) -> Self {
        Self {
            frame: Duration::from_secs_f64(1.0 / fps.max(1.0)),
        }
    }

    /// Run until the frame source returns `None`
    pub async fn run<F>(&self, engine: &mut Engine, mut frames: F) -> Result<()>
    where
        F: FnMut(u64) -> Option<Vec<f32>>,
    {
        let mut interval = tokio::time::interval(self.frame);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let delta_ms = self.frame.as_secs_f64() * 1000.0;
        let mut index = 0u64;

        while let Some(samples) = frames(index) {
            interval.tick().await;

            if let Err(err) = engine.tick(delta_ms, &samples).await {
                // One faulty tick must not wedge the loop
                error!(frame = index, "tick failed: {}", err.user_message());
            }

            index += 1;
        }

        Ok(())
    }
}
