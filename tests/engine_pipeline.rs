//! End-to-end engine exercises: full ticks over a real scene, the pipeline
//! feedback contract, and teardown mid-session.

use pulse_compositor::{
    audio::{BasicExtractor, FeatureAssignment},
    composition::{Engine, NullSink, RenderScheduler},
    config::{Config, PreviewConfig},
    error::Result,
    module::{FrameContext, InstanceState, ModuleDefinition, RasterModule},
    modules::register_builtin_modules,
    surface::Surface,
};

/// Writes a deterministic pattern so pixel equality is checkable
struct Pattern {
    tag: u8,
}

impl RasterModule for Pattern {
    fn draw(
        &mut self,
        surface: &mut Surface,
        _state: &InstanceState,
        _ctx: &FrameContext<'_>,
    ) -> Result<()> {
        for y in 0..surface.height() {
            for x in 0..surface.width() {
                surface.set_pixel(x, y, [self.tag, x as u8, y as u8, 255]);
            }
        }
        Ok(())
    }
}

/// Draws nothing, leaving the chained pipeline image untouched
struct Passthrough;

impl RasterModule for Passthrough {
    fn draw(
        &mut self,
        _surface: &mut Surface,
        _state: &InstanceState,
        _ctx: &FrameContext<'_>,
    ) -> Result<()> {
        Ok(())
    }
}

fn small_config() -> Config {
    let mut config = Config::default();
    config.render.width = 8;
    config.render.height = 8;
    config.render.preview = PreviewConfig { x: 0, y: 0, width: 4, height: 4 };
    config.audio.window_size = 64;
    config
}

fn test_engine() -> Engine {
    let config = small_config();
    let window_size = config.audio.window_size;
    let mut engine = Engine::new(
        config,
        Box::new(BasicExtractor::new(window_size)),
        Box::new(NullSink),
    )
    .unwrap();

    engine.runtime_mut().registry_mut().register_raster(
        ModuleDefinition::raster("Pattern", "test", "1.0.0"),
        || Box::new(Pattern { tag: 42 }),
    );
    engine.runtime_mut().registry_mut().register_raster(
        ModuleDefinition::raster("Passthrough", "test", "1.0.0"),
        || Box::new(Passthrough),
    );

    engine
}

fn sine_frame(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.2).sin() * 0.5).collect()
}

#[tokio::test(start_paused = true)]
async fn pipeline_layer_chains_through_a_full_tick() {
    let mut engine = test_engine();

    let layer = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(layer).unwrap();
        layer.pipeline = true;
        layer.clearing = true;
        layer.inherit = false;
    }

    engine.add_module_to_layer("Pattern", layer, 0, true).unwrap();
    engine.add_module_to_layer("Passthrough", layer, 1, true).unwrap();

    engine.tick(1000.0 / 60.0, &sine_frame(64)).await.unwrap();

    // The passthrough module consumed the chained image without disturbing
    // it, so the pattern survives to the layer and the output composite
    let surface = &engine.layers().get(0).unwrap().surface;
    assert_eq!(surface.get_pixel(5, 3), [42, 5, 3, 255]);
    assert_eq!(engine.output().get_pixel(5, 3), [42, 5, 3, 255]);
}

#[tokio::test(start_paused = true)]
async fn inherit_chain_carries_previous_layer_forward() {
    let mut engine = test_engine();

    let base = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(base).unwrap();
        layer.clearing = true;
        layer.inherit = false;
    }
    engine.add_module_to_layer("Pattern", base, 0, true).unwrap();

    let top = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(top).unwrap();
        layer.inherit = true;
        layer.enabled = false;
    }

    engine.tick(1000.0 / 60.0, &sine_frame(64)).await.unwrap();

    let base_surface = engine.layers().get(base).unwrap().surface.clone();
    let top_surface = engine.layers().get(top).unwrap().surface.clone();
    assert_eq!(base_surface, top_surface);
}

#[tokio::test(start_paused = true)]
async fn preview_matches_scaled_output_after_tick() {
    let mut engine = test_engine();

    let layer = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(layer).unwrap();
        layer.clearing = true;
        layer.inherit = false;
    }
    engine.add_module_to_layer("Pattern", layer, 0, true).unwrap();

    engine.tick(1000.0 / 60.0, &sine_frame(64)).await.unwrap();

    // 8x8 output scaled into a 4x4 viewport: preview (1,1) samples (2,2)
    assert_eq!(engine.preview().get_pixel(1, 1), engine.output().get_pixel(2, 2));
}

#[tokio::test(start_paused = true)]
async fn full_scene_with_builtins_runs_and_snapshots() {
    let mut engine = test_engine();
    register_builtin_modules(engine.runtime_mut().registry_mut());

    let background = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(background).unwrap();
        layer.clearing = true;
        layer.inherit = false;
    }
    engine.add_module_to_layer("SolidWash", background, 0, true).unwrap();

    let reactive = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(reactive).unwrap();
        layer.clearing = true;
        layer.inherit = false;
    }
    let pulse = engine.add_module_to_layer("SpectrumPulse", reactive, 0, true).unwrap();
    engine.feed_mut().assign(FeatureAssignment {
        feature: "rms".to_string(),
        module_name: pulse.clone(),
        param: "gain".to_string(),
    });

    let scheduler = RenderScheduler::new(60.0);
    scheduler
        .run(&mut engine, |frame| (frame < 5).then(|| sine_frame(64)))
        .await
        .unwrap();

    // The rms assignment moved analysis into the committed parameter
    let gain = engine.runtime().active(&pulse).unwrap().state.param_f64("gain");
    assert!(gain > 0.0);

    let snapshot = engine.snapshot();
    assert!(snapshot["modules"].as_object().unwrap().contains_key("SolidWash"));
    assert_eq!(snapshot["layers"].as_array().unwrap().len(), 2);
    // SolidWash's palette rides along under its derived id
    assert!(snapshot["palettes"]
        .as_object()
        .unwrap()
        .contains_key("SolidWash-color"));
}

#[tokio::test(start_paused = true)]
async fn removing_a_module_mid_session_keeps_ticking() {
    let mut engine = test_engine();

    let layer = engine.add_layer();
    {
        let layer = engine.layers_mut().get_mut(layer).unwrap();
        layer.clearing = true;
        layer.inherit = false;
    }
    let name = engine.add_module_to_layer("Pattern", layer, 0, true).unwrap();

    engine.tick(1000.0 / 60.0, &sine_frame(64)).await.unwrap();
    assert_eq!(engine.output().get_pixel(0, 0), [42, 0, 0, 255]);

    engine.remove_module(&name).unwrap();
    engine.tick(1000.0 / 60.0, &sine_frame(64)).await.unwrap();

    // The cleared layer contributes transparency once its module is gone
    assert_eq!(engine.output().get_pixel(0, 0), [0, 0, 0, 0]);

    // A stale write for the removed module is dropped by the next commit
    assert!(engine.update_prop(&name, "level", 1.0.into(), None).is_err());
}
