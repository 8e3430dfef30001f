use crate::{
    audio::FeatureSet,
    error::Result,
    module::definition::ModuleDefinition,
    module::instance::InstanceState,
    surface::Surface,
};

/// Per-tick frame arguments shared by every module draw call
pub struct FrameContext<'a> {
    pub features: &'a FeatureSet,
    pub delta: f64,
    pub bpm: f64,
    pub kick: bool,
    pub video_frame: Option<&'a Surface>,
}

/// Contract for raster-drawing modules
///
/// Authors implement `draw` against a scratch surface; compositing onto the
/// layer happens in the sealed render wrapper and cannot be replaced.
pub trait RasterModule: Send {
    /// One-time setup against the shared compositing surface
    fn init(&mut self, _surface: &mut Surface) {}

    /// Called when the compositing surfaces change size
    fn resize(&mut self, _surface: &mut Surface) {}

    fn draw(
        &mut self,
        surface: &mut Surface,
        state: &InstanceState,
        ctx: &FrameContext<'_>,
    ) -> Result<()>;
}

/// Sealed wrapper around a raster module
///
/// Performs off-screen double-buffered drawing and composites the result
/// onto the target honoring the instance's alpha and composite operation.
pub struct RasterRenderer {
    module: Box<dyn RasterModule>,
    scratch: Surface,
}

impl RasterRenderer {
    pub fn new(module: Box<dyn RasterModule>) -> Self {
        Self { module, scratch: Surface::new(1, 1) }
    }

    pub fn init(&mut self, surface: &mut Surface) {
        self.module.init(surface);
    }

    pub fn resize(&mut self, surface: &mut Surface) {
        self.module.resize(surface);
    }

    fn render(
        &mut self,
        target: &mut Surface,
        state: &InstanceState,
        ctx: &FrameContext<'_>,
    ) -> Result<()> {
        if self.scratch.width() != target.width() || self.scratch.height() != target.height() {
            self.scratch.resize(target.width(), target.height());
        }
        self.scratch.clear();

        self.module.draw(&mut self.scratch, state, ctx)?;

        target.composite(&self.scratch, state.meta.alpha, state.meta.composite_operation);
        Ok(())
    }
}

/// Contract for externally-prepared shader programs
///
/// Compilation and uniform binding happen in the backend; the compositor
/// only drives the per-tick render call.
pub trait ShaderProgram: Send {
    fn render(
        &mut self,
        surface: &mut Surface,
        state: &InstanceState,
        ctx: &FrameContext<'_>,
        pipeline: bool,
    ) -> Result<()>;
}

/// Backend that prepares shader and shader-interchange programs
pub trait ShaderBackend: Send {
    /// Compile a definition's program; failure aborts the instantiation
    fn prepare(&mut self, definition: &ModuleDefinition) -> Result<Box<dyn ShaderProgram>>;

    /// Drain the backend's command queue at the end of a tick
    fn poll(&mut self) {}
}

/// Closed dispatch over the renderer families, selected once at
/// instantiation and carried on the instance
pub enum ModuleRenderer {
    Raster(RasterRenderer),
    Shader(Box<dyn ShaderProgram>),
    ShaderInterchange(Box<dyn ShaderProgram>),
}

impl ModuleRenderer {
    pub fn render(
        &mut self,
        target: &mut Surface,
        state: &InstanceState,
        ctx: &FrameContext<'_>,
        pipeline: bool,
    ) -> Result<()> {
        match self {
            ModuleRenderer::Raster(renderer) => renderer.render(target, state, ctx),
            ModuleRenderer::Shader(program) | ModuleRenderer::ShaderInterchange(program) => {
                program.render(target, state, ctx, pipeline)
            }
        }
    }

    pub fn init(&mut self, surface: &mut Surface) {
        if let ModuleRenderer::Raster(renderer) = self {
            renderer.init(surface);
        }
    }

    pub fn resize(&mut self, surface: &mut Surface) {
        if let ModuleRenderer::Raster(renderer) = self {
            renderer.resize(surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct WhiteFill;

    impl RasterModule for WhiteFill {
        fn draw(
            &mut self,
            surface: &mut Surface,
            _state: &InstanceState,
            _ctx: &FrameContext<'_>,
        ) -> Result<()> {
            surface.fill([255, 255, 255, 255]);
            Ok(())
        }
    }

    fn test_state(alpha: f64) -> InstanceState {
        let definition = Arc::new(ModuleDefinition::raster("White", "test", "1.0.0"));
        let mut state = InstanceState::from_definition("White".to_string(), definition, true);
        state.meta.alpha = alpha;
        state
    }

    #[test]
    fn test_wrapper_composites_with_alpha() {
        let features = FeatureSet::new();
        let ctx = FrameContext {
            features: &features,
            delta: 16.0,
            bpm: 120.0,
            kick: false,
            video_frame: None,
        };

        let mut renderer = RasterRenderer::new(Box::new(WhiteFill));
        let mut target = Surface::new_filled(2, 2, [0, 0, 0, 255]);

        let state = test_state(0.5);
        renderer.render(&mut target, &state, &ctx).unwrap();

        let pixel = target.get_pixel(0, 0);
        assert!(pixel[0] > 100 && pixel[0] < 155, "got {:?}", pixel);
    }

    #[test]
    fn test_wrapper_tracks_target_size() {
        let features = FeatureSet::new();
        let ctx = FrameContext {
            features: &features,
            delta: 16.0,
            bpm: 120.0,
            kick: false,
            video_frame: None,
        };

        let mut renderer = RasterRenderer::new(Box::new(WhiteFill));
        let mut target = Surface::new(8, 4);

        let state = test_state(1.0);
        renderer.render(&mut target, &state, &ctx).unwrap();
        assert_eq!(target.get_pixel(7, 3), [255, 255, 255, 255]);
    }
}
