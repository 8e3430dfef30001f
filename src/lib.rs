//! # Pulse-Compositor
//!
//! Real-time audio-reactive visual performance engine with beat-synchronized
//! layer compositing.
//!
//! Each tick the engine commits queued parameter writes, updates audio
//! features and the BPM/kick estimate, walks the layer stack dispatching
//! every module through its renderer, and republishes the composited frame
//! to the preview and output surfaces.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pulse_compositor::{
//!     audio::BasicExtractor,
//!     composition::{Engine, NullSink, RenderScheduler},
//!     config::Config,
//!     modules::register_builtin_modules,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let window_size = config.audio.window_size;
//!
//! let mut engine = Engine::new(
//!     config,
//!     Box::new(BasicExtractor::new(window_size)),
//!     Box::new(NullSink),
//! )?;
//! register_builtin_modules(engine.runtime_mut().registry_mut());
//!
//! let layer = engine.add_layer();
//! engine.add_module_to_layer("SolidWash", layer, 0, true)?;
//!
//! let scheduler = RenderScheduler::new(60.0);
//! scheduler.run(&mut engine, |frame| (frame < 600).then(Vec::new)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`composition`] - Frame compositor, engine and render scheduler
//! - [`store`] - Control-value store and the per-tick commit protocol
//! - [`module`] - Module definitions, instances and the runtime lifecycle
//! - [`palette`] - Isolated palette animation worker and its registry
//! - [`audio`] - Feature feed, BPM estimation and kick detection
//! - [`layer`] - Layer stack and its compositing flags
//!
//! ## Writing Modules
//!
//! Raster modules implement the [`RasterModule`](module::RasterModule)
//! trait. Drawing happens against an off-screen scratch surface; the sealed
//! render wrapper composites the result onto the layer honoring the
//! instance's alpha and composite operation:
//!
//! ```rust,no_run
//! use pulse_compositor::error::Result;
//! use pulse_compositor::module::{FrameContext, InstanceState, RasterModule};
//! use pulse_compositor::surface::Surface;
//!
//! struct Flash;
//!
//! impl RasterModule for Flash {
//!     fn draw(
//!         &mut self,
//!         surface: &mut Surface,
//!         _state: &InstanceState,
//!         ctx: &FrameContext<'_>,
//!     ) -> Result<()> {
//!         if ctx.kick {
//!             surface.fill([255, 255, 255, 255]);
//!         }
//!         Ok(())
//!     }
//! }
//! ```

pub mod audio;
pub mod composition;
pub mod config;
pub mod error;
pub mod layer;
pub mod module;
pub mod modules;
pub mod naming;
pub mod palette;
pub mod store;
pub mod surface;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{Engine, FrameSink, NullSink, RenderScheduler},
    config::Config,
    error::{EngineError, Result},
    layer::{Layer, LayerStack},
    module::{ModuleDefinition, ModuleRuntime, RasterModule},
    store::ControlValueStore,
    surface::{CompositeOp, Surface},
};
