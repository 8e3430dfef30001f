//! The frame compositor and render scheduling
//!
//! [`render_layers`] is the per-tick layer walk; [`Engine`] owns the
//! subsystems and sequences commit, audio update, walk, mux and preview
//! repaint; [`RenderScheduler`] drives one tick per host frame signal.

mod compositor;
mod engine;

pub use compositor::render_layers;
pub use engine::{Engine, FrameSink, NullSink, RenderScheduler, SinkFuture};
