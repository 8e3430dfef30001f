//! Palette animation engine
//!
//! Color interpolation runs on an isolated worker with its own timer,
//! reachable only through asynchronous messages. The engine keeps a
//! lightweight mirror of each palette for snapshots and routes worker
//! updates into the control-value store as ordinary parameter writes.

mod palette;
mod registry;
mod worker;

pub use palette::{Color, Palette, ReturnFormat, TICK_MS};
pub use registry::{PaletteEntry, PaletteRegistry};
pub use worker::{PaletteCommand, PaletteEvent, PaletteOptions, PaletteWorker};
