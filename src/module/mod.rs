//! Module definitions, instances and the runtime lifecycle
//!
//! A definition is an immutable template registered once; an active module
//! is a live placement with its own committed parameter values, group
//! arrays and metadata, plus the renderer selected at instantiation time.

mod definition;
mod instance;
mod registry;
mod renderer;
mod runtime;

pub use definition::{
    ControlBinding, DefinitionMeta, GroupSchema, ModuleDefinition, ModuleKind,
    PaletteControlOptions, ParamValue, PropKind, PropSchema, SaveSchema, Setter, ShaderSource,
    TextureValue,
};
pub use instance::{
    ActiveModule, GroupSlot, GroupState, InstanceState, MetaKey, MetaWrite, ModuleMeta,
};
pub use registry::{ModuleRegistry, RasterFactory, RegistryEntry};
pub use renderer::{
    FrameContext, ModuleRenderer, RasterModule, RasterRenderer, ShaderBackend, ShaderProgram,
};
pub use runtime::ModuleRuntime;
