use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    audio::AudioFeed,
    error::{ModuleError, Result},
    layer::LayerStack,
    module::definition::{ControlBinding, ModuleKind, PropKind},
    module::instance::{ActiveModule, InstanceState},
    module::registry::ModuleRegistry,
    module::renderer::{ModuleRenderer, RasterRenderer, ShaderBackend},
    naming::next_name,
    palette::PaletteRegistry,
    surface::Surface,
};

/// Lifecycle manager for module instances
///
/// Owns the definition registry and every active instance; other components
/// address modules by name and resolve through the runtime's lookups.
pub struct ModuleRuntime {
    registry: ModuleRegistry,
    active: HashMap<String, ActiveModule>,
    focused: Option<String>,
    pinned: HashSet<String>,
    shader_backend: Option<Box<dyn ShaderBackend>>,
    interchange_backend: Option<Box<dyn ShaderBackend>>,
}

impl ModuleRuntime {
    pub fn new() -> Self {
        Self {
            registry: ModuleRegistry::new(),
            active: HashMap::new(),
            focused: None,
            pinned: HashSet::new(),
            shader_backend: None,
            interchange_backend: None,
        }
    }

    /// Attach the backends that prepare shader and shader-interchange
    /// programs
    pub fn with_backends(
        mut self,
        shader: Option<Box<dyn ShaderBackend>>,
        interchange: Option<Box<dyn ShaderBackend>>,
    ) -> Self {
        self.shader_backend = shader;
        self.interchange_backend = interchange;
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    pub fn active(&self, name: &str) -> Option<&ActiveModule> {
        self.active.get(name)
    }

    pub fn active_mut(&mut self, name: &str) -> Option<&mut ActiveModule> {
        self.active.get_mut(name)
    }

    pub fn active_names(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn set_focus(&mut self, name: Option<String>) {
        self.focused = name;
    }

    pub fn pin(&mut self, name: impl Into<String>) {
        self.pinned.insert(name.into());
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.pinned.contains(name)
    }

    /// Create an active instance from a registered definition
    ///
    /// Shader kinds run their backend preparation first; a compile failure
    /// aborts the whole instantiation and registers nothing. The instance
    /// gets a collision-free display name, schema defaults, group arrays at
    /// their declared default length, a palette per palette-type control,
    /// and its declared audio features registered with the feed. Lifecycle
    /// hooks run against the shared compositing surface except for gallery
    /// previews.
    pub fn instantiate(
        &mut self,
        definition_name: &str,
        enabled: bool,
        append_suffix: Option<&str>,
        skip_init: bool,
        palettes: &mut PaletteRegistry,
        feed: &mut AudioFeed,
        init_surface: &mut Surface,
    ) -> Result<String> {
        let entry = self.registry.get(definition_name).ok_or_else(|| ModuleError::NotRegistered {
            name: definition_name.to_string(),
        })?;

        let definition = Arc::clone(&entry.definition);

        // Renderer preparation comes first so a failure cannot leave a
        // half-configured instance behind
        let mut renderer = match definition.meta.kind {
            ModuleKind::Raster => {
                let factory = entry.factory.clone().ok_or_else(|| ModuleError::PreparationFailed {
                    name: definition_name.to_string(),
                    reason: "raster module registered without a factory".to_string(),
                })?;
                ModuleRenderer::Raster(RasterRenderer::new(factory()))
            }
            ModuleKind::Shader => {
                let backend =
                    self.shader_backend.as_mut().ok_or_else(|| ModuleError::PreparationFailed {
                        name: definition_name.to_string(),
                        reason: "no shader backend attached".to_string(),
                    })?;
                ModuleRenderer::Shader(backend.prepare(&definition)?)
            }
            ModuleKind::ShaderInterchange => {
                let backend = self.interchange_backend.as_mut().ok_or_else(|| {
                    ModuleError::PreparationFailed {
                        name: definition_name.to_string(),
                        reason: "no shader-interchange backend attached".to_string(),
                    }
                })?;
                ModuleRenderer::ShaderInterchange(backend.prepare(&definition)?)
            }
        };

        let base = format!("{}{}", definition.meta.name, append_suffix.unwrap_or(""));
        let name = next_name(&base, self.active.keys().map(String::as_str));

        let state = InstanceState::from_definition(name.clone(), Arc::clone(&definition), enabled);

        // Palette-type controls get their backing palette before the
        // instance is considered ready
        for (key, schema) in &definition.props {
            if let Some(ControlBinding::Palette(options)) = &schema.control {
                palettes.create_palette(
                    format!("{}-{}", name, key),
                    options.colors.clone(),
                    options.duration,
                    options.return_format,
                    name.clone(),
                    key.clone(),
                );
            }
        }

        for feature in &definition.audio_features {
            feed.register_feature(feature.clone());
        }

        if !state.is_gallery() && !skip_init {
            renderer.init(init_surface);
            renderer.resize(init_surface);
        }

        debug!(module = %name, kind = ?definition.meta.kind, "module instantiated");
        self.active.insert(name.clone(), ActiveModule { state, renderer });

        Ok(name)
    }

    /// Remove an active instance
    ///
    /// Detaches it from its layer, tears down any palette bound to its
    /// parameters and clears pin/focus state. Removing an unknown name is a
    /// no-op.
    pub fn remove(
        &mut self,
        name: &str,
        layers: &mut LayerStack,
        palettes: &mut PaletteRegistry,
    ) -> Result<()> {
        self.pinned.remove(name);
        if self.focused.as_deref() == Some(name) {
            self.focused = None;
        }

        let Some(module) = self.active.get(name) else {
            return Ok(());
        };

        for (key, schema) in &module.state.definition.props {
            if matches!(schema.control, Some(ControlBinding::Palette(_))) {
                palettes.remove_palette(&format!("{}-{}", name, key));
            }
        }

        layers.remove_module(name);
        self.active.remove(name);

        info!(module = %name, "module removed");
        Ok(())
    }

    /// Append one slot to every sub-array of the named group
    pub fn grow(&mut self, name: &str, group: &str) -> Result<()> {
        let module = self.active.get_mut(name).ok_or_else(|| ModuleError::NotActive {
            name: name.to_string(),
        })?;

        let definition = Arc::clone(&module.state.definition);
        let schema = definition
            .props
            .get(group)
            .and_then(|prop| prop.group.as_ref())
            .ok_or_else(|| ModuleError::UnknownGroup {
                name: name.to_string(),
                group: group.to_string(),
            })?;

        let state = module.state.group_mut(group).ok_or_else(|| ModuleError::UnknownGroup {
            name: name.to_string(),
            group: group.to_string(),
        })?;

        state.grow(schema);
        Ok(())
    }

    /// Remove the last slot of every sub-array of the named group; a no-op
    /// at length zero
    pub fn shrink(&mut self, name: &str, group: &str) -> Result<()> {
        let module = self.active.get_mut(name).ok_or_else(|| ModuleError::NotActive {
            name: name.to_string(),
        })?;

        let state = module.state.group_mut(group).ok_or_else(|| ModuleError::UnknownGroup {
            name: name.to_string(),
            group: group.to_string(),
        })?;

        state.shrink();
        Ok(())
    }

    /// Drain the graphics backends' command queues
    pub fn poll_backends(&mut self) {
        if let Some(backend) = self.shader_backend.as_mut() {
            backend.poll();
        }
        if let Some(backend) = self.interchange_backend.as_mut() {
            backend.poll();
        }
    }

    /// Snapshot committed values and metadata for every non-preview
    /// instance
    ///
    /// Definitions with a save schema have their committed state validated
    /// against it; instances that fail validation are excluded with a
    /// warning rather than aborting the snapshot.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut data = serde_json::Map::new();

        let mut names: Vec<&String> =
            self.active.keys().filter(|name| !name.contains("-gallery")).collect();
        names.sort();

        for name in names {
            let module = &self.active[name];
            let state = &module.state;
            let definition = &state.definition;

            let mut values = serde_json::Map::new();
            for (key, value) in state.params() {
                values.insert(key.to_string(), value.to_json());
            }
            for group_name in state.group_names() {
                let group = state.group(group_name).expect("group names are from the state");
                let group_props: Vec<String> = definition
                    .props
                    .get(group_name)
                    .and_then(|p| p.group.as_ref())
                    .map(|g| g.props.keys().cloned().collect())
                    .unwrap_or_default();

                let mut arrays = serde_json::Map::new();
                for prop in group_props {
                    let slots: Vec<serde_json::Value> = group
                        .array(&prop)
                        .map(|a| a.iter().map(|v| v.to_json()).collect())
                        .unwrap_or_default();
                    arrays.insert(prop, serde_json::Value::Array(slots));
                }
                values.insert(
                    group_name.to_string(),
                    json!({ "length": group.length(), "props": arrays }),
                );
            }

            if let Some(schema) = &definition.save_schema {
                let mut valid = true;
                for (field, kind) in &schema.fields {
                    let matches = if *kind == PropKind::Group {
                        state.group(field).is_some()
                    } else {
                        state
                            .current_value(field, None)
                            .map(|value| kind_matches(*kind, &value))
                            .unwrap_or(false)
                    };

                    if !matches {
                        valid = false;
                        break;
                    }
                }

                if !valid {
                    warn!(module = %name, "save schema validation failed, excluding from snapshot");
                    continue;
                }

                values.retain(|key, _| schema.fields.contains_key(key));
            } else {
                debug!(module = %name, "no save schema, keeping all committed values");
            }

            data.insert(
                name.clone(),
                json!({
                    "values": values,
                    "meta": {
                        "originalName": state.meta.original_name,
                        "alpha": state.meta.alpha,
                        "enabled": state.meta.enabled,
                        "compositeOperation": state.meta.composite_operation,
                    },
                }),
            );
        }

        serde_json::Value::Object(data)
    }
}

impl Default for ModuleRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_matches(kind: PropKind, value: &crate::module::definition::ParamValue) -> bool {
    use crate::module::definition::ParamValue;

    matches!(
        (kind, value),
        (PropKind::Float, ParamValue::Float(_))
            | (PropKind::Float, ParamValue::Int(_))
            | (PropKind::Int, ParamValue::Int(_))
            | (PropKind::Bool, ParamValue::Bool(_))
            | (PropKind::Text, ParamValue::Text(_))
            | (PropKind::Texture, ParamValue::Texture(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::module::definition::{
        GroupSchema, ModuleDefinition, PropSchema, SaveSchema, ShaderSource,
    };
    use crate::module::instance::InstanceState;
    use crate::module::renderer::{FrameContext, RasterModule, ShaderProgram};

    struct Nop;

    impl RasterModule for Nop {
        fn draw(
            &mut self,
            _surface: &mut Surface,
            _state: &InstanceState,
            _ctx: &FrameContext<'_>,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }

    struct FailingBackend;

    impl ShaderBackend for FailingBackend {
        fn prepare(
            &mut self,
            definition: &ModuleDefinition,
        ) -> crate::error::Result<Box<dyn ShaderProgram>> {
            Err(ModuleError::PreparationFailed {
                name: definition.meta.name.clone(),
                reason: "compile error".to_string(),
            }
            .into())
        }
    }

    fn runtime_with_nop() -> ModuleRuntime {
        let mut runtime = ModuleRuntime::new();
        runtime.registry_mut().register_raster(
            ModuleDefinition::raster("Nop", "test", "1.0.0")
                .with_prop("level", PropSchema::float(0.5))
                .with_prop(
                    "emitters",
                    PropSchema::group(GroupSchema::new(1).with_prop("x", PropSchema::float(0.0))),
                ),
            || Box::new(Nop),
        );
        runtime
    }

    fn collaborators() -> (PaletteRegistry, AudioFeed, Surface) {
        (PaletteRegistry::new(60.0), AudioFeed::new(), Surface::new(4, 4))
    }

    #[tokio::test(start_paused = true)]
    async fn test_instantiate_applies_unique_names() {
        let mut runtime = runtime_with_nop();
        let (mut palettes, mut feed, mut surface) = collaborators();

        let first = runtime
            .instantiate("Nop", true, None, false, &mut palettes, &mut feed, &mut surface)
            .unwrap();
        let second = runtime
            .instantiate("Nop", true, None, false, &mut palettes, &mut feed, &mut surface)
            .unwrap();

        assert_eq!(first, "Nop");
        assert_eq!(second, "Nop-2");
        assert_eq!(runtime.active_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instantiate_unknown_definition_fails() {
        let mut runtime = runtime_with_nop();
        let (mut palettes, mut feed, mut surface) = collaborators();

        let result = runtime.instantiate(
            "Missing", true, None, false, &mut palettes, &mut feed, &mut surface,
        );
        assert!(matches!(
            result,
            Err(EngineError::Module(ModuleError::NotRegistered { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_shader_preparation_registers_nothing() {
        let mut runtime =
            ModuleRuntime::new().with_backends(Some(Box::new(FailingBackend)), None);
        runtime.registry_mut().register(ModuleDefinition::shader(
            "Glow",
            "test",
            "1.0.0",
            ShaderSource { vertex: None, fragment: "void main() {}".to_string() },
        ));

        let (mut palettes, mut feed, mut surface) = collaborators();
        let result = runtime.instantiate(
            "Glow", true, None, false, &mut palettes, &mut feed, &mut surface,
        );

        assert!(result.is_err());
        assert_eq!(runtime.active_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_is_idempotent_and_clears_focus() {
        let mut runtime = runtime_with_nop();
        let (mut palettes, mut feed, mut surface) = collaborators();
        let mut layers = LayerStack::new();
        layers.add_layer(4, 4);

        let name = runtime
            .instantiate("Nop", true, None, false, &mut palettes, &mut feed, &mut surface)
            .unwrap();
        layers.add_module_to_layer(&name, 0, 0).unwrap();
        runtime.set_focus(Some(name.clone()));

        runtime.remove(&name, &mut layers, &mut palettes).unwrap();
        assert_eq!(runtime.active_len(), 0);
        assert_eq!(runtime.focused(), None);
        assert_eq!(layers.layer_from_module(&name), None);

        // Second removal of the same name is a no-op
        runtime.remove(&name, &mut layers, &mut palettes).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_grow_and_shrink_through_runtime() {
        let mut runtime = runtime_with_nop();
        let (mut palettes, mut feed, mut surface) = collaborators();

        let name = runtime
            .instantiate("Nop", true, None, false, &mut palettes, &mut feed, &mut surface)
            .unwrap();

        runtime.grow(&name, "emitters").unwrap();
        let module = runtime.active(&name).unwrap();
        assert_eq!(module.state.group("emitters").unwrap().length(), 2);

        runtime.shrink(&name, "emitters").unwrap();
        runtime.shrink(&name, "emitters").unwrap();
        runtime.shrink(&name, "emitters").unwrap();
        let module = runtime.active(&name).unwrap();
        let group = module.state.group("emitters").unwrap();
        assert_eq!(group.length(), 0);
        assert!(group.is_consistent());

        assert!(runtime.grow(&name, "missing").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_excludes_gallery_and_invalid_modules() {
        let mut runtime = runtime_with_nop();
        runtime.registry_mut().register_raster(
            ModuleDefinition::raster("Strict", "test", "1.0.0")
                .with_prop("level", PropSchema::float(1.0))
                .with_save_schema(
                    SaveSchema::new().with_field("missing", PropKind::Float),
                ),
            || Box::new(Nop),
        );

        let (mut palettes, mut feed, mut surface) = collaborators();
        runtime
            .instantiate("Nop", true, None, false, &mut palettes, &mut feed, &mut surface)
            .unwrap();
        runtime
            .instantiate(
                "Nop", false, Some("-gallery"), true, &mut palettes, &mut feed, &mut surface,
            )
            .unwrap();
        runtime
            .instantiate("Strict", true, None, false, &mut palettes, &mut feed, &mut surface)
            .unwrap();

        let snapshot = runtime.snapshot();
        let object = snapshot.as_object().unwrap();

        assert!(object.contains_key("Nop"));
        assert!(!object.keys().any(|k| k.contains("-gallery")));
        // Save schema names a field the module never committed
        assert!(!object.contains_key("Strict"));

        let values = &object["Nop"]["values"];
        assert_eq!(values["level"], json!(0.5));
        assert_eq!(values["emitters"]["length"], json!(1));
    }
}
