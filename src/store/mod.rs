//! Control-value store: the double-buffered parameter commit protocol
//!
//! Producers (audio assignments, UI edits, palette updates, automation)
//! queue writes at any time; the render scheduler drains the queues exactly
//! once per tick, before the layer walk reads committed state. Within one
//! commit a module sees at most one applied value per parameter and never a
//! partially-applied parameter set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::{
    error::{ModuleError, Result},
    module::{
        GroupSlot, MetaKey, MetaWrite, ModuleRuntime, ParamValue, PropKind,
    },
    surface::Surface,
};

/// A queued parameter write; only the most recent write per
/// (module, parameter) key survives until the next commit
#[derive(Debug, Clone)]
pub struct QueuedWrite {
    pub value: ParamValue,
    pub kind: PropKind,
    pub slot: Option<GroupSlot>,
}

/// Context handed to value-transform hooks
pub struct TransformContext<'a> {
    pub module_name: &'a str,
    pub param: &'a str,
    pub value: &'a ParamValue,
    pub delta: f64,
}

/// A registered value-transform hook; returning `Some` substitutes the
/// value, and the last substitution wins
pub type ValueTransform = Box<dyn Fn(&TransformContext<'_>) -> Option<ParamValue> + Send + Sync>;

/// Resolves texture names to their backing surfaces at commit time
pub trait TextureResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<Surface>>;
}

type PropQueue = HashMap<String, HashMap<String, QueuedWrite>>;
type MetaQueue = HashMap<String, HashMap<MetaKey, MetaWrite>>;

/// The pending-write queues and the validating write entry point
pub struct ControlValueStore {
    pending_props: Arc<Mutex<PropQueue>>,
    pending_meta: Arc<Mutex<MetaQueue>>,
    transforms: Vec<ValueTransform>,
    texture_resolver: Option<Box<dyn TextureResolver>>,
    delta: f64,
}

impl ControlValueStore {
    pub fn new() -> Self {
        Self {
            pending_props: Arc::new(Mutex::new(HashMap::new())),
            pending_meta: Arc::new(Mutex::new(HashMap::new())),
            transforms: Vec::new(),
            texture_resolver: None,
            delta: 0.0,
        }
    }

    /// Register a value-transform hook; hooks run in registration order
    pub fn add_transform(&mut self, transform: ValueTransform) {
        self.transforms.push(transform);
    }

    pub fn set_texture_resolver(&mut self, resolver: Box<dyn TextureResolver>) {
        self.texture_resolver = Some(resolver);
    }

    /// Record the tick delta handed to transform hooks
    pub fn set_delta(&mut self, delta: f64) {
        self.delta = delta;
    }

    /// Store a write into the pending queue, overwriting any prior pending
    /// value for the same key; no validation beyond type coercion
    pub fn queue_write(
        &self,
        module_name: &str,
        param: &str,
        value: ParamValue,
        kind: PropKind,
        slot: Option<GroupSlot>,
    ) {
        let value = value.coerce_to(kind);
        let mut queue = self.pending_props.lock().expect("prop queue poisoned");
        queue
            .entry(module_name.to_string())
            .or_default()
            .insert(param.to_string(), QueuedWrite { value, kind, slot });
    }

    /// The validating write entry point used by every producer
    ///
    /// Runs the transform hooks (each sees the original value; the last
    /// substitution wins), applies strict clamping, absolute value and
    /// integer rounding per the schema, suppresses writes equal to the
    /// committed value, and queues the result.
    pub fn request_write(
        &self,
        runtime: &ModuleRuntime,
        module_name: &str,
        param: &str,
        raw: ParamValue,
        slot: Option<GroupSlot>,
    ) -> Result<()> {
        let active = runtime.active(module_name).ok_or_else(|| ModuleError::NotActive {
            name: module_name.to_string(),
        })?;

        let group_name = slot.as_ref().map(|s| s.group.as_str());
        let schema = active
            .state
            .definition
            .prop_schema(param, group_name)
            .ok_or_else(|| ModuleError::InvalidParameter {
                name: module_name.to_string(),
                param: param.to_string(),
                details: "no such parameter in schema".to_string(),
            })?;

        let mut value = raw.clone();
        let ctx = TransformContext {
            module_name,
            param,
            value: &raw,
            delta: self.delta,
        };
        for transform in &self.transforms {
            if let Some(substituted) = transform(&ctx) {
                value = substituted;
            }
        }

        if let Some(mut scalar) = value.as_f64() {
            if schema.strict {
                if let (Some(min), Some(max)) = (schema.min, schema.max) {
                    scalar = scalar.clamp(min, max);
                }
            }

            if schema.abs {
                scalar = scalar.abs();
            }

            value = if schema.kind == PropKind::Int {
                ParamValue::Int(scalar.round() as i64)
            } else {
                ParamValue::Float(scalar)
            };
        }

        // A write equal to the committed value is suppressed so downstream
        // setters never fire redundantly
        if active.state.current_value(param, slot.as_ref()) == Some(value.clone()) {
            return Ok(());
        }

        self.queue_write(module_name, param, value, schema.kind, slot);
        Ok(())
    }

    /// Queue a metadata write (alpha, enabled, composite operation)
    pub fn queue_meta(&self, module_name: &str, write: MetaWrite) {
        let mut queue = self.pending_meta.lock().expect("meta queue poisoned");
        queue
            .entry(module_name.to_string())
            .or_default()
            .insert(write.key(), write);
    }

    /// Drain both pending queues into committed state
    ///
    /// Runs to completion before the render pass reads committed state.
    /// Texture names resolve against the resolver here, not at queue time.
    /// Writes for modules that have since been removed are dropped; writes
    /// into out-of-range group slots are rejected silently.
    pub fn commit(&self, runtime: &mut ModuleRuntime) {
        let drained: PropQueue = {
            let mut queue = self.pending_props.lock().expect("prop queue poisoned");
            std::mem::take(&mut *queue)
        };

        for (module_name, props) in drained {
            let Some(active) = runtime.active_mut(&module_name) else {
                debug!(module = %module_name, "dropping queued writes for removed module");
                continue;
            };

            let definition = Arc::clone(&active.state.definition);

            for (param, write) in props {
                let QueuedWrite { mut value, kind, slot } = write;

                if kind == PropKind::Texture {
                    if let (ParamValue::Texture(texture), Some(resolver)) =
                        (&mut value, &self.texture_resolver)
                    {
                        texture.resolved = resolver.resolve(&texture.name);
                    }
                }

                let schema =
                    definition.prop_schema(&param, slot.as_ref().map(|s| s.group.as_str()));

                match schema.and_then(|s| s.set.clone()) {
                    Some(setter) => setter(&mut active.state, value),
                    None => {
                        if !active.state.set_value(&param, value, slot.as_ref()) {
                            debug!(
                                module = %module_name,
                                param = %param,
                                "group slot write rejected"
                            );
                        }
                    }
                }
            }
        }

        let drained_meta: MetaQueue = {
            let mut queue = self.pending_meta.lock().expect("meta queue poisoned");
            std::mem::take(&mut *queue)
        };

        for (module_name, writes) in drained_meta {
            let Some(active) = runtime.active_mut(&module_name) else {
                continue;
            };

            for (_, write) in writes {
                active.state.apply_meta(write);
            }
        }
    }

    /// Number of modules with pending parameter writes
    pub fn pending_len(&self) -> usize {
        self.pending_props.lock().expect("prop queue poisoned").len()
    }

    pub fn pending_is_empty(&self) -> bool {
        let props_empty = self.pending_props.lock().expect("prop queue poisoned").is_empty();
        let meta_empty = self.pending_meta.lock().expect("meta queue poisoned").is_empty();
        props_empty && meta_empty
    }
}

impl Default for ControlValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::AudioFeed,
        module::{
            FrameContext, GroupSchema, InstanceState, ModuleDefinition, PropSchema, RasterModule,
        },
        palette::PaletteRegistry,
        surface::CompositeOp,
    };

    struct Nop;

    impl RasterModule for Nop {
        fn draw(
            &mut self,
            _surface: &mut Surface,
            _state: &InstanceState,
            _ctx: &FrameContext<'_>,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct FixedResolver;

    impl TextureResolver for FixedResolver {
        fn resolve(&self, name: &str) -> Option<Arc<Surface>> {
            (name == "camera").then(|| Arc::new(Surface::new(2, 2)))
        }
    }

    fn runtime_with_module() -> (ModuleRuntime, String) {
        let mut runtime = ModuleRuntime::new();
        runtime.registry_mut().register_raster(
            ModuleDefinition::raster("Nop", "test", "1.0.0")
                .with_prop("level", PropSchema::float(0.5).with_bounds(0.0, 1.0).strict())
                .with_prop("offset", PropSchema::float(0.0).abs())
                .with_prop("count", PropSchema::int(1))
                .with_prop("source", PropSchema::texture())
                .with_prop(
                    "emitters",
                    PropSchema::group(GroupSchema::new(2).with_prop("x", PropSchema::float(0.0))),
                )
                .with_prop(
                    "doubled",
                    PropSchema::float(0.0).with_setter(Arc::new(|state, value| {
                        if let Some(v) = value.as_f64() {
                            state.set_value("doubled", ParamValue::Float(v * 2.0), None);
                        }
                    })),
                ),
            || Box::new(Nop),
        );

        let mut palettes = PaletteRegistry::new(60.0);
        let mut feed = AudioFeed::new();
        let mut surface = Surface::new(2, 2);
        let name = runtime
            .instantiate("Nop", true, None, false, &mut palettes, &mut feed, &mut surface)
            .unwrap();

        (runtime, name)
    }

    fn level(runtime: &ModuleRuntime, name: &str) -> f64 {
        runtime.active(name).unwrap().state.param_f64("level")
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins_within_one_commit() {
        let (mut runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        for value in [0.1, 0.2, 0.3] {
            store
                .request_write(&runtime, &name, "level", ParamValue::Float(value), None)
                .unwrap();
        }

        store.commit(&mut runtime);
        assert_eq!(level(&runtime, &name), 0.3);
        assert!(store.pending_is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_noop_write_is_suppressed() {
        let (runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        // 0.5 is the committed default
        store
            .request_write(&runtime, &name, "level", ParamValue::Float(0.5), None)
            .unwrap();

        assert!(store.pending_is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_bounds_clamp() {
        let (mut runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        store
            .request_write(&runtime, &name, "level", ParamValue::Float(7.0), None)
            .unwrap();
        store.commit(&mut runtime);

        assert_eq!(level(&runtime, &name), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abs_and_integer_rounding() {
        let (mut runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        store
            .request_write(&runtime, &name, "offset", ParamValue::Float(-0.25), None)
            .unwrap();
        store
            .request_write(&runtime, &name, "count", ParamValue::Float(2.6), None)
            .unwrap();
        store.commit(&mut runtime);

        let state = &runtime.active(&name).unwrap().state;
        assert_eq!(state.param_f64("offset"), 0.25);
        assert_eq!(state.param_i64("count"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transform_hooks_see_raw_value_and_last_wins() {
        let (mut runtime, name) = runtime_with_module();
        let mut store = ControlValueStore::new();

        store.add_transform(Box::new(|ctx| {
            ctx.value.as_f64().map(|v| ParamValue::Float(v + 0.1))
        }));
        store.add_transform(Box::new(|ctx| {
            // Sees the original raw value, not the first hook's output
            ctx.value.as_f64().map(|v| ParamValue::Float(v * 0.5))
        }));

        store
            .request_write(&runtime, &name, "level", ParamValue::Float(0.8), None)
            .unwrap();
        store.commit(&mut runtime);

        assert_eq!(level(&runtime, &name), 0.4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setter_replaces_direct_assignment() {
        let (mut runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        store
            .request_write(&runtime, &name, "doubled", ParamValue::Float(0.3), None)
            .unwrap();
        store.commit(&mut runtime);

        assert_eq!(runtime.active(&name).unwrap().state.param_f64("doubled"), 0.6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_texture_resolves_at_commit_time() {
        let (mut runtime, name) = runtime_with_module();
        let mut store = ControlValueStore::new();

        // Queued before the resolver knows the resource; resolution happens
        // at commit, so it is still picked up
        store
            .request_write(&runtime, &name, "source", ParamValue::from("camera"), None)
            .unwrap();
        store.set_texture_resolver(Box::new(FixedResolver));
        store.commit(&mut runtime);

        let state = &runtime.active(&name).unwrap().state;
        match state.current_value("source", None).unwrap() {
            ParamValue::Texture(texture) => {
                assert_eq!(texture.name, "camera");
                assert!(texture.resolved.is_some());
            }
            other => panic!("expected texture, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_slot_writes_and_bounds() {
        let (mut runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        let in_range = GroupSlot { group: "emitters".to_string(), index: 1 };
        store
            .request_write(&runtime, &name, "x", ParamValue::Float(0.9), Some(in_range))
            .unwrap();
        store.commit(&mut runtime);

        let group = runtime.active(&name).unwrap().state.group("emitters").unwrap();
        assert_eq!(group.get("x", 1), Some(&ParamValue::Float(0.9)));

        let out_of_range = GroupSlot { group: "emitters".to_string(), index: 9 };
        store
            .request_write(&runtime, &name, "x", ParamValue::Float(0.4), Some(out_of_range))
            .unwrap();
        store.commit(&mut runtime);

        // The out-of-range write neither grew the array nor panicked
        let group = runtime.active(&name).unwrap().state.group("emitters").unwrap();
        assert_eq!(group.length(), 2);
        assert_eq!(group.get("x", 1), Some(&ParamValue::Float(0.9)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_meta_queue_commits() {
        let (mut runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        store.queue_meta(&name, MetaWrite::Alpha(0.25));
        store.queue_meta(&name, MetaWrite::Enabled(false));
        store.queue_meta(&name, MetaWrite::CompositeOperation(CompositeOp::Add));
        store.commit(&mut runtime);

        let meta = &runtime.active(&name).unwrap().state.meta;
        assert_eq!(meta.alpha, 0.25);
        assert!(!meta.enabled);
        assert_eq!(meta.composite_operation, CompositeOp::Add);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_for_removed_module_are_dropped() {
        let (mut runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        store
            .request_write(&runtime, &name, "level", ParamValue::Float(0.9), None)
            .unwrap();

        let mut layers = crate::layer::LayerStack::new();
        let mut palettes = PaletteRegistry::new(60.0);
        runtime.remove(&name, &mut layers, &mut palettes).unwrap();

        // Must not panic or resurrect the module
        store.commit(&mut runtime);
        assert!(runtime.active(&name).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_parameter_is_rejected() {
        let (runtime, name) = runtime_with_module();
        let store = ControlValueStore::new();

        let result =
            store.request_write(&runtime, &name, "nonsense", ParamValue::Float(1.0), None);
        assert!(result.is_err());
        assert!(store.pending_is_empty());
    }
}
