use std::collections::BTreeMap;
use std::sync::Arc;

use crate::module::definition::{
    GroupSchema, ModuleDefinition, ParamValue, PropKind,
};
use crate::module::renderer::{FrameContext, ModuleRenderer};
use crate::surface::{CompositeOp, Surface};

/// Mutable metadata carried by every active instance
#[derive(Debug, Clone)]
pub struct ModuleMeta {
    pub original_name: String,
    pub alpha: f64,
    pub enabled: bool,
    pub composite_operation: CompositeOp,
}

/// Addressable meta fields for the double-buffered meta queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    Alpha,
    Enabled,
    CompositeOperation,
}

/// One pending meta write
#[derive(Debug, Clone, PartialEq)]
pub enum MetaWrite {
    Alpha(f64),
    Enabled(bool),
    CompositeOperation(CompositeOp),
}

impl MetaWrite {
    pub fn key(&self) -> MetaKey {
        match self {
            MetaWrite::Alpha(_) => MetaKey::Alpha,
            MetaWrite::Enabled(_) => MetaKey::Enabled,
            MetaWrite::CompositeOperation(_) => MetaKey::CompositeOperation,
        }
    }
}

/// Addressing for a write into a grouped parameter's sub-array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSlot {
    pub group: String,
    pub index: usize,
}

/// Runtime state of one group parameter: parallel sub-arrays keyed by
/// sub-parameter name, all sharing one length
#[derive(Debug, Clone, Default)]
pub struct GroupState {
    length: usize,
    arrays: BTreeMap<String, Vec<ParamValue>>,
}

impl GroupState {
    pub fn from_schema(schema: &GroupSchema) -> Self {
        let mut arrays = BTreeMap::new();

        for (name, prop) in &schema.props {
            let default = prop
                .default
                .clone()
                .unwrap_or_else(|| prop.kind.zero_value());
            arrays.insert(name.clone(), vec![default; schema.default_length]);
        }

        Self { length: schema.default_length, arrays }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn array(&self, prop: &str) -> Option<&[ParamValue]> {
        self.arrays.get(prop).map(Vec::as_slice)
    }

    pub fn get(&self, prop: &str, index: usize) -> Option<&ParamValue> {
        self.arrays.get(prop)?.get(index)
    }

    /// Write one slot; out-of-range indices are rejected
    pub fn set(&mut self, prop: &str, index: usize, value: ParamValue) -> bool {
        match self.arrays.get_mut(prop) {
            Some(array) if index < array.len() => {
                array[index] = value;
                true
            }
            _ => false,
        }
    }

    /// Append one default-valued slot to every sub-array atomically
    pub fn grow(&mut self, schema: &GroupSchema) {
        for (name, array) in &mut self.arrays {
            let default = schema
                .props
                .get(name)
                .map(|prop| {
                    prop.default
                        .clone()
                        .unwrap_or_else(|| prop.kind.zero_value())
                })
                .unwrap_or(ParamValue::Float(0.0));
            array.push(default);
        }
        self.length += 1;
    }

    /// Remove the last slot of every sub-array atomically; a no-op at zero
    pub fn shrink(&mut self) {
        if self.length == 0 {
            return;
        }

        for array in self.arrays.values_mut() {
            array.pop();
        }
        self.length -= 1;
    }

    /// Every sub-array holds exactly `length` slots
    pub fn is_consistent(&self) -> bool {
        self.arrays.values().all(|array| array.len() == self.length)
    }
}

/// Committed state of one active module instance
#[derive(Debug, Clone)]
pub struct InstanceState {
    pub name: String,
    pub definition: Arc<ModuleDefinition>,
    pub meta: ModuleMeta,
    params: BTreeMap<String, ParamValue>,
    groups: BTreeMap<String, GroupState>,
}

impl InstanceState {
    /// Apply schema defaults for every declared parameter
    pub fn from_definition(name: String, definition: Arc<ModuleDefinition>, enabled: bool) -> Self {
        let mut params = BTreeMap::new();
        let mut groups = BTreeMap::new();

        for (key, schema) in &definition.props {
            if schema.kind == PropKind::Group {
                if let Some(group_schema) = &schema.group {
                    groups.insert(key.clone(), GroupState::from_schema(group_schema));
                }
                continue;
            }

            let value = schema
                .default
                .clone()
                .unwrap_or_else(|| schema.kind.zero_value());
            params.insert(key.clone(), value);
        }

        let meta = ModuleMeta {
            original_name: definition.meta.name.clone(),
            alpha: 1.0,
            enabled,
            composite_operation: CompositeOp::Normal,
        };

        Self { name, definition, meta, params, groups }
    }

    pub fn is_gallery(&self) -> bool {
        self.name.contains("-gallery")
    }

    pub fn current_value(&self, param: &str, slot: Option<&GroupSlot>) -> Option<ParamValue> {
        match slot {
            Some(slot) => self.groups.get(&slot.group)?.get(param, slot.index).cloned(),
            None => self.params.get(param).cloned(),
        }
    }

    /// Assign a committed value; group writes are bounds-checked
    pub fn set_value(&mut self, param: &str, value: ParamValue, slot: Option<&GroupSlot>) -> bool {
        match slot {
            Some(slot) => match self.groups.get_mut(&slot.group) {
                Some(group) => group.set(param, slot.index, value),
                None => false,
            },
            None => {
                self.params.insert(param.to_string(), value);
                true
            }
        }
    }

    pub fn group(&self, name: &str) -> Option<&GroupState> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut GroupState> {
        self.groups.get_mut(name)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn apply_meta(&mut self, write: MetaWrite) {
        match write {
            MetaWrite::Alpha(alpha) => self.meta.alpha = alpha,
            MetaWrite::Enabled(enabled) => self.meta.enabled = enabled,
            MetaWrite::CompositeOperation(op) => self.meta.composite_operation = op,
        }
    }

    // Typed helpers for module draw code

    pub fn param_f64(&self, name: &str) -> f64 {
        self.params.get(name).and_then(ParamValue::as_f64).unwrap_or(0.0)
    }

    pub fn param_i64(&self, name: &str) -> i64 {
        self.params.get(name).and_then(ParamValue::as_i64).unwrap_or(0)
    }

    pub fn param_bool(&self, name: &str) -> bool {
        self.params.get(name).and_then(ParamValue::as_bool).unwrap_or(false)
    }

    pub fn param_text(&self, name: &str) -> &str {
        self.params.get(name).and_then(ParamValue::as_str).unwrap_or("")
    }
}

/// A live placement of a module definition: committed state plus the
/// renderer selected once at instantiation time
pub struct ActiveModule {
    pub state: InstanceState,
    pub renderer: ModuleRenderer,
}

impl ActiveModule {
    pub fn render(
        &mut self,
        target: &mut Surface,
        ctx: &FrameContext<'_>,
        pipeline: bool,
    ) -> crate::error::Result<()> {
        let Self { state, renderer } = self;
        renderer.render(target, state, ctx, pipeline)
    }
}
