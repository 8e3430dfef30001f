use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::module::instance::InstanceState;
use crate::palette::{Color, ReturnFormat};
use crate::surface::Surface;

/// Renderer family a module belongs to, fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    Raster,
    Shader,
    ShaderInterchange,
}

/// A committed or pending parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    Vector(Vec<f64>),
    Texture(TextureValue),
}

/// A texture parameter: a resource name, resolved to its backing surface at
/// commit time rather than queue time
#[derive(Clone)]
pub struct TextureValue {
    pub name: String,
    pub resolved: Option<Arc<Surface>>,
}

impl TextureValue {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), resolved: None }
    }
}

impl PartialEq for TextureValue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for TextureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureValue")
            .field("name", &self.name)
            .field("resolved", &self.resolved.is_some())
            .finish()
    }
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Coerce to the declared parameter kind where a lossless-enough mapping
    /// exists; other values pass through unchanged
    pub fn coerce_to(self, kind: PropKind) -> ParamValue {
        match (kind, self) {
            (PropKind::Float, ParamValue::Int(v)) => ParamValue::Float(v as f64),
            (PropKind::Int, ParamValue::Float(v)) => ParamValue::Int(v.round() as i64),
            (PropKind::Texture, ParamValue::Text(name)) => {
                ParamValue::Texture(TextureValue::named(name))
            }
            (_, value) => value,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Float(v) => serde_json::json!(v),
            ParamValue::Int(v) => serde_json::json!(v),
            ParamValue::Bool(v) => serde_json::json!(v),
            ParamValue::Text(v) => serde_json::json!(v),
            ParamValue::Vector(v) => serde_json::json!(v),
            ParamValue::Texture(t) => serde_json::json!(t.name),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropKind {
    Float,
    Int,
    Bool,
    Text,
    Texture,
    Group,
}

impl PropKind {
    /// Fallback value when a schema declares no default
    pub fn zero_value(&self) -> ParamValue {
        match self {
            PropKind::Float => ParamValue::Float(0.0),
            PropKind::Int => ParamValue::Int(0),
            PropKind::Bool => ParamValue::Bool(false),
            PropKind::Text => ParamValue::Text(String::new()),
            PropKind::Texture => ParamValue::Texture(TextureValue::named("")),
            PropKind::Group => ParamValue::Int(0),
        }
    }
}

/// Custom setter invoked at commit time instead of a direct assignment
pub type Setter = Arc<dyn Fn(&mut InstanceState, ParamValue) + Send + Sync>;

/// Declared schema of a single parameter
#[derive(Clone)]
pub struct PropSchema {
    pub kind: PropKind,
    pub default: Option<ParamValue>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub strict: bool,
    pub abs: bool,
    pub control: Option<ControlBinding>,
    pub group: Option<GroupSchema>,
    pub set: Option<Setter>,
}

impl fmt::Debug for PropSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropSchema")
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("strict", &self.strict)
            .field("abs", &self.abs)
            .field("control", &self.control)
            .field("group", &self.group)
            .field("set", &self.set.is_some())
            .finish()
    }
}

impl PropSchema {
    fn of_kind(kind: PropKind) -> Self {
        Self {
            kind,
            default: None,
            min: None,
            max: None,
            strict: false,
            abs: false,
            control: None,
            group: None,
            set: None,
        }
    }

    pub fn float(default: f64) -> Self {
        let mut schema = Self::of_kind(PropKind::Float);
        schema.default = Some(ParamValue::Float(default));
        schema
    }

    pub fn int(default: i64) -> Self {
        let mut schema = Self::of_kind(PropKind::Int);
        schema.default = Some(ParamValue::Int(default));
        schema
    }

    pub fn boolean(default: bool) -> Self {
        let mut schema = Self::of_kind(PropKind::Bool);
        schema.default = Some(ParamValue::Bool(default));
        schema
    }

    pub fn text(default: &str) -> Self {
        let mut schema = Self::of_kind(PropKind::Text);
        schema.default = Some(ParamValue::Text(default.to_string()));
        schema
    }

    pub fn texture() -> Self {
        Self::of_kind(PropKind::Texture)
    }

    pub fn group(group: GroupSchema) -> Self {
        let mut schema = Self::of_kind(PropKind::Group);
        schema.group = Some(group);
        schema
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Clamp out-of-range writes instead of accepting them
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn abs(mut self) -> Self {
        self.abs = true;
        self
    }

    pub fn with_control(mut self, control: ControlBinding) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_setter(mut self, set: Setter) -> Self {
        self.set = Some(set);
        self
    }
}

/// Declared shape of a group parameter: parallel variable-length sub-arrays
/// sharing one length
#[derive(Debug, Clone, Default)]
pub struct GroupSchema {
    pub default_length: usize,
    pub props: BTreeMap<String, PropSchema>,
}

impl GroupSchema {
    pub fn new(default_length: usize) -> Self {
        Self { default_length, props: BTreeMap::new() }
    }

    pub fn with_prop(mut self, name: &str, schema: PropSchema) -> Self {
        self.props.insert(name.to_string(), schema);
        self
    }
}

/// UI control bound to a parameter
#[derive(Debug, Clone)]
pub enum ControlBinding {
    Palette(PaletteControlOptions),
}

/// Options for a palette-type control
#[derive(Debug, Clone, Default)]
pub struct PaletteControlOptions {
    pub colors: Vec<Color>,
    pub duration: Option<f64>,
    pub return_format: ReturnFormat,
}

/// Declared persistence schema: the fields a snapshot keeps, with their
/// expected kinds
#[derive(Debug, Clone, Default)]
pub struct SaveSchema {
    pub fields: BTreeMap<String, PropKind>,
}

impl SaveSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, kind: PropKind) -> Self {
        self.fields.insert(name.to_string(), kind);
        self
    }
}

/// Identity block of a module definition
#[derive(Debug, Clone)]
pub struct DefinitionMeta {
    pub name: String,
    pub author: String,
    pub version: String,
    pub kind: ModuleKind,
}

/// Shader sources for externally-prepared module kinds
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub vertex: Option<String>,
    pub fragment: String,
}

/// Immutable module template, registered once and never mutated by running
/// instances
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    pub meta: DefinitionMeta,
    pub props: BTreeMap<String, PropSchema>,
    pub audio_features: Vec<String>,
    pub save_schema: Option<SaveSchema>,
    pub shader_source: Option<ShaderSource>,
}

impl ModuleDefinition {
    pub fn new(name: &str, author: &str, version: &str, kind: ModuleKind) -> Self {
        Self {
            meta: DefinitionMeta {
                name: name.to_string(),
                author: author.to_string(),
                version: version.to_string(),
                kind,
            },
            props: BTreeMap::new(),
            audio_features: Vec::new(),
            save_schema: None,
            shader_source: None,
        }
    }

    pub fn raster(name: &str, author: &str, version: &str) -> Self {
        Self::new(name, author, version, ModuleKind::Raster)
    }

    pub fn shader(name: &str, author: &str, version: &str, source: ShaderSource) -> Self {
        let mut definition = Self::new(name, author, version, ModuleKind::Shader);
        definition.shader_source = Some(source);
        definition
    }

    pub fn shader_interchange(
        name: &str,
        author: &str,
        version: &str,
        source: ShaderSource,
    ) -> Self {
        let mut definition = Self::new(name, author, version, ModuleKind::ShaderInterchange);
        definition.shader_source = Some(source);
        definition
    }

    pub fn with_prop(mut self, name: &str, schema: PropSchema) -> Self {
        self.props.insert(name.to_string(), schema);
        self
    }

    pub fn with_audio_feature(mut self, feature: &str) -> Self {
        self.audio_features.push(feature.to_string());
        self
    }

    pub fn with_save_schema(mut self, schema: SaveSchema) -> Self {
        self.save_schema = Some(schema);
        self
    }

    /// Look up a parameter schema, descending into a group when a group name
    /// is given
    pub fn prop_schema(&self, param: &str, group: Option<&str>) -> Option<&PropSchema> {
        match group {
            Some(group_name) => self
                .props
                .get(group_name)?
                .group
                .as_ref()?
                .props
                .get(param),
            None => self.props.get(param),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coercion_between_numeric_kinds() {
        assert_eq!(
            ParamValue::Int(3).coerce_to(PropKind::Float),
            ParamValue::Float(3.0)
        );
        assert_eq!(
            ParamValue::Float(2.6).coerce_to(PropKind::Int),
            ParamValue::Int(3)
        );
    }

    #[test]
    fn test_text_coerces_to_texture_by_name() {
        let coerced = ParamValue::Text("camera".to_string()).coerce_to(PropKind::Texture);
        match coerced {
            ParamValue::Texture(t) => assert_eq!(t.name, "camera"),
            other => panic!("expected texture, got {:?}", other),
        }
    }

    #[test]
    fn test_group_schema_lookup() {
        let definition = ModuleDefinition::raster("Scatter", "test", "1.0.0").with_prop(
            "emitters",
            PropSchema::group(
                GroupSchema::new(2)
                    .with_prop("x", PropSchema::float(0.5))
                    .with_prop("y", PropSchema::float(0.5)),
            ),
        );

        assert!(definition.prop_schema("x", Some("emitters")).is_some());
        assert!(definition.prop_schema("x", None).is_none());
        assert!(definition.prop_schema("emitters", None).is_some());
    }

    #[test]
    fn test_texture_equality_ignores_resolution() {
        let unresolved = TextureValue::named("cam");
        let resolved = TextureValue {
            name: "cam".to_string(),
            resolved: Some(Arc::new(Surface::new(1, 1))),
        };
        assert_eq!(ParamValue::Texture(unresolved), ParamValue::Texture(resolved));
    }
}
