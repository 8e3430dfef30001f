use std::collections::HashMap;
use std::sync::Arc;

use crate::module::definition::{ModuleDefinition, ModuleKind};
use crate::module::renderer::RasterModule;

/// Factory producing a fresh raster module for each placement
pub type RasterFactory = Arc<dyn Fn() -> Box<dyn RasterModule> + Send + Sync>;

/// One registered definition plus its raster factory where applicable
#[derive(Clone)]
pub struct RegistryEntry {
    pub definition: Arc<ModuleDefinition>,
    pub factory: Option<RasterFactory>,
}

/// Registry of module definitions
///
/// Definitions are registered once and are immutable thereafter; every
/// placement clones its own mutable state from the definition.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raster module with its drawing factory
    pub fn register_raster<F>(&mut self, definition: ModuleDefinition, factory: F)
    where
        F: Fn() -> Box<dyn RasterModule> + Send + Sync + 'static,
    {
        debug_assert_eq!(definition.meta.kind, ModuleKind::Raster);
        let name = definition.meta.name.clone();
        self.entries.insert(
            name,
            RegistryEntry {
                definition: Arc::new(definition),
                factory: Some(Arc::new(factory)),
            },
        );
    }

    /// Register a shader or shader-interchange module; the program is
    /// prepared by the matching backend at instantiation time
    pub fn register(&mut self, definition: ModuleDefinition) {
        let name = definition.meta.name.clone();
        self.entries.insert(
            name,
            RegistryEntry {
                definition: Arc::new(definition),
                factory: None,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn definition(&self, name: &str) -> Option<&Arc<ModuleDefinition>> {
        self.entries.get(name).map(|entry| &entry.definition)
    }

    pub fn available_modules(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::module::renderer::{FrameContext, RasterModule};
    use crate::module::instance::InstanceState;
    use crate::surface::Surface;

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

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ModuleRegistry::new();
        registry.register_raster(
            ModuleDefinition::raster("Nop", "test", "1.0.0"),
            || Box::new(Nop),
        );

        assert!(registry.has_module("Nop"));
        assert!(registry.get("Nop").unwrap().factory.is_some());
        assert!(!registry.has_module("Unknown"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_available_modules() {
        let mut registry = ModuleRegistry::new();
        registry.register_raster(
            ModuleDefinition::raster("A", "test", "1.0.0"),
            || Box::new(Nop),
        );
        registry.register_raster(
            ModuleDefinition::raster("B", "test", "1.0.0"),
            || Box::new(Nop),
        );

        let mut names = registry.available_modules();
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}
