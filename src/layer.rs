use serde::{Deserialize, Serialize};

use crate::{
    error::{LayerError, Result},
    naming::next_name,
    surface::Surface,
};

/// A stacked compositing surface holding an ordered list of module instances
///
/// Layers are walked bottom-to-top each tick. `module_order` defines paint
/// order within the layer; the surface is exclusively owned and mutated by
/// the render scheduler.
#[derive(Debug)]
pub struct Layer {
    pub name: String,

    /// Clear the surface at the start of each tick
    pub clearing: bool,

    /// Skip module execution when disabled
    pub enabled: bool,

    /// Locked layers reject module placement
    pub locked: bool,

    /// UI hint only; carried for persistence
    pub collapsed: bool,

    /// Start each tick from another layer's current image
    pub inherit: bool,

    /// Explicit inherit source; `None` means the previous layer
    pub inherit_from: Option<usize>,

    /// Feedback-buffered compositing: each module consumes and re-produces
    /// the shared intermediate image
    pub pipeline: bool,

    /// Blend the layer during output compositing
    pub blending: bool,

    /// Include this layer in the final output composite
    pub draw_to_output: bool,

    /// Layer opacity applied during output compositing
    pub alpha: f64,

    /// Paint order of module instance names within this layer
    pub module_order: Vec<String>,

    /// The layer's own drawing surface
    pub surface: Surface,
}

impl Layer {
    pub fn new(name: String, width: u32, height: u32) -> Self {
        Self {
            name,
            clearing: false,
            enabled: true,
            locked: false,
            collapsed: false,
            inherit: true,
            inherit_from: None,
            pipeline: false,
            blending: false,
            draw_to_output: true,
            alpha: 1.0,
            module_order: Vec::new(),
            surface: Surface::new(width, height),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32, dpr: f64) {
        let width = (width as f64 * dpr) as u32;
        let height = (height as f64 * dpr) as u32;
        self.surface.resize(width.max(1), height.max(1));
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        LayerSnapshot {
            name: self.name.clone(),
            alpha: self.alpha,
            blending: self.blending,
            clearing: self.clearing,
            collapsed: self.collapsed,
            draw_to_output: self.draw_to_output,
            enabled: self.enabled,
            inherit: self.inherit,
            inherit_from: self.inherit_from,
            locked: self.locked,
            module_order: self.module_order.clone(),
            pipeline: self.pipeline,
        }
    }
}

/// Persistable view of a layer's flags and module order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub name: String,
    pub alpha: f64,
    pub blending: bool,
    pub clearing: bool,
    pub collapsed: bool,
    pub draw_to_output: bool,
    pub enabled: bool,
    pub inherit: bool,
    pub inherit_from: Option<usize>,
    pub locked: bool,
    pub module_order: Vec<String>,
    pub pipeline: bool,
}

/// Ordered layer stack with focus tracking
#[derive(Debug, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
    focused: usize,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new layer with a collision-free name; returns its index
    pub fn add_layer(&mut self, width: u32, height: u32) -> usize {
        let name = next_name("Layer", self.layers.iter().map(|l| l.name.as_str()));
        self.layers.push(Layer::new(name, width, height));
        self.focused = self.layers.len() - 1;
        self.focused
    }

    /// Remove a layer, returning the module names it held
    pub fn remove_layer(&mut self, index: usize) -> Result<Vec<String>> {
        if index >= self.layers.len() {
            return Err(LayerError::NotFound { index }.into());
        }

        let layer = self.layers.remove(index);
        if self.focused > 0 && self.focused >= self.layers.len() {
            self.focused -= 1;
        }
        Ok(layer.module_order)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Layer> {
        self.layers.get(index).ok_or_else(|| LayerError::NotFound { index }.into())
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Layer> {
        self.layers
            .get_mut(index)
            .ok_or_else(|| LayerError::NotFound { index }.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn focused_index(&self) -> usize {
        self.focused
    }

    pub fn set_focus(&mut self, index: usize) {
        if index < self.layers.len() {
            self.focused = index;
        }
    }

    /// Find the layer currently holding the named module
    pub fn layer_from_module(&self, module_name: &str) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.module_order.iter().any(|m| m == module_name))
    }

    /// Place a module into a layer's paint order
    ///
    /// A module name lives in at most one layer's order: placing an already
    /// placed module moves it. Locked layers reject placement.
    pub fn add_module_to_layer(
        &mut self,
        module_name: &str,
        layer_index: usize,
        position: usize,
    ) -> Result<()> {
        if layer_index >= self.layers.len() {
            return Err(LayerError::NotFound { index: layer_index }.into());
        }

        if self.layers[layer_index].locked {
            return Err(LayerError::Locked { index: layer_index }.into());
        }

        self.remove_module(module_name);

        let order = &mut self.layers[layer_index].module_order;
        let position = position.min(order.len());
        order.insert(position, module_name.to_string());
        Ok(())
    }

    /// Remove a module name from whichever layer holds it
    pub fn remove_module(&mut self, module_name: &str) -> bool {
        for layer in &mut self.layers {
            if let Some(pos) = layer.module_order.iter().position(|m| m == module_name) {
                layer.module_order.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn update_module_order(&mut self, layer_index: usize, order: Vec<String>) -> Result<()> {
        let layer = self.get_mut(layer_index)?;
        layer.module_order = order;
        Ok(())
    }

    /// Copy one layer's surface content onto another's
    ///
    /// Used by the inherit step; a same-index or out-of-range copy is a
    /// no-op.
    pub(crate) fn copy_surface_between(&mut self, src: usize, dst: usize) {
        if src == dst || src >= self.layers.len() || dst >= self.layers.len() {
            return;
        }

        let (source, target) = if src < dst {
            let (left, right) = self.layers.split_at_mut(dst);
            (&left[src].surface, &mut right[0].surface)
        } else {
            let (left, right) = self.layers.split_at_mut(src);
            (&right[0].surface, &mut left[dst].surface)
        };

        target.copy_from(source);
    }

    pub fn resize_all(&mut self, width: u32, height: u32, dpr: f64) {
        for layer in &mut self.layers {
            layer.resize(width, height, dpr);
        }
    }

    pub fn snapshot(&self) -> Vec<LayerSnapshot> {
        self.layers.iter().map(Layer::snapshot).collect()
    }
}
