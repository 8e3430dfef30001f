use tracing::warn;

use crate::{
    layer::LayerStack,
    module::{FrameContext, ModuleRuntime},
    surface::Surface,
};

/// The per-tick layer walk
///
/// Walks the ordered layer list bottom-to-top, handling per-layer clearing,
/// the inherit chain and pipeline feedback buffering, and dispatches every
/// enabled module through its renderer. `previous_output` is the prior
/// tick's final output surface, read by the first layer's inherit step.
///
/// Module draw failures are contained: the faulting module's contribution is
/// skipped for this tick and the walk continues.
pub fn render_layers(
    layers: &mut LayerStack,
    runtime: &mut ModuleRuntime,
    feedback: &mut Surface,
    previous_output: &Surface,
    ctx: &FrameContext<'_>,
) {
    for layer_index in 0..layers.len() {
        let (clearing, enabled, inherit, inherit_from, pipeline, alpha, module_order) = {
            let layer = layers.get(layer_index).expect("index is within the walk");
            (
                layer.clearing,
                layer.enabled,
                layer.inherit,
                layer.inherit_from,
                layer.pipeline,
                layer.alpha,
                layer.module_order.clone(),
            )
        };

        if pipeline && clearing {
            feedback.clear();
        }

        if clearing {
            if let Ok(layer) = layers.get_mut(layer_index) {
                layer.surface.clear();
            }
        }

        if inherit {
            let source = inherit_from.or_else(|| layer_index.checked_sub(1));

            match source {
                Some(source_index) => {
                    layers.copy_surface_between(source_index, layer_index);
                    if pipeline {
                        if let Ok(source_layer) = layers.get(source_index) {
                            feedback.copy_from(&source_layer.surface);
                        }
                    }
                }
                // The first layer inherits the prior tick's final output
                None => {
                    if let Ok(layer) = layers.get_mut(layer_index) {
                        layer.surface.copy_from(previous_output);
                    }
                    if pipeline {
                        feedback.copy_from(previous_output);
                    }
                }
            }
        }

        // A disabled or fully transparent layer skips module execution; the
        // inherited or cleared surface still stands as its contribution
        if !enabled || alpha == 0.0 {
            continue;
        }

        for (module_index, module_name) in module_order.iter().enumerate() {
            // The order list was snapshotted at tick start; names removed
            // mid-session simply no longer resolve
            let Some(module) = runtime.active_mut(module_name) else {
                continue;
            };

            if !module.state.meta.enabled || module.state.meta.alpha == 0.0 {
                continue;
            }

            let layer = layers.get_mut(layer_index).expect("index is within the walk");

            // In pipeline mode every module after the first starts from the
            // chained feedback image
            if pipeline && module_index != 0 {
                layer.surface.copy_from(feedback);
            }

            if let Err(err) = module.render(&mut layer.surface, ctx, pipeline) {
                warn!(module = %module_name, "module draw failed: {}", err);
                continue;
            }

            // The feedback surface mirrors the layer after every module's
            // turn so the next consumer sees the latest composited state
            if pipeline {
                feedback.copy_from(&layer.surface);
            }
        }
    }
}
