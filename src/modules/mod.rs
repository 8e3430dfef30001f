//! Built-in sample modules
//!
//! A small set of raster modules used by the demo binary and the tests.
//! They double as reference implementations of the module contract: draw
//! into the scratch surface, read committed parameters from the instance
//! state, and react to features, BPM and kick.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{
    error::Result,
    module::{
        ControlBinding, FrameContext, GroupSchema, InstanceState, ModuleDefinition,
        ModuleRegistry, PaletteControlOptions, PropKind, PropSchema, RasterModule, SaveSchema,
    },
    palette::{Color, ReturnFormat},
    surface::Surface,
};

/// Parse an `rgb(...)` or `rgba(...)` color string into RGBA bytes
///
/// Unparseable strings yield opaque black, matching the palette engine's
/// degraded output.
pub fn parse_color(text: &str) -> [u8; 4] {
    let inner = text
        .trim()
        .strip_prefix("rgba(")
        .or_else(|| text.trim().strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'));

    let Some(inner) = inner else {
        return [0, 0, 0, 255];
    };

    let mut channels = inner.split(',').map(|part| part.trim().parse::<f64>());
    let mut next = || channels.next().and_then(|c| c.ok()).unwrap_or(0.0);

    let r = next().clamp(0.0, 255.0) as u8;
    let g = next().clamp(0.0, 255.0) as u8;
    let b = next().clamp(0.0, 255.0) as u8;
    [r, g, b, 255]
}

/// Full-surface wash driven by a palette-bound color parameter
pub struct SolidWash;

impl SolidWash {
    pub fn definition() -> ModuleDefinition {
        ModuleDefinition::raster("SolidWash", "pulse", "1.0.0")
            .with_prop(
                "color",
                PropSchema::text("rgb(0,0,0)").with_control(ControlBinding::Palette(
                    PaletteControlOptions {
                        colors: vec![
                            Color::new(20, 10, 60),
                            Color::new(200, 40, 120),
                            Color::new(10, 180, 220),
                        ],
                        duration: Some(1500.0),
                        return_format: ReturnFormat::RgbString,
                    },
                )),
            )
            .with_save_schema(SaveSchema::new().with_field("color", PropKind::Text))
    }
}

impl RasterModule for SolidWash {
    fn draw(
        &mut self,
        surface: &mut Surface,
        state: &InstanceState,
        _ctx: &FrameContext<'_>,
    ) -> Result<()> {
        surface.fill(parse_color(state.param_text("color")));
        Ok(())
    }
}

/// Filled circle whose radius follows the RMS feature; flashes on kicks
pub struct SpectrumPulse;

impl SpectrumPulse {
    pub fn definition() -> ModuleDefinition {
        ModuleDefinition::raster("SpectrumPulse", "pulse", "1.0.0")
            .with_prop("gain", PropSchema::float(1.0).with_bounds(0.0, 10.0).strict())
            .with_prop("kickFlash", PropSchema::boolean(true))
            .with_audio_feature("rms")
    }
}

impl RasterModule for SpectrumPulse {
    fn draw(
        &mut self,
        surface: &mut Surface,
        state: &InstanceState,
        ctx: &FrameContext<'_>,
    ) -> Result<()> {
        let width = surface.width();
        let height = surface.height();
        if width == 0 || height == 0 {
            return Ok(());
        }

        let rms = ctx.features.get("rms").unwrap_or(0.0);
        let gain = state.param_f64("gain");
        let flash = state.param_bool("kickFlash") && ctx.kick;

        let max_radius = width.min(height) as f64 / 2.0;
        let radius = (rms * gain).min(1.0) * max_radius;
        let radius_sq = radius * radius;

        let brightness: u8 = if flash { 255 } else { 180 };
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;

        for y in 0..height {
            for x in 0..width {
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                if dx * dx + dy * dy <= radius_sq {
                    surface.set_pixel(x, y, [brightness, brightness, brightness, 255]);
                }
            }
        }

        Ok(())
    }
}

/// Scatters random pixels around a set of emitters
///
/// The emitters are a group parameter: growing the group adds one emitter,
/// each with its own normalized position and spread.
pub struct NoiseScatter {
    rng: SmallRng,
}

impl NoiseScatter {
    pub fn new() -> Self {
        Self { rng: SmallRng::seed_from_u64(0x5eed) }
    }

    pub fn definition() -> ModuleDefinition {
        ModuleDefinition::raster("NoiseScatter", "pulse", "1.0.0")
            .with_prop("density", PropSchema::int(64).with_bounds(0.0, 4096.0).strict())
            .with_prop(
                "emitters",
                PropSchema::group(
                    GroupSchema::new(1)
                        .with_prop("x", PropSchema::float(0.5))
                        .with_prop("y", PropSchema::float(0.5))
                        .with_prop("spread", PropSchema::float(0.2)),
                ),
            )
    }
}

impl Default for NoiseScatter {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterModule for NoiseScatter {
    fn draw(
        &mut self,
        surface: &mut Surface,
        state: &InstanceState,
        _ctx: &FrameContext<'_>,
    ) -> Result<()> {
        let Some(emitters) = state.group("emitters") else {
            return Ok(());
        };

        let width = surface.width() as f64;
        let height = surface.height() as f64;
        let density = state.param_i64("density").max(0) as usize;

        for index in 0..emitters.length() {
            let x = emitters.get("x", index).and_then(|v| v.as_f64()).unwrap_or(0.5);
            let y = emitters.get("y", index).and_then(|v| v.as_f64()).unwrap_or(0.5);
            let spread =
                emitters.get("spread", index).and_then(|v| v.as_f64()).unwrap_or(0.2);

            for _ in 0..density {
                let dx = (self.rng.gen::<f64>() - 0.5) * 2.0 * spread;
                let dy = (self.rng.gen::<f64>() - 0.5) * 2.0 * spread;
                let px = ((x + dx) * width) as i64;
                let py = ((y + dy) * height) as i64;

                if px >= 0 && py >= 0 {
                    surface.set_pixel(px as u32, py as u32, [255, 255, 255, 255]);
                }
            }
        }

        Ok(())
    }
}

/// Register every built-in module
pub fn register_builtin_modules(registry: &mut ModuleRegistry) {
    registry.register_raster(SolidWash::definition(), || Box::new(SolidWash));
    registry.register_raster(SpectrumPulse::definition(), || Box::new(SpectrumPulse));
    registry.register_raster(NoiseScatter::definition(), || Box::new(NoiseScatter::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_variants() {
        assert_eq!(parse_color("rgb(1,2,3)"), [1, 2, 3, 255]);
        assert_eq!(parse_color("rgba(10, 20, 30, 1)"), [10, 20, 30, 255]);
        assert_eq!(parse_color("not-a-color"), [0, 0, 0, 255]);
        assert_eq!(parse_color("rgb(300,-5,12)"), [255, 0, 12, 255]);
    }

    #[test]
    fn test_builtins_register() {
        let mut registry = ModuleRegistry::new();
        register_builtin_modules(&mut registry);

        assert!(registry.has_module("SolidWash"));
        assert!(registry.has_module("SpectrumPulse"));
        assert!(registry.has_module("NoiseScatter"));
        assert_eq!(registry.len(), 3);
    }
}
