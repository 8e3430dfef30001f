use image::{ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// A 2D drawing surface backed by an RGBA buffer
///
/// Every layer, the shared feedback buffer, the output and the preview are
/// surfaces. Modules draw into one, and the compositor copies between them.
#[derive(Clone, Debug)]
pub struct Surface {
    buffer: RgbaImage,
}

impl Surface {
    /// Create a new transparent surface with the given dimensions
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: ImageBuffer::new(width, height),
        }
    }

    /// Create a surface filled with the given color
    pub fn new_filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgba(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Clear the surface to fully transparent black
    pub fn clear(&mut self) {
        for pixel in self.buffer.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Fill the whole surface with one color
    pub fn fill(&mut self, color: [u8; 4]) {
        for pixel in self.buffer.pixels_mut() {
            *pixel = Rgba(color);
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if x < self.width() && y < self.height() {
            self.buffer.put_pixel(x, y, Rgba(color));
        }
    }

    /// Replace this surface's content with another surface's content
    ///
    /// Dimensions are reconciled by reallocating; the compositor keeps all
    /// surfaces the same size so the common path is a plain copy.
    pub fn copy_from(&mut self, other: &Surface) {
        if self.buffer.dimensions() == other.buffer.dimensions() {
            self.buffer.copy_from_slice(other.buffer.as_raw());
        } else {
            self.buffer = other.buffer.clone();
        }
    }

    /// Composite another surface onto this one with alpha and a blend mode
    pub fn composite(&mut self, source: &Surface, alpha: f64, op: CompositeOp) {
        let alpha = alpha.clamp(0.0, 1.0) as f32;
        if alpha == 0.0 {
            return;
        }

        let width = self.width().min(source.width());
        let height = self.height().min(source.height());

        for y in 0..height {
            for x in 0..width {
                let src = source.get_pixel(x, y);
                let src_a = (src[3] as f32 / 255.0) * alpha;
                if src_a == 0.0 {
                    continue;
                }

                let dst = self.get_pixel(x, y);
                let mut out = [0u8; 4];

                for c in 0..3 {
                    let s = src[c] as f32 / 255.0;
                    let d = dst[c] as f32 / 255.0;

                    let blended = match op {
                        CompositeOp::Normal => s,
                        CompositeOp::Add => (s + d).min(1.0),
                        CompositeOp::Multiply => s * d,
                        CompositeOp::Screen => 1.0 - (1.0 - s) * (1.0 - d),
                    };

                    let mixed = blended * src_a + d * (1.0 - src_a);
                    out[c] = (mixed * 255.0 + 0.5) as u8;
                }

                let dst_a = dst[3] as f32 / 255.0;
                out[3] = (((src_a + dst_a * (1.0 - src_a)) * 255.0) + 0.5).min(255.0) as u8;

                self.set_pixel(x, y, out);
            }
        }
    }

    /// Draw another surface scaled into a viewport rectangle of this one
    ///
    /// Used for the preview repaint: the output surface is scaled into the
    /// preview's configured viewport with nearest-neighbour sampling.
    pub fn draw_scaled(&mut self, source: &Surface, x: u32, y: u32, width: u32, height: u32) {
        if width == 0 || height == 0 || source.width() == 0 || source.height() == 0 {
            return;
        }

        for dy in 0..height {
            let ty = y + dy;
            if ty >= self.height() {
                break;
            }

            let sy = (dy as u64 * source.height() as u64 / height as u64) as u32;

            for dx in 0..width {
                let tx = x + dx;
                if tx >= self.width() {
                    break;
                }

                let sx = (dx as u64 * source.width() as u64 / width as u64) as u32;
                self.buffer.put_pixel(tx, ty, Rgba(source.get_pixel(sx, sy)));
            }
        }
    }

    /// Resize the surface, discarding its content
    pub fn resize(&mut self, width: u32, height: u32) {
        self.buffer = ImageBuffer::new(width, height);
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.buffer
    }

    /// Save the surface as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        self.buffer.as_raw() == other.buffer.as_raw()
    }
}

/// Blend mode applied when a module's off-screen buffer is composited onto
/// its target surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeOp {
    #[default]
    Normal,
    Add,
    Multiply,
    Screen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_and_fill() {
        let mut surface = Surface::new_filled(4, 4, [10, 20, 30, 255]);
        assert_eq!(surface.get_pixel(2, 2), [10, 20, 30, 255]);

        surface.clear();
        assert_eq!(surface.get_pixel(2, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn test_copy_from_matches_source() {
        let source = Surface::new_filled(8, 8, [200, 100, 50, 255]);
        let mut target = Surface::new(8, 8);

        target.copy_from(&source);
        assert_eq!(target, source);
    }

    #[test]
    fn test_composite_normal_full_alpha_replaces() {
        let source = Surface::new_filled(2, 2, [255, 0, 0, 255]);
        let mut target = Surface::new_filled(2, 2, [0, 0, 255, 255]);

        target.composite(&source, 1.0, CompositeOp::Normal);
        assert_eq!(target.get_pixel(0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_composite_zero_alpha_is_noop() {
        let source = Surface::new_filled(2, 2, [255, 0, 0, 255]);
        let mut target = Surface::new_filled(2, 2, [0, 0, 255, 255]);

        target.composite(&source, 0.0, CompositeOp::Normal);
        assert_eq!(target.get_pixel(0, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn test_composite_add_saturates() {
        let source = Surface::new_filled(1, 1, [200, 200, 200, 255]);
        let mut target = Surface::new_filled(1, 1, [100, 100, 100, 255]);

        target.composite(&source, 1.0, CompositeOp::Add);
        assert_eq!(target.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_draw_scaled_into_viewport() {
        let source = Surface::new_filled(8, 8, [9, 9, 9, 255]);
        let mut preview = Surface::new(10, 10);

        preview.draw_scaled(&source, 2, 2, 4, 4);

        assert_eq!(preview.get_pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(preview.get_pixel(3, 3), [9, 9, 9, 255]);
        assert_eq!(preview.get_pixel(6, 6), [0, 0, 0, 0]);
    }
}
