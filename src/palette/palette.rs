use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One color slot in a palette's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#rrggbb` hex string
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }
}

/// String format a palette emits its interpolated color in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReturnFormat {
    #[default]
    RgbString,
    RgbaString,
}

impl ReturnFormat {
    fn format(&self, color: Color) -> String {
        match self {
            ReturnFormat::RgbString => format!("rgb({},{},{})", color.r, color.g, color.b),
            ReturnFormat::RgbaString => format!("rgba({},{},{},1)", color.r, color.g, color.b),
        }
    }
}

/// Engine tick duration in milliseconds; the worker steps at a fixed 60 Hz
/// independent of the render frame rate.
pub const TICK_MS: f64 = 1000.0 / 60.0;

/// An independently animated color-interpolation state machine
///
/// With no colors a step yields nothing; with one color it always yields that
/// color; with two or more it cycles, emitting a linear blend between the
/// current color and the next, proportional to the elapsed time within the
/// configured period.
#[derive(Debug, Clone)]
pub struct Palette {
    id: String,
    pub colors: Vec<Color>,
    pub time_period: f64,
    pub bpm: f64,
    pub use_bpm: bool,
    pub bpm_division: f64,
    pub return_format: ReturnFormat,
    pub current_color: usize,
    pub current_time: f64,
    pub created_at: DateTime<Utc>,
}

impl Palette {
    pub fn new(
        colors: Vec<Color>,
        time_period: Option<f64>,
        id: impl Into<String>,
        return_format: ReturnFormat,
    ) -> Self {
        Self {
            id: id.into(),
            colors,
            time_period: time_period.unwrap_or(100.0),
            bpm: 120.0,
            use_bpm: false,
            bpm_division: 16.0,
            return_format,
            current_color: 0,
            current_time: 0.0,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_color(&mut self, color: Color) -> usize {
        self.colors.push(color);
        self.colors.len()
    }

    pub fn remove_at(&mut self, index: usize) -> Option<Color> {
        if index < self.colors.len() {
            Some(self.colors.remove(index))
        } else {
            None
        }
    }

    /// Advance one engine tick and produce the step color
    ///
    /// Returns `None` when the palette has no colors. When BPM sync is on the
    /// period is recomputed from the current tempo before stepping.
    pub fn next_step(&mut self) -> Option<String> {
        if self.use_bpm {
            // ticks * 60 seconds / bpm / division
            self.time_period = (3600.0 / self.bpm) * self.bpm_division;
        }

        if self.colors.is_empty() {
            return None;
        }

        if self.colors.len() < 2 {
            return Some(self.return_format.format(self.colors[0]));
        }

        self.current_time += TICK_MS;

        if self.current_time >= self.time_period {
            if self.current_color > self.colors.len().saturating_sub(2) {
                self.current_color = 0;
            } else {
                self.current_color += 1;
            }
            self.current_time = 0.0;
        }

        let step = calculate_step(
            &self.colors,
            self.current_color,
            self.current_time,
            self.time_period,
        );

        Some(self.return_format.format(step))
    }
}

/// Blend between the current color and the next one
///
/// A concurrent color-list edit can leave `current` pointing past the end;
/// the step then yields black and leaves the stale index for the next wrap
/// to correct.
fn calculate_step(colors: &[Color], current: usize, current_time: f64, time_period: f64) -> Color {
    let Some(from) = colors.get(current).copied() else {
        return Color::BLACK;
    };

    let mut next = current + 1;
    if next > colors.len() - 1 {
        next = 0;
    }
    let to = colors[next];

    let p = current_time / (time_period - 1.0);
    let channel = |a: u8, b: u8| {
        ((1.0 - p) * a as f64 + p * b as f64 + 0.5).round().clamp(0.0, 255.0) as u8
    };

    Color {
        r: channel(from.r, to.r),
        g: channel(from.g, to.g),
        b: channel(from.b, to.b),
    }
}
