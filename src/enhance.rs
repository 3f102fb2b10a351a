//! Optional post-removal frame enhancement.
//!
//! [`Enhancer`] is the seam for any frame-to-frame quality pass. The crate
//! ships [`ColorEnhancer`], a dimension-preserving sharpen and color grade
//! with four named presets. Without an enhancer frames pass through as-is.

use std::fmt;
use std::str::FromStr;

use image::{Rgb, RgbImage};

use crate::error::{Error, Result};

/// A frame-to-frame quality pass.
pub trait Enhancer: Send + Sync {
    /// Produce an enhanced copy of `frame` with the same dimensions.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the frame cannot be processed.
    fn enhance(&self, frame: &RgbImage) -> Result<RgbImage>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Named grading presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Mild sharpening, a touch more contrast, slightly muted color.
    Cinematic,
    /// Strong sharpening, contrast and saturation.
    Vivid,
    /// Light sharpening only.
    Clean,
    /// High contrast and saturation with a brightness lift.
    Hdr,
}

impl Preset {
    /// Grading parameters for this preset.
    #[must_use]
    pub fn params(self) -> ColorParams {
        let (sharpen, brightness, contrast, saturation) = match self {
            Preset::Cinematic => (0.3, 0.98, 1.1, 0.95),
            Preset::Vivid => (0.6, 1.02, 1.15, 1.3),
            Preset::Clean => (0.2, 1.0, 1.0, 1.0),
            Preset::Hdr => (0.5, 1.05, 1.2, 1.2),
        };
        ColorParams {
            sharpen,
            brightness,
            contrast,
            saturation,
        }
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cinematic" => Ok(Preset::Cinematic),
            "vivid" => Ok(Preset::Vivid),
            "clean" => Ok(Preset::Clean),
            "hdr" => Ok(Preset::Hdr),
            _ => Err(Error::UnknownPreset(s.to_string())),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Preset::Cinematic => "cinematic",
            Preset::Vivid => "vivid",
            Preset::Clean => "clean",
            Preset::Hdr => "hdr",
        };
        f.write_str(name)
    }
}

/// Parameters of a [`ColorEnhancer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorParams {
    /// Unsharp amount, `0.0` disables sharpening.
    pub sharpen: f32,
    /// Brightness multiplier; `1.0` is neutral. Applied as an offset of
    /// `(brightness - 1) * 50`.
    pub brightness: f32,
    /// Contrast gain; `1.0` is neutral.
    pub contrast: f32,
    /// Saturation multiplier; `1.0` is neutral.
    pub saturation: f32,
}

impl Default for ColorParams {
    fn default() -> Self {
        Preset::Clean.params()
    }
}

/// Sharpen, then brightness/contrast, then saturation.
#[derive(Debug, Clone)]
pub struct ColorEnhancer {
    params: ColorParams,
    name: String,
}

impl ColorEnhancer {
    /// Enhancer with explicit parameters.
    #[must_use]
    pub fn new(params: ColorParams) -> Self {
        Self {
            params,
            name: "color".to_string(),
        }
    }

    /// Enhancer for a named preset.
    #[must_use]
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            params: preset.params(),
            name: preset.to_string(),
        }
    }

    /// The active parameters.
    #[must_use]
    pub fn params(&self) -> &ColorParams {
        &self.params
    }
}

impl Enhancer for ColorEnhancer {
    fn enhance(&self, frame: &RgbImage) -> Result<RgbImage> {
        let p = self.params;
        let mut out = if p.sharpen > 0.0 {
            sharpen(frame, p.sharpen)
        } else {
            frame.clone()
        };

        let offset = (p.brightness - 1.0) * 50.0;
        let neutral_levels = (p.contrast - 1.0).abs() < f32::EPSILON && offset.abs() < f32::EPSILON;
        let neutral_saturation = (p.saturation - 1.0).abs() < f32::EPSILON;

        if !(neutral_levels && neutral_saturation) {
            for px in out.pixels_mut() {
                if !neutral_levels {
                    *px = Rgb(px.0.map(|v| to_u8(f32::from(v) * p.contrast + offset)));
                }
                if !neutral_saturation {
                    *px = saturate(*px, p.saturation);
                }
            }
        }

        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Unsharp mask against a 3x3 box blur: `v + amount * (v - blur)`.
/// Edge pixels average only the in-bounds part of the window.
fn sharpen(frame: &RgbImage, amount: f32) -> RgbImage {
    let (w, h) = frame.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let mut sum = [0.0_f32; 3];
        let mut n = 0.0_f32;
        for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                let q = frame.get_pixel(nx, ny);
                for (acc, v) in sum.iter_mut().zip(q.0) {
                    *acc += f32::from(v);
                }
                n += 1.0;
            }
        }
        let px = frame.get_pixel(x, y);
        Rgb(std::array::from_fn(|ch| {
            let v = f32::from(px[ch]);
            to_u8(v + amount * (v - sum[ch] / n))
        }))
    })
}

/// Scale HSV saturation by `factor` while keeping hue and value.
///
/// With `V = max(r, g, b)` fixed, every channel moves linearly toward or
/// away from `V`: `c' = V - factor * (V - c)`, clipped to `[0, V]`.
fn saturate(px: Rgb<u8>, factor: f32) -> Rgb<u8> {
    let value = f32::from(px.0.iter().copied().max().unwrap_or(0));
    Rgb(px.0.map(|c| {
        let shifted = value - factor * (value - f32::from(c));
        to_u8(shifted.clamp(0.0, value))
    }))
}
