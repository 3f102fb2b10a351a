//! Binary occupancy masks.
//!
//! A mask has the frame's dimensions; `255` marks a watermark pixel that must
//! be reconstructed and `0` marks background that is kept as-is.

use image::{GrayImage, Luma};
use tracing::debug;

use crate::detection::Detection;
use crate::region::Region;

/// Mask value for watermark pixels.
pub const MASKED: u8 = 255;
/// Structuring element radius used when dilating detected regions.
pub const DETECTION_DILATE_RADIUS: u32 = 3;
/// Structuring element radius used when dilating a manual region.
pub const MANUAL_DILATE_RADIUS: u32 = 2;
/// Dilation passes applied to region masks.
pub const DILATE_ITERATIONS: u32 = 2;

/// A per-pixel occupancy mask.
pub type Mask = GrayImage;

/// Offsets `(dx, dy)` of a structuring element's active cells.
#[derive(Debug, Clone)]
pub struct Kernel {
    offsets: Vec<(i64, i64)>,
}

impl Kernel {
    /// Elliptical element of size `(2r+1) x (2r+1)`.
    ///
    /// Row `dy` spans `|dx| <= round(r * sqrt(1 - dy^2/r^2))`, the usual
    /// discrete ellipse construction.
    #[must_use]
    pub fn ellipse(radius: u32) -> Self {
        let r = i64::from(radius);
        if r == 0 {
            return Self {
                offsets: vec![(0, 0)],
            };
        }
        let rf = f64::from(radius);
        let mut offsets = Vec::new();
        for dy in -r..=r {
            #[allow(clippy::cast_precision_loss)]
            let dyf = dy as f64;
            #[allow(clippy::cast_possible_truncation)]
            let half = (rf * ((rf * rf - dyf * dyf) / (rf * rf)).sqrt()).round() as i64;
            for dx in -half..=half {
                offsets.push((dx, dy));
            }
        }
        Self { offsets }
    }

    /// Full `(2r+1) x (2r+1)` square element.
    #[must_use]
    pub fn square(radius: u32) -> Self {
        let r = i64::from(radius);
        let offsets = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .collect();
        Self { offsets }
    }

    /// Number of active cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the element has no active cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Fill `region` with [`MASKED`], clipped to the mask bounds.
pub fn rasterize(mask: &mut Mask, region: &Region) {
    let x1 = region.right().min(mask.width());
    let y1 = region.bottom().min(mask.height());
    for y in region.y.min(y1)..y1 {
        for x in region.x.min(x1)..x1 {
            mask.put_pixel(x, y, Luma([MASKED]));
        }
    }
}

/// Grey-level dilation: each output pixel is the maximum over the kernel
/// footprint. Out-of-bounds cells are ignored.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn dilate(mask: &Mask, kernel: &Kernel, iterations: u32) -> Mask {
    let (w, h) = mask.dimensions();
    let reach = kernel
        .offsets
        .iter()
        .map(|&(dx, dy)| dx.abs().max(dy.abs()))
        .max()
        .unwrap_or(0) as u32;

    let mut current = mask.clone();
    for _ in 0..iterations {
        // Only pixels within `reach` of a non-zero pixel can change.
        let Some(bounds) = nonzero_bounds(&current) else {
            return current;
        };
        let x0 = bounds.x.saturating_sub(reach);
        let y0 = bounds.y.saturating_sub(reach);
        let x1 = (bounds.right() + reach).min(w);
        let y1 = (bounds.bottom() + reach).min(h);

        let src = &current;
        let next = GrayImage::from_fn(w, h, |x, y| {
            if x < x0 || x >= x1 || y < y0 || y >= y1 {
                return Luma([0]);
            }
            let mut best = 0u8;
            for &(dx, dy) in &kernel.offsets {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                    continue;
                }
                best = best.max(src.get_pixel(nx as u32, ny as u32)[0]);
                if best == u8::MAX {
                    break;
                }
            }
            Luma([best])
        });
        current = next;
    }
    current
}

/// Bounding box of the non-zero pixels, or `None` for an empty mask.
#[must_use]
pub fn nonzero_bounds(mask: &Mask) -> Option<Region> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| Region::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Merge detected regions into one dilated mask for a `width x height` frame.
#[must_use]
pub fn build_mask(width: u32, height: u32, detection: &Detection) -> Mask {
    build_mask_from_regions(width, height, detection.regions())
}

/// Rasterize and OR `regions`, then dilate with the detection kernel.
#[must_use]
pub fn build_mask_from_regions<'a>(
    width: u32,
    height: u32,
    regions: impl IntoIterator<Item = &'a Region>,
) -> Mask {
    let mut mask = GrayImage::new(width, height);
    let mut count = 0usize;
    for region in regions {
        rasterize(&mut mask, region);
        count += 1;
    }
    let mask = dilate(
        &mask,
        &Kernel::ellipse(DETECTION_DILATE_RADIUS),
        DILATE_ITERATIONS,
    );
    debug!(
        regions = count,
        masked = masked_pixel_count(&mask),
        "mask built"
    );
    mask
}

/// Mask for a single user-specified watermark rectangle.
#[must_use]
pub fn manual_mask(width: u32, height: u32, region: &Region) -> Mask {
    let mut mask = GrayImage::new(width, height);
    rasterize(&mut mask, region);
    dilate(&mask, &Kernel::ellipse(MANUAL_DILATE_RADIUS), DILATE_ITERATIONS)
}

/// Compute Sobel gradient magnitude for a 2D float array.
///
/// Uses 3x3 Sobel kernels. Border pixels are set to 0.
fn sobel_magnitude(data: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut result = vec![0.0_f32; width * height];
    if width < 3 || height < 3 {
        return result;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let at = |yy: usize, xx: usize| data[yy * width + xx];

            let gx = -at(y - 1, x - 1) + at(y - 1, x + 1) - 2.0 * at(y, x - 1)
                + 2.0 * at(y, x + 1)
                - at(y + 1, x - 1)
                + at(y + 1, x + 1);

            let gy = -at(y - 1, x - 1) - 2.0 * at(y - 1, x) - at(y - 1, x + 1)
                + at(y + 1, x - 1)
                + 2.0 * at(y + 1, x)
                + at(y + 1, x + 1);

            result[y * width + x] = (gx * gx + gy * gy).sqrt();
        }
    }

    result
}

/// Inner edge of the mask: masked pixels where the mask gradient is non-zero.
#[must_use]
pub fn mask_edges(mask: &Mask) -> Mask {
    let (w, h) = mask.dimensions();
    let data: Vec<f32> = mask.pixels().map(|p| f32::from(p[0]) / 255.0).collect();
    let grad = sobel_magnitude(&data, w as usize, h as usize);

    let mut edges = GrayImage::new(w, h);
    for (i, (px, g)) in edges.pixels_mut().zip(grad.iter()).enumerate() {
        if *g > 1e-6 && data[i] > 0.0 {
            *px = Luma([MASKED]);
        }
    }
    edges
}

/// The band around the mask boundary that is re-inpainted after temporal
/// blending: mask edges dilated with a 3x3 square.
#[must_use]
pub fn seam_band(mask: &Mask, iterations: u32) -> Mask {
    dilate(&mask_edges(mask), &Kernel::square(1), iterations)
}

/// Number of non-zero mask pixels.
#[must_use]
pub fn masked_pixel_count(mask: &Mask) -> u64 {
    mask.pixels().filter(|p| p[0] > 0).count() as u64
}

/// Whether every pixel of `region` (clipped to the mask) is masked.
#[must_use]
pub fn covers(mask: &Mask, region: &Region) -> bool {
    let x1 = region.right().min(mask.width());
    let y1 = region.bottom().min(mask.height());
    (region.y.min(y1)..y1).all(|y| (region.x.min(x1)..x1).all(|x| mask.get_pixel(x, y)[0] > 0))
}
