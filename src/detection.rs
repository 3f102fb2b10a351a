//! Watermark region detection.
//!
//! The overlay is a bright, text-like mark that lives in the bottom-right
//! corner of the frame. Detection runs in two independent parts:
//! 1. **Text outlines**: bright blobs inside the bottom-right search window
//!    whose outline area and bounding box look like glyphs.
//! 2. **Fixed prior**: a rectangle at the nominal watermark position that is
//!    always emitted, so removal still covers the mark when it is faint,
//!    semi-transparent or sitting on a busy background.

use image::{GrayImage, Luma, RgbImage};
use tracing::debug;

use crate::region::Region;

/// Search window starts at this fraction of the frame height.
const SEARCH_TOP_FRACTION: f64 = 0.85;
/// Search window starts at this fraction of the frame width.
const SEARCH_LEFT_FRACTION: f64 = 0.70;
/// Luminance at or above this value counts as watermark ink.
pub const BRIGHTNESS_CUTOFF: u8 = 200;
/// Outline area must be strictly above this.
const MIN_OUTLINE_AREA: f64 = 100.0;
/// Outline area must be strictly below this.
const MAX_OUTLINE_AREA: f64 = 10_000.0;
/// Accepted bounding-box width range (exclusive).
const WIDTH_RANGE: (u32, u32) = (10, 300);
/// Accepted bounding-box height range (exclusive).
const HEIGHT_RANGE: (u32, u32) = (5, 100);
/// Padding added around each accepted outline.
pub const REGION_PADDING: u32 = 5;
/// Prior rectangle width as a fraction of frame width.
const PRIOR_WIDTH_FRACTION: f64 = 0.08;
/// Prior rectangle height as a fraction of frame height.
const PRIOR_HEIGHT_FRACTION: f64 = 0.04;
/// Prior rectangle inset from the right and bottom edges.
const PRIOR_MARGIN_FRACTION: f64 = 0.02;

/// Moore neighbourhood in clockwise order (image coordinates, y down),
/// starting from west.
const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

/// Regions found in a single frame.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Text-like outlines, padded and in frame coordinates.
    pub candidates: Vec<Region>,
    /// The fixed bottom-right prior region.
    pub prior: Region,
}

impl Detection {
    /// All regions, candidates first and the prior last.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.candidates.iter().chain(std::iter::once(&self.prior))
    }
}

/// Floor of `value * fraction`, matching integer truncation of a scaled size.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(value: u32, fraction: f64) -> u32 {
    (f64::from(value) * fraction) as u32
}

/// The fixed watermark prior for a `width x height` frame.
///
/// Anchored at the bottom-right corner, roughly 8% x 4% of the frame and
/// inset by 2% of each dimension.
#[must_use]
pub fn prior_region(width: u32, height: u32) -> Region {
    let margin_x = scaled(width, PRIOR_MARGIN_FRACTION);
    let margin_y = scaled(height, PRIOR_MARGIN_FRACTION);
    let wm_w = scaled(width, PRIOR_WIDTH_FRACTION);
    let wm_h = scaled(height, PRIOR_HEIGHT_FRACTION);

    let x = width.saturating_sub(margin_x + wm_w);
    let y = height.saturating_sub(margin_y + wm_h);
    let right = width.saturating_sub(margin_x);
    let bottom = height.saturating_sub(margin_y);
    Region::new(x, y, right - x, bottom - y)
}

/// The bottom-right search window, or `None` if it covers no pixels.
#[must_use]
pub fn search_window(width: u32, height: u32) -> Option<Region> {
    let x = scaled(width, SEARCH_LEFT_FRACTION);
    let y = scaled(height, SEARCH_TOP_FRACTION);
    let region = Region::new(x, y, width.saturating_sub(x), height.saturating_sub(y));
    (!region.is_empty()).then_some(region)
}

/// Convert an RGB image region to 8-bit luminance.
///
/// Uses luminance formula: `0.299*R + 0.587*G + 0.114*B`.
fn region_to_luminance(img: &RgbImage, region: &Region) -> GrayImage {
    GrayImage::from_fn(region.width, region.height, |dx, dy| {
        let px = img.get_pixel(region.x + dx, region.y + dy);
        let lum = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Luma([lum.round().clamp(0.0, 255.0) as u8])
    })
}

/// Binary threshold: `true` where luminance is at or above `cutoff`.
fn threshold(gray: &GrayImage, cutoff: u8) -> Vec<bool> {
    gray.pixels().map(|p| p[0] >= cutoff).collect()
}

/// The external outline of one connected blob.
#[derive(Debug, Clone)]
pub(crate) struct Outline {
    /// Boundary pixel coordinates in tracing order.
    pub points: Vec<(i64, i64)>,
}

impl Outline {
    /// Polygon area enclosed by the boundary pixel centres (shoelace formula).
    #[allow(clippy::cast_precision_loss)]
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: i64 = (0..n)
            .map(|i| {
                let (x0, y0) = self.points[i];
                let (x1, y1) = self.points[(i + 1) % n];
                x0 * y1 - x1 * y0
            })
            .sum();
        (twice as f64).abs() / 2.0
    }

    /// Inclusive bounding box as a region (`width = max - min + 1`).
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bounding_region(&self) -> Region {
        let (mut min_x, mut min_y) = (i64::MAX, i64::MAX);
        let (mut max_x, mut max_y) = (i64::MIN, i64::MIN);
        for &(x, y) in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Region {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
            area: self.area(),
        }
    }
}

/// Trace the outer boundary of every 8-connected foreground blob.
///
/// Blobs are discovered in raster order; each one is flood-filled so it is
/// traced exactly once, starting from its top-left pixel.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub(crate) fn trace_outlines(binary: &[bool], width: u32, height: u32) -> Vec<Outline> {
    let w = width as usize;
    let h = height as usize;
    debug_assert_eq!(binary.len(), w * h);

    let is_fg = |x: i64, y: i64| -> bool {
        x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h && binary[y as usize * w + x as usize]
    };

    let mut visited = vec![false; w * h];
    let mut outlines = Vec::new();
    let mut stack = Vec::new();

    for start_y in 0..h {
        for start_x in 0..w {
            let idx = start_y * w + start_x;
            if !binary[idx] || visited[idx] {
                continue;
            }

            // Claim the whole blob.
            let mut blob_size = 0usize;
            visited[idx] = true;
            stack.push((start_x as i64, start_y as i64));
            while let Some((x, y)) = stack.pop() {
                blob_size += 1;
                for (dx, dy) in NEIGHBOURS {
                    let (nx, ny) = (x + dx, y + dy);
                    if is_fg(nx, ny) {
                        let n_idx = ny as usize * w + nx as usize;
                        if !visited[n_idx] {
                            visited[n_idx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            let start = (start_x as i64, start_y as i64);
            outlines.push(Outline {
                points: moore_trace(start, blob_size, &is_fg),
            });
        }
    }

    outlines
}

/// Moore-neighbour boundary tracing from `start`, whose west neighbour is
/// known to be background. Stops when the first move out of `start` repeats.
fn moore_trace(
    start: (i64, i64),
    blob_size: usize,
    is_fg: &impl Fn(i64, i64) -> bool,
) -> Vec<(i64, i64)> {
    let mut points = vec![start];
    let mut current = start;
    let mut backtrack = (start.0 - 1, start.1);
    let mut first_move = None;
    // Every boundary pixel is entered at most four times.
    let max_steps = 4 * blob_size + 8;

    for _ in 0..max_steps {
        let from = (backtrack.0 - current.0, backtrack.1 - current.1);
        let Some(base) = NEIGHBOURS.iter().position(|&d| d == from) else {
            break;
        };

        let mut next = None;
        for k in 1..=8 {
            let (dx, dy) = NEIGHBOURS[(base + k) % 8];
            let candidate = (current.0 + dx, current.1 + dy);
            if is_fg(candidate.0, candidate.1) {
                let (bx, by) = NEIGHBOURS[(base + k - 1) % 8];
                next = Some((candidate, (current.0 + bx, current.1 + by)));
                break;
            }
        }

        // Isolated pixel.
        let Some((next_pixel, next_backtrack)) = next else {
            break;
        };

        if current == start {
            match first_move {
                None => first_move = Some(next_pixel),
                Some(first) if first == next_pixel => break,
                Some(_) => {}
            }
        }

        points.push(next_pixel);
        current = next_pixel;
        backtrack = next_backtrack;
    }

    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }
    points
}

/// Whether an outline looks like a rendered glyph.
fn is_text_like(region: &Region) -> bool {
    region.area > MIN_OUTLINE_AREA
        && region.area < MAX_OUTLINE_AREA
        && region.width > WIDTH_RANGE.0
        && region.width < WIDTH_RANGE.1
        && region.height > HEIGHT_RANGE.0
        && region.height < HEIGHT_RANGE.1
}

/// Locate watermark-candidate regions in one frame.
///
/// Never fails: if the search window is degenerate only the prior region is
/// returned.
#[must_use]
pub fn detect_regions(frame: &RgbImage) -> Detection {
    let (width, height) = frame.dimensions();
    let prior = prior_region(width, height);

    let Some(window) = search_window(width, height) else {
        debug!(width, height, "search window empty, using prior region only");
        return Detection {
            candidates: Vec::new(),
            prior,
        };
    };

    let gray = region_to_luminance(frame, &window);
    let binary = threshold(&gray, BRIGHTNESS_CUTOFF);
    let outlines = trace_outlines(&binary, window.width, window.height);

    let candidates: Vec<Region> = outlines
        .iter()
        .map(Outline::bounding_region)
        .filter(is_text_like)
        .map(|r| r.translated(window.x, window.y).padded(REGION_PADDING, width, height))
        .collect();

    debug!(
        outlines = outlines.len(),
        accepted = candidates.len(),
        window_x = window.x,
        window_y = window.y,
        "text outline detection finished"
    );

    Detection { candidates, prior }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn fill(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..y + h {
            for px in x..x + w {
                img.put_pixel(px, py, Rgb(color));
            }
        }
    }

    #[test]
    fn prior_region_for_100x100() {
        let r = prior_region(100, 100);
        assert_eq!((r.x, r.y, r.width, r.height), (90, 94, 8, 4));
    }

    #[test]
    fn prior_region_for_1920x1080() {
        let r = prior_region(1920, 1080);
        assert_eq!(r.width, 153);
        assert_eq!(r.height, 43);
        assert_eq!(r.right(), 1920 - 38);
        assert_eq!(r.bottom(), 1080 - 21);
    }

    #[test]
    fn prior_region_is_empty_for_tiny_frames() {
        assert!(prior_region(5, 5).is_empty());
    }

    #[test]
    fn search_window_is_bottom_right() {
        let win = search_window(1000, 1000).unwrap();
        assert_eq!((win.x, win.y, win.width, win.height), (700, 850, 300, 150));
        assert!(search_window(0, 0).is_none());
    }

    #[test]
    fn shoelace_area_of_filled_square() {
        let mut binary = vec![false; 20 * 20];
        for y in 5..15 {
            for x in 5..15 {
                binary[y * 20 + x] = true;
            }
        }
        let outlines = trace_outlines(&binary, 20, 20);
        assert_eq!(outlines.len(), 1);
        let region = outlines[0].bounding_region();
        assert_eq!((region.x, region.y, region.width, region.height), (5, 5, 10, 10));
        assert!((region.area - 81.0).abs() < 1e-9);
    }

    #[test]
    fn separate_blobs_get_separate_outlines() {
        let mut binary = vec![false; 30 * 10];
        for y in 2..6 {
            for x in 2..6 {
                binary[y * 30 + x] = true;
            }
            for x in 20..25 {
                binary[y * 30 + x] = true;
            }
        }
        let outlines = trace_outlines(&binary, 30, 10);
        assert_eq!(outlines.len(), 2);
    }

    #[test]
    fn diagonal_pixels_are_one_blob() {
        let mut binary = vec![false; 5 * 5];
        binary[0] = true;
        binary[6] = true;
        binary[12] = true;
        let outlines = trace_outlines(&binary, 5, 5);
        assert_eq!(outlines.len(), 1);
        let region = outlines[0].bounding_region();
        assert_eq!((region.width, region.height), (3, 3));
    }

    #[test]
    fn single_pixel_has_zero_area() {
        let mut binary = vec![false; 9];
        binary[4] = true;
        let outlines = trace_outlines(&binary, 3, 3);
        assert_eq!(outlines.len(), 1);
        assert!(outlines[0].area().abs() < f64::EPSILON);
    }

    #[test]
    fn detects_text_sized_bright_blob() {
        let mut img = RgbImage::from_pixel(640, 360, Rgb([20, 20, 20]));
        // 40x12 "word" inside the search window (x >= 448, y >= 306).
        fill(&mut img, 500, 320, 40, 12, [250, 250, 250]);

        let detection = detect_regions(&img);
        assert_eq!(detection.candidates.len(), 1);
        let r = detection.candidates[0];
        assert_eq!((r.x, r.y), (495, 315));
        assert_eq!((r.width, r.height), (50, 22));
    }

    #[test]
    fn ignores_bright_blobs_outside_window_and_specks() {
        let mut img = RgbImage::from_pixel(640, 360, Rgb([20, 20, 20]));
        fill(&mut img, 10, 10, 40, 12, [250, 250, 250]);
        fill(&mut img, 600, 340, 3, 3, [250, 250, 250]);

        let detection = detect_regions(&img);
        assert!(detection.candidates.is_empty());
        assert_eq!(detection.regions().count(), 1);
    }

    #[test]
    fn rejects_large_background_shapes() {
        let mut img = RgbImage::from_pixel(1920, 1080, Rgb([0, 0, 0]));
        // Bright sky across the entire search window.
        fill(&mut img, 1344, 918, 576, 162, [255, 255, 255]);
        let detection = detect_regions(&img);
        assert!(detection.candidates.is_empty());
    }

    #[test]
    fn degenerate_frame_returns_prior_only() {
        let img = RgbImage::new(1, 1);
        let detection = detect_regions(&img);
        assert!(detection.candidates.is_empty());
    }
}
