//! Fast-marching inpainting.
//!
//! Masked pixels are filled in order of increasing distance from the mask
//! boundary. Each one becomes a weighted average of already-known pixels
//! within `radius`, where weights favour close pixels, pixels on the same
//! distance level, and pixels along the marching direction. Filled pixels
//! immediately become sources for pixels deeper inside the mask.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::{Rgb, RgbImage};
use tracing::warn;

use crate::mask::Mask;

/// Distance assigned to pixels not yet reached by the front.
const FAR: f32 = 1.0e6;
/// Lower bound on the directional weight so sideways samples still count.
const MIN_DIRECTION_WEIGHT: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Known,
    Band,
    Inside,
}

/// Heap entry ordered so that `BinaryHeap` pops the smallest distance first.
#[derive(Debug, Clone, Copy)]
struct Front {
    distance: f32,
    index: usize,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.index.cmp(&self.index))
    }
}

struct Marcher<'a> {
    width: usize,
    height: usize,
    radius: i64,
    state: Vec<State>,
    distance: Vec<f32>,
    values: Vec<[f32; 3]>,
    heap: BinaryHeap<Front>,
    mask: &'a Mask,
}

impl<'a> Marcher<'a> {
    fn new(frame: &RgbImage, mask: &'a Mask, radius: u32) -> Self {
        let width = frame.width() as usize;
        let height = frame.height() as usize;

        let state: Vec<State> = mask
            .pixels()
            .map(|p| if p[0] > 0 { State::Inside } else { State::Known })
            .collect();
        let distance = state
            .iter()
            .map(|s| if *s == State::Inside { FAR } else { 0.0 })
            .collect();
        let values = frame
            .pixels()
            .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
            .collect();

        let mut marcher = Self {
            width,
            height,
            radius: i64::from(radius.max(1)),
            state,
            distance,
            values,
            heap: BinaryHeap::new(),
            mask,
        };
        marcher.seed_band();
        marcher
    }

    fn neighbours4(&self, index: usize) -> impl Iterator<Item = usize> {
        let (w, h) = (self.width, self.height);
        let (x, y) = (index % w, index / w);
        [
            (x > 0).then(|| index - 1),
            (x + 1 < w).then(|| index + 1),
            (y > 0).then(|| index - w),
            (y + 1 < h).then(|| index + w),
        ]
        .into_iter()
        .flatten()
    }

    /// Known pixels touching the mask form the initial front.
    fn seed_band(&mut self) {
        for index in 0..self.state.len() {
            if self.state[index] != State::Known {
                continue;
            }
            let touches_mask = self
                .neighbours4(index)
                .any(|n| self.state[n] == State::Inside);
            if touches_mask {
                self.state[index] = State::Band;
                self.heap.push(Front {
                    distance: 0.0,
                    index,
                });
            }
        }
    }

    fn reached(&self, index: Option<usize>) -> Option<f32> {
        index
            .filter(|&i| self.state[i] != State::Inside)
            .map(|i| self.distance[i])
    }

    /// First-order eikonal update from one vertical and one horizontal neighbour.
    fn solve(&self, a: Option<usize>, b: Option<usize>) -> f32 {
        match (self.reached(a), self.reached(b)) {
            (Some(ta), Some(tb)) => {
                let diff = ta - tb;
                let disc = 2.0 - diff * diff;
                if disc > 0.0 {
                    let r = disc.sqrt();
                    let s = (ta + tb - r) / 2.0;
                    if s >= ta && s >= tb {
                        return s;
                    }
                    let s = s + r;
                    if s >= ta && s >= tb {
                        return s;
                    }
                }
                1.0 + ta.min(tb)
            }
            (Some(t), None) | (None, Some(t)) => 1.0 + t,
            (None, None) => FAR,
        }
    }

    fn arrival_time(&self, index: usize) -> f32 {
        let (w, h) = (self.width, self.height);
        let (x, y) = (index % w, index / w);
        let up = (y > 0).then(|| index - w);
        let down = (y + 1 < h).then(|| index + w);
        let left = (x > 0).then(|| index - 1);
        let right = (x + 1 < w).then(|| index + 1);

        self.solve(up, left)
            .min(self.solve(down, left))
            .min(self.solve(up, right))
            .min(self.solve(down, right))
    }

    /// Gradient of the distance field at `index` from reached neighbours.
    fn distance_gradient(&self, index: usize) -> (f32, f32) {
        let (w, h) = (self.width, self.height);
        let (x, y) = (index % w, index / w);
        let t = self.distance[index];

        let axis = |prev: Option<usize>, next: Option<usize>| -> f32 {
            match (self.reached(prev), self.reached(next)) {
                (Some(tp), Some(tn)) => (tn - tp) / 2.0,
                (Some(tp), None) => t - tp,
                (None, Some(tn)) => tn - t,
                (None, None) => 0.0,
            }
        };

        let gx = axis((x > 0).then(|| index - 1), (x + 1 < w).then(|| index + 1));
        let gy = axis((y > 0).then(|| index - w), (y + 1 < h).then(|| index + w));
        (gx, gy)
    }

    /// Weighted average of reached pixels within the radius.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn fill(&mut self, index: usize) {
        let (w, h) = (self.width as i64, self.height as i64);
        let px = (index % self.width) as i64;
        let py = (index / self.width) as i64;
        let t = self.distance[index];
        let (gx, gy) = self.distance_gradient(index);
        let g_norm = (gx * gx + gy * gy).sqrt();
        let r = self.radius;

        let mut sum = [0.0_f32; 3];
        let mut total = 0.0_f32;

        for qy in (py - r).max(0)..=(py + r).min(h - 1) {
            for qx in (px - r).max(0)..=(px + r).min(w - 1) {
                let (dx, dy) = (px - qx, py - qy);
                let d2 = dx * dx + dy * dy;
                if d2 == 0 || d2 > r * r {
                    continue;
                }
                let q = (qy * w + qx) as usize;
                if self.state[q] == State::Inside {
                    continue;
                }

                let len = (d2 as f32).sqrt();
                let direction = if g_norm > f32::EPSILON {
                    ((dx as f32 * gx + dy as f32 * gy) / (len * g_norm))
                        .abs()
                        .max(MIN_DIRECTION_WEIGHT)
                } else {
                    1.0
                };
                let proximity = 1.0 / (d2 as f32);
                let level = 1.0 / (1.0 + (self.distance[q] - t).abs());
                let weight = direction * proximity * level;

                for (acc, value) in sum.iter_mut().zip(self.values[q]) {
                    *acc += weight * value;
                }
                total += weight;
            }
        }

        if total > 0.0 {
            self.values[index] = sum.map(|s| s / total);
        }
    }

    fn run(&mut self) {
        while let Some(Front { index, .. }) = self.heap.pop() {
            if self.state[index] == State::Known {
                continue;
            }
            self.state[index] = State::Known;

            let inside: Vec<usize> = self
                .neighbours4(index)
                .filter(|&n| self.state[n] == State::Inside)
                .collect();

            for n in inside {
                self.distance[n] = self.arrival_time(n);
                self.fill(n);
                self.state[n] = State::Band;
                self.heap.push(Front {
                    distance: self.distance[n],
                    index: n,
                });
            }
        }
    }

    fn write_back(self, out: &mut RgbImage) {
        let unreached = self
            .state
            .iter()
            .filter(|s| **s == State::Inside)
            .count();
        if unreached > 0 {
            warn!(
                pixels = unreached,
                "mask has no known neighbourhood, filling with black"
            );
        }

        for (i, (px, m)) in out.pixels_mut().zip(self.mask.pixels()).enumerate() {
            if m[0] == 0 {
                continue;
            }
            *px = if self.state[i] == State::Inside {
                Rgb([0, 0, 0])
            } else {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Rgb(self.values[i].map(|v| v.round().clamp(0.0, 255.0) as u8))
            };
        }
    }
}

/// Inpaint the masked pixels of `frame` in place, sampling within `radius`.
///
/// Pixels where `mask` is zero are never modified. `mask` must have the
/// frame's dimensions.
pub fn inpaint_in_place(frame: &mut RgbImage, mask: &Mask, radius: u32) {
    debug_assert_eq!(frame.dimensions(), mask.dimensions());
    let mut marcher = Marcher::new(frame, mask, radius);
    marcher.run();
    marcher.write_back(frame);
}

/// Inpainted copy of `frame`. See [`inpaint_in_place`].
#[must_use]
pub fn inpaint(frame: &RgbImage, mask: &Mask, radius: u32) -> RgbImage {
    let mut out = frame.clone();
    inpaint_in_place(&mut out, mask, radius);
    out
}
