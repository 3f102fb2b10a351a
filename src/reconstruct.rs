//! Per-frame watermark reconstruction.
//!
//! Two strategies share one entry point:
//! - **Spatial**: inpaint every masked pixel from its surroundings. Used for
//!   the first frame, or whenever no compatible previous output exists.
//! - **Temporal**: take masked pixels from the previous reconstructed frame
//!   (the watermark is static while the background moves, so the last clean
//!   estimate is the best guess), then re-inpaint a thin band around the
//!   mask edge to hide the blend seam.

use image::{Rgb, RgbImage};

use crate::enhance::Enhancer;
use crate::error::{Error, Result, Stage};
use crate::inpaint;
use crate::mask::{self, Mask};

/// Inpainting radius for full spatial reconstruction.
pub const SPATIAL_RADIUS: u32 = 5;
/// Inpainting radius for the seam band after temporal blending.
pub const SEAM_RADIUS: u32 = 3;
/// Dilation passes applied to the mask edge to form the seam band.
pub const SEAM_ITERATIONS: u32 = 2;

/// How a frame is reconstructed.
#[derive(Debug, Clone, Copy)]
pub enum Strategy<'a> {
    /// Inpaint masked pixels from the current frame only.
    Spatial,
    /// Blend masked pixels from the previous reconstructed frame.
    Temporal {
        /// Previous output, same dimensions as the current frame.
        previous: &'a RgbImage,
    },
}

impl<'a> Strategy<'a> {
    /// Pick the strategy for `frame`: temporal when a previous output of the
    /// same dimensions is available, spatial otherwise.
    #[must_use]
    pub fn select(frame: &RgbImage, previous: Option<&'a RgbImage>) -> Self {
        match previous {
            Some(prev) if prev.dimensions() == frame.dimensions() => {
                Strategy::Temporal { previous: prev }
            }
            _ => Strategy::Spatial,
        }
    }
}

/// Tunables for [`Reconstructor`].
#[derive(Debug, Clone, Copy)]
pub struct ReconstructOptions {
    /// Radius for spatial inpainting.
    pub spatial_radius: u32,
    /// Radius for seam inpainting.
    pub seam_radius: u32,
    /// Dilation passes for the seam band.
    pub seam_iterations: u32,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            spatial_radius: SPATIAL_RADIUS,
            seam_radius: SEAM_RADIUS,
            seam_iterations: SEAM_ITERATIONS,
        }
    }
}

/// Removes the watermark from individual frames.
#[derive(Default)]
pub struct Reconstructor {
    options: ReconstructOptions,
    enhancer: Option<Box<dyn Enhancer>>,
}

impl std::fmt::Debug for Reconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconstructor")
            .field("options", &self.options)
            .field("enhancer", &self.enhancer.as_ref().map(|e| e.name()))
            .finish()
    }
}

impl Reconstructor {
    /// Create a reconstructor with the given options and no enhancer.
    #[must_use]
    pub fn new(options: ReconstructOptions) -> Self {
        Self {
            options,
            enhancer: None,
        }
    }

    /// Attach an enhancer applied by [`Reconstructor::enhance`].
    #[must_use]
    pub fn with_enhancer(mut self, enhancer: Box<dyn Enhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// The configured options.
    #[must_use]
    pub fn options(&self) -> &ReconstructOptions {
        &self.options
    }

    /// Seam band of `mask` for these options.
    #[must_use]
    pub fn seam_band(&self, mask: &Mask) -> Mask {
        mask::seam_band(mask, self.options.seam_iterations)
    }

    /// Reconstruct `frame` under `mask`, using `previous` when compatible.
    ///
    /// The seam band is derived from `mask` on every temporal call; use
    /// [`Reconstructor::reconstruct_with_seam`] when the mask is fixed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `mask` and `frame` dimensions differ.
    pub fn reconstruct(
        &self,
        frame: &RgbImage,
        mask: &Mask,
        previous: Option<&RgbImage>,
    ) -> Result<RgbImage> {
        self.reconstruct_with_seam(frame, mask, None, previous)
    }

    /// Like [`Reconstructor::reconstruct`], with a precomputed seam band.
    ///
    /// `seam` must come from [`Reconstructor::seam_band`] on the same mask.
    /// When `None`, it is computed here if the temporal path needs it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `mask` or `seam` dimensions differ
    /// from `frame`.
    pub fn reconstruct_with_seam(
        &self,
        frame: &RgbImage,
        mask: &Mask,
        seam: Option<&Mask>,
        previous: Option<&RgbImage>,
    ) -> Result<RgbImage> {
        check_dimensions(frame, mask)?;
        if let Some(seam) = seam {
            check_dimensions(frame, seam)?;
        }

        let out = match Strategy::select(frame, previous) {
            Strategy::Spatial => inpaint::inpaint(frame, mask, self.options.spatial_radius),
            Strategy::Temporal { previous } => match seam {
                Some(seam) => self.temporal(frame, mask, seam, previous),
                None => self.temporal(frame, mask, &self.seam_band(mask), previous),
            },
        };
        Ok(out)
    }

    fn temporal(
        &self,
        frame: &RgbImage,
        mask: &Mask,
        seam: &Mask,
        previous: &RgbImage,
    ) -> RgbImage {
        let mut out = blend(frame, previous, mask);
        inpaint::inpaint_in_place(&mut out, seam, self.options.seam_radius);
        out
    }

    /// Apply the attached enhancer, or return a copy of `frame` if none.
    ///
    /// # Errors
    ///
    /// Propagates enhancer failures, and returns [`Error::InvalidInput`] if
    /// the enhancer changed the frame dimensions.
    pub fn enhance(&self, frame: &RgbImage) -> Result<RgbImage> {
        let Some(enhancer) = &self.enhancer else {
            return Ok(frame.clone());
        };
        let out = enhancer.enhance(frame)?;
        if out.dimensions() != frame.dimensions() {
            return Err(Error::InvalidInput {
                stage: Stage::Enhance,
                expected: frame.dimensions(),
                actual: out.dimensions(),
            });
        }
        Ok(out)
    }
}

fn check_dimensions(frame: &RgbImage, mask: &Mask) -> Result<()> {
    if mask.dimensions() == frame.dimensions() {
        return Ok(());
    }
    Err(Error::InvalidInput {
        stage: Stage::Reconstruct,
        expected: frame.dimensions(),
        actual: mask.dimensions(),
    })
}

/// `current * (1 - m) + previous * m` with `m = mask / 255`, per pixel.
fn blend(current: &RgbImage, previous: &RgbImage, mask: &Mask) -> RgbImage {
    let mut out = current.clone();
    for ((px, prev), m) in out.pixels_mut().zip(previous.pixels()).zip(mask.pixels()) {
        if m[0] == 0 {
            continue;
        }
        let weight = f32::from(m[0]) / 255.0;
        let mixed: [u8; 3] = std::array::from_fn(|ch| {
            let v = f32::from(px[ch]) * (1.0 - weight) + f32::from(prev[ch]) * weight;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                v.round().clamp(0.0, 255.0) as u8
            }
        });
        *px = Rgb(mixed);
    }
    out
}
