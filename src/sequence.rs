//! Frame sequence driver.
//!
//! The driver computes the watermark mask once from frame 0, rewinds the
//! source and streams every frame through the [`Reconstructor`], carrying
//! the previous reconstructed frame forward for temporal blending.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::detection::{self, Detection};
use crate::error::{Error, Result, Stage};
use crate::mask::{self, Mask};
use crate::reconstruct::Reconstructor;
use crate::region::Region;

/// Frames between progress notifications.
pub const PROGRESS_INTERVAL: u64 = 30;

/// Static properties of a frame sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub frame_rate: f64,
    /// Expected number of frames (may be an estimate).
    pub frame_count: u64,
}

/// Supplies frames in order.
pub trait FrameSource {
    /// Dimensions, rate and expected length of the sequence.
    fn info(&self) -> SequenceInfo;

    /// The next frame, or `None` at the end of the sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame exists but cannot be read.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Restart from the first frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot seek back.
    fn rewind(&mut self) -> Result<()>;
}

/// Consumes reconstructed frames in order.
pub trait FrameSink {
    /// Append one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be stored.
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the output.
    ///
    /// # Errors
    ///
    /// Returns an error if finalizing fails.
    fn finish(&mut self) -> Result<()>;
}

/// Receives `(frames_processed, frames_total)` notifications.
///
/// Implementations must return quickly and never panic.
pub trait ProgressObserver {
    /// Called every [`PROGRESS_INTERVAL`] frames and once at the end.
    fn on_progress(&self, processed: u64, total: u64);
}

impl<F: Fn(u64, u64)> ProgressObserver for F {
    fn on_progress(&self, processed: u64, total: u64) {
        self(processed, total);
    }
}

/// Observer that ignores all notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _processed: u64, _total: u64) {}
}

/// How the sequence mask is obtained from frame 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MaskMode {
    /// Text outline detection plus the fixed prior region.
    #[default]
    Auto,
    /// Only the fixed bottom-right prior region.
    PriorOnly,
    /// A user-supplied rectangle.
    Manual(Region),
}

impl MaskMode {
    /// Build the mask for `frame` and return the regions it was built from.
    #[must_use]
    pub fn build(&self, frame: &RgbImage) -> (Mask, Vec<Region>) {
        let (width, height) = frame.dimensions();
        match self {
            MaskMode::Auto => {
                let detection = detection::detect_regions(frame);
                let mask = mask::build_mask(width, height, &detection);
                (mask, detection.regions().copied().collect())
            }
            MaskMode::PriorOnly => {
                let detection = Detection {
                    candidates: Vec::new(),
                    prior: detection::prior_region(width, height),
                };
                let mask = mask::build_mask(width, height, &detection);
                (mask, vec![detection.prior])
            }
            MaskMode::Manual(region) => (mask::manual_mask(width, height, region), vec![*region]),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct SequenceReport {
    /// Frames written to the sink.
    pub frames_processed: u64,
    /// Frame width.
    pub width: u32,
    /// Frame height.
    pub height: u32,
    /// Non-zero pixels in the sequence mask.
    pub masked_pixels: u64,
    /// Regions the mask was built from.
    pub regions: Vec<Region>,
}

/// Lifecycle of a [`SequenceDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Nothing read yet.
    Uninitialized,
    /// Mask built from frame 0, source rewound.
    MaskComputed,
    /// Currently processing the frame at this index.
    Streaming(u64),
    /// All frames written and the sink finished.
    Done,
}

/// Owns the sequence mask and the previous reconstructed frame for one run.
#[derive(Debug)]
pub struct SequenceDriver {
    reconstructor: Reconstructor,
    mask_mode: MaskMode,
    cancel: Option<Arc<AtomicBool>>,
    state: DriverState,
    mask: Option<Mask>,
    seam: Option<Mask>,
    previous: Option<RgbImage>,
}

impl SequenceDriver {
    /// Driver using `reconstructor` and automatic mask detection.
    #[must_use]
    pub fn new(reconstructor: Reconstructor) -> Self {
        Self {
            reconstructor,
            mask_mode: MaskMode::Auto,
            cancel: None,
            state: DriverState::Uninitialized,
            mask: None,
            seam: None,
            previous: None,
        }
    }

    /// Choose how the mask is built.
    #[must_use]
    pub fn with_mask_mode(mut self, mode: MaskMode) -> Self {
        self.mask_mode = mode;
        self
    }

    /// Stop between frames once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The sequence mask, once computed.
    #[must_use]
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Process the whole sequence from `source` into `sink`.
    ///
    /// Once streaming has started the sink is finished on every exit path,
    /// including failures, and the driver ends in [`DriverState::Done`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the driver already ran.
    /// - [`Error::SourceUnreadable`] if frame 0 cannot be read.
    /// - [`Error::Frame`] wrapping the first per-frame failure.
    /// - [`Error::Cancelled`] if the cancel flag was raised.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &dyn ProgressObserver,
    ) -> Result<SequenceReport> {
        if self.state != DriverState::Uninitialized {
            return Err(Error::InvalidState("sequence driver can only run once"));
        }

        let info = source.info();
        info!(
            width = info.width,
            height = info.height,
            frame_rate = info.frame_rate,
            frames = info.frame_count,
            mode = ?self.mask_mode,
            "starting watermark removal"
        );

        let first = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(Error::SourceUnreadable(
                    "sequence contains no frames".to_string(),
                ))
            }
            Err(e) => return Err(Error::SourceUnreadable(e.to_string())),
        };

        let (mask, regions) = self.mask_mode.build(&first);
        let masked_pixels = mask::masked_pixel_count(&mask);
        debug!(regions = regions.len(), masked_pixels, "sequence mask computed");
        let (width, height) = mask.dimensions();
        self.seam = Some(self.reconstructor.seam_band(&mask));
        self.mask = Some(mask);
        self.state = DriverState::MaskComputed;
        drop(first);

        source
            .rewind()
            .map_err(|e| e.at_frame(0, Stage::Read))?;

        let streamed = self.stream(source, sink, progress, info.frame_count);
        self.previous = None;
        self.state = DriverState::Done;

        let processed = match streamed {
            Ok(processed) => processed,
            Err(Error::Cancelled { processed }) => {
                sink.finish().map_err(|e| e.at_frame(processed, Stage::Write))?;
                return Err(Error::Cancelled { processed });
            }
            Err(e) => {
                if let Err(finish) = sink.finish() {
                    warn!(error = %finish, "failed to finish sink after error");
                }
                return Err(e);
            }
        };

        sink.finish().map_err(|e| e.at_frame(processed, Stage::Write))?;

        info!(frames = processed, "watermark removal complete");
        Ok(SequenceReport {
            frames_processed: processed,
            width,
            height,
            masked_pixels,
            regions,
        })
    }

    fn stream(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        progress: &dyn ProgressObserver,
        total: u64,
    ) -> Result<u64> {
        let Some(mask) = self.mask.as_ref() else {
            return Err(Error::InvalidState("mask not computed"));
        };
        let seam = self.seam.as_ref();

        let mut index = 0u64;
        loop {
            if self.cancelled() {
                return Err(Error::Cancelled { processed: index });
            }

            let Some(frame) = source
                .next_frame()
                .map_err(|e| e.at_frame(index, Stage::Read))?
            else {
                break;
            };
            self.state = DriverState::Streaming(index);

            let clean = self
                .reconstructor
                .reconstruct_with_seam(&frame, mask, seam, self.previous.as_ref())
                .map_err(|e| e.at_frame(index, Stage::Reconstruct))?;
            let output = self
                .reconstructor
                .enhance(&clean)
                .map_err(|e| e.at_frame(index, Stage::Enhance))?;
            sink.write_frame(&output)
                .map_err(|e| e.at_frame(index, Stage::Write))?;

            self.previous = Some(clean);
            index += 1;

            if index % PROGRESS_INTERVAL == 0 {
                progress.on_progress(index, total.max(index));
            }
        }

        if index % PROGRESS_INTERVAL != 0 {
            progress.on_progress(index, total.max(index));
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MemorySink, MemorySource};
    use image::Rgb;
    use std::cell::RefCell;

    fn frames(n: usize, w: u32, h: u32) -> Vec<RgbImage> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_possible_truncation)]
                RgbImage::from_pixel(w, h, Rgb([(i * 10) as u8, 50, 60]))
            })
            .collect()
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn info(&self) -> SequenceInfo {
            SequenceInfo {
                width: 10,
                height: 10,
                frame_rate: 30.0,
                frame_count: 1,
            }
        }
        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            Err(Error::UnsupportedFormat("corrupt".into()))
        }
        fn rewind(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_source_is_unreadable() {
        let mut driver = SequenceDriver::new(Reconstructor::default());
        let mut source = MemorySource::new(Vec::new(), 30.0);
        let mut sink = MemorySink::default();
        let err = driver.run(&mut source, &mut sink, &NoProgress).unwrap_err();
        assert!(matches!(err, Error::SourceUnreadable(_)));
        assert_eq!(driver.state(), DriverState::Uninitialized);
    }

    #[test]
    fn failing_first_read_is_unreadable() {
        let mut driver = SequenceDriver::new(Reconstructor::default());
        let mut sink = MemorySink::default();
        let err = driver
            .run(&mut FailingSource, &mut sink, &NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnreadable(msg) if msg.contains("corrupt")));
    }

    #[test]
    fn processes_every_frame_including_first() {
        let input = frames(4, 64, 48);
        let mut source = MemorySource::new(input, 25.0);
        let mut sink = MemorySink::default();
        let mut driver = SequenceDriver::new(Reconstructor::default());

        let report = driver.run(&mut source, &mut sink, &NoProgress).unwrap();
        assert_eq!(report.frames_processed, 4);
        assert_eq!(sink.frames().len(), 4);
        assert!(sink.is_finished());
        assert_eq!(driver.state(), DriverState::Done);
        assert!(driver.mask().is_some());
    }

    struct BrokenSink {
        accept: usize,
        written: usize,
        finished: bool,
    }

    impl FrameSink for BrokenSink {
        fn write_frame(&mut self, _frame: &RgbImage) -> Result<()> {
            if self.written == self.accept {
                return Err(Error::UnsupportedFormat("disk full".into()));
            }
            self.written += 1;
            Ok(())
        }
        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn paint(frame: &mut RgbImage, region: &Region, color: Rgb<u8>) {
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                frame.put_pixel(x, y, color);
            }
        }
    }

    #[test]
    fn mask_comes_from_first_frame_only() {
        let text = Region::new(470, 320, 36, 14);
        let late_text = Region::new(530, 318, 30, 12);
        let bright = Rgb([240, 240, 240]);
        let input: Vec<RgbImage> = (0..4u8)
            .map(|i| {
                let mut f = RgbImage::from_pixel(640, 360, Rgb([30 + i * 10, 60, 90]));
                paint(&mut f, &text, bright);
                if i > 0 {
                    paint(&mut f, &late_text, bright);
                }
                f
            })
            .collect();

        let expected = MaskMode::Auto.build(&input[0]).0;
        assert_ne!(MaskMode::Auto.build(&input[1]).0, expected);

        let mut source = MemorySource::new(input.clone(), 30.0);
        let mut sink = MemorySink::default();
        let mut driver = SequenceDriver::new(Reconstructor::default());
        driver.run(&mut source, &mut sink, &NoProgress).unwrap();

        let mask = driver.mask().unwrap();
        assert_eq!(*mask, expected);
        assert_eq!(mask.get_pixel(545, 324)[0], 0);

        let out = sink.frames();
        assert_eq!(out.len(), input.len());
        assert_eq!(out[0].get_pixel(10, 10), input[0].get_pixel(10, 10));
        assert_eq!(out[3].get_pixel(10, 10), input[3].get_pixel(10, 10));
        assert_eq!(out[3].get_pixel(545, 324), &bright);
    }

    #[test]
    fn failed_write_still_finishes_sink() {
        let mut driver = SequenceDriver::new(Reconstructor::default());
        let mut source = MemorySource::new(frames(3, 16, 16), 30.0);
        let mut sink = BrokenSink {
            accept: 1,
            written: 0,
            finished: false,
        };

        let err = driver.run(&mut source, &mut sink, &NoProgress).unwrap_err();
        assert!(matches!(
            err,
            Error::Frame {
                index: 1,
                stage: Stage::Write,
                ..
            }
        ));
        assert_eq!(sink.written, 1);
        assert!(sink.finished);
        assert_eq!(driver.state(), DriverState::Done);
    }

    #[test]
    fn driver_runs_only_once() {
        let mut driver = SequenceDriver::new(Reconstructor::default());
        let mut source = MemorySource::new(frames(1, 20, 20), 30.0);
        let mut sink = MemorySink::default();
        driver.run(&mut source, &mut sink, &NoProgress).unwrap();

        let mut source = MemorySource::new(frames(1, 20, 20), 30.0);
        let err = driver.run(&mut source, &mut sink, &NoProgress).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn progress_reported_every_thirty_frames_and_at_end() {
        let calls = RefCell::new(Vec::new());
        let observer = |done: u64, total: u64| calls.borrow_mut().push((done, total));

        let mut driver = SequenceDriver::new(Reconstructor::default());
        let mut source = MemorySource::new(frames(65, 8, 8), 30.0);
        let mut sink = MemorySink::default();
        driver.run(&mut source, &mut sink, &observer).unwrap();

        assert_eq!(*calls.borrow(), vec![(30, 65), (60, 65), (65, 65)]);
    }

    #[test]
    fn mismatched_frame_aborts_with_context() {
        let mut input = frames(3, 30, 30);
        input[2] = RgbImage::new(31, 30);
        let mut source = MemorySource::new(input, 30.0);
        let mut sink = MemorySink::default();
        let mut driver = SequenceDriver::new(Reconstructor::default());

        let err = driver.run(&mut source, &mut sink, &NoProgress).unwrap_err();
        match err {
            Error::Frame { index, stage, .. } => {
                assert_eq!(index, 2);
                assert_eq!(stage, Stage::Reconstruct);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink.frames().len(), 2);
        assert!(sink.is_finished());
        assert_eq!(driver.state(), DriverState::Done);
    }

    #[test]
    fn cancel_flag_stops_between_frames() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut driver =
            SequenceDriver::new(Reconstructor::default()).with_cancel_flag(Arc::clone(&flag));
        let mut source = MemorySource::new(frames(3, 16, 16), 30.0);
        let mut sink = MemorySink::default();

        let err = driver.run(&mut source, &mut sink, &NoProgress).unwrap_err();
        assert!(matches!(err, Error::Cancelled { processed: 0 }));
        assert!(sink.is_finished());
        assert_eq!(driver.state(), DriverState::Done);
    }

    #[test]
    fn manual_mode_uses_given_region() {
        let region = Region::new(2, 2, 4, 4);
        let (mask, regions) = MaskMode::Manual(region).build(&RgbImage::new(20, 20));
        assert_eq!(regions, vec![region]);
        assert!(mask::covers(&mask, &region));
        assert_eq!(mask.get_pixel(19, 19)[0], 0);
    }

    #[test]
    fn prior_only_mode_ignores_text() {
        let frame = RgbImage::from_pixel(640, 360, Rgb([255, 255, 255]));
        let (_, regions) = MaskMode::PriorOnly.build(&frame);
        assert_eq!(regions, vec![detection::prior_region(640, 360)]);
    }
}
