//! Remove static corner text watermarks from generated video.
//!
//! Generated clips often carry a bright text mark in the bottom-right corner.
//! This crate locates it in the first frame, builds one mask for the whole
//! sequence, and reconstructs the covered pixels frame by frame: spatial
//! inpainting for the first frame, then the previous clean frame blended in
//! with a seam-only inpainting pass for temporal coherence.
//!
//! # Quick Start
//!
//! ```no_run
//! use video_watermark_removal::{MemorySink, MemorySource, NoProgress, Reconstructor, SequenceDriver};
//!
//! let frames: Vec<image::RgbImage> = Vec::new(); // decoded frames
//! let mut source = MemorySource::new(frames, 30.0);
//! let mut sink = MemorySink::default();
//! let mut driver = SequenceDriver::new(Reconstructor::default());
//! let report = driver.run(&mut source, &mut sink, &NoProgress).expect("removal failed");
//! println!("cleaned {} frames", report.frames_processed);
//! ```
//!
//! # Image Sequences
//!
//! Directories of still frames can be processed directly:
//!
//! ```no_run
//! use std::path::Path;
//! use video_watermark_removal::{NoProgress, ProcessOptions, WatermarkEngine};
//!
//! let engine = WatermarkEngine::new();
//! let opts = ProcessOptions::default();
//! let result = engine.process_sequence(Path::new("frames"), Path::new("cleaned"), &opts, &NoProgress);
//! println!("{}: {}", result.path.display(), result.message);
//! ```

#![deny(missing_docs)]

pub mod detection;
pub mod enhance;
mod engine;
pub mod error;
pub mod inpaint;
pub mod io;
pub mod mask;
pub mod reconstruct;
pub mod region;
pub mod sequence;

pub use engine::{
    default_output_path, is_sequence_dir, ProcessOptions, ProcessResult, WatermarkEngine,
};
pub use enhance::{ColorEnhancer, ColorParams, Enhancer, Preset};
pub use error::{Error, Result, Stage};
pub use io::{ImageDirSink, ImageDirSource, MemorySink, MemorySource};
pub use mask::Mask;
pub use reconstruct::{ReconstructOptions, Reconstructor, Strategy};
pub use region::Region;
pub use sequence::{
    DriverState, FrameSink, FrameSource, MaskMode, NoProgress, ProgressObserver, SequenceDriver,
    SequenceInfo, SequenceReport,
};
