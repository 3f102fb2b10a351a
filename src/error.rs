//! Error types for the video-watermark-removal crate.

use std::fmt;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading a frame from the source.
    Read,
    /// Building the sequence mask from frame 0.
    Mask,
    /// Reconstructing masked pixels.
    Reconstruct,
    /// Post-reconstruction enhancement.
    Enhance,
    /// Writing a frame to the sink.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::Mask => "mask",
            Stage::Reconstruct => "reconstruct",
            Stage::Enhance => "enhance",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while removing a watermark from a frame sequence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two grids that must share dimensions do not.
    #[error(
        "invalid input at {stage} stage: expected {}x{}, got {}x{}",
        expected.0, expected.1, actual.0, actual.1
    )]
    InvalidInput {
        /// Stage that rejected the input.
        stage: Stage,
        /// Expected `(width, height)`.
        expected: (u32, u32),
        /// Actual `(width, height)`.
        actual: (u32, u32),
    },

    /// The first frame could not be obtained, so no mask can be built.
    #[error("source unreadable: {0}")]
    SourceUnreadable(String),

    /// A per-frame failure, annotated with where it happened.
    #[error("frame {index} failed at {stage} stage: {source}")]
    Frame {
        /// Zero-based frame index.
        index: u64,
        /// Stage that failed.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// The run was stopped through its cancellation flag.
    #[error("cancelled after {processed} frames")]
    Cancelled {
        /// Frames written before cancellation was observed.
        processed: u64,
    },

    /// An operation was attempted in the wrong driver state.
    #[error("invalid driver state: {0}")]
    InvalidState(&'static str),

    /// An enhancement preset name was not recognized.
    #[error("unknown preset: {0} (expected cinematic, vivid, clean or hdr)")]
    UnknownPreset(String),

    /// A manual region specification could not be parsed or is empty.
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Wrap this error with the frame index and stage it occurred at.
    #[must_use]
    pub fn at_frame(self, index: u64, stage: Stage) -> Self {
        Error::Frame {
            index,
            stage,
            source: Box::new(self),
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
