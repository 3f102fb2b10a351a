//! Frame sources and sinks.
//!
//! Image directories stand in for decoded video: a source reads the
//! supported still images of a directory in file-name order, and a sink
//! writes numbered frames. In-memory variants back tests and embedding.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::debug;

use crate::error::{Error, Result, Stage};
use crate::sequence::{FrameSink, FrameSource, SequenceInfo};

/// Frame rate assumed for image sequences, which carry no timing.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::io::BufWriter::new(std::fs::File::create(path)?);
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(img)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            DynamicImage::ImageRgb8(img.clone()).save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Supported image files directly inside `dir`, sorted by file name.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Reads a directory of still images as a frame sequence.
#[derive(Debug)]
pub struct ImageDirSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    info: SequenceInfo,
}

impl ImageDirSource {
    /// Open `dir`. Dimensions come from the first image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnreadable`] if the directory holds no
    /// supported images or the first one cannot be decoded, and
    /// [`Error::Io`] if the directory cannot be listed.
    pub fn open(dir: &Path, frame_rate: f64) -> Result<Self> {
        let paths = list_frames(dir)?;
        let Some(first) = paths.first() else {
            return Err(Error::SourceUnreadable(format!(
                "no supported images in {}",
                dir.display()
            )));
        };
        let (width, height) = image::image_dimensions(first)
            .map_err(|e| Error::SourceUnreadable(format!("{}: {e}", first.display())))?;

        debug!(dir = %dir.display(), frames = paths.len(), width, height, "opened image sequence");
        let frame_count = paths.len() as u64;
        Ok(Self {
            paths,
            cursor: 0,
            info: SequenceInfo {
                width,
                height,
                frame_rate,
                frame_count,
            },
        })
    }

    /// Paths of all frames in sequence order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageDirSource {
    fn info(&self) -> SequenceInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let frame = image::open(path)?.to_rgb8();
        if frame.dimensions() != (self.info.width, self.info.height) {
            return Err(Error::InvalidInput {
                stage: Stage::Read,
                expected: (self.info.width, self.info.height),
                actual: frame.dimensions(),
            });
        }
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Writes frames as `frame_NNNNNN.<ext>` into a directory.
#[derive(Debug)]
pub struct ImageDirSink {
    dir: PathBuf,
    extension: String,
    written: u64,
}

impl ImageDirSink {
    /// Create the sink, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for an unknown extension and
    /// [`Error::Io`] if the directory cannot be created.
    pub fn create(dir: &Path, extension: &str) -> Result<Self> {
        let probe = Path::new("frame").with_extension(extension);
        if !is_supported_image(&probe) {
            return Err(Error::UnsupportedFormat(extension.to_string()));
        }
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            extension: extension.to_lowercase(),
            written: 0,
        })
    }

    /// Path the frame at `index` is written to.
    #[must_use]
    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir
            .join(format!("frame_{index:06}.{}", self.extension))
    }

    /// Frames written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageDirSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        save_image(frame, &self.frame_path(self.written))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        debug!(dir = %self.dir.display(), frames = self.written, "image sequence written");
        Ok(())
    }
}

/// Frame source over owned frames.
#[derive(Debug, Clone)]
pub struct MemorySource {
    frames: Vec<RgbImage>,
    cursor: usize,
    frame_rate: f64,
}

impl MemorySource {
    /// Wrap `frames`, played at `frame_rate`.
    #[must_use]
    pub fn new(frames: Vec<RgbImage>, frame_rate: f64) -> Self {
        Self {
            frames,
            cursor: 0,
            frame_rate,
        }
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> SequenceInfo {
        let (width, height) = self.frames.first().map_or((0, 0), RgbImage::dimensions);
        SequenceInfo {
            width,
            height,
            frame_rate: self.frame_rate,
            frame_count: self.frames.len() as u64,
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Frame sink collecting frames in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    frames: Vec<RgbImage>,
    finished: bool,
}

impl MemorySink {
    /// Frames received so far.
    #[must_use]
    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    /// Whether [`FrameSink::finish`] was called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Take ownership of the collected frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<RgbImage> {
        self.frames
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
