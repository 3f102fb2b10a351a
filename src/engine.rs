//! Top-level processing of image-sequence directories.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::enhance::{ColorEnhancer, Preset};
use crate::error::Result;
use crate::io::{self, ImageDirSink, ImageDirSource, DEFAULT_FRAME_RATE};
use crate::reconstruct::{ReconstructOptions, Reconstructor};
use crate::sequence::{MaskMode, NoProgress, ProgressObserver, SequenceDriver, SequenceReport};

/// Options controlling sequence processing behavior.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// How the watermark mask is obtained from the first frame.
    pub mask_mode: MaskMode,
    /// Frame rate reported for image sequences.
    pub frame_rate: f64,
    /// Color enhancement applied after removal, if any.
    pub preset: Option<Preset>,
    /// Output image extension; defaults to the first input frame's.
    pub output_ext: Option<String>,
    /// Enable verbose logging.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            mask_mode: MaskMode::Auto,
            frame_rate: DEFAULT_FRAME_RATE,
            preset: None,
            output_ext: None,
            verbose: false,
            quiet: false,
        }
    }
}

/// Result of processing one frame sequence.
#[derive(Debug)]
pub struct ProcessResult {
    /// Input directory of the sequence.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Frames written.
    pub frames: u64,
    /// Pixels covered by the watermark mask.
    pub masked_pixels: u64,
    /// Human-readable status message.
    pub message: String,
}

/// The removal engine.
///
/// Create once and reuse for multiple sequences; every run gets its own
/// mask and reconstruction state.
#[derive(Debug, Clone, Default)]
pub struct WatermarkEngine {
    reconstruct: ReconstructOptions,
}

impl WatermarkEngine {
    /// Engine with default reconstruction settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with custom reconstruction settings.
    #[must_use]
    pub fn with_options(reconstruct: ReconstructOptions) -> Self {
        Self { reconstruct }
    }

    fn driver(&self, opts: &ProcessOptions) -> SequenceDriver {
        let mut reconstructor = Reconstructor::new(self.reconstruct);
        if let Some(preset) = opts.preset {
            reconstructor = reconstructor.with_enhancer(Box::new(ColorEnhancer::from_preset(preset)));
        }
        SequenceDriver::new(reconstructor).with_mask_mode(opts.mask_mode)
    }

    /// Run one image sequence from `input_dir` into `output_dir`.
    ///
    /// # Errors
    ///
    /// Propagates source, sink and per-frame failures.
    pub fn run_sequence(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
        progress: &dyn ProgressObserver,
    ) -> Result<SequenceReport> {
        let mut source = ImageDirSource::open(input_dir, opts.frame_rate)?;
        let ext = match &opts.output_ext {
            Some(ext) => ext.clone(),
            None => source
                .paths()
                .first()
                .and_then(|p| p.extension())
                .map_or_else(|| "png".to_string(), |e| e.to_string_lossy().to_lowercase()),
        };
        let mut sink = ImageDirSink::create(output_dir, &ext)?;
        self.driver(opts).run(&mut source, &mut sink, progress)
    }

    /// Process a single sequence directory, reporting the outcome.
    #[must_use]
    pub fn process_sequence(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
        progress: &dyn ProgressObserver,
    ) -> ProcessResult {
        let mut result = ProcessResult {
            path: input_dir.to_path_buf(),
            success: false,
            frames: 0,
            masked_pixels: 0,
            message: String::new(),
        };

        match self.run_sequence(input_dir, output_dir, opts, progress) {
            Ok(report) => {
                info!(
                    input = %input_dir.display(),
                    output = %output_dir.display(),
                    frames = report.frames_processed,
                    "sequence cleaned"
                );
                result.success = true;
                result.frames = report.frames_processed;
                result.masked_pixels = report.masked_pixels;
                result.message = format!(
                    "Watermark removed from {} frames ({} masked pixels)",
                    report.frames_processed, report.masked_pixels
                );
            }
            Err(e) => {
                warn!(input = %input_dir.display(), error = %e, "sequence failed");
                result.message = e.to_string();
            }
        }

        result
    }

    /// Process every sequence directory under `input_root`.
    ///
    /// Each subdirectory containing supported images is one sequence and is
    /// written to the same-named subdirectory of `output_root`. Sequences run
    /// in parallel when the `cli` feature is enabled (via rayon).
    #[must_use]
    pub fn process_batch(
        &self,
        input_root: &Path,
        output_root: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        let dirs: Vec<PathBuf> = match std::fs::read_dir(input_root) {
            Ok(rd) => {
                let mut dirs: Vec<PathBuf> = rd
                    .filter_map(std::result::Result::ok)
                    .filter(|e| e.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
                    .map(|e| e.path())
                    .filter(|p| is_sequence_dir(p))
                    .collect();
                dirs.sort();
                dirs
            }
            Err(e) => {
                return vec![ProcessResult {
                    path: input_root.to_path_buf(),
                    success: false,
                    frames: 0,
                    masked_pixels: 0,
                    message: format!("Failed to read directory: {e}"),
                }];
            }
        };

        let run = |dir: &PathBuf| {
            let output = match dir.file_name() {
                Some(name) => output_root.join(name),
                None => output_root.to_path_buf(),
            };
            self.process_sequence(dir, &output, opts, &NoProgress)
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            dirs.par_iter().map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            dirs.iter().map(run).collect()
        }
    }
}

/// Whether `dir` directly contains at least one supported image.
#[must_use]
pub fn is_sequence_dir(dir: &Path) -> bool {
    io::list_frames(dir).is_ok_and(|frames| !frames.is_empty())
}

/// Generate a default output path from an input path.
///
/// Example: `"clips/intro"` becomes `"clips/intro_cleaned"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let name = input.file_name().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{name}_cleaned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_sequence(dir: &Path, frames: u32) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..frames {
            RgbImage::from_pixel(48, 32, Rgb([40, 80, 120]))
                .save(dir.join(format!("{i:03}.png")))
                .unwrap();
        }
    }

    #[test]
    fn default_output_path_appends_cleaned_suffix() {
        let p = default_output_path(Path::new("/tmp/intro"));
        assert_eq!(p, PathBuf::from("/tmp/intro_cleaned"));

        let p = default_output_path(Path::new("clip"));
        assert_eq!(p.file_name().unwrap().to_str().unwrap(), "clip_cleaned");
    }

    #[test]
    fn process_sequence_reports_frames() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        write_sequence(&input, 3);

        let engine = WatermarkEngine::new();
        let opts = ProcessOptions {
            preset: Some(Preset::Clean),
            ..ProcessOptions::default()
        };
        let result = engine.process_sequence(&input, &root.path().join("out"), &opts, &NoProgress);
        assert!(result.success, "{}", result.message);
        assert_eq!(result.frames, 3);
        assert_eq!(io::list_frames(&root.path().join("out")).unwrap().len(), 3);
    }

    #[test]
    fn process_sequence_reports_failure_for_empty_dir() {
        let root = tempfile::tempdir().unwrap();
        let engine = WatermarkEngine::new();
        let result = engine.process_sequence(
            root.path(),
            &root.path().join("out"),
            &ProcessOptions::default(),
            &NoProgress,
        );
        assert!(!result.success);
        assert!(result.message.contains("source unreadable"));
    }

    #[test]
    fn batch_processes_each_sequence_dir() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        write_sequence(&input.join("a"), 2);
        write_sequence(&input.join("b"), 4);
        std::fs::create_dir_all(input.join("empty")).unwrap();

        let output = root.path().join("out");
        let results = WatermarkEngine::new().process_batch(&input, &output, &ProcessOptions::default());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(io::list_frames(&output.join("a")).unwrap().len(), 2);
        assert_eq!(io::list_frames(&output.join("b")).unwrap().len(), 4);
    }

    #[test]
    fn batch_reports_unreadable_root() {
        let root = tempfile::tempdir().unwrap();
        let results = WatermarkEngine::new().process_batch(
            &root.path().join("missing"),
            root.path(),
            &ProcessOptions::default(),
        );
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }
}
