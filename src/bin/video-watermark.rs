use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use video_watermark_removal::{
    default_output_path, is_sequence_dir, MaskMode, Preset, ProcessOptions, ProcessResult,
    ProgressObserver, Region, WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "video-watermark",
    about = "Remove static corner text watermarks from video frame sequences",
    version,
    after_help = "Input is a directory of decoded frames (png, jpg, webp, bmp), processed in \
                  file-name order.\nWith --batch, every subdirectory of <input> is a separate \
                  sequence.\n\n\
                  NOTE: Decode the video to frames beforehand and re-encode the output frames \
                  afterwards; this tool does not read or write video containers."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input frame directory (or directory of frame directories with --batch)
    input: String,

    /// Output directory (default: {input}_cleaned)
    #[arg(short, long)]
    output: Option<String>,

    /// Treat each subdirectory of <input> as its own sequence
    #[arg(short, long)]
    batch: bool,

    /// Watermark rectangle as x,y,w,h instead of auto-detection
    #[arg(long, conflicts_with = "prior_only")]
    region: Option<Region>,

    /// Use only the fixed bottom-right region, skip text detection
    #[arg(long)]
    prior_only: bool,

    /// Color enhancement preset: cinematic, vivid, clean, hdr
    #[arg(long)]
    preset: Option<Preset>,

    /// Frame rate of the sequence
    #[arg(long, default_value = "30.0")]
    fps: f64,

    /// Output image extension (default: same as input frames)
    #[arg(long)]
    ext: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

/// Progress bar fed by the sequence driver.
struct BarProgress(ProgressBar);

impl BarProgress {
    fn new(quiet: bool) -> Self {
        if quiet {
            return Self(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {percent:>3}% {pos}/{len} frames [{elapsed_precise}<{eta_precise}]",
        ) {
            bar.set_style(style);
        }
        Self(bar)
    }
}

impl ProgressObserver for BarProgress {
    fn on_progress(&self, processed: u64, total: u64) {
        self.0.set_length(total);
        self.0.set_position(processed);
    }
}

fn init_logging(opts: &ProcessOptions) {
    let default_level = if opts.quiet {
        "warn"
    } else if opts.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    if cli.fps <= 0.0 || !cli.fps.is_finite() {
        eprintln!("Error: Frame rate must be a positive number");
        process::exit(1);
    }

    let mask_mode = match (cli.region, cli.prior_only) {
        (Some(region), _) => MaskMode::Manual(region),
        (None, true) => MaskMode::PriorOnly,
        (None, false) => MaskMode::Auto,
    };

    let opts = ProcessOptions {
        mask_mode,
        frame_rate: cli.fps,
        preset: cli.preset,
        output_ext: cli.ext.clone(),
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    init_logging(&opts);

    let input_path = Path::new(&cli.input);
    if !input_path.is_dir() {
        eprintln!("Error: Input directory does not exist: {}", cli.input);
        process::exit(1);
    }

    let output_path = match &cli.output {
        Some(o) => PathBuf::from(o),
        None => default_output_path(input_path),
    };

    if !opts.quiet {
        match opts.mask_mode {
            MaskMode::Auto => eprintln!("Mask: auto-detect (text outlines + bottom-right prior)"),
            MaskMode::PriorOnly => eprintln!("Mask: bottom-right prior only"),
            MaskMode::Manual(r) => {
                eprintln!("Mask: manual region {}x{} at ({}, {})", r.width, r.height, r.x, r.y);
            }
        }
        if let Some(preset) = opts.preset {
            eprintln!("Enhancement preset: {preset}");
        }
        eprintln!();
    }

    let engine = WatermarkEngine::new();

    let results = if cli.batch {
        engine.process_batch(input_path, &output_path, &opts)
    } else {
        if !is_sequence_dir(input_path) {
            eprintln!("Error: No supported frames found in {}", cli.input);
            eprintln!("Hint: use --batch for a directory of frame directories");
            process::exit(1);
        }
        let progress = BarProgress::new(opts.quiet);
        let result = engine.process_sequence(input_path, &output_path, &opts, &progress);
        progress.0.finish_and_clear();
        vec![result]
    };

    let mut success_count = 0u32;
    let mut fail_count = 0u32;
    let mut frame_count = 0u64;

    for r in &results {
        print_result(r, &opts);
        if r.success {
            success_count += 1;
            frame_count += r.frames;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count} ({frame_count} frames)");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 || results.is_empty() {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, opts: &ProcessOptions) {
    if opts.quiet && result.success {
        return;
    }

    let name = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.success {
        if !opts.quiet {
            eprintln!("[OK] {name} ({} frames)", result.frames);
        }
    } else {
        eprintln!("[FAIL] {name}: {}", result.message);
    }

    if opts.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
