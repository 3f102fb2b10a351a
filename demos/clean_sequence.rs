//! Remove the watermark from one directory of frames.
//!
//! Usage:
//! ```sh
//! cargo run --example clean_sequence -- frames/ cleaned/
//! ```

use std::env;
use std::process;

use video_watermark_removal::{NoProgress, ProcessOptions, WatermarkEngine};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input_dir> <output_dir>", args[0]);
        process::exit(1);
    }

    let input = &args[1];
    let output = &args[2];

    let engine = WatermarkEngine::new();
    let opts = ProcessOptions::default();
    let result = engine.process_sequence(input.as_ref(), output.as_ref(), &opts, &NoProgress);

    if result.success {
        println!("Done: {}", result.message);
    } else {
        eprintln!("Error: {}", result.message);
        process::exit(1);
    }
}
