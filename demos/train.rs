//! Fit a model from two labeled directories and save it.
//!
//! Run with: cargo run --example train -- <real_dir> <ai_dir> <model.json>

use std::env;

use image_authenticity::{Detector, error::Result, image_utils::list_images};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        println!("Usage: {} <real_dir> <ai_dir> <model.json>", args[0]);
        return Ok(());
    }

    let real = list_images(&args[1])?;
    let ai = list_images(&args[2])?;
    println!("Found {} real and {} ai image(s)", real.len(), ai.len());

    let detector = Detector::new();
    let model = detector.train_from_paths(&real, &ai)?;
    detector.save_model(&args[3])?;

    let meta = model.metadata();
    println!();
    println!("Trained on {} real / {} ai sample(s)", meta.real_samples, meta.ai_samples);
    for (i, (variance, ratio)) in meta
        .explained_variance
        .iter()
        .zip(meta.explained_variance_ratio.iter())
        .enumerate()
    {
        println!("  PC{}: variance {variance:.4}, {:.1}% of total", i + 1, ratio * 100.0);
    }
    if !meta.skipped.is_empty() {
        println!();
        println!("Skipped {} image(s):", meta.skipped.len());
        for skipped in &meta.skipped {
            let source = skipped.source.as_deref().unwrap_or("<memory>");
            println!("  [{}] {source}: {}", skipped.class, skipped.reason);
        }
    }
    println!();
    println!("Model saved to {}", args[3]);

    Ok(())
}
