//! Classify one image, or every image in a directory, as real or ai.
//!
//! Run with: cargo run --example classify -- <image_or_dir> [model.json]

use std::{env, path::Path};

use image_authenticity::{
    Detector, DetectorConfig,
    error::Result,
    image_utils::list_images,
    report::{BatchReport, VerdictReport},
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: {} <image_or_dir> [model.json]", args[0]);
        println!();
        println!("Without a model (or with one built for another extractor version)");
        println!("the rule-based baseline scorer is used.");
        return Ok(());
    }

    let target = Path::new(&args[1]);
    let detector = match args.get(2) {
        Some(model_path) => Detector::open(DetectorConfig::default(), model_path)?,
        None => Detector::new(),
    };

    let status = detector.status();
    println!("Scoring mode: {:?}", status.mode);
    if let Some(model) = &status.model {
        println!(
            "  model: {} component(s), {} real / {} ai samples, explained variance {:?}",
            model.components, model.real_samples, model.ai_samples, model.explained_variance_ratio
        );
    }
    println!();

    if target.is_dir() {
        let paths = list_images(target)?;
        let verdicts = detector.classify_paths(&paths);
        let report = BatchReport::new(
            paths
                .iter()
                .map(|p| p.display().to_string())
                .zip(verdicts),
        );

        for entry in &report.entries {
            match (&entry.verdict, &entry.error) {
                (Some(v), _) => println!("{:<40} {:<4} {:>5.1}%", entry.source, v.label.as_str(), v.confidence * 100.0),
                (None, Some(e)) => println!("{:<40} failed: {e}", entry.source),
                (None, None) => {}
            }
        }

        let s = &report.summary;
        println!();
        println!(
            "{} image(s): {} real, {} ai, {} failed, mean confidence {:.1}%",
            s.total,
            s.real,
            s.ai,
            s.failed,
            s.mean_confidence * 100.0
        );
    } else {
        let image = image::open(target)?;
        let verdict = detector.classify_image(&image)?;
        let report = VerdictReport::from(&verdict);

        println!("Label:      {}", verdict.label);
        println!("Confidence: {:.1}% ({:?})", verdict.confidence * 100.0, verdict.confidence_level);
        println!();
        println!("Reasons:");
        for reason in &verdict.reasons {
            println!("  - {reason}");
        }
        for warning in &verdict.warnings {
            println!("  ! {warning}");
        }
        println!();
        println!("{}", report.to_json()?);
    }

    Ok(())
}
