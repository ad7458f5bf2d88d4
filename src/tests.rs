use std::sync::Arc;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Detector, DetectorConfig,
    analysis::{
        extract,
        layout::{FEATURE_VERSION, LayoutInfo},
    },
    detection::{Label, ScoringMode, classify},
    error::DetectorError,
    image_utils::from_raw_pixels,
    model::{CentroidMethod, TrainedModel, storage},
    training::train,
};

fn flat(value: u8, size: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(size, size, Luma([value])))
}

fn noise(seed: u64, size: u32) -> DynamicImage {
    let mut rng = StdRng::seed_from_u64(seed);
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |_, _| {
        Rgb([rng.r#gen::<u8>(), rng.r#gen::<u8>(), rng.r#gen::<u8>()])
    }))
}

fn smooth(offset: u32, size: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |x, y| {
        Luma([((x + y + offset) / 2 % 256) as u8])
    }))
}

#[test]
fn test_extraction_is_deterministic() {
    let image = noise(11, 48);
    let a = extract(&image).unwrap();
    let b = extract(&image).unwrap();
    assert_eq!(a, b);

    let va = classify(&a, None).unwrap();
    let vb = classify(&b, None).unwrap();
    assert_eq!(va, vb);
}

#[test]
fn test_flat_image_leans_ai() {
    let verdict = Detector::new().classify_image(&flat(128, 64)).unwrap();

    assert_eq!(verdict.mode, ScoringMode::Baseline);
    assert_eq!(verdict.label, Label::Ai);
    assert_eq!(verdict.features.gradient_variance, 0.0);
    assert_eq!(verdict.features.edge_density, 0.0);
    assert_eq!(verdict.features.entropy, 0.0);
    assert!(verdict.confidence > 0.0 && verdict.confidence <= 1.0);
    assert!(verdict.trained.is_none());
}

#[test]
fn test_noise_leans_real() {
    let verdict = Detector::new().classify_image(&noise(3, 64)).unwrap();
    assert_eq!(verdict.label, Label::Real);
    assert!(!verdict.reasons.is_empty());
}

#[test]
fn test_tiny_images_are_handled() {
    let detector = Detector::new();
    for image in [flat(0, 1), flat(255, 1), noise(1, 1), noise(2, 2)] {
        let verdict = detector.classify_image(&image).unwrap();
        assert!((0.0..=1.0).contains(&verdict.confidence));
        assert!(verdict.features.feature_vector.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_raw_pixels_match_decoded_image() {
    let image = noise(4, 20);
    let pixels = image.to_rgb8().into_raw();
    let rebuilt = from_raw_pixels(20, 20, 3, pixels).unwrap();
    assert_eq!(extract(&image).unwrap(), extract(&rebuilt).unwrap());
}

#[test]
fn test_identical_classes_give_minimal_confidence() {
    let model = train(&[smooth(0, 32)], &[smooth(0, 32)]).unwrap();
    assert_eq!(model.real_centroid(), model.ai_centroid());

    for image in [smooth(0, 32), noise(5, 32), flat(10, 32)] {
        let bundle = extract(&image).unwrap();
        let verdict = classify(&bundle, Some(&model)).unwrap();
        assert_eq!(verdict.mode, ScoringMode::Trained);
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.label, Label::Real);
    }
}

#[test]
fn test_trained_mode_separates_classes() {
    let real = (0..4).map(|i| noise(100 + i, 32)).collect::<Vec<_>>();
    let ai = (0..4).map(|i| smooth(i as u32 * 9, 32)).collect::<Vec<_>>();

    let detector = Detector::new();
    detector.train(&real, &ai).unwrap();
    assert_eq!(detector.status().mode, ScoringMode::Trained);

    let verdict = detector.classify_image(&noise(999, 32)).unwrap();
    assert_eq!(verdict.label, Label::Real);
    assert!(verdict.trained.is_some());
    assert!(verdict.reasons.iter().any(|r| r.starts_with("supporting: ")));

    let verdict = detector.classify_image(&smooth(5, 32)).unwrap();
    assert_eq!(verdict.label, Label::Ai);
}

#[test]
fn test_nearest_neighbor_method() {
    let config = DetectorConfig::default().with_method(CentroidMethod::NearestNeighbor);
    let detector = Detector::with_config(config).unwrap();
    detector
        .train(&[noise(1, 32), noise(2, 32)], &[flat(30, 32), smooth(3, 32)])
        .unwrap();

    let verdict = detector.classify_image(&noise(1, 32)).unwrap();
    let evidence = verdict.trained.unwrap();
    assert_eq!(evidence.method, CentroidMethod::NearestNeighbor);
    assert!(evidence.distance_to_real.abs() < 1e-9);
    assert_eq!(verdict.label, Label::Real);
}

#[test]
fn test_failed_training_keeps_previous_model() {
    let detector = Detector::new();
    let first = detector.train(&[noise(7, 32)], &[flat(90, 32)]).unwrap();

    let err = detector.train(&[noise(8, 32)], &[]).unwrap_err();
    assert!(matches!(err, DetectorError::InsufficientTrainingData { real: 1, ai: 0 }));

    let current = detector.model().unwrap();
    assert!(Arc::ptr_eq(&first, &current));
}

#[test]
fn test_model_round_trip_reproduces_verdicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let detector = Detector::new();
    detector
        .train(&[noise(21, 32), noise(22, 32), noise(23, 32)], &[flat(40, 32), smooth(2, 32)])
        .unwrap();
    detector.save_model(&path).unwrap();

    let queries = [noise(24, 32), smooth(11, 32), flat(200, 32)];
    let before = detector.classify_batch(&queries);

    let reloaded = Detector::open(DetectorConfig::default(), &path).unwrap();
    assert_eq!(*reloaded.model().unwrap(), *detector.model().unwrap());

    let after = reloaded.classify_batch(&queries);
    for (a, b) in before.into_iter().zip(after) {
        assert_eq!(a.unwrap(), b.unwrap());
    }
}

#[test]
fn test_mismatched_artifact_falls_back_to_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let model = train(&[noise(31, 32)], &[flat(31, 32)]).unwrap();
    let mut value: serde_json::Value = serde_json::from_slice(&storage::to_bytes(&model).unwrap()).unwrap();
    value["extractor_version"] = serde_json::json!(0);
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let detector = Detector::new();
    assert!(matches!(
        detector.load_model(&path),
        Err(DetectorError::ModelVersionMismatch { .. })
    ));
    assert!(detector.load_model_if_present(&path).unwrap().is_none());

    let verdict = detector.classify_image(&noise(32, 32)).unwrap();
    assert_eq!(verdict.mode, ScoringMode::Baseline);
    assert_eq!(detector.status().mode, ScoringMode::Baseline);
}

#[test]
fn test_stale_model_cannot_be_installed() {
    let detector = Detector::new();
    let current = train(&[noise(35, 32)], &[flat(35, 32)]).unwrap();
    detector.install_model(current).unwrap();
    let before = detector.model().unwrap();

    let mut value = serde_json::to_value(&*before).unwrap();
    value["extractor_version"] = serde_json::json!(FEATURE_VERSION + 1);
    let stale: TrainedModel = serde_json::from_value(value).unwrap();

    assert!(matches!(
        detector.install_model(stale),
        Err(DetectorError::ModelVersionMismatch { .. })
    ));
    assert!(Arc::ptr_eq(&before, &detector.model().unwrap()));

    let status = detector.status();
    assert_eq!(status.mode, ScoringMode::Trained);
    assert_eq!(status.layout, LayoutInfo::current());
    assert_eq!(status.model.unwrap().extractor_version, status.layout.version);
}

#[test]
fn test_missing_artifact_is_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let detector = Detector::open(DetectorConfig::default(), dir.path().join("absent.json")).unwrap();
    assert!(detector.status().model.is_none());
    assert!(matches!(
        detector.save_model(dir.path().join("out.json")),
        Err(DetectorError::InvalidParameter(_))
    ));
}

#[test]
fn test_foreign_bundle_is_a_configuration_error() {
    let model = train(&[noise(41, 32)], &[flat(41, 32)]).unwrap();
    let mut bundle = extract(&noise(42, 32)).unwrap();
    bundle.feature_vector.pop();

    let err = classify(&bundle, Some(&model)).unwrap_err();
    assert!(matches!(err, DetectorError::FeatureLayoutMismatch { .. }));
}

#[test]
fn test_batch_preserves_order_and_isolates_failures() {
    let images = vec![
        noise(51, 32),
        DynamicImage::new_luma8(0, 0),
        flat(77, 32),
        noise(52, 16),
    ];

    let detector = Detector::new();
    let results = detector.classify_batch(&images);
    assert_eq!(results.len(), images.len());
    assert!(matches!(results[1], Err(DetectorError::InvalidImage(_))));

    for (image, result) in images.iter().zip(&results) {
        if let Ok(verdict) = result {
            assert_eq!(*verdict, detector.classify_image(image).unwrap());
        }
    }

    let sequential = Detector::with_config(DetectorConfig::default().with_parallel(false)).unwrap();
    let again = sequential.classify_batch(&images);
    for (a, b) in results.iter().zip(&again) {
        assert_eq!(a.as_ref().ok(), b.as_ref().ok());
    }
}

#[test]
fn test_classify_paths() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.png");
    let missing = dir.path().join("missing.png");
    noise(61, 24).save(&good).unwrap();

    let results = Detector::new().classify_paths(&[good, missing]);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(DetectorError::ImageLoad(_)) | Err(DetectorError::Io(_))));
}

#[test]
fn test_reset_returns_to_baseline() {
    let detector = Detector::new();
    detector.train(&[noise(71, 32)], &[flat(71, 32)]).unwrap();
    assert_eq!(detector.status().model.unwrap().real_samples, 1);

    detector.reset();
    let verdict = detector.classify_image(&noise(72, 32)).unwrap();
    assert_eq!(verdict.mode, ScoringMode::Baseline);
}

#[test]
fn test_concurrent_classification_during_training() {
    let detector = Arc::new(Detector::new());
    let query = Arc::new(noise(81, 32));

    let readers = (0..4)
        .map(|_| {
            let detector = Arc::clone(&detector);
            let query = Arc::clone(&query);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let verdict = detector.classify_image(&query).unwrap();
                    match verdict.mode {
                        ScoringMode::Baseline => assert!(verdict.trained.is_none()),
                        ScoringMode::Trained => assert!(verdict.trained.is_some()),
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    detector.train(&[noise(82, 32), noise(83, 32)], &[flat(5, 32), smooth(1, 32)]).unwrap();

    for reader in readers {
        reader.join().unwrap();
    }
}
