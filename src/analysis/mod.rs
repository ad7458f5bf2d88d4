pub mod gradient;
pub mod layout;
pub mod spectrum;
pub mod statistics;

use image::DynamicImage;
use log::debug;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::{
    FeatureBundle,
    analysis::{
        gradient::GradientField,
        layout::{FEATURE_COUNT, FEATURE_VERSION, layout_hash},
        spectrum::high_freq_ratio,
        statistics::{moments, shannon_entropy},
    },
    error::{DetectorError, Result},
    image_utils::{calculate_histogram, gray_to_unit, luminance},
};

/// Turns a decoded image into a [`FeatureBundle`].
///
/// Pure and deterministic: the same pixels always give a bit-identical bundle.
/// Flat images are valid input and produce the minimum of every texture statistic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, image: &DynamicImage) -> Result<FeatureBundle> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DetectorError::InvalidImage(format!(
                "zero-area image ({width}x{height})"
            )));
        }

        let gray = luminance(image);
        let lum = moments(&gray_to_unit(&gray));
        let entropy = shannon_entropy(&calculate_histogram(&gray));
        let grad = GradientField::from_luminance(&gray).stats();
        let high_freq = high_freq_ratio(&gray);

        let feature_vector = vec![
            grad.variance,
            grad.mean,
            grad.entropy,
            grad.edge_density,
            grad.direction_variance,
            high_freq,
            entropy,
            lum.mean,
            lum.std_dev,
            lum.skewness,
            grad.cov_xx,
            grad.cov_xy,
            grad.cov_yy,
        ];
        debug_assert_eq!(feature_vector.len(), FEATURE_COUNT);

        if let Some(pos) = feature_vector.iter().position(|v| !v.is_finite()) {
            return Err(DetectorError::InvalidImage(format!(
                "non-finite statistic at feature index {pos}"
            )));
        }

        debug!("extracted {FEATURE_COUNT} features from {width}x{height} image");

        Ok(FeatureBundle {
            gradient_variance: grad.variance,
            entropy,
            edge_density: grad.edge_density,
            luminance_mean: lum.mean,
            luminance_std: lum.std_dev,
            layout_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            feature_vector,
        })
    }

    /// Extracts every image independently; output order matches input order.
    pub fn extract_batch(&self, images: &[DynamicImage], parallel: bool) -> Vec<Result<FeatureBundle>> {
        if parallel {
            images.par_iter().map(|image| self.extract(image)).collect()
        } else {
            images.iter().map(|image| self.extract(image)).collect()
        }
    }
}

/// Extracts features with the fixed extractor.
pub fn extract(image: &DynamicImage) -> Result<FeatureBundle> {
    FeatureExtractor::new().extract(image)
}
