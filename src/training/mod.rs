pub mod pca;

use std::path::Path;

use image::DynamicImage;
use log::{info, warn};
use ndarray::Array2;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    FeatureBundle,
    analysis::{
        FeatureExtractor,
        layout::{FEATURE_COUNT, FEATURE_VERSION, is_layout_compatible, layout_hash},
    },
    detection::Label,
    error::{DetectorError, Result},
    image_utils::load_image,
    model::{DistanceMetric, ModelMetadata, ModelParts, ReductionTransform, TrainedModel},
    training::pca::{Standardizer, component_count, fit_pca},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub n_components: usize,
    pub standardize: bool,
    pub metric: DistanceMetric,
    pub parallel: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            standardize: true,
            metric: DistanceMetric::Euclidean,
            parallel: true,
        }
    }
}

impl TrainerConfig {
    pub fn with_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(DetectorError::InvalidParameter(
                "n_components must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// A training image left out of the fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub class: Label,
    pub index: usize,
    pub source: Option<String>,
    pub reason: String,
}

/// Fits the reduction transform and class centroids from two labeled sets.
///
/// One pass, closed form: standardize, project onto the leading principal
/// axes, average each class. Images that fail extraction are recorded in the
/// model metadata and left out, as long as both classes keep a sample.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
    extractor: FeatureExtractor,
}

impl Trainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TrainerConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn train(&self, real: &[DynamicImage], ai: &[DynamicImage]) -> Result<TrainedModel> {
        self.config.validate()?;
        ensure_samples(real.len(), ai.len())?;

        let (real_bundles, mut skipped) = self.extract_class(Label::Real, real, |image| self.extractor.extract(image), |_| None);
        let (ai_bundles, ai_skipped) = self.extract_class(Label::Ai, ai, |image| self.extractor.extract(image), |_| None);
        skipped.extend(ai_skipped);

        self.fit(real_bundles, ai_bundles, skipped)
    }

    /// Like [`Trainer::train`], decoding each file first. Unreadable files are skipped.
    pub fn train_from_paths<P>(&self, real: &[P], ai: &[P]) -> Result<TrainedModel>
    where
        P: AsRef<Path> + Sync,
    {
        self.config.validate()?;
        ensure_samples(real.len(), ai.len())?;

        let extract = |path: &P| load_image(path).and_then(|image| self.extractor.extract(&image));
        let source = |path: &P| Some(path.as_ref().display().to_string());

        let (real_bundles, mut skipped) = self.extract_class(Label::Real, real, extract, source);
        let (ai_bundles, ai_skipped) = self.extract_class(Label::Ai, ai, extract, source);
        skipped.extend(ai_skipped);

        self.fit(real_bundles, ai_bundles, skipped)
    }

    /// Fits directly from bundles extracted elsewhere.
    pub fn fit_bundles(&self, real: &[FeatureBundle], ai: &[FeatureBundle]) -> Result<TrainedModel> {
        self.config.validate()?;
        ensure_samples(real.len(), ai.len())?;
        self.fit(real.to_vec(), ai.to_vec(), Vec::new())
    }

    fn extract_class<T, E, S>(
        &self,
        class: Label,
        inputs: &[T],
        extract: E,
        source: S,
    ) -> (Vec<FeatureBundle>, Vec<SkippedImage>)
    where
        T: Sync,
        E: Fn(&T) -> Result<FeatureBundle> + Sync,
        S: Fn(&T) -> Option<String>,
    {
        let results: Vec<Result<FeatureBundle>> = if self.config.parallel {
            inputs.par_iter().map(&extract).collect()
        } else {
            inputs.iter().map(&extract).collect()
        };

        let mut bundles = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();

        for (index, (result, input)) in results.into_iter().zip(inputs.iter()).enumerate() {
            match result {
                Ok(bundle) => bundles.push(bundle),
                Err(e) => {
                    let source = source(input);
                    warn!(
                        "skipping {class} training image #{index}{}: {e}",
                        source.as_deref().map(|s| format!(" ({s})")).unwrap_or_default()
                    );
                    skipped.push(SkippedImage {
                        class,
                        index,
                        source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        (bundles, skipped)
    }

    fn fit(
        &self,
        real: Vec<FeatureBundle>,
        ai: Vec<FeatureBundle>,
        skipped: Vec<SkippedImage>,
    ) -> Result<TrainedModel> {
        ensure_samples(real.len(), ai.len())?;

        if let Some(bad) = real.iter().chain(ai.iter()).find(|b| !fits_layout(b)) {
            return Err(DetectorError::FeatureLayoutMismatch {
                expected_len: FEATURE_COUNT,
                expected_hash: layout_hash(),
                actual_len: bad.feature_vector.len(),
                actual_hash: bad.layout_hash,
            });
        }

        let samples = real.len() + ai.len();
        let flat = real
            .iter()
            .chain(ai.iter())
            .flat_map(|b| b.feature_vector.iter().copied())
            .collect::<Vec<_>>();
        let data = Array2::from_shape_vec((samples, FEATURE_COUNT), flat)
            .map_err(|e| DetectorError::InvalidParameter(format!("training matrix: {e}")))?;

        let standardizer = Standardizer::fit(&data, self.config.standardize);
        let scaled = standardizer.apply(&data);

        let k = component_count(self.config.n_components, FEATURE_COUNT, samples);
        let pca = fit_pca(&scaled, k);

        let transform = ReductionTransform::new(standardizer.mean, standardizer.scale, pca.components)?;
        let real_embeddings = project_all(&transform, &real)?;
        let ai_embeddings = project_all(&transform, &ai)?;

        info!(
            "trained on {} real / {} ai samples ({} skipped), {k} component(s), explained variance ratio {:?}",
            real.len(),
            ai.len(),
            skipped.len(),
            pca.explained_variance_ratio
        );

        TrainedModel::from_parts(ModelParts {
            extractor_version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            transform,
            real_embeddings,
            ai_embeddings,
            metric: self.config.metric,
            metadata: ModelMetadata {
                real_samples: real.len(),
                ai_samples: ai.len(),
                skipped,
                requested_components: self.config.n_components,
                explained_variance: pca.explained_variance,
                explained_variance_ratio: pca.explained_variance_ratio,
                standardized: self.config.standardize,
            },
        })
    }
}

/// Trains with the default configuration.
pub fn train(real: &[DynamicImage], ai: &[DynamicImage]) -> Result<TrainedModel> {
    Trainer::new().train(real, ai)
}

fn ensure_samples(real: usize, ai: usize) -> Result<()> {
    if real == 0 || ai == 0 {
        return Err(DetectorError::InsufficientTrainingData { real, ai });
    }
    Ok(())
}

fn fits_layout(bundle: &FeatureBundle) -> bool {
    bundle.feature_vector.len() == FEATURE_COUNT
        && is_layout_compatible(bundle.layout_version, bundle.layout_hash)
}

fn project_all(transform: &ReductionTransform, bundles: &[FeatureBundle]) -> Result<Vec<Vec<f64>>> {
    bundles
        .iter()
        .map(|b| transform.project(&b.feature_vector))
        .collect()
}
