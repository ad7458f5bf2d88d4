use std::{path::Path, sync::Arc};

use image::DynamicImage;
use log::{info, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{
        FeatureExtractor,
        layout::{FEATURE_LAYOUT, LayoutInfo, feature_index},
    },
    detection::{Classifier, ClassifierConfig, ConfidenceLevel, Label, ScoringMode, baseline::Statistic},
    error::{DetectorError, Result},
    image_utils::load_image,
    model::{CentroidMethod, DistanceMetric, ModelSummary, TrainedModel, active::ActiveModel, storage},
    training::{Trainer, TrainerConfig},
};

pub mod analysis;
pub mod detection;
pub mod error;
pub mod image_utils;
pub mod model;
pub mod report;
pub mod training;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub classifier: ClassifierConfig,
    pub trainer: TrainerConfig,
    /// Run batch classification on the rayon pool.
    pub parallel: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            trainer: TrainerConfig::default(),
            parallel: true,
        }
    }
}

impl DetectorConfig {
    pub fn with_method(mut self, method: CentroidMethod) -> Self {
        self.classifier.method = method;
        self
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.trainer.metric = metric;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self.trainer.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        self.trainer.validate()
    }
}

/// Extractor, classifier and trainer around one active model slot.
///
/// Every classification reads a snapshot of the active model, so training or
/// loading a model while classifications are in flight is safe. A failed
/// training run or a rejected artifact leaves the active model untouched.
pub struct Detector {
    config: DetectorConfig,
    extractor: FeatureExtractor,
    classifier: Classifier,
    trainer: Trainer,
    active: ActiveModel,
}

impl Detector {
    pub fn new() -> Self {
        Self::build(DetectorConfig::default())
    }

    pub fn with_config(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Builds a detector and reloads a previously saved model if one exists.
    pub fn open<P: AsRef<Path>>(config: DetectorConfig, model_path: P) -> Result<Self> {
        let detector = Self::with_config(config)?;
        detector.load_model_if_present(model_path)?;
        Ok(detector)
    }

    fn build(config: DetectorConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            classifier: Classifier::with_config(config.classifier.clone()),
            trainer: Trainer::with_config(config.trainer.clone()),
            active: ActiveModel::new(),
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn extract(&self, image: &DynamicImage) -> Result<FeatureBundle> {
        self.extractor.extract(image)
    }

    pub fn classify(&self, bundle: &FeatureBundle) -> Result<Verdict> {
        let model = self.active.snapshot();
        self.classifier.classify(bundle, model.as_deref())
    }

    pub fn classify_image(&self, image: &DynamicImage) -> Result<Verdict> {
        let model = self.active.snapshot();
        self.classify_with(image, model.as_deref())
    }

    /// One result per image, in input order. A failing image does not affect the others.
    pub fn classify_batch(&self, images: &[DynamicImage]) -> Vec<Result<Verdict>> {
        let model = self.active.snapshot();
        let model = model.as_deref();

        if self.config.parallel {
            images.par_iter().map(|image| self.classify_with(image, model)).collect()
        } else {
            images.iter().map(|image| self.classify_with(image, model)).collect()
        }
    }

    pub fn classify_paths<P>(&self, paths: &[P]) -> Vec<Result<Verdict>>
    where
        P: AsRef<Path> + Sync,
    {
        let model = self.active.snapshot();
        let model = model.as_deref();
        let classify = |path: &P| load_image(path).and_then(|image| self.classify_with(&image, model));

        if self.config.parallel {
            paths.par_iter().map(classify).collect()
        } else {
            paths.iter().map(classify).collect()
        }
    }

    fn classify_with(&self, image: &DynamicImage, model: Option<&TrainedModel>) -> Result<Verdict> {
        let bundle = self.extractor.extract(image)?;
        self.classifier.classify(&bundle, model)
    }

    /// Trains a new model and makes it active. On error the previous model stays.
    pub fn train(&self, real: &[DynamicImage], ai: &[DynamicImage]) -> Result<Arc<TrainedModel>> {
        let model = self.trainer.train(real, ai)?;
        self.active.install(model)
    }

    pub fn train_from_paths<P>(&self, real: &[P], ai: &[P]) -> Result<Arc<TrainedModel>>
    where
        P: AsRef<Path> + Sync,
    {
        let model = self.trainer.train_from_paths(real, ai)?;
        self.active.install(model)
    }

    /// Makes an externally built model active. A model for another extractor
    /// layout is refused with `ModelVersionMismatch` and the current model stays.
    pub fn install_model(&self, model: TrainedModel) -> Result<Arc<TrainedModel>> {
        self.active.install(model)
    }

    pub fn model(&self) -> Option<Arc<TrainedModel>> {
        self.active.snapshot()
    }

    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<Arc<TrainedModel>> {
        self.active.load_from(path)
    }

    /// Startup reload. A missing artifact or one built for another extractor
    /// layout leaves baseline scoring in effect; other failures are returned.
    pub fn load_model_if_present<P: AsRef<Path>>(&self, path: P) -> Result<Option<Arc<TrainedModel>>> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no model at {}; baseline scoring in effect", path.display());
            return Ok(None);
        }

        match self.active.load_from(path) {
            Ok(model) => Ok(Some(model)),
            Err(DetectorError::ModelVersionMismatch { .. }) => {
                warn!("keeping baseline scoring; model at {} needs retraining", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let model = self
            .active
            .snapshot()
            .ok_or_else(|| DetectorError::InvalidParameter("no trained model to save".into()))?;
        storage::save_model(&model, path)
    }

    /// Drops the active model; classification returns to baseline scoring.
    pub fn reset(&self) {
        self.active.clear();
    }

    pub fn status(&self) -> DetectorStatus {
        match self.active.snapshot() {
            Some(model) => DetectorStatus {
                mode: ScoringMode::Trained,
                layout: LayoutInfo::current(),
                model: Some(model.summary()),
            },
            None => DetectorStatus {
                mode: ScoringMode::Baseline,
                layout: LayoutInfo::current(),
                model: None,
            },
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorStatus {
    pub mode: ScoringMode,
    /// Feature layout of the running extractor.
    pub layout: LayoutInfo,
    pub model: Option<ModelSummary>,
}

/// Statistics extracted from one image.
///
/// The named fields are the baseline signals; `feature_vector` holds every
/// statistic in layout order and is what a trained model consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub gradient_variance: f64,
    pub entropy: f64,
    pub edge_density: f64,
    pub luminance_mean: f64,
    pub luminance_std: f64,
    pub layout_version: u8,
    pub layout_hash: u32,
    pub feature_vector: Vec<f64>,
}

impl FeatureBundle {
    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).and_then(|i| self.feature_vector.get(i).copied())
    }

    pub fn named_statistics(&self) -> Vec<(&'static str, f64)> {
        FEATURE_LAYOUT
            .iter()
            .copied()
            .zip(self.feature_vector.iter().copied())
            .collect()
    }
}

/// What one baseline rule added to the score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub statistic: Statistic,
    pub value: f64,
    pub threshold: f64,
    /// Positive favors "real".
    pub sub_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedEvidence {
    pub projection: Vec<f64>,
    pub distance_to_real: f64,
    pub distance_to_ai: f64,
    pub method: CentroidMethod,
    pub metric: DistanceMetric,
    /// Share of training variance the embedding keeps, summed over components.
    pub explained_variance_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    /// In `[0, 1]`; 0 means the two classes were indistinguishable.
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    /// Signed margin; zero and above is "real".
    pub score: f64,
    pub mode: ScoringMode,
    pub features: FeatureBundle,
    pub reasons: Vec<String>,
    pub contributions: Vec<Contribution>,
    pub trained: Option<TrainedEvidence>,
    pub warnings: Vec<String>,
}

impl Verdict {
    pub fn is_real(&self) -> bool {
        self.label == Label::Real
    }
}
