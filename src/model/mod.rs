pub mod active;
pub mod storage;

use serde::{Deserialize, Serialize};

use crate::{
    FeatureBundle,
    analysis::layout::{FEATURE_LAYOUT, is_layout_compatible, validate_layout},
    error::{DetectorError, Result},
    training::SkippedImage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| x - y);
        match self {
            DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            DistanceMetric::Manhattan => diffs.map(f64::abs).sum(),
        }
    }
}

/// How distances to each class are measured in the embedded space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidMethod {
    #[default]
    Centroid,
    /// Distance to the closest training embedding of each class.
    NearestNeighbor,
}

impl CentroidMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CentroidMethod::Centroid => "centroid",
            CentroidMethod::NearestNeighbor => "nearest_neighbor",
        }
    }
}

/// Linear map `((x - mean) / scale) . components^T` from feature space to the embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTransform")]
pub struct ReductionTransform {
    mean: Vec<f64>,
    scale: Vec<f64>,
    components: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawTransform {
    mean: Vec<f64>,
    scale: Vec<f64>,
    components: Vec<Vec<f64>>,
}

impl TryFrom<RawTransform> for ReductionTransform {
    type Error = DetectorError;

    fn try_from(raw: RawTransform) -> Result<Self> {
        Self::new(raw.mean, raw.scale, raw.components)
    }
}

impl ReductionTransform {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>, components: Vec<Vec<f64>>) -> Result<Self> {
        let transform = Self {
            mean,
            scale,
            components,
        };
        transform.validate()?;
        Ok(transform)
    }

    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn output_dim(&self) -> usize {
        self.components.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn components(&self) -> &[Vec<f64>] {
        &self.components
    }

    pub fn project(&self, vector: &[f64]) -> Result<Vec<f64>> {
        if vector.len() != self.input_dim() {
            return Err(DetectorError::InvalidParameter(format!(
                "cannot project a {}-feature vector through a {}-feature transform",
                vector.len(),
                self.input_dim()
            )));
        }

        let standardized = vector
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect::<Vec<_>>();

        Ok(self
            .components
            .iter()
            .map(|component| {
                standardized
                    .iter()
                    .zip(component.iter())
                    .map(|(&x, &c)| x * c)
                    .sum()
            })
            .collect())
    }

    fn validate(&self) -> Result<()> {
        let dim = self.input_dim();
        if dim == 0 {
            return Err(DetectorError::MalformedModel("transform has no input features".into()));
        }
        if self.scale.len() != dim {
            return Err(DetectorError::MalformedModel(format!(
                "scale has {} entries, mean has {dim}",
                self.scale.len()
            )));
        }
        if self.components.is_empty() {
            return Err(DetectorError::MalformedModel("transform has no components".into()));
        }
        if let Some(bad) = self.components.iter().find(|c| c.len() != dim) {
            return Err(DetectorError::MalformedModel(format!(
                "component has {} loadings, expected {dim}",
                bad.len()
            )));
        }
        if self.scale.iter().any(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(DetectorError::MalformedModel("scale must be positive and finite".into()));
        }
        let all_finite = self.mean.iter().all(|v| v.is_finite())
            && self.components.iter().flatten().all(|v| v.is_finite());
        if !all_finite {
            return Err(DetectorError::MalformedModel("transform holds non-finite values".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub real_samples: usize,
    pub ai_samples: usize,
    pub skipped: Vec<SkippedImage>,
    pub requested_components: usize,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
    pub standardized: bool,
}

/// Result of one training run. Immutable: a new run builds a new model.
///
/// Deserialization goes through [`TrainedModel::validate`], so a decoded model
/// is always structurally consistent. Layout compatibility is checked
/// separately, when a model is installed or loaded from an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTrainedModel")]
pub struct TrainedModel {
    extractor_version: u8,
    layout_hash: u32,
    feature_names: Vec<String>,
    transform: ReductionTransform,
    real_centroid: Vec<f64>,
    ai_centroid: Vec<f64>,
    real_embeddings: Vec<Vec<f64>>,
    ai_embeddings: Vec<Vec<f64>>,
    metric: DistanceMetric,
    metadata: ModelMetadata,
}

#[derive(Deserialize)]
struct RawTrainedModel {
    extractor_version: u8,
    layout_hash: u32,
    feature_names: Vec<String>,
    transform: ReductionTransform,
    real_centroid: Vec<f64>,
    ai_centroid: Vec<f64>,
    real_embeddings: Vec<Vec<f64>>,
    ai_embeddings: Vec<Vec<f64>>,
    metric: DistanceMetric,
    metadata: ModelMetadata,
}

impl TryFrom<RawTrainedModel> for TrainedModel {
    type Error = DetectorError;

    fn try_from(raw: RawTrainedModel) -> Result<Self> {
        let model = Self {
            extractor_version: raw.extractor_version,
            layout_hash: raw.layout_hash,
            feature_names: raw.feature_names,
            transform: raw.transform,
            real_centroid: raw.real_centroid,
            ai_centroid: raw.ai_centroid,
            real_embeddings: raw.real_embeddings,
            ai_embeddings: raw.ai_embeddings,
            metric: raw.metric,
            metadata: raw.metadata,
        };
        model.validate()?;
        Ok(model)
    }
}

/// Compact description of a model for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub extractor_version: u8,
    pub layout_hash: u32,
    pub components: usize,
    pub real_samples: usize,
    pub ai_samples: usize,
    pub skipped: usize,
    pub explained_variance_ratio: Vec<f64>,
    pub metric: DistanceMetric,
}

pub(crate) struct ModelParts {
    pub extractor_version: u8,
    pub layout_hash: u32,
    pub transform: ReductionTransform,
    pub real_embeddings: Vec<Vec<f64>>,
    pub ai_embeddings: Vec<Vec<f64>>,
    pub metric: DistanceMetric,
    pub metadata: ModelMetadata,
}

impl TrainedModel {
    pub(crate) fn from_parts(parts: ModelParts) -> Result<Self> {
        let dim = parts.transform.output_dim();
        let real_centroid = centroid(&parts.real_embeddings, dim)?;
        let ai_centroid = centroid(&parts.ai_embeddings, dim)?;

        let model = Self {
            extractor_version: parts.extractor_version,
            layout_hash: parts.layout_hash,
            feature_names: FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect(),
            transform: parts.transform,
            real_centroid,
            ai_centroid,
            real_embeddings: parts.real_embeddings,
            ai_embeddings: parts.ai_embeddings,
            metric: parts.metric,
            metadata: parts.metadata,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn extractor_version(&self) -> u8 {
        self.extractor_version
    }

    pub fn layout_hash(&self) -> u32 {
        self.layout_hash
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn transform(&self) -> &ReductionTransform {
        &self.transform
    }

    pub fn real_centroid(&self) -> &[f64] {
        &self.real_centroid
    }

    pub fn ai_centroid(&self) -> &[f64] {
        &self.ai_centroid
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn components(&self) -> usize {
        self.transform.output_dim()
    }

    /// True when the model was built for the running extractor layout.
    pub fn is_compatible(&self) -> bool {
        is_layout_compatible(self.extractor_version, self.layout_hash)
    }

    pub fn check_bundle(&self, bundle: &FeatureBundle) -> Result<()> {
        let fits = bundle.feature_vector.len() == self.transform.input_dim()
            && bundle.layout_version == self.extractor_version
            && bundle.layout_hash == self.layout_hash;

        if fits {
            Ok(())
        } else {
            Err(DetectorError::FeatureLayoutMismatch {
                expected_len: self.transform.input_dim(),
                expected_hash: self.layout_hash,
                actual_len: bundle.feature_vector.len(),
                actual_hash: bundle.layout_hash,
            })
        }
    }

    pub fn project(&self, vector: &[f64]) -> Result<Vec<f64>> {
        self.transform.project(vector)
    }

    /// `(distance_to_real, distance_to_ai)` for an embedded point.
    pub fn distances(&self, projection: &[f64], method: CentroidMethod) -> Result<(f64, f64)> {
        if projection.len() != self.components() {
            return Err(DetectorError::InvalidParameter(format!(
                "projection has {} coordinates, model embeds into {}",
                projection.len(),
                self.components()
            )));
        }

        Ok(match method {
            CentroidMethod::Centroid => (
                self.metric.distance(projection, &self.real_centroid),
                self.metric.distance(projection, &self.ai_centroid),
            ),
            CentroidMethod::NearestNeighbor => (
                self.nearest(projection, &self.real_embeddings, &self.real_centroid),
                self.nearest(projection, &self.ai_embeddings, &self.ai_centroid),
            ),
        })
    }

    fn nearest(&self, projection: &[f64], samples: &[Vec<f64>], fallback: &[f64]) -> f64 {
        samples
            .iter()
            .map(|s| self.metric.distance(projection, s))
            .min_by(f64::total_cmp)
            .unwrap_or_else(|| self.metric.distance(projection, fallback))
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            extractor_version: self.extractor_version,
            layout_hash: self.layout_hash,
            components: self.components(),
            real_samples: self.metadata.real_samples,
            ai_samples: self.metadata.ai_samples,
            skipped: self.metadata.skipped.len(),
            explained_variance_ratio: self.metadata.explained_variance_ratio.clone(),
            metric: self.metric,
        }
    }

    /// Structural consistency plus compatibility with the running extractor.
    pub fn check_installable(&self) -> Result<()> {
        self.validate()?;
        validate_layout(self.extractor_version, self.layout_hash)
    }

    /// Structural consistency; run on construction and after deserialization.
    pub(crate) fn validate(&self) -> Result<()> {
        self.transform.validate()?;

        let input = self.transform.input_dim();
        let output = self.transform.output_dim();

        if self.feature_names.len() != input {
            return Err(DetectorError::MalformedModel(format!(
                "{} feature names for a {input}-feature transform",
                self.feature_names.len()
            )));
        }
        if self.real_centroid.len() != output || self.ai_centroid.len() != output {
            return Err(DetectorError::MalformedModel(format!(
                "centroids do not have {output} dimensions"
            )));
        }
        let embeddings_ok = self
            .real_embeddings
            .iter()
            .chain(self.ai_embeddings.iter())
            .all(|e| e.len() == output && e.iter().all(|v| v.is_finite()));
        if !embeddings_ok {
            return Err(DetectorError::MalformedModel("malformed training embeddings".into()));
        }
        let centroids_ok = self
            .real_centroid
            .iter()
            .chain(self.ai_centroid.iter())
            .all(|v| v.is_finite());
        if !centroids_ok {
            return Err(DetectorError::MalformedModel("centroids hold non-finite values".into()));
        }
        if self.metadata.explained_variance.len() != output
            || self.metadata.explained_variance_ratio.len() != output
        {
            return Err(DetectorError::MalformedModel(
                "explained variance does not match component count".into(),
            ));
        }
        Ok(())
    }
}

fn centroid(embeddings: &[Vec<f64>], dim: usize) -> Result<Vec<f64>> {
    if embeddings.is_empty() {
        return Err(DetectorError::MalformedModel("class has no embeddings".into()));
    }

    let mut sum = vec![0.0; dim];
    for embedding in embeddings {
        for (acc, &v) in sum.iter_mut().zip(embedding.iter()) {
            *acc += v;
        }
    }

    let n = embeddings.len() as f64;
    Ok(sum.into_iter().map(|s| s / n).collect())
}
