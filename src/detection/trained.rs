use crate::{
    FeatureBundle, TrainedEvidence,
    analysis::statistics::MIN_DENOMINATOR,
    detection::Label,
    error::Result,
    model::{CentroidMethod, TrainedModel},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainedOutcome {
    pub label: Label,
    /// Distance to the ai class minus distance to the real class.
    pub score: f64,
    pub confidence: f64,
    pub evidence: TrainedEvidence,
}

/// Nearest-class scoring in the model's embedded space.
///
/// Fails only when the bundle does not fit the model's feature layout.
pub fn score(bundle: &FeatureBundle, model: &TrainedModel, method: CentroidMethod) -> Result<TrainedOutcome> {
    model.check_bundle(bundle)?;

    let projection = model.project(&bundle.feature_vector)?;
    let (distance_to_real, distance_to_ai) = model.distances(&projection, method)?;

    let score = distance_to_ai - distance_to_real;
    let label = Label::from_score(score);
    let confidence = margin_confidence(distance_to_real, distance_to_ai);

    Ok(TrainedOutcome {
        label,
        score,
        confidence,
        evidence: TrainedEvidence {
            projection,
            distance_to_real,
            distance_to_ai,
            method,
            metric: model.metric(),
            explained_variance_ratio: model.metadata().explained_variance_ratio.iter().sum(),
        },
    })
}

/// Normalized gap between the two distances; 0 when they are equal.
pub fn margin_confidence(distance_to_real: f64, distance_to_ai: f64) -> f64 {
    let total = (distance_to_real + distance_to_ai).max(MIN_DENOMINATOR);
    let gap = (distance_to_ai - distance_to_real).abs();
    if !gap.is_finite() {
        return 0.0;
    }
    (gap / total).clamp(0.0, 1.0)
}

pub fn distance_reasons(evidence: &TrainedEvidence) -> Vec<String> {
    let toward = Label::from_score(evidence.distance_to_ai - evidence.distance_to_real);
    vec![
        format!(
            "distance to real centroid = {:.4}, to ai centroid = {:.4} ({} method) favors {toward}",
            evidence.distance_to_real,
            evidence.distance_to_ai,
            evidence.method.name(),
        ),
        format!(
            "embedding explains {:.1}% of training variance",
            evidence.explained_variance_ratio * 100.0
        ),
    ]
}
