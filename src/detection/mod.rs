pub mod baseline;
pub mod trained;

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    FeatureBundle, Verdict,
    analysis::layout::{FEATURE_VERSION, layout_hash},
    detection::baseline::{BaselineConfig, BaselineScorer},
    error::Result,
    model::{CentroidMethod, TrainedModel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Real,
    Ai,
}

impl Label {
    /// Zero and above is "real", so an exact tie never reports "ai".
    pub fn from_score(score: f64) -> Self {
        if score >= 0.0 || score.is_nan() {
            Label::Real
        } else {
            Label::Ai
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Real => "real",
            Label::Ai => "ai",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 0.2 => ConfidenceLevel::None,
            s if s < 0.4 => ConfidenceLevel::Low,
            s if s < 0.6 => ConfidenceLevel::Medium,
            s if s < 0.8 => ConfidenceLevel::High,
            _ => ConfidenceLevel::VeryHigh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Baseline,
    Trained,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub baseline: BaselineConfig,
    pub method: CentroidMethod,
}

impl ClassifierConfig {
    pub fn with_method(mut self, method: CentroidMethod) -> Self {
        self.method = method;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.baseline.validate()
    }
}

/// Baseline scoring when no model is given, trained scoring otherwise.
///
/// A model built for a different extractor layout is never used: the verdict
/// falls back to baseline and carries a warning. A bundle that does not fit a
/// compatible model is a configuration error, not a verdict.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(&self, bundle: &FeatureBundle, model: Option<&TrainedModel>) -> Result<Verdict> {
        match model {
            None => Ok(self.baseline_verdict(bundle, Vec::new())),
            Some(model) if !model.is_compatible() => {
                let message = format!(
                    "model built for extractor v{} ({:08x}) does not match running v{} ({:08x}); served baseline verdict",
                    model.extractor_version(),
                    model.layout_hash(),
                    FEATURE_VERSION,
                    layout_hash(),
                );
                warn!("{message}");
                Ok(self.baseline_verdict(bundle, vec![message]))
            }
            Some(model) => self.trained_verdict(bundle, model),
        }
    }

    fn baseline_verdict(&self, bundle: &FeatureBundle, warnings: Vec<String>) -> Verdict {
        let outcome = BaselineScorer::new(&self.config.baseline).score(bundle);

        Verdict {
            label: outcome.label,
            confidence: outcome.confidence,
            confidence_level: ConfidenceLevel::from_score(outcome.confidence),
            score: outcome.score,
            mode: ScoringMode::Baseline,
            features: bundle.clone(),
            reasons: outcome.reasons,
            contributions: outcome.contributions,
            trained: None,
            warnings,
        }
    }

    fn trained_verdict(&self, bundle: &FeatureBundle, model: &TrainedModel) -> Result<Verdict> {
        let outcome = trained::score(bundle, model, self.config.method)?;
        let supporting = BaselineScorer::new(&self.config.baseline).score(bundle);

        let mut reasons = trained::distance_reasons(&outcome.evidence);
        reasons.extend(
            supporting
                .reasons
                .into_iter()
                .map(|reason| format!("supporting: {reason}")),
        );

        Ok(Verdict {
            label: outcome.label,
            confidence: outcome.confidence,
            confidence_level: ConfidenceLevel::from_score(outcome.confidence),
            score: outcome.score,
            mode: ScoringMode::Trained,
            features: bundle.clone(),
            reasons,
            contributions: supporting.contributions,
            trained: Some(outcome.evidence),
            warnings: Vec::new(),
        })
    }
}

/// Classifies with the default weight table and centroid method.
pub fn classify(bundle: &FeatureBundle, model: Option<&TrainedModel>) -> Result<Verdict> {
    Classifier::new().classify(bundle, model)
}
