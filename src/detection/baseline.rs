use serde::{Deserialize, Serialize};
use statrs::function::logistic::logistic;

use crate::{
    Contribution, FeatureBundle,
    analysis::{layout::feature_index, statistics::MIN_DENOMINATOR},
    detection::Label,
    error::{DetectorError, Result},
};

/// Named statistics the baseline scorer can weigh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    GradientVariance,
    GradientMean,
    GradientEntropy,
    EdgeDensity,
    DirectionVariance,
    HighFreqRatio,
    Entropy,
    LuminanceMean,
    LuminanceStd,
    LuminanceSkew,
}

impl Statistic {
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::GradientVariance => "gradient_variance",
            Statistic::GradientMean => "gradient_mean",
            Statistic::GradientEntropy => "gradient_entropy",
            Statistic::EdgeDensity => "edge_density",
            Statistic::DirectionVariance => "direction_variance",
            Statistic::HighFreqRatio => "high_freq_ratio",
            Statistic::Entropy => "entropy",
            Statistic::LuminanceMean => "luminance_mean",
            Statistic::LuminanceStd => "luminance_std",
            Statistic::LuminanceSkew => "luminance_skew",
        }
    }

    /// Reads the statistic from a bundle. Returns NaN when a vector-only
    /// statistic is missing from a malformed bundle.
    pub fn read(&self, bundle: &FeatureBundle) -> f64 {
        match self {
            Statistic::GradientVariance => bundle.gradient_variance,
            Statistic::Entropy => bundle.entropy,
            Statistic::EdgeDensity => bundle.edge_density,
            Statistic::LuminanceMean => bundle.luminance_mean,
            Statistic::LuminanceStd => bundle.luminance_std,
            other => feature_index(other.name())
                .and_then(|i| bundle.feature_vector.get(i).copied())
                .unwrap_or(f64::NAN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Values above the threshold push toward "real".
    HigherIsReal,
    /// Values below the threshold push toward "real".
    LowerIsReal,
}

impl Direction {
    fn sign(&self) -> f64 {
        match self {
            Direction::HigherIsReal => 1.0,
            Direction::LowerIsReal => -1.0,
        }
    }
}

/// One row of the baseline weight table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub statistic: Statistic,
    pub threshold: f64,
    /// Distance from the threshold at which the sub-score reaches ~76% of its weight.
    pub spread: f64,
    pub weight: f64,
    pub direction: Direction,
}

impl ThresholdRule {
    pub fn new(statistic: Statistic, threshold: f64, spread: f64, weight: f64, direction: Direction) -> Self {
        Self {
            statistic,
            threshold,
            spread,
            weight,
            direction,
        }
    }

    /// Signed, weighted sub-score in `[-weight, weight]`; positive favors "real".
    pub fn contribution(&self, bundle: &FeatureBundle) -> Contribution {
        let value = self.statistic.read(bundle);
        let sub_score = if value.is_finite() {
            let z = (value - self.threshold) / self.spread.max(MIN_DENOMINATOR);
            self.direction.sign() * self.weight * z.tanh()
        } else {
            0.0
        };

        Contribution {
            statistic: self.statistic,
            value,
            threshold: self.threshold,
            sub_score,
        }
    }

    fn validate(&self) -> Result<()> {
        let name = self.statistic.name();
        if !self.threshold.is_finite() {
            return Err(DetectorError::InvalidParameter(format!(
                "{name}: threshold must be finite"
            )));
        }
        if !(self.spread.is_finite() && self.spread > 0.0) {
            return Err(DetectorError::InvalidParameter(format!(
                "{name}: spread must be positive"
            )));
        }
        if !(self.weight.is_finite() && self.weight >= 0.0) {
            return Err(DetectorError::InvalidParameter(format!(
                "{name}: weight must be non-negative"
            )));
        }
        Ok(())
    }
}

/// The calibrated default weight table. Smooth, denoised output sits below
/// every threshold; sensor noise and optical texture sit above.
pub fn default_rules() -> Vec<ThresholdRule> {
    use Direction::HigherIsReal;

    vec![
        ThresholdRule::new(Statistic::GradientVariance, 0.01, 0.01, 0.15, HigherIsReal),
        ThresholdRule::new(Statistic::GradientEntropy, 4.5, 1.0, 0.15, HigherIsReal),
        ThresholdRule::new(Statistic::HighFreqRatio, 0.05, 0.05, 0.15, HigherIsReal),
        ThresholdRule::new(Statistic::DirectionVariance, 0.3, 0.2, 0.15, HigherIsReal),
        ThresholdRule::new(Statistic::EdgeDensity, 0.2, 0.1, 0.10, HigherIsReal),
        ThresholdRule::new(Statistic::Entropy, 6.0, 1.0, 0.10, HigherIsReal),
        ThresholdRule::new(Statistic::LuminanceStd, 0.15, 0.05, 0.10, HigherIsReal),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub rules: Vec<ThresholdRule>,
    /// Sub-scores smaller than this in magnitude produce no reason.
    pub min_relevance: f64,
    /// Slope of the logistic squashing of `|score|`.
    pub steepness: f64,
    /// Ceiling on confidence unless at least two statistics back the label.
    pub corroboration_cap: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            min_relevance: 0.02,
            steepness: 4.0,
            corroboration_cap: 0.75,
        }
    }
}

impl BaselineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(DetectorError::InvalidParameter(
                "baseline weight table is empty".into(),
            ));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        if !(self.min_relevance.is_finite() && self.min_relevance >= 0.0) {
            return Err(DetectorError::InvalidParameter(
                "min_relevance must be non-negative".into(),
            ));
        }
        if !(self.steepness.is_finite() && self.steepness > 0.0) {
            return Err(DetectorError::InvalidParameter(
                "steepness must be positive".into(),
            ));
        }
        if !(self.corroboration_cap > 0.0 && self.corroboration_cap <= 1.0) {
            return Err(DetectorError::InvalidParameter(
                "corroboration_cap must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaselineOutcome {
    pub label: Label,
    pub score: f64,
    pub confidence: f64,
    /// Every rule's contribution, largest magnitude first.
    pub contributions: Vec<Contribution>,
    pub reasons: Vec<String>,
}

pub struct BaselineScorer<'a> {
    config: &'a BaselineConfig,
}

impl<'a> BaselineScorer<'a> {
    pub fn new(config: &'a BaselineConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, bundle: &FeatureBundle) -> BaselineOutcome {
        let mut contributions = self
            .config
            .rules
            .iter()
            .map(|rule| rule.contribution(bundle))
            .collect::<Vec<_>>();

        // Stable: ties keep table order
        contributions.sort_by(|a, b| b.sub_score.abs().total_cmp(&a.sub_score.abs()));

        let score = contributions.iter().map(|c| c.sub_score).sum::<f64>();
        let label = Label::from_score(score);

        let relevant = contributions
            .iter()
            .filter(|c| c.sub_score.abs() >= self.config.min_relevance && c.sub_score != 0.0)
            .collect::<Vec<_>>();

        let reasons = relevant
            .iter()
            .map(|c| describe(c.statistic.name(), c.value, c.sub_score))
            .collect();

        let corroborating = relevant
            .iter()
            .filter(|c| Label::from_score(c.sub_score) == label)
            .count();

        let mut confidence = squash(score.abs(), self.config.steepness);
        if corroborating < 2 {
            confidence = confidence.min(self.config.corroboration_cap);
        }

        BaselineOutcome {
            label,
            score,
            confidence,
            contributions,
            reasons,
        }
    }
}

/// Maps `|score|` onto `[0, 1)`: `2 * logistic(k * x) - 1`.
pub fn squash(magnitude: f64, steepness: f64) -> f64 {
    if !magnitude.is_finite() {
        return 0.0;
    }
    (2.0 * logistic(steepness * magnitude.abs()) - 1.0).clamp(0.0, 1.0)
}

/// Reason text for one statistic; depends only on its arguments.
pub fn describe(statistic: &str, value: f64, contribution: f64) -> String {
    let toward = Label::from_score(contribution);
    format!("{statistic} = {value:.4} pushed toward {toward} ({contribution:+.3})")
}
