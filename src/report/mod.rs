use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    TrainedEvidence, Verdict,
    detection::{ConfidenceLevel, Label, ScoringMode},
    error::Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictReport {
    pub label: Label,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub score: f64,
    pub mode: ScoringMode,
    pub reasons: Vec<String>,
    pub statistics: BTreeMap<String, f64>,
    pub trained: Option<TrainedEvidence>,
    pub warnings: Vec<String>,
}

impl From<&Verdict> for VerdictReport {
    fn from(verdict: &Verdict) -> Self {
        Self {
            label: verdict.label,
            confidence: verdict.confidence,
            confidence_level: verdict.confidence_level,
            score: verdict.score,
            mode: verdict.mode,
            reasons: verdict.reasons.clone(),
            statistics: verdict
                .features
                .named_statistics()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            trained: verdict.trained.clone(),
            warnings: verdict.warnings.clone(),
        }
    }
}

impl VerdictReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub source: String,
    pub verdict: Option<VerdictReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub real: usize,
    pub ai: usize,
    pub failed: usize,
    /// Mean over classified entries; 0 when none succeeded.
    pub mean_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub summary: BatchSummary,
}

impl BatchReport {
    /// Pairs each source with its outcome; entries keep input order.
    pub fn new<S, I>(outcomes: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Result<Verdict>)>,
    {
        let entries = outcomes
            .into_iter()
            .map(|(source, outcome)| match outcome {
                Ok(verdict) => BatchEntry {
                    source: source.into(),
                    verdict: Some(VerdictReport::from(&verdict)),
                    error: None,
                },
                Err(e) => BatchEntry {
                    source: source.into(),
                    verdict: None,
                    error: Some(e.to_string()),
                },
            })
            .collect::<Vec<_>>();

        let summary = summarize(&entries);
        Self { entries, summary }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn summarize(entries: &[BatchEntry]) -> BatchSummary {
    let verdicts = entries.iter().filter_map(|e| e.verdict.as_ref()).collect::<Vec<_>>();
    let classified = verdicts.len();

    BatchSummary {
        total: entries.len(),
        real: verdicts.iter().filter(|v| v.label == Label::Real).count(),
        ai: verdicts.iter().filter(|v| v.label == Label::Ai).count(),
        failed: entries.len() - classified,
        mean_confidence: if classified > 0 {
            verdicts.iter().map(|v| v.confidence).sum::<f64>() / classified as f64
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, GrayImage, Luma};

    use super::*;
    use crate::{Detector, error::DetectorError};

    #[test]
    fn test_verdict_report_lists_every_statistic() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_fn(24, 24, |x, y| Luma([((x * 7 + y * 13) % 256) as u8])));
        let verdict = Detector::new().classify_image(&image).unwrap();
        let report = VerdictReport::from(&verdict);

        assert_eq!(report.statistics.len(), verdict.features.feature_vector.len());
        assert_eq!(report.statistics["edge_density"], verdict.features.edge_density);
        assert_eq!(report.label, verdict.label);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"mode\": \"baseline\""));
    }

    #[test]
    fn test_batch_summary_counts() {
        let detector = Detector::new();
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([128])));
        let verdict = detector.classify_image(&flat).unwrap();
        let label = verdict.label;

        let report = BatchReport::new(vec![
            ("flat.png", Ok(verdict.clone())),
            ("broken.png", Err(DetectorError::InvalidImage("zero-area image (0x0)".into()))),
            ("flat-again.png", Ok(verdict)),
        ]);

        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.entries[1].source, "broken.png");
        assert!(report.entries[1].verdict.is_none());
        assert!(report.entries[1].error.as_deref().unwrap().contains("zero-area"));

        let summary = &report.summary;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.real + summary.ai, 2);
        assert_eq!(if label == Label::Ai { summary.ai } else { summary.real }, 2);
    }

    #[test]
    fn test_empty_batch() {
        let report = BatchReport::new(Vec::<(String, Result<Verdict>)>::new());
        assert_eq!(report.summary, BatchSummary::default());
    }
}
