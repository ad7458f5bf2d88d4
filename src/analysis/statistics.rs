use statrs::statistics::Statistics;

/// Floor for every denominator in the feature and scoring code.
pub const MIN_DENOMINATOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub skewness: f64,
}

/// Population moments. Empty input and flat input both give zero spread and skew.
pub fn moments(values: &[f64]) -> Moments {
    if values.is_empty() {
        return Moments {
            mean: 0.0,
            variance: 0.0,
            std_dev: 0.0,
            skewness: 0.0,
        };
    }

    let mean = values.iter().mean();
    let variance = values.iter().population_variance().max(0.0);
    let std_dev = variance.sqrt();

    let skewness = if std_dev < MIN_DENOMINATOR {
        0.0
    } else {
        values
            .iter()
            .map(|&v| ((v - mean) / std_dev).powi(3))
            .sum::<f64>()
            / values.len() as f64
    };

    Moments {
        mean,
        variance,
        std_dev,
        skewness,
    }
}

/// Shannon entropy in bits over the nonzero bins of a histogram.
pub fn shannon_entropy(histogram: &[u32]) -> f64 {
    let total = histogram.iter().map(|&c| c as u64).sum::<u64>();
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    let entropy = histogram
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum::<f64>();

    // A single occupied bin yields -0.0
    entropy.max(0.0)
}
