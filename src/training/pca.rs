use ndarray::{Array1, Array2, Axis};

use crate::analysis::statistics::MIN_DENOMINATOR;

/// Below this population std a feature is treated as constant and left unscaled.
pub const STD_FLOOR: f64 = 1e-10;

const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-12;

/// Per-feature centering and scaling fitted on the training matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Standardizer {
    /// Centers every column. With `scale` set, also divides by the population
    /// std of the column; constant columns keep a scale of 1.
    pub fn fit(data: &Array2<f64>, scale: bool) -> Self {
        let cols = data.ncols();
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(cols));

        let scale = if scale {
            data.axis_iter(Axis(1))
                .zip(mean.iter())
                .map(|(column, &m)| {
                    let var = column.iter().map(|&v| (v - m).powi(2)).sum::<f64>()
                        / column.len().max(1) as f64;
                    let std = var.sqrt();
                    if std.is_finite() && std > STD_FLOOR { std } else { 1.0 }
                })
                .collect()
        } else {
            vec![1.0; cols]
        };

        Self {
            mean: mean.to_vec(),
            scale,
        }
    }

    pub fn apply(&self, data: &Array2<f64>) -> Array2<f64> {
        let mean = Array1::from(self.mean.clone());
        let scale = Array1::from(self.scale.clone());
        (data - &mean) / &scale
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PcaFit {
    /// Unit-length principal axes, strongest first.
    pub components: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

/// Number of components that can be fitted: `min(requested, features, samples - 1)`, at least 1.
pub fn component_count(requested: usize, features: usize, samples: usize) -> usize {
    requested
        .min(features)
        .min(samples.saturating_sub(1))
        .max(1)
}

/// Principal axes of already centered data via power iteration with deflation.
pub fn fit_pca(centered: &Array2<f64>, k: usize) -> PcaFit {
    let n = centered.ncols();
    let denom = centered.nrows().saturating_sub(1).max(1) as f64;
    let covariance = centered.t().dot(centered) / denom;

    let total_variance = covariance.diag().sum();
    let mut deflated = covariance;
    let mut components: Vec<Array1<f64>> = Vec::with_capacity(k);
    let mut explained_variance = Vec::with_capacity(k);

    for c in 0..k.min(n) {
        let mut v = start_vector(c, n, &components);

        for _ in 0..MAX_ITERATIONS {
            let mut next = deflated.dot(&v);
            orthogonalize(&mut next, &components);

            let norm = next.dot(&next).sqrt();
            if norm < MIN_DENOMINATOR {
                break;
            }
            next /= norm;

            let diff = (&next - &v).mapv(f64::abs).sum();
            v = next;
            if diff < TOLERANCE {
                break;
            }
        }

        fix_sign(&mut v);
        let eigenvalue = v.dot(&deflated.dot(&v)).max(0.0);

        let column = v.view().insert_axis(Axis(1));
        let outer = column.dot(&column.t());
        deflated = deflated - outer * eigenvalue;

        components.push(v);
        explained_variance.push(eigenvalue);
    }

    let explained_variance_ratio = explained_variance
        .iter()
        .map(|&ev| {
            if total_variance > MIN_DENOMINATOR {
                (ev / total_variance).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect();

    PcaFit {
        components: components.into_iter().map(|v| v.to_vec()).collect(),
        explained_variance,
        explained_variance_ratio,
    }
}

/// Deterministic start vector orthogonal to the axes already found.
fn start_vector(c: usize, n: usize, found: &[Array1<f64>]) -> Array1<f64> {
    let seeded = Array1::from_shape_fn(n, |i| ((i + 1) as f64 * (c + 1) as f64 * 0.1).sin() + 1.0);
    let basis = (0..n).map(|j| Array1::from_shape_fn(n, |i| if i == j { 1.0 } else { 0.0 }));

    for mut candidate in std::iter::once(seeded).chain(basis) {
        orthogonalize(&mut candidate, found);
        let norm = candidate.dot(&candidate).sqrt();
        if norm > 1e-6 {
            return candidate / norm;
        }
    }

    Array1::zeros(n)
}

fn orthogonalize(v: &mut Array1<f64>, found: &[Array1<f64>]) {
    for axis in found {
        let projection = v.dot(axis);
        v.scaled_add(-projection, axis);
    }
}

/// The largest-magnitude loading is made positive; the first one wins ties.
fn fix_sign(v: &mut Array1<f64>) {
    let mut pivot = 0.0_f64;
    for &x in v.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn test_component_count() {
        assert_eq!(component_count(2, 13, 100), 2);
        assert_eq!(component_count(2, 13, 2), 1);
        assert_eq!(component_count(2, 13, 1), 1);
        assert_eq!(component_count(5, 3, 100), 3);
    }

    #[test]
    fn test_standardizer_floors_constant_columns() {
        let data = array![[1.0, 5.0], [3.0, 5.0]];
        let s = Standardizer::fit(&data, true);
        assert_eq!(s.mean, vec![2.0, 5.0]);
        assert_eq!(s.scale, vec![1.0, 1.0]);

        let scaled = s.apply(&data);
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);

        let unscaled = Standardizer::fit(&array![[0.0], [10.0]], false);
        assert_eq!(unscaled.scale, vec![1.0]);
    }

    #[test]
    fn test_recovers_dominant_axis() {
        // Points spread along (1, 1) with a little spread along (1, -1)
        let data = array![
            [-2.0, -2.1],
            [-1.0, -0.9],
            [0.0, 0.05],
            [1.0, 1.1],
            [2.0, 1.85],
        ];
        let centered = Standardizer::fit(&data, false).apply(&data);
        let fit = fit_pca(&centered, 2);

        let first = &fit.components[0];
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((first[0] - expected).abs() < 0.05);
        assert!((first[1] - expected).abs() < 0.05);

        let dot = fit.components[0][0] * fit.components[1][0] + fit.components[0][1] * fit.components[1][1];
        assert!(dot.abs() < 1e-8);

        assert!(fit.explained_variance[0] > fit.explained_variance[1]);
        let total: f64 = fit.explained_variance_ratio.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_variance_is_finite() {
        let centered = Array2::<f64>::zeros((2, 4));
        let fit = fit_pca(&centered, 1);

        assert_eq!(fit.components.len(), 1);
        assert!(fit.components[0].iter().all(|v| v.is_finite()));
        let norm: f64 = fit.components[0].iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        assert_eq!(fit.explained_variance, vec![0.0]);
        assert_eq!(fit.explained_variance_ratio, vec![0.0]);
    }

    #[test]
    fn test_sign_is_fixed() {
        let mut v = Array1::from(vec![0.1, -0.9, 0.3]);
        fix_sign(&mut v);
        assert_eq!(v.to_vec(), vec![-0.1, 0.9, -0.3]);
    }
}
