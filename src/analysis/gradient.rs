use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use num_complex::Complex64;

use crate::{
    analysis::statistics::{moments, shannon_entropy},
    image_utils::value_histogram,
};

/// Pixels whose Sobel magnitude exceeds this count as edges.
pub const EDGE_THRESHOLD: f64 = 0.1;

/// Largest Sobel magnitude reachable on `[0, 1]` luminance.
pub const MAX_GRADIENT_MAGNITUDE: f64 = 4.0 * std::f64::consts::SQRT_2;

pub const GRADIENT_HISTOGRAM_BINS: usize = 256;

/// Sobel response of a luminance plane, in units of `[0, 1]` luminance.
pub struct GradientField {
    pub gx: Vec<f64>,
    pub gy: Vec<f64>,
    pub magnitude: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStats {
    pub variance: f64,
    pub mean: f64,
    pub entropy: f64,
    pub edge_density: f64,
    pub direction_variance: f64,
    pub cov_xx: f64,
    pub cov_xy: f64,
    pub cov_yy: f64,
}

impl GradientField {
    pub fn from_luminance(gray: &GrayImage) -> Self {
        let horizontal = horizontal_sobel(gray);
        let vertical = vertical_sobel(gray);

        let gx = horizontal
            .pixels()
            .map(|p| p[0] as f64 / 255.0)
            .collect::<Vec<_>>();
        let gy = vertical
            .pixels()
            .map(|p| p[0] as f64 / 255.0)
            .collect::<Vec<_>>();
        let magnitude = gx
            .iter()
            .zip(gy.iter())
            .map(|(&x, &y)| (x * x + y * y).sqrt())
            .collect();

        Self { gx, gy, magnitude }
    }

    pub fn stats(&self) -> GradientStats {
        let n = self.magnitude.len().max(1) as f64;
        let m = moments(&self.magnitude);

        let histogram = value_histogram(
            &self.magnitude,
            MAX_GRADIENT_MAGNITUDE,
            GRADIENT_HISTOGRAM_BINS,
        );

        let edges = self
            .magnitude
            .iter()
            .filter(|&&v| v > EDGE_THRESHOLD)
            .count();

        let (mut cov_xx, mut cov_xy, mut cov_yy) = (0.0, 0.0, 0.0);
        for (&x, &y) in self.gx.iter().zip(self.gy.iter()) {
            cov_xx += x * x;
            cov_xy += x * y;
            cov_yy += y * y;
        }

        GradientStats {
            variance: m.variance,
            mean: m.mean,
            entropy: shannon_entropy(&histogram),
            edge_density: edges as f64 / n,
            direction_variance: self.direction_variance(),
            cov_xx: cov_xx / n,
            cov_xy: cov_xy / n,
            cov_yy: cov_yy / n,
        }
    }

    /// Circular variance `1 - |mean(e^{i*theta})|` over pixels that have a gradient.
    fn direction_variance(&self) -> f64 {
        let mut resultant = Complex64::new(0.0, 0.0);
        let mut count = 0usize;

        for ((&x, &y), &mag) in self.gx.iter().zip(self.gy.iter()).zip(self.magnitude.iter()) {
            if mag > 0.0 {
                resultant += Complex64::from_polar(1.0, y.atan2(x));
                count += 1;
            }
        }

        if count == 0 {
            return 0.0;
        }

        (1.0 - resultant.norm() / count as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn test_flat_image_has_no_gradient() {
        let gray = GrayImage::from_pixel(16, 16, Luma([120]));
        let stats = GradientField::from_luminance(&gray).stats();

        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.entropy, 0.0);
        assert_eq!(stats.edge_density, 0.0);
        assert_eq!(stats.direction_variance, 0.0);
    }

    #[test]
    fn test_vertical_edge_is_consistent() {
        let gray = GrayImage::from_fn(16, 16, |x, _| if x < 8 { Luma([0]) } else { Luma([255]) });
        let field = GradientField::from_luminance(&gray);
        let stats = field.stats();

        assert!(stats.edge_density > 0.0);
        assert!(stats.cov_xx > 0.0);
        assert!(stats.cov_yy.abs() < 1e-12);
        // Every nonzero gradient points the same way
        assert!(stats.direction_variance < 1e-9);
    }

    #[test]
    fn test_magnitude_within_bounds() {
        let gray = GrayImage::from_fn(9, 9, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]));
        let field = GradientField::from_luminance(&gray);

        assert!(
            field
                .magnitude
                .iter()
                .all(|&m| m <= MAX_GRADIENT_MAGNITUDE + 1e-9)
        );
    }
}
