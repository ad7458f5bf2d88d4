use image::GrayImage;
use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::analysis::statistics::MIN_DENOMINATOR;

/// Side of the central crop fed to the FFT.
pub const SPECTRAL_WINDOW: u32 = 256;

/// Normalized radial frequency (cycles/pixel) above which energy counts as high.
pub const SPECTRAL_CUTOFF: f64 = 0.25;

/// Share of non-DC spectral energy above [`SPECTRAL_CUTOFF`].
///
/// Works on a Hann-windowed, mean-removed central crop of at most
/// `SPECTRAL_WINDOW` square so the cost stays bounded for large images.
pub fn high_freq_ratio(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    let w = width.min(SPECTRAL_WINDOW) as usize;
    let h = height.min(SPECTRAL_WINDOW) as usize;
    if w == 0 || h == 0 {
        return 0.0;
    }

    let x0 = (width as usize - w) / 2;
    let y0 = (height as usize - h) / 2;

    let mut samples = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let px = gray.get_pixel((x0 + x) as u32, (y0 + y) as u32)[0];
            samples.push(px as f64 / 255.0);
        }
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;

    let window_x = hann(w);
    let window_y = hann(h);
    let mut data = samples
        .iter()
        .enumerate()
        .map(|(i, &v)| Complex64::new((v - mean) * window_x[i % w] * window_y[i / w], 0.0))
        .collect::<Vec<_>>();

    let mut planner = FftPlanner::<f64>::new();

    let row_fft = planner.plan_fft_forward(w);
    for row in data.chunks_exact_mut(w) {
        row_fft.process(row);
    }

    let col_fft = planner.plan_fft_forward(h);
    let mut column = vec![Complex64::new(0.0, 0.0); h];
    for x in 0..w {
        for y in 0..h {
            column[y] = data[y * w + x];
        }
        col_fft.process(&mut column);
        for y in 0..h {
            data[y * w + x] = column[y];
        }
    }

    let mut total = 0.0;
    let mut high = 0.0;
    for ky in 0..h {
        let fy = signed_frequency(ky, h);
        for kx in 0..w {
            if kx == 0 && ky == 0 {
                continue;
            }

            let fx = signed_frequency(kx, w);
            let energy = data[ky * w + kx].norm_sqr();
            total += energy;
            if (fx * fx + fy * fy).sqrt() > SPECTRAL_CUTOFF {
                high += energy;
            }
        }
    }

    if total < MIN_DENOMINATOR {
        return 0.0;
    }

    (high / total).clamp(0.0, 1.0)
}

fn hann(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }

    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos()))
        .collect()
}

fn signed_frequency(k: usize, n: usize) -> f64 {
    let k = if k <= n / 2 { k as f64 } else { k as f64 - n as f64 };
    k / n as f64
}

#[cfg(test)]
mod tests {
    use image::Luma;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_flat_image_has_no_high_frequencies() {
        let gray = GrayImage::from_pixel(32, 32, Luma([200]));
        assert_eq!(high_freq_ratio(&gray), 0.0);
    }

    #[test]
    fn test_single_pixel() {
        let gray = GrayImage::from_pixel(1, 1, Luma([3]));
        assert_eq!(high_freq_ratio(&gray), 0.0);
    }

    #[test]
    fn test_noise_beats_smooth_ramp() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = GrayImage::from_fn(64, 64, |_, _| Luma([rng.r#gen::<u8>()]));
        let smooth = GrayImage::from_fn(64, 64, |x, y| {
            let v = 128.0 + 100.0 * ((x as f64 / 10.0).sin() * (y as f64 / 14.0).cos());
            Luma([v as u8])
        });

        let noisy_ratio = high_freq_ratio(&noise);
        let smooth_ratio = high_freq_ratio(&smooth);

        assert!(noisy_ratio > 0.5, "noise ratio {noisy_ratio}");
        assert!(smooth_ratio < 0.05, "smooth ratio {smooth_ratio}");
    }

    #[test]
    fn test_signed_frequency() {
        assert_eq!(signed_frequency(0, 8), 0.0);
        assert_eq!(signed_frequency(4, 8), 0.5);
        assert_eq!(signed_frequency(5, 8), -0.375);
    }
}
