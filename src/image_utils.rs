use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{DynamicImage, GrayAlphaImage, GrayImage, Luma, RgbImage, RgbaImage};

use crate::error::{DetectorError, Result};

/// File extensions picked up by [`list_images`], compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Builds a validated raster from a row-major 8-bit buffer.
///
/// Accepts 1 (gray), 2 (gray + alpha), 3 (RGB) or 4 (RGBA) channels. The
/// buffer must hold exactly `width * height * channels` samples.
pub fn from_raw_pixels(
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
) -> Result<DynamicImage> {
    if width == 0 || height == 0 {
        return Err(DetectorError::InvalidImage(format!(
            "zero-area image ({width}x{height})"
        )));
    }

    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels as usize))
        .ok_or_else(|| DetectorError::InvalidImage("pixel count overflows".into()))?;

    if pixels.len() != expected {
        return Err(DetectorError::InvalidImage(format!(
            "buffer holds {} samples, {width}x{height}x{channels} needs {expected}",
            pixels.len()
        )));
    }

    let image = match channels {
        1 => GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(width, height, pixels).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8),
        other => {
            return Err(DetectorError::InvalidImage(format!(
                "unsupported channel count {other}"
            )));
        }
    };

    image.ok_or_else(|| DetectorError::InvalidImage("unreadable pixel buffer".into()))
}

/// ITU-R BT.709 luminance, rounded back to 8 bits.
pub fn rgb_to_luminance(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum = 0.2126 * pixel[0] as f64 + 0.7152 * pixel[1] as f64 + 0.0722 * pixel[2] as f64;
        gray.put_pixel(x, y, Luma([lum.round().clamp(0.0, 255.0) as u8]));
    }

    gray
}

/// Luminance plane of any decoded image. Gray input is used as-is, alpha is dropped.
pub fn luminance(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => image.to_luma8(),
        _ => rgb_to_luminance(&image.to_rgb8()),
    }
}

pub fn calculate_histogram(image: &GrayImage) -> [u32; 256] {
    let mut histogram = [0u32; 256];

    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    histogram
}

/// Histogram of arbitrary values over `[0, max]`; values outside the range are
/// clamped into the first or last bin.
pub fn value_histogram(values: &[f64], max: f64, bins: usize) -> Vec<u32> {
    let mut histogram = vec![0u32; bins];
    if bins == 0 || max <= 0.0 {
        return histogram;
    }

    for &v in values {
        let pos = (v / max * bins as f64).floor();
        let bin = if pos.is_nan() || pos < 0.0 {
            0
        } else {
            (pos as usize).min(bins - 1)
        };
        histogram[bin] += 1;
    }

    histogram
}

/// Luminance samples scaled into `[0, 1]`, row-major.
pub fn gray_to_unit(image: &GrayImage) -> Vec<f64> {
    image.pixels().map(|p| p[0] as f64 / 255.0).collect()
}

pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    Ok(image::open(path)?)
}

/// Sorted list of image files directly inside `dir`.
pub fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(DetectorError::InvalidParameter(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false);

        if matches {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}
