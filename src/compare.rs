//! Regression comparator: pixelmatch / SSIM diffing with size alignment
//!
//! Two captures are decoded to RGBA, padded to a common size when size
//! mismatches are allowed, and compared with the configured method. The
//! aggregate difference is checked against a failure threshold expressed
//! either as a ratio of differing pixels or as an absolute pixel count.

use crate::{Error, Result};
use image::{imageops, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Pixel differencing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMethod {
    /// Per-pixel YIQ colour distance with anti-aliasing detection
    #[default]
    Pixelmatch,
    /// Windowed structural similarity over luma
    Ssim,
}

/// Unit of the failure threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdType {
    /// Ratio of differing pixels (0.0-1.0)
    #[default]
    Percent,
    /// Absolute number of differing pixels
    Pixel,
}

/// Comparison configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    pub method: ComparisonMethod,
    /// Pad both images to a common size instead of failing on a size mismatch
    pub allow_size_mismatch: bool,
    pub failure_threshold: f64,
    pub failure_threshold_type: ThresholdType,
    /// Per-pixel colour distance threshold for pixelmatch (0.0-1.0)
    pub pixel_threshold: f64,
    /// Count anti-aliased pixels as differences
    pub include_anti_aliasing: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            method: ComparisonMethod::Pixelmatch,
            allow_size_mismatch: true,
            failure_threshold: 0.05,
            failure_threshold_type: ThresholdType::Percent,
            pixel_threshold: 0.01,
            include_anti_aliasing: false,
        }
    }
}

/// Outcome of comparing a received image against a baseline
#[derive(Debug, Clone)]
pub struct Comparison {
    pub pass: bool,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    /// `diff_pixels / total_pixels`, 0 for empty images
    pub diff_ratio: f64,
    pub size_mismatch: bool,
    /// Composite `baseline | diff | received` image, absent for identical inputs
    pub diff_image: Option<RgbaImage>,
}

impl Comparison {
    fn identical(width: u32, height: u32) -> Self {
        Self {
            pass: true,
            diff_pixels: 0,
            total_pixels: width as u64 * height as u64,
            diff_ratio: 0.0,
            size_mismatch: false,
            diff_image: None,
        }
    }

    /// Encodes the diff image (if present) to PNG bytes.
    pub fn diff_png(&self) -> Result<Option<Vec<u8>>> {
        self.diff_image.as_ref().map(encode_png).transpose()
    }
}

/// Compare two PNG byte buffers.
pub fn compare_png(baseline: &[u8], received: &[u8], options: &CompareOptions) -> Result<Comparison> {
    if baseline == received {
        let img = decode_png(baseline)?;
        return Ok(Comparison::identical(img.width(), img.height()));
    }
    let baseline = decode_png(baseline)?;
    let received = decode_png(received)?;
    compare_images(&baseline, &received, options)
}

/// Compare two RGBA images according to `options`.
///
/// Returns [`Error::SizeMismatch`] when the dimensions differ and
/// `allow_size_mismatch` is off.
pub fn compare_images(baseline: &RgbaImage, received: &RgbaImage, options: &CompareOptions) -> Result<Comparison> {
    let size_mismatch = baseline.dimensions() != received.dimensions();
    if size_mismatch && !options.allow_size_mismatch {
        return Err(Error::SizeMismatch {
            expected: baseline.dimensions(),
            actual: received.dimensions(),
        });
    }

    let (baseline, received) = align_to_same_size(baseline, received);
    let (width, height) = baseline.dimensions();
    let total_pixels = width as u64 * height as u64;

    if !size_mismatch && baseline.as_raw() == received.as_raw() {
        return Ok(Comparison::identical(width, height));
    }

    let (diff_pixels, diff) = match options.method {
        ComparisonMethod::Pixelmatch => pixelmatch(&baseline, &received, options),
        ComparisonMethod::Ssim => ssim_diff(&baseline, &received),
    };

    let diff_ratio = if total_pixels > 0 {
        diff_pixels as f64 / total_pixels as f64
    } else {
        0.0
    };

    let within = match options.failure_threshold_type {
        ThresholdType::Percent => diff_ratio <= options.failure_threshold,
        ThresholdType::Pixel => diff_pixels as f64 <= options.failure_threshold,
    };

    Ok(Comparison {
        pass: within,
        diff_pixels,
        total_pixels,
        diff_ratio,
        size_mismatch,
        diff_image: Some(composite(&baseline, &diff, &received)),
    })
}

/// Pad both images to the union of their sizes.
///
/// The padded area is filled with `rgba(0, 0, 0, 64)` so it always registers
/// as a difference against real content.
pub fn align_to_same_size(a: &RgbaImage, b: &RgbaImage) -> (RgbaImage, RgbaImage) {
    let width = a.width().max(b.width());
    let height = a.height().max(b.height());
    (pad(a, width, height), pad(b, width, height))
}

fn pad(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    let mut out = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 64]));
    imageops::replace(&mut out, img, 0, 0);
    out
}

/// Lay out `baseline | diff | received` side by side.
fn composite(baseline: &RgbaImage, diff: &RgbaImage, received: &RgbaImage) -> RgbaImage {
    let (w, h) = baseline.dimensions();
    let mut out = RgbaImage::new(w * 3, h);
    imageops::replace(&mut out, baseline, 0, 0);
    imageops::replace(&mut out, diff, w as i64, 0);
    imageops::replace(&mut out, received, 2 * w as i64, 0);
    out
}

const DIFF_COLOR: [u8; 3] = [255, 0, 0];
const AA_COLOR: [u8; 3] = [255, 255, 0];
const FADE_ALPHA: f64 = 0.1;
// Maximum possible YIQ delta between two colours.
const MAX_YIQ_DELTA: f64 = 35215.0;

fn pixelmatch(img1: &RgbaImage, img2: &RgbaImage, options: &CompareOptions) -> (u64, RgbaImage) {
    let (width, height) = img1.dimensions();
    let max_delta = MAX_YIQ_DELTA * options.pixel_threshold * options.pixel_threshold;
    let mut output = RgbaImage::new(width, height);
    let mut diff = 0u64;

    for y in 0..height {
        for x in 0..width {
            let p1 = img1.get_pixel(x, y);
            let p2 = img2.get_pixel(x, y);
            let delta = color_delta(p1, p2, false);

            if delta.abs() > max_delta {
                if !options.include_anti_aliasing
                    && (antialiased(img1, x, y, img2) || antialiased(img2, x, y, img1))
                {
                    draw_pixel(&mut output, x, y, AA_COLOR);
                } else {
                    draw_pixel(&mut output, x, y, DIFF_COLOR);
                    diff += 1;
                }
            } else {
                draw_gray_pixel(&mut output, x, y, p1);
            }
        }
    }

    (diff, output)
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

// Blend a channel with white by alpha.
fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn blended_rgb(p: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = p.0;
    let (r, g, b) = (r as f64, g as f64, b as f64);
    if a < 255 {
        let a = a as f64 / 255.0;
        (blend(r, a), blend(g, a), blend(b, a))
    } else {
        (r, g, b)
    }
}

/// Squared YIQ distance between two pixels, signed negative when the first
/// is brighter. With `y_only` only the brightness difference is returned.
fn color_delta(p1: &Rgba<u8>, p2: &Rgba<u8>, y_only: bool) -> f64 {
    if p1 == p2 {
        return 0.0;
    }
    let (r1, g1, b1) = blended_rgb(p1);
    let (r2, g2, b2) = blended_rgb(p2);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;
    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

fn neighborhood(x: u32, y: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    (
        x.saturating_sub(1),
        y.saturating_sub(1),
        (x + 1).min(width - 1),
        (y + 1).min(height - 1),
    )
}

/// Whether the pixel at (x1, y1) looks like an anti-aliasing edge in `img`
/// (and the corresponding darkest/brightest neighbour is part of a flat area
/// in both images).
fn antialiased(img: &RgbaImage, x1: u32, y1: u32, img2: &RgbaImage) -> bool {
    let (width, height) = img.dimensions();
    let (x0, y0, x2, y2) = neighborhood(x1, y1, width, height);
    let center = img.get_pixel(x1, y1);

    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);
    let mut min = 0.0;
    let mut max = 0.0;
    let mut min_at = (x1, y1);
    let mut max_at = (x1, y1);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let delta = color_delta(center, img.get_pixel(x, y), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (x, y);
            } else if delta > max {
                max = delta;
                max_at = (x, y);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_at.0, min_at.1) && has_many_siblings(img2, min_at.0, min_at.1))
        || (has_many_siblings(img, max_at.0, max_at.1) && has_many_siblings(img2, max_at.0, max_at.1))
}

/// Whether the pixel has more than two identical neighbours.
fn has_many_siblings(img: &RgbaImage, x1: u32, y1: u32) -> bool {
    let (width, height) = img.dimensions();
    let (x0, y0, x2, y2) = neighborhood(x1, y1, width, height);
    let center = img.get_pixel(x1, y1);
    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            if img.get_pixel(x, y) == center {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }
    false
}

fn draw_pixel(out: &mut RgbaImage, x: u32, y: u32, [r, g, b]: [u8; 3]) {
    out.put_pixel(x, y, Rgba([r, g, b, 255]));
}

fn draw_gray_pixel(out: &mut RgbaImage, x: u32, y: u32, src: &Rgba<u8>) {
    let [r, g, b, a] = src.0;
    let luma = rgb2y(r as f64, g as f64, b as f64);
    let val = blend(luma, FADE_ALPHA * a as f64 / 255.0).round().clamp(0.0, 255.0) as u8;
    draw_pixel(out, x, y, [val, val, val]);
}

const SSIM_WINDOW: u32 = 11;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;
const SSIM_L: f64 = 255.0;

fn luma(p: &Rgba<u8>) -> f64 {
    let (r, g, b) = blended_rgb(p);
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Mean SSIM over non-overlapping windows; the diff image shades each window
/// by its similarity (white = identical).
fn ssim_diff(img1: &RgbaImage, img2: &RgbaImage) -> (u64, RgbaImage) {
    let (width, height) = img1.dimensions();
    let mut output = RgbaImage::new(width, height);
    let c1 = (SSIM_K1 * SSIM_L).powi(2);
    let c2 = (SSIM_K2 * SSIM_L).powi(2);

    let mut sum = 0.0;
    let mut windows = 0u64;

    for wy in (0..height).step_by(SSIM_WINDOW as usize) {
        for wx in (0..width).step_by(SSIM_WINDOW as usize) {
            let x_end = (wx + SSIM_WINDOW).min(width);
            let y_end = (wy + SSIM_WINDOW).min(height);
            let n = ((x_end - wx) * (y_end - wy)) as f64;

            let (mut s1, mut s2) = (0.0, 0.0);
            for y in wy..y_end {
                for x in wx..x_end {
                    s1 += luma(img1.get_pixel(x, y));
                    s2 += luma(img2.get_pixel(x, y));
                }
            }
            let (m1, m2) = (s1 / n, s2 / n);

            let (mut v1, mut v2, mut cov) = (0.0, 0.0, 0.0);
            for y in wy..y_end {
                for x in wx..x_end {
                    let d1 = luma(img1.get_pixel(x, y)) - m1;
                    let d2 = luma(img2.get_pixel(x, y)) - m2;
                    v1 += d1 * d1;
                    v2 += d2 * d2;
                    cov += d1 * d2;
                }
            }
            let denom = if n > 1.0 { n - 1.0 } else { 1.0 };
            let (v1, v2, cov) = (v1 / denom, v2 / denom, cov / denom);

            let ssim = ((2.0 * m1 * m2 + c1) * (2.0 * cov + c2))
                / ((m1 * m1 + m2 * m2 + c1) * (v1 + v2 + c2));
            sum += ssim;
            windows += 1;

            let shade = (ssim.clamp(0.0, 1.0) * 255.0).round() as u8;
            for y in wy..y_end {
                for x in wx..x_end {
                    draw_pixel(&mut output, x, y, [shade, shade, shade]);
                }
            }
        }
    }

    let mssim = if windows > 0 { sum / windows as f64 } else { 1.0 };
    let total = width as f64 * height as f64;
    let diff = ((1.0 - mssim.clamp(0.0, 1.0)) * total).floor() as u64;
    (diff, output)
}

/// Decode PNG bytes into an RGBA image.
pub fn decode_png(data: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory_with_format(data, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(|e| Error::ImageError(format!("Failed to decode PNG: {}", e)))
}

/// Encode an RGBA image to PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| Error::ImageError(format!("Failed to encode PNG: {}", e)))?;
    Ok(buffer)
}
