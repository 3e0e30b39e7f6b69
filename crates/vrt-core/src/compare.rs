//! Pixel-level image comparison
//!
//! Two decoded images are walked pixel by pixel. A pixel pair matches when
//! every channel differs by less than the channel tolerance. With
//! anti-aliasing ignored, a differing pixel that sits on an anti-aliased edge
//! in either image still matches when the brightness delta is within the
//! brightness tolerance.

use crate::error::CompareError;
use image::RgbaImage;
use serde::Serialize;

/// Per-channel and brightness tolerances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerance {
    /// Red channel tolerance
    pub red: u8,
    /// Green channel tolerance
    pub green: u8,
    /// Blue channel tolerance
    pub blue: u8,
    /// Alpha channel tolerance
    pub alpha: u8,
    /// Brightness delta still treated as similar
    pub min_brightness: u8,
    /// Brightness delta above which neighbours contrast
    pub max_brightness: u8,
}

impl Tolerance {
    /// Tolerances used when anti-aliasing is ignored
    pub const ANTIALIASING: Self = Self {
        red: 32,
        green: 32,
        blue: 32,
        alpha: 32,
        min_brightness: 64,
        max_brightness: 96,
    };

    /// Only byte-identical pixels match
    pub const EXACT: Self = Self {
        red: 1,
        green: 1,
        blue: 1,
        alpha: 1,
        min_brightness: 1,
        max_brightness: 255,
    };
}

/// Comparator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareConfig {
    /// Tolerances
    pub tolerance: Tolerance,
    /// Treat anti-aliased edge pixels leniently
    pub ignore_antialiasing: bool,
}

impl CompareConfig {
    /// Exact comparison
    #[inline]
    #[must_use]
    pub fn exact() -> Self {
        Self {
            tolerance: Tolerance::EXACT,
            ignore_antialiasing: false,
        }
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::ANTIALIASING,
            ignore_antialiasing: true,
        }
    }
}

/// Signed size difference, original minus test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DimensionDifference {
    /// Width delta in pixels
    pub width: i64,
    /// Height delta in pixels
    pub height: i64,
}

/// Result of comparing one image pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    /// Both images have identical width and height
    pub is_same_dimensions: bool,
    /// Size delta between the two images
    pub dimension_difference: DimensionDifference,
    /// Share of mismatching pixels, 0-100
    pub raw_mismatch_percentage: f64,
    /// `raw_mismatch_percentage` with two decimals
    pub mismatch_percentage: String,
}

impl ComparisonResult {
    fn new(mismatched: u64, total: u64, difference: DimensionDifference) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let raw = if total > 0 {
            mismatched as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            is_same_dimensions: difference == DimensionDifference::default(),
            dimension_difference: difference,
            raw_mismatch_percentage: raw,
            mismatch_percentage: format!("{raw:.2}"),
        }
    }

    /// Check the pass criterion against a threshold percentage
    #[inline]
    #[must_use]
    pub fn passes(&self, max_diff_percentage: f64) -> bool {
        self.is_same_dimensions && self.raw_mismatch_percentage <= max_diff_percentage
    }
}

/// Image comparator
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    config: CompareConfig,
}

impl Comparator {
    /// Create comparator with a config
    #[inline]
    #[must_use]
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Compare two encoded images (original first, test second)
    ///
    /// # Errors
    /// - `CompareError::Empty` if a buffer is empty
    /// - `CompareError::Decode` if a buffer is not a supported image
    pub fn compare(&self, original: &[u8], test: &[u8]) -> Result<ComparisonResult, CompareError> {
        let original = decode(original, "original")?;
        let test = decode(test, "test")?;
        Ok(self.compare_images(&original, &test))
    }

    /// Compare two decoded images
    #[must_use]
    pub fn compare_images(&self, a: &RgbaImage, b: &RgbaImage) -> ComparisonResult {
        let difference = DimensionDifference {
            width: i64::from(a.width()) - i64::from(b.width()),
            height: i64::from(a.height()) - i64::from(b.height()),
        };

        let width = a.width().min(b.width());
        let height = a.height().min(b.height());
        let total = u64::from(a.width().max(b.width())) * u64::from(a.height().max(b.height()));
        let overlap = u64::from(width) * u64::from(height);

        let mut mismatched = total - overlap;
        for y in 0..height {
            for x in 0..width {
                if !self.pixels_match(a, b, x, y) {
                    mismatched += 1;
                }
            }
        }

        ComparisonResult::new(mismatched, total, difference)
    }

    fn pixels_match(&self, a: &RgbaImage, b: &RgbaImage, x: u32, y: u32) -> bool {
        let tol = &self.config.tolerance;
        let pa = Pixel::at(a, x, y);
        let pb = Pixel::at(b, x, y);

        if pa.rgba_similar(&pb, tol) {
            return true;
        }

        if self.config.ignore_antialiasing && (is_antialiased(a, x, y, tol) || is_antialiased(b, x, y, tol)) {
            return pa.brightness_similar(&pb, tol);
        }

        false
    }
}

/// Compare with the default (anti-aliasing tolerant) configuration
///
/// # Errors
/// See [`Comparator::compare`].
pub fn compare(original: &[u8], test: &[u8]) -> Result<ComparisonResult, CompareError> {
    Comparator::default().compare(original, test)
}

fn decode(bytes: &[u8], side: &'static str) -> Result<RgbaImage, CompareError> {
    if bytes.is_empty() {
        return Err(CompareError::Empty(side));
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| CompareError::Decode {
            side,
            reason: e.to_string(),
        })
}

#[derive(Debug, Clone, Copy)]
struct Pixel {
    r: f64,
    g: f64,
    b: f64,
    a: f64,
}

impl Pixel {
    fn at(img: &RgbaImage, x: u32, y: u32) -> Self {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        Self {
            r: f64::from(r),
            g: f64::from(g),
            b: f64::from(b),
            a: f64::from(a),
        }
    }

    fn brightness(&self) -> f64 {
        0.3 * self.r + 0.59 * self.g + 0.11 * self.b
    }

    /// Hue in `[0, 1)`
    fn hue(&self) -> f64 {
        let (r, g, b) = (self.r / 255.0, self.g / 255.0, self.b / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        if (max - min).abs() < f64::EPSILON {
            return 0.0;
        }

        let d = max - min;
        let h = if (max - r).abs() < f64::EPSILON {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if (max - g).abs() < f64::EPSILON {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        h / 6.0
    }

    fn rgba_similar(&self, other: &Self, tol: &Tolerance) -> bool {
        similar(self.r, other.r, tol.red)
            && similar(self.g, other.g, tol.green)
            && similar(self.b, other.b, tol.blue)
            && similar(self.a, other.a, tol.alpha)
    }

    fn rgb_same(&self, other: &Self) -> bool {
        self.r == other.r && self.g == other.g && self.b == other.b
    }

    fn brightness_similar(&self, other: &Self, tol: &Tolerance) -> bool {
        similar(self.brightness(), other.brightness(), tol.min_brightness) && similar(self.a, other.a, tol.alpha)
    }

    fn contrasts(&self, other: &Self, tol: &Tolerance) -> bool {
        (self.brightness() - other.brightness()).abs() > f64::from(tol.max_brightness)
    }
}

fn similar(a: f64, b: f64, tolerance: u8) -> bool {
    (a - b).abs() < f64::from(tolerance)
}

/// Edge heuristic over the 8-neighbourhood
///
/// A pixel is anti-aliased when more than one neighbour contrasts strongly or
/// has a clearly different hue, or when fewer than two neighbours share its
/// exact colour.
fn is_antialiased(img: &RgbaImage, x: u32, y: u32, tol: &Tolerance) -> bool {
    let source = Pixel::at(img, x, y);
    let source_hue = source.hue();

    let mut high_contrast = 0;
    let mut different_hue = 0;
    let mut equivalent = 0;

    for dx in -1i64..=1 {
        for dy in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(img.width()) || ny >= i64::from(img.height()) {
                continue;
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let target = Pixel::at(img, nx as u32, ny as u32);

            if source.contrasts(&target, tol) {
                high_contrast += 1;
            }
            if source.rgb_same(&target) {
                equivalent += 1;
            }
            if (target.hue() - source_hue).abs() > 0.3 {
                different_hue += 1;
            }
            if different_hue > 1 || high_contrast > 1 {
                return true;
            }
        }
    }

    equivalent < 2
}
