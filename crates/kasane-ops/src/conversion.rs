//! Conversion family: grayscale, HSV adjustment, binary and adaptive
//! thresholding.
//!
//! All four operations run against the original source image and share the
//! construction-time validation policy: ranges the interface promises are
//! enforced here and rejected with [`OperationError::Parameter`]; the two
//! documented normalizations (even adaptive block size, Multi-Otsu class
//! clamp in the segmentation module) are applied silently.

use serde::{Deserialize, Serialize};

use crate::catalog::{ParamKind, ParamSpec};
use crate::error::OperationError;
use crate::types::{GrayF32, Image};
use crate::progress::Progress;

/// Grayscale conversion with brightness and contrast adjustment.
///
/// Brightness is added in the `[0, 1]` domain and the result clipped;
/// contrast rescales around the 0.5 midpoint and clips again. With both
/// parameters at their defaults the operation is exactly the weighted
/// luma conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrayscaleParams {
    brightness: f32,
    contrast: f32,
}

impl GrayscaleParams {
    /// Declarative parameter table rendered by front ends.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec {
            name: "brightness",
            kind: ParamKind::Float {
                min: -1.0,
                max: 1.0,
                default: 0.0,
            },
            help: "-1.0 (darker) to 1.0 (brighter)",
        },
        ParamSpec {
            name: "contrast",
            kind: ParamKind::Float {
                min: 0.0,
                max: 3.0,
                default: 1.0,
            },
            help: "0.0 (none) to 3.0 (high)",
        },
    ];

    /// Validate and construct.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Parameter`] when `brightness` is outside
    /// `[-1, 1]` or `contrast` outside `[0, 3]`.
    pub fn new(brightness: f32, contrast: f32) -> Result<Self, OperationError> {
        if !(-1.0..=1.0).contains(&brightness) {
            return Err(OperationError::parameter(
                "brightness",
                format!("must be in [-1, 1], got {brightness}"),
            ));
        }
        if !(0.0..=3.0).contains(&contrast) {
            return Err(OperationError::parameter(
                "contrast",
                format!("must be in [0, 3], got {contrast}"),
            ));
        }
        Ok(Self {
            brightness,
            contrast,
        })
    }

    /// Brightness offset.
    #[must_use]
    pub const fn brightness(&self) -> f32 {
        self.brightness
    }

    /// Contrast factor.
    #[must_use]
    pub const fn contrast(&self) -> f32 {
        self.contrast
    }

    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        progress.report(30, "Converting to grayscale...");
        let luma = image.to_luma();

        // No-op fast path: plain luma conversion.
        if self.brightness == 0.0 && self.contrast == 1.0 {
            return Ok(Image::Gray(luma));
        }

        progress.report(60, "Applying brightness and contrast...");
        let mut gray = crate::types::gray_to_f32(&luma);
        if self.brightness != 0.0 {
            for p in gray.pixels_mut() {
                p.0[0] = (p.0[0] + self.brightness).clamp(0.0, 1.0);
            }
        }
        if self.contrast != 1.0 {
            for p in gray.pixels_mut() {
                p.0[0] = ((p.0[0] - 0.5) * self.contrast + 0.5).clamp(0.0, 1.0);
            }
        }

        progress.report(80, "Formatting output...");
        Ok(Image::gray_from_f32(&gray))
    }
}

impl Default for GrayscaleParams {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 1.0,
        }
    }
}

/// HSV adjustment: circular hue shift plus saturation/value scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvParams {
    hue_shift: f32,
    saturation_scale: f32,
    value_scale: f32,
}

impl HsvParams {
    /// Declarative parameter table rendered by front ends.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec {
            name: "hue_shift",
            kind: ParamKind::Float {
                min: -0.5,
                max: 0.5,
                default: 0.0,
            },
            help: "-0.5 to 0.5, wraps circularly",
        },
        ParamSpec {
            name: "saturation_scale",
            kind: ParamKind::Float {
                min: 0.0,
                max: 2.0,
                default: 1.0,
            },
            help: "0.0 (desaturated) to 2.0 (oversaturated)",
        },
        ParamSpec {
            name: "value_scale",
            kind: ParamKind::Float {
                min: 0.0,
                max: 2.0,
                default: 1.0,
            },
            help: "0.0 (black) to 2.0 (brighter)",
        },
    ];

    /// Validate and construct.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Parameter`] when `hue_shift` is outside
    /// `[-0.5, 0.5]` or either scale is outside `[0, 2]`.
    pub fn new(
        hue_shift: f32,
        saturation_scale: f32,
        value_scale: f32,
    ) -> Result<Self, OperationError> {
        if !(-0.5..=0.5).contains(&hue_shift) {
            return Err(OperationError::parameter(
                "hue_shift",
                format!("must be in [-0.5, 0.5], got {hue_shift}"),
            ));
        }
        for (name, value) in [
            ("saturation_scale", saturation_scale),
            ("value_scale", value_scale),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(OperationError::parameter(
                    name,
                    format!("must be in [0, 2], got {value}"),
                ));
            }
        }
        Ok(Self {
            hue_shift,
            saturation_scale,
            value_scale,
        })
    }

    /// Hue shift in turns.
    #[must_use]
    pub const fn hue_shift(&self) -> f32 {
        self.hue_shift
    }

    /// Saturation multiplier.
    #[must_use]
    pub const fn saturation_scale(&self) -> f32 {
        self.saturation_scale
    }

    /// Value (brightness) multiplier.
    #[must_use]
    pub const fn value_scale(&self) -> f32 {
        self.value_scale
    }

    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        progress.report(30, "Converting to HSV...");
        let rgb = image.to_rgb_f32()?;
        let mut hsv: Vec<(f32, f32, f32)> = rgb
            .pixels()
            .map(|p| rgb_to_hsv(p.0[0], p.0[1], p.0[2]))
            .collect();

        let adjusting = self.hue_shift != 0.0
            || self.saturation_scale != 1.0
            || self.value_scale != 1.0;
        if adjusting {
            progress.report(50, "Applying HSV adjustments...");
            for (h, s, v) in &mut hsv {
                if self.hue_shift != 0.0 {
                    *h = shift_hue(*h, self.hue_shift);
                }
                if self.saturation_scale != 1.0 {
                    *s = (*s * self.saturation_scale).clamp(0.0, 1.0);
                }
                if self.value_scale != 1.0 {
                    *v = (*v * self.value_scale).clamp(0.0, 1.0);
                }
            }
        }

        progress.report(70, "Converting back to RGB for display...");
        let (width, height) = rgb.dimensions();
        let mut out = crate::types::RgbF32::new(width, height);
        for (dst, &(h, s, v)) in out.pixels_mut().zip(hsv.iter()) {
            let (r, g, b) = hsv_to_rgb(h, s, v);
            dst.0 = [r, g, b];
        }
        Ok(Image::rgb_from_f32(&out))
    }
}

impl Default for HsvParams {
    fn default() -> Self {
        Self {
            hue_shift: 0.0,
            saturation_scale: 1.0,
            value_scale: 1.0,
        }
    }
}

/// Shift a hue in turns with circular wrap-around.
pub(crate) fn shift_hue(hue: f32, shift: f32) -> f32 {
    (hue + shift).rem_euclid(1.0)
}

/// RGB (each `[0, 1]`) to HSV with hue in turns (`[0, 1)`).
pub(crate) fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        (((g - b) / delta).rem_euclid(6.0)) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

/// HSV (hue in turns) back to RGB, each channel in `[0, 1]`.
pub(crate) fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h6 = (h.rem_euclid(1.0)) * 6.0;
    let chroma = v * s;
    let x = chroma * (1.0 - (h6 % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match h6 {
        h if h < 1.0 => (chroma, x, 0.0),
        h if h < 2.0 => (x, chroma, 0.0),
        h if h < 3.0 => (0.0, chroma, x),
        h if h < 4.0 => (0.0, x, chroma),
        h if h < 5.0 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = v - chroma;
    (r1 + m, g1 + m, b1 + m)
}

/// Fixed binary threshold over the grayscale preparation of the input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryThresholdParams {
    threshold: f32,
    invert: bool,
}

impl BinaryThresholdParams {
    /// Declarative parameter table rendered by front ends.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec {
            name: "threshold",
            kind: ParamKind::Float {
                min: 0.0,
                max: 1.0,
                default: 0.5,
            },
            help: "0.0 (black) to 1.0 (white)",
        },
        ParamSpec {
            name: "invert",
            kind: ParamKind::Bool { default: false },
            help: "swap black and white in the output",
        },
    ];

    /// Validate and construct.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Parameter`] when `threshold` is outside
    /// `[0, 1]`.
    pub fn new(threshold: f32, invert: bool) -> Result<Self, OperationError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(OperationError::parameter(
                "threshold",
                format!("must be in [0, 1], got {threshold}"),
            ));
        }
        Ok(Self { threshold, invert })
    }

    /// Threshold level in `[0, 1]`.
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether the binary output is complemented.
    #[must_use]
    pub const fn invert(&self) -> bool {
        self.invert
    }

    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        progress.report(30, "Preparing grayscale image...");
        let gray = image.to_gray_f32();

        progress.report(60, &format!("Applying threshold at {}...", self.threshold));
        let invert = self.invert;
        let threshold = self.threshold;
        if invert {
            progress.report(80, "Inverting image...");
        }
        Ok(Image::gray_from_mask(
            gray.width(),
            gray.height(),
            move |x, y| (gray.get_pixel(x, y).0[0] > threshold) != invert,
        ))
    }
}

impl Default for BinaryThresholdParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            invert: false,
        }
    }
}

/// Local-mean adaptive threshold over a square neighborhood.
///
/// A pixel becomes foreground when it exceeds the mean of its
/// `block_size`-sized window minus `constant`. The window is clamped at
/// the image borders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholdParams {
    block_size: u32,
    constant: f32,
}

impl AdaptiveThresholdParams {
    /// Declarative parameter table rendered by front ends.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec {
            name: "block_size",
            kind: ParamKind::Int {
                min: 3,
                max: 255,
                default: 35,
            },
            help: "neighborhood size in pixels; even values are bumped to the next odd",
        },
        ParamSpec {
            name: "constant",
            kind: ParamKind::Float {
                min: -0.5,
                max: 0.5,
                default: 0.0,
            },
            help: "offset subtracted from the local mean",
        },
    ];

    /// Validate and construct. An even `block_size` is silently
    /// incremented to the next odd value; this is deliberate
    /// normalization, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Parameter`] when `block_size < 3` or
    /// `constant` is not finite.
    pub fn new(block_size: u32, constant: f32) -> Result<Self, OperationError> {
        if block_size < 3 {
            return Err(OperationError::parameter(
                "block_size",
                format!("must be at least 3, got {block_size}"),
            ));
        }
        if !constant.is_finite() {
            return Err(OperationError::parameter(
                "constant",
                format!("must be finite, got {constant}"),
            ));
        }
        let block_size = if block_size % 2 == 0 {
            block_size + 1
        } else {
            block_size
        };
        Ok(Self {
            block_size,
            constant,
        })
    }

    /// Neighborhood size (always odd after construction).
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Offset subtracted from the local mean.
    #[must_use]
    pub const fn constant(&self) -> f32 {
        self.constant
    }

    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        progress.report(20, "Preparing grayscale image...");
        let gray = image.to_gray_f32();

        progress.report(40, "Computing adaptive threshold...");
        let means = local_means(&gray, self.block_size);

        progress.report(80, "Applying threshold...");
        let (width, height) = gray.dimensions();
        let constant = self.constant;
        Ok(Image::gray_from_mask(width, height, move |x, y| {
            let idx = (y * width + x) as usize;
            gray.get_pixel(x, y).0[0] > means[idx] - constant
        }))
    }
}

impl Default for AdaptiveThresholdParams {
    fn default() -> Self {
        Self {
            block_size: 35,
            constant: 0.0,
        }
    }
}

/// Per-pixel mean over a square window clamped at the borders, computed
/// through an integral image so the cost is independent of block size.
#[allow(clippy::cast_possible_truncation)]
fn local_means(gray: &GrayF32, block_size: u32) -> Vec<f32> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let radius = (block_size / 2) as usize;

    // integral[y][x] = sum of pixels in [0, y) x [0, x).
    let mut integral = vec![0.0f64; (w + 1) * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0.0f64;
        for x in 0..w {
            row_sum += f64::from(gray.get_pixel(x as u32, y as u32).0[0]);
            integral[(y + 1) * (w + 1) + (x + 1)] = integral[y * (w + 1) + (x + 1)] + row_sum;
        }
    }

    let mut means = Vec::with_capacity(w * h);
    for y in 0..h {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            let sum = integral[y1 * (w + 1) + x1] - integral[y0 * (w + 1) + x1]
                - integral[y1 * (w + 1) + x0]
                + integral[y0 * (w + 1) + x0];
            let area = ((y1 - y0) * (x1 - x0)) as f64;
            means.push((sum / area) as f32);
        }
    }
    means
}
