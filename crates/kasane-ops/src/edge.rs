//! Edge Detection family: Roberts, Sobel, Scharr, and Prewitt operators.
//!
//! All four share one pipeline: luma preparation, optional Gaussian blur
//! (sigma 0 means skip, mirroring the blur wrapper's short-circuit),
//! normalization to `[0, 1]`, filter-specific gradient magnitude, optional
//! thresholding, and 8-bit formatting. Only the gradient step differs per
//! operator, selected through [`EdgeFilterKind`].

use serde::{Deserialize, Serialize};

use crate::catalog::{ParamKind, ParamSpec};
use crate::error::OperationError;
use crate::types::{GrayF32, Image, gray_to_f32};
use crate::progress::Progress;

/// Selects which gradient operator the edge detection pipeline applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeFilterKind {
    /// 2x2 cross-difference operator. Fast, noise-sensitive.
    Roberts,
    /// 3x3 smoothed central difference.
    Sobel,
    /// Sobel variant with better rotational symmetry.
    Scharr,
    /// 3x3 unweighted central difference.
    Prewitt,
}

impl EdgeFilterKind {
    /// Display name used for history labels and log messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Roberts => "Roberts Edge Detection",
            Self::Sobel => "Sobel Edge Detection",
            Self::Scharr => "Scharr Edge Detection",
            Self::Prewitt => "Prewitt Edge Detection",
        }
    }
}

/// Trait for gradient-magnitude computation strategies.
///
/// Input: a `[0, 1]` single-channel image. Output: gradient magnitude per
/// pixel, scaled to stay within `[0, 1]`.
pub trait GradientFilter {
    /// Compute the gradient magnitude of the given image.
    fn gradient(&self, image: &GrayF32) -> GrayF32;
}

impl GradientFilter for EdgeFilterKind {
    fn gradient(&self, image: &GrayF32) -> GrayF32 {
        match *self {
            Self::Roberts => roberts_magnitude(image),
            Self::Sobel => kernel_magnitude(image, &SOBEL_H, &SOBEL_V),
            Self::Scharr => kernel_magnitude(image, &SCHARR_H, &SCHARR_V),
            Self::Prewitt => kernel_magnitude(image, &PREWITT_H, &PREWITT_V),
        }
    }
}

// Kernels normalized by their weight sum so each directional response
// stays within [-1, 1] on [0, 1] input.
const SOBEL_H: [[f32; 3]; 3] = [
    [0.25, 0.5, 0.25],
    [0.0, 0.0, 0.0],
    [-0.25, -0.5, -0.25],
];
const SOBEL_V: [[f32; 3]; 3] = [
    [0.25, 0.0, -0.25],
    [0.5, 0.0, -0.5],
    [0.25, 0.0, -0.25],
];
const SCHARR_H: [[f32; 3]; 3] = [
    [0.1875, 0.625, 0.1875],
    [0.0, 0.0, 0.0],
    [-0.1875, -0.625, -0.1875],
];
const SCHARR_V: [[f32; 3]; 3] = [
    [0.1875, 0.0, -0.1875],
    [0.625, 0.0, -0.625],
    [0.1875, 0.0, -0.1875],
];
const PREWITT_H: [[f32; 3]; 3] = [
    [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
    [0.0, 0.0, 0.0],
    [-1.0 / 3.0, -1.0 / 3.0, -1.0 / 3.0],
];
const PREWITT_V: [[f32; 3]; 3] = [
    [1.0 / 3.0, 0.0, -1.0 / 3.0],
    [1.0 / 3.0, 0.0, -1.0 / 3.0],
    [1.0 / 3.0, 0.0, -1.0 / 3.0],
];

const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// Sample with border replication.
fn sample(image: &GrayF32, x: i64, y: i64) -> f32 {
    let xc = x.clamp(0, i64::from(image.width()) - 1);
    let yc = y.clamp(0, i64::from(image.height()) - 1);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let p = image.get_pixel(xc as u32, yc as u32);
    p.0[0]
}

/// Gradient magnitude from a horizontal/vertical 3x3 kernel pair, scaled
/// by `1/sqrt(2)` so the result stays within `[0, 1]`.
fn kernel_magnitude(image: &GrayF32, h: &[[f32; 3]; 3], v: &[[f32; 3]; 3]) -> GrayF32 {
    GrayF32::from_fn(image.width(), image.height(), |x, y| {
        let (mut gx, mut gy) = (0.0f32, 0.0f32);
        for (ky, (hrow, vrow)) in h.iter().zip(v.iter()).enumerate() {
            for (kx, (&hw, &vw)) in hrow.iter().zip(vrow.iter()).enumerate() {
                let value = sample(
                    image,
                    i64::from(x) + kx as i64 - 1,
                    i64::from(y) + ky as i64 - 1,
                );
                gx = hw.mul_add(value, gx);
                gy = vw.mul_add(value, gy);
            }
        }
        image::Luma([gx.hypot(gy) / SQRT_2])
    })
}

/// Roberts cross gradient magnitude over the 2x2 forward neighborhood,
/// scaled by `1/sqrt(2)`.
fn roberts_magnitude(image: &GrayF32) -> GrayF32 {
    GrayF32::from_fn(image.width(), image.height(), |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        let g1 = sample(image, x, y) - sample(image, x + 1, y + 1);
        let g2 = sample(image, x + 1, y) - sample(image, x, y + 1);
        image::Luma([g1.hypot(g2) / SQRT_2])
    })
}

/// Parameters shared by every edge detection operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeDetectParams {
    filter: EdgeFilterKind,
    threshold: Option<f32>,
    sigma: f32,
}

impl EdgeDetectParams {
    /// Declarative parameter table rendered by front ends (shared by all
    /// four operators).
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec {
            name: "threshold",
            kind: ParamKind::OptionalFloat { min: 0.0, max: 1.0 },
            help: "gradient threshold; unset or 0.0 keeps the raw magnitude",
        },
        ParamSpec {
            name: "sigma",
            kind: ParamKind::Float {
                min: 0.0,
                max: 5.0,
                default: 0.0,
            },
            help: "Gaussian blur applied before detection (0.0 = no blur)",
        },
    ];

    /// Validate and construct. A threshold of exactly `0.0` is treated as
    /// unset, matching the interface convention that 0 means "auto".
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Parameter`] when the threshold is outside
    /// `[0, 1]` or `sigma` is negative or non-finite.
    pub fn new(
        filter: EdgeFilterKind,
        threshold: Option<f32>,
        sigma: f32,
    ) -> Result<Self, OperationError> {
        if let Some(t) = threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(OperationError::parameter(
                    "threshold",
                    format!("must be in [0, 1] or unset, got {t}"),
                ));
            }
        }
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(OperationError::parameter(
                "sigma",
                format!("must be a non-negative number, got {sigma}"),
            ));
        }
        let threshold = threshold.filter(|&t| t > 0.0);
        Ok(Self {
            filter,
            threshold,
            sigma,
        })
    }

    /// Which gradient operator this instance applies.
    #[must_use]
    pub const fn filter(&self) -> EdgeFilterKind {
        self.filter
    }

    /// Effective threshold (`None` = keep the raw magnitude).
    #[must_use]
    pub const fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    /// Gaussian blur sigma (0 = no blur).
    #[must_use]
    pub const fn sigma(&self) -> f32 {
        self.sigma
    }

    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        progress.report(20, "Preparing grayscale image...");
        let mut luma = image.to_luma();

        if self.sigma > 0.0 {
            progress.report(40, &format!("Applying Gaussian blur (sigma={})...", self.sigma));
            luma = imageproc::filter::gaussian_blur_f32(&luma, self.sigma);
        }
        let gray = gray_to_f32(&luma);

        progress.report(60, &format!("Applying {} filter...", self.filter.name()));
        progress.checkpoint()?;
        let magnitude = self.filter.gradient(&gray);

        if let Some(threshold) = self.threshold {
            progress.report(80, &format!("Applying threshold ({threshold})..."));
            Ok(Image::gray_from_mask(
                magnitude.width(),
                magnitude.height(),
                move |x, y| magnitude.get_pixel(x, y).0[0] > threshold,
            ))
        } else {
            progress.report(90, "Formatting output...");
            Ok(Image::gray_from_f32(&magnitude))
        }
    }
}
