//! Multi-Otsu segmentation.
//!
//! Finds `classes - 1` thresholds over a 256-bin histogram of the
//! grayscale preparation by exhaustively maximizing the between-class
//! variance, then buckets pixels by threshold index and rescales the
//! region indices across the 8-bit range, so the output has exactly
//! `classes` distinct gray levels.

use serde::{Deserialize, Serialize};

use crate::catalog::{ParamKind, ParamSpec};
use crate::error::OperationError;
use crate::types::Image;
use crate::progress::Progress;

/// Number of histogram bins used for threshold search.
const BINS: usize = 256;

/// Multi-Otsu parameters. The class count is silently clamped into
/// `[2, 5]`; deliberate normalization, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiOtsuParams {
    classes: u8,
}

impl MultiOtsuParams {
    /// Declarative parameter table rendered by front ends.
    pub const PARAMS: &'static [ParamSpec] = &[ParamSpec {
        name: "classes",
        kind: ParamKind::Int {
            min: 2,
            max: 5,
            default: 3,
        },
        help: "number of segments; values outside [2, 5] are clamped",
    }];

    /// Construct, clamping `classes` into `[2, 5]`.
    #[must_use]
    pub const fn new(classes: u8) -> Self {
        let classes = if classes < 2 {
            2
        } else if classes > 5 {
            5
        } else {
            classes
        };
        Self { classes }
    }

    /// Number of output classes (always within `[2, 5]`).
    #[must_use]
    pub const fn classes(&self) -> u8 {
        self.classes
    }

    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        progress.report(20, "Preparing grayscale image...");
        let gray = image.to_gray_f32();

        progress.report(40, "Computing Otsu thresholds...");
        progress.checkpoint()?;
        let mut histogram = [0.0f64; BINS];
        for p in gray.pixels() {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bin = ((p.0[0] * 255.0).round() as usize).min(BINS - 1);
            histogram[bin] += 1.0;
        }
        let threshold_bins = multi_otsu_bins(&histogram, usize::from(self.classes));

        progress.report(60, "Applying segmentation...");
        #[allow(clippy::cast_precision_loss)]
        let thresholds: Vec<f32> = threshold_bins
            .iter()
            .map(|&t| (t as f32 + 0.5) / 255.0)
            .collect();

        progress.report(80, "Formatting output...");
        let levels = f32::from(self.classes - 1);
        let (width, height) = gray.dimensions();
        let mut out = image::GrayImage::new(width, height);
        for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
            let region = thresholds.iter().filter(|&&t| src.0[0] > t).count();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            {
                dst.0[0] = (region as f32 / levels * 255.0).round() as u8;
            }
        }
        Ok(Image::Gray(out))
    }
}

impl Default for MultiOtsuParams {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Exhaustively search for the `classes - 1` threshold bins maximizing
/// between-class variance (equivalently, maximizing the sum of
/// `mean^2 / weight` over classes).
fn multi_otsu_bins(histogram: &[f64; BINS], classes: usize) -> Vec<usize> {
    // Prefix sums over weights and first moments.
    let mut weight = [0.0f64; BINS + 1];
    let mut moment = [0.0f64; BINS + 1];
    for (bin, &count) in histogram.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let level = bin as f64;
        weight[bin + 1] = weight[bin] + count;
        moment[bin + 1] = moment[bin] + count * level;
    }

    let mut best_score = f64::NEG_INFINITY;
    let mut best = vec![0usize; classes - 1];
    let mut current = Vec::with_capacity(classes - 1);
    search(
        &weight,
        &moment,
        0,
        classes - 1,
        0.0,
        &mut current,
        &mut best_score,
        &mut best,
    );
    best
}

/// Contribution of the class spanning bins `lo..=hi`.
fn class_score(weight: &[f64; BINS + 1], moment: &[f64; BINS + 1], lo: usize, hi: usize) -> f64 {
    let w = weight[hi + 1] - weight[lo];
    if w <= 0.0 {
        return 0.0;
    }
    let m = moment[hi + 1] - moment[lo];
    m * m / w
}

#[allow(clippy::too_many_arguments)]
fn search(
    weight: &[f64; BINS + 1],
    moment: &[f64; BINS + 1],
    start: usize,
    remaining: usize,
    score_so_far: f64,
    current: &mut Vec<usize>,
    best_score: &mut f64,
    best: &mut Vec<usize>,
) {
    if remaining == 0 {
        let total = score_so_far + class_score(weight, moment, start, BINS - 1);
        if total > *best_score {
            *best_score = total;
            best.clone_from(current);
        }
        return;
    }
    // Leave room for the remaining thresholds below the top bin.
    for t in start..(BINS - remaining) {
        let class = class_score(weight, moment, start, t);
        current.push(t);
        search(
            weight,
            moment,
            t + 1,
            remaining - 1,
            score_so_far + class,
            current,
            best_score,
            best,
        );
        current.pop();
    }
}
