//! Morphological snakes (morphological ACWE) segmentation.
//!
//! A Chan-Vese variant that replaces the PDE solve with morphological
//! operators on a binary level set, trading accuracy for numerical
//! stability. Each iteration applies a region-mean balloon update and
//! then `smoothing` passes of the alternating sup-inf/inf-sup curvature
//! operator.
//!
//! The continuation contract is the progress handle: every iteration
//! reports and honors cancellation, so a front end can stop a long run
//! between iterations.

use serde::{Deserialize, Serialize};

use crate::catalog::{ParamKind, ParamSpec};
use crate::error::OperationError;
use crate::types::Image;
use crate::progress::Progress;

/// Three-point line structuring elements used by the curvature operator:
/// horizontal, vertical, and both diagonals.
const LINES: [[(i64, i64); 3]; 4] = [
    [(-1, 0), (0, 0), (1, 0)],
    [(0, -1), (0, 0), (0, 1)],
    [(-1, -1), (0, 0), (1, 1)],
    [(-1, 1), (0, 0), (1, -1)],
];

/// Morphological ACWE parameters. `iterations` and `smoothing` are
/// floored at 1; the region weights are unconstrained apart from
/// finiteness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MorphSnakesParams {
    iterations: u32,
    smoothing: u32,
    lambda1: f64,
    lambda2: f64,
}

impl MorphSnakesParams {
    /// Declarative parameter table rendered by front ends.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec {
            name: "iterations",
            kind: ParamKind::Int {
                min: 1,
                max: 200,
                default: 35,
            },
            help: "number of evolution steps",
        },
        ParamSpec {
            name: "smoothing",
            kind: ParamKind::Int {
                min: 1,
                max: 10,
                default: 1,
            },
            help: "curvature-smoothing passes per step",
        },
        ParamSpec {
            name: "lambda1",
            kind: ParamKind::Float {
                min: 0.1,
                max: 5.0,
                default: 1.0,
            },
            help: "weight of the inside-region energy",
        },
        ParamSpec {
            name: "lambda2",
            kind: ParamKind::Float {
                min: 0.1,
                max: 5.0,
                default: 1.0,
            },
            help: "weight of the outside-region energy",
        },
    ];

    /// Construct, flooring `iterations` and `smoothing` at 1.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Parameter`] when either region weight is
    /// not finite.
    pub fn new(
        iterations: u32,
        smoothing: u32,
        lambda1: f64,
        lambda2: f64,
    ) -> Result<Self, OperationError> {
        for (name, value) in [("lambda1", lambda1), ("lambda2", lambda2)] {
            if !value.is_finite() {
                return Err(OperationError::parameter(
                    name,
                    format!("must be finite, got {value}"),
                ));
            }
        }
        Ok(Self {
            iterations: iterations.max(1),
            smoothing: smoothing.max(1),
            lambda1,
            lambda2,
        })
    }

    /// Number of evolution steps (at least 1).
    #[must_use]
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Curvature-smoothing passes per step (at least 1).
    #[must_use]
    pub const fn smoothing(&self) -> u32 {
        self.smoothing
    }

    /// Re-run the construction checks and floors (used after
    /// deserialization, which bypasses [`new`](Self::new)).
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub(crate) fn validated(self) -> Result<Self, OperationError> {
        Self::new(self.iterations, self.smoothing, self.lambda1, self.lambda2)
    }

    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        progress.report(20, "Preparing grayscale image...");
        let gray = image.to_gray_f32();
        let (width, height) = gray.dimensions();
        let (w, h) = (width as usize, height as usize);
        let intensity: Vec<f64> = gray.pixels().map(|p| f64::from(p.0[0])).collect();

        progress.report(
            40,
            &format!(
                "Applying Morphological Snakes with iterations={}, smoothing={}...",
                self.iterations, self.smoothing,
            ),
        );

        let mut level_set = checkerboard(w, h);
        let mut flip = false;
        let step = (self.iterations / 20).max(1);

        for iteration in 0..self.iterations {
            progress.checkpoint()?;
            if iteration % step == 0 {
                #[allow(clippy::cast_possible_truncation)]
                let percent = 40 + (iteration * 60 / self.iterations) as u8;
                progress.report(
                    percent,
                    &format!("ACWE iteration {iteration}/{}...", self.iterations),
                );
            }

            self.balloon_update(&intensity, &mut level_set, w, h);
            for _ in 0..self.smoothing {
                level_set = if flip {
                    sup_inf(&inf_sup(&level_set, w, h), w, h)
                } else {
                    inf_sup(&sup_inf(&level_set, w, h), w, h)
                };
                flip = !flip;
            }
        }

        progress.report(95, "Formatting output...");
        Ok(Image::gray_from_mask(width, height, |x, y| {
            level_set[y as usize * w + x as usize]
        }))
    }

    /// Region-competition update: flip pixels along the level-set border
    /// toward the closer region mean.
    fn balloon_update(&self, intensity: &[f64], level_set: &mut [bool], w: usize, h: usize) {
        let (mut sum_in, mut n_in, mut sum_out, mut n_out) = (0.0f64, 0u64, 0.0f64, 0u64);
        for (&u, &inside) in intensity.iter().zip(level_set.iter()) {
            if inside {
                sum_in += u;
                n_in += 1;
            } else {
                sum_out += u;
                n_out += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let overall = (sum_in + sum_out) / (n_in + n_out).max(1) as f64;
        #[allow(clippy::cast_precision_loss)]
        let c1 = if n_in == 0 { overall } else { sum_in / n_in as f64 };
        #[allow(clippy::cast_precision_loss)]
        let c0 = if n_out == 0 { overall } else { sum_out / n_out as f64 };

        let value = |x: i64, y: i64| -> f64 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let idx = y.clamp(0, h as i64 - 1) as usize * w + x.clamp(0, w as i64 - 1) as usize;
            f64::from(u8::from(level_set[idx]))
        };

        let mut updated = level_set.to_vec();
        for y in 0..h {
            for x in 0..w {
                let (xi, yi) = (x as i64, y as i64);
                let gx = (value(xi + 1, yi) - value(xi - 1, yi)) / 2.0;
                let gy = (value(xi, yi + 1) - value(xi, yi - 1)) / 2.0;
                let gradient = gx.hypot(gy);
                if gradient == 0.0 {
                    continue;
                }
                let u = intensity[y * w + x];
                let aux = gradient
                    * self
                        .lambda1
                        .mul_add((u - c1).powi(2), -(self.lambda2 * (u - c0).powi(2)));
                if aux < 0.0 {
                    updated[y * w + x] = true;
                } else if aux > 0.0 {
                    updated[y * w + x] = false;
                }
            }
        }
        level_set.copy_from_slice(&updated);
    }
}

impl Default for MorphSnakesParams {
    fn default() -> Self {
        Self {
            iterations: 35,
            smoothing: 1,
            lambda1: 1.0,
            lambda2: 1.0,
        }
    }
}

/// Checkerboard binary level set with a 5-pixel cell size.
pub(crate) fn checkerboard(w: usize, h: usize) -> Vec<bool> {
    let mut level_set = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            level_set.push((x / 5 + y / 5) % 2 == 1);
        }
    }
    level_set
}

fn clamped(level_set: &[bool], w: usize, h: usize, x: i64, y: i64) -> bool {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = y.clamp(0, h as i64 - 1) as usize * w + x.clamp(0, w as i64 - 1) as usize;
    level_set[idx]
}

/// Sup-of-erosions curvature half-operator: for each pixel, erode along
/// each line structuring element and keep the largest response.
fn sup_inf(level_set: &[bool], w: usize, h: usize) -> Vec<bool> {
    let mut out = Vec::with_capacity(level_set.len());
    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as i64, y as i64);
            let value = LINES.iter().any(|line| {
                line.iter()
                    .all(|&(dx, dy)| clamped(level_set, w, h, xi + dx, yi + dy))
            });
            out.push(value);
        }
    }
    out
}

/// Inf-of-dilations curvature half-operator, the dual of [`sup_inf`].
fn inf_sup(level_set: &[bool], w: usize, h: usize) -> Vec<bool> {
    let mut out = Vec::with_capacity(level_set.len());
    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as i64, y as i64);
            let value = LINES.iter().all(|line| {
                line.iter()
                    .any(|&(dx, dy)| clamped(level_set, w, h, xi + dx, yi + dy))
            });
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma};

    use crate::progress::{CancelToken, NullSink};

    use super::*;

    /// Bright square on a dark background.
    fn square_image() -> Image {
        Image::Gray(GrayImage::from_fn(32, 32, |x, y| {
            Luma([if (8..24).contains(&x) && (8..24).contains(&y) {
                230
            } else {
                25
            }])
        }))
    }

    #[test]
    fn iterations_and_smoothing_are_floored_at_one() {
        let params = MorphSnakesParams::new(0, 0, 1.0, 1.0).unwrap();
        assert_eq!(params.iterations(), 1);
        assert_eq!(params.smoothing(), 1);
    }

    #[test]
    fn non_finite_weight_is_rejected() {
        assert!(matches!(
            MorphSnakesParams::new(10, 1, f64::INFINITY, 1.0),
            Err(OperationError::Parameter { name: "lambda1", .. }),
        ));
    }

    #[test]
    fn output_is_binary_with_input_dimensions() {
        let params = MorphSnakesParams::new(5, 1, 1.0, 1.0).unwrap();
        let out = params.compute(&square_image(), &Progress::silent()).unwrap();
        assert_eq!(out.dimensions(), (32, 32));
        let Image::Gray(buf) = out else {
            unreachable!("segmentation returns a gray image");
        };
        for p in buf.pixels() {
            assert!(p.0[0] == 0 || p.0[0] == 255);
        }
    }

    #[test]
    fn square_is_separated_from_background() {
        let params = MorphSnakesParams::new(40, 1, 1.0, 1.0).unwrap();
        let out = params.compute(&square_image(), &Progress::silent()).unwrap();
        let Image::Gray(buf) = out else {
            unreachable!("segmentation returns a gray image");
        };
        let center = buf.get_pixel(16, 16).0[0];
        let corner = buf.get_pixel(1, 1).0[0];
        assert_ne!(
            center, corner,
            "expected the square interior and the background in different phases",
        );
    }

    #[test]
    fn cancellation_aborts_the_iteration() {
        let token = CancelToken::new();
        token.cancel();
        let progress = Progress::new(&NullSink, token);
        assert!(matches!(
            MorphSnakesParams::default().compute(&square_image(), &progress),
            Err(OperationError::Cancelled),
        ));
    }

    #[test]
    fn checkerboard_has_both_phases() {
        let level_set = checkerboard(20, 20);
        assert!(level_set.iter().any(|&v| v));
        assert!(level_set.iter().any(|&v| !v));
    }

    #[test]
    fn curvature_operator_removes_isolated_pixels() {
        // A single inside pixel has no 3-point line fully inside, so the
        // sup-inf half-operator erases it.
        let mut level_set = vec![false; 9 * 9];
        level_set[4 * 9 + 4] = true;
        let smoothed = sup_inf(&level_set, 9, 9);
        assert!(smoothed.iter().all(|&v| !v));
    }
}
