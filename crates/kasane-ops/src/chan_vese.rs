//! Chan-Vese active-contour segmentation.
//!
//! Energy-minimizing level-set segmentation for objects without sharp
//! boundaries. The level set starts from a checkerboard pattern and
//! evolves by explicit gradient descent: a curvature term weighted by
//! `mu` regularizes the contour while the `lambda1`/`lambda2` region
//! terms pull it toward the two-phase partition of the image.
//!
//! Failing to converge within `max_iter` iterations is not an error;
//! the mask reached at that point is returned as the result.

use serde::{Deserialize, Serialize};

use crate::catalog::{ParamKind, ParamSpec};
use crate::error::OperationError;
use crate::types::Image;
use crate::progress::Progress;

/// Chan-Vese parameters.
///
/// `max_iter` is floored at 10 and `tol` at `1e-6`; both floors are
/// deliberate normalization. The energy weights are unconstrained apart
/// from finiteness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChanVeseParams {
    max_iter: u32,
    tol: f64,
    mu: f64,
    lambda1: f64,
    lambda2: f64,
    dt: f64,
}

impl ChanVeseParams {
    /// Declarative parameter table rendered by front ends.
    pub const PARAMS: &'static [ParamSpec] = &[
        ParamSpec {
            name: "max_iter",
            kind: ParamKind::Int {
                min: 10,
                max: 1000,
                default: 200,
            },
            help: "iteration cap; values below 10 are raised to 10",
        },
        ParamSpec {
            name: "tol",
            kind: ParamKind::Float {
                min: 1e-6,
                max: 0.01,
                default: 1e-3,
            },
            help: "convergence tolerance on the level-set change",
        },
        ParamSpec {
            name: "mu",
            kind: ParamKind::Float {
                min: 0.0,
                max: 1.0,
                default: 0.25,
            },
            help: "contour length penalty",
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
        ParamSpec {
            name: "dt",
            kind: ParamKind::Float {
                min: 0.1,
                max: 2.0,
                default: 0.5,
            },
            help: "time step of the level-set update",
        },
    ];

    /// Construct, flooring `max_iter` at 10 and `tol` at `1e-6`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Parameter`] when any energy weight or the
    /// time step is not finite.
    pub fn new(
        max_iter: u32,
        tol: f64,
        mu: f64,
        lambda1: f64,
        lambda2: f64,
        dt: f64,
    ) -> Result<Self, OperationError> {
        for (name, value) in [("mu", mu), ("lambda1", lambda1), ("lambda2", lambda2), ("dt", dt)] {
            if !value.is_finite() {
                return Err(OperationError::parameter(
                    name,
                    format!("must be finite, got {value}"),
                ));
            }
        }
        if !tol.is_finite() {
            return Err(OperationError::parameter(
                "tol",
                format!("must be finite, got {tol}"),
            ));
        }
        Ok(Self {
            max_iter: max_iter.max(10),
            tol: tol.max(1e-6),
            mu,
            lambda1,
            lambda2,
            dt,
        })
    }

    /// Iteration cap (at least 10).
    #[must_use]
    pub const fn max_iter(&self) -> u32 {
        self.max_iter
    }

    /// Convergence tolerance (at least `1e-6`).
    #[must_use]
    pub const fn tol(&self) -> f64 {
        self.tol
    }

    /// Re-run the construction checks and floors (used after
    /// deserialization, which bypasses [`new`](Self::new)).
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub(crate) fn validated(self) -> Result<Self, OperationError> {
        Self::new(
            self.max_iter,
            self.tol,
            self.mu,
            self.lambda1,
            self.lambda2,
            self.dt,
        )
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

        progress.report(40, "Starting Chan-Vese segmentation...");
        let mut phi = checkerboard_level_set(w, h);
        let mut iterations_run = 0;
        let step = (self.max_iter / 20).max(1);

        for iteration in 0..self.max_iter {
            progress.checkpoint()?;
            if iteration % step == 0 {
                #[allow(clippy::cast_possible_truncation)]
                let percent = 40 + (iteration * 50 / self.max_iter) as u8;
                progress.report(
                    percent,
                    &format!("Chan-Vese iteration {iteration}/{}...", self.max_iter),
                );
            }

            let (c1, c2) = region_means(&intensity, &phi);
            let change = self.evolve(&intensity, &mut phi, w, h, c1, c2);
            iterations_run = iteration + 1;
            if change < self.tol {
                break;
            }
        }

        progress.report(
            95,
            &format!("Chan-Vese completed: {iterations_run} iterations"),
        );
        Ok(Image::gray_from_mask(width, height, |x, y| {
            phi[y as usize * w + x as usize] > 0.0
        }))
    }

    /// One explicit gradient-descent step. Returns the mean absolute
    /// level-set change.
    fn evolve(
        &self,
        intensity: &[f64],
        phi: &mut Vec<f64>,
        w: usize,
        h: usize,
        c1: f64,
        c2: f64,
    ) -> f64 {
        let at = |buf: &[f64], x: i64, y: i64| -> f64 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let idx = y.clamp(0, h as i64 - 1) as usize * w + x.clamp(0, w as i64 - 1) as usize;
            buf[idx]
        };

        let mut next = vec![0.0f64; phi.len()];
        let mut total_change = 0.0f64;
        for y in 0..h {
            for x in 0..w {
                let (xi, yi) = (x as i64, y as i64);
                let p = phi[y * w + x];

                let px = (at(phi, xi + 1, yi) - at(phi, xi - 1, yi)) / 2.0;
                let py = (at(phi, xi, yi + 1) - at(phi, xi, yi - 1)) / 2.0;
                let pxx = at(phi, xi + 1, yi) - 2.0 * p + at(phi, xi - 1, yi);
                let pyy = at(phi, xi, yi + 1) - 2.0 * p + at(phi, xi, yi - 1);
                let pxy = (at(phi, xi + 1, yi + 1) + at(phi, xi - 1, yi - 1)
                    - at(phi, xi + 1, yi - 1)
                    - at(phi, xi - 1, yi + 1))
                    / 4.0;

                let grad_sq = px * px + py * py;
                let curvature = px
                    .mul_add(-2.0 * py * pxy, pxx.mul_add(py * py, pyy * px * px))
                    / (grad_sq + 1e-8).powf(1.5);

                let u = intensity[y * w + x];
                let fit = self.lambda2.mul_add((u - c2).powi(2), -(self.lambda1 * (u - c1).powi(2)));
                let dirac = 1.0 / (std::f64::consts::PI * p.mul_add(p, 1.0));
                let updated = self.dt.mul_add(dirac * self.mu.mul_add(curvature, fit), p);

                total_change += (updated - p).abs();
                next[y * w + x] = updated;
            }
        }
        *phi = next;
        #[allow(clippy::cast_precision_loss)]
        let n = (w * h) as f64;
        total_change / n
    }
}

impl Default for ChanVeseParams {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol: 1e-3,
            mu: 0.25,
            lambda1: 1.0,
            lambda2: 1.0,
            dt: 0.5,
        }
    }
}

/// Checkerboard initial level set: `sin(pi x / 5) * sin(pi y / 5)`.
pub(crate) fn checkerboard_level_set(w: usize, h: usize) -> Vec<f64> {
    let period = std::f64::consts::PI / 5.0;
    let mut phi = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            #[allow(clippy::cast_precision_loss)]
            phi.push((period * x as f64).sin() * (period * y as f64).sin());
        }
    }
    phi
}

/// Mean intensity inside (`phi > 0`) and outside the contour. An empty
/// region falls back to the overall mean.
pub(crate) fn region_means(intensity: &[f64], phi: &[f64]) -> (f64, f64) {
    let (mut sum1, mut n1, mut sum2, mut n2) = (0.0f64, 0u64, 0.0f64, 0u64);
    for (&u, &p) in intensity.iter().zip(phi.iter()) {
        if p > 0.0 {
            sum1 += u;
            n1 += 1;
        } else {
            sum2 += u;
            n2 += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let overall = (sum1 + sum2) / (n1 + n2).max(1) as f64;
    #[allow(clippy::cast_precision_loss)]
    let c1 = if n1 == 0 { overall } else { sum1 / n1 as f64 };
    #[allow(clippy::cast_precision_loss)]
    let c2 = if n2 == 0 { overall } else { sum2 / n2 as f64 };
    (c1, c2)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma};

    use crate::progress::CancelToken;

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
    fn max_iter_is_floored_at_ten() {
        let params = ChanVeseParams::new(3, 1e-3, 0.25, 1.0, 1.0, 0.5).unwrap();
        assert_eq!(params.max_iter(), 10);
    }

    #[test]
    fn tol_is_floored() {
        let params = ChanVeseParams::new(100, 0.0, 0.25, 1.0, 1.0, 0.5).unwrap();
        assert!((params.tol() - 1e-6).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_weight_is_rejected() {
        assert!(matches!(
            ChanVeseParams::new(100, 1e-3, f64::NAN, 1.0, 1.0, 0.5),
            Err(OperationError::Parameter { name: "mu", .. }),
        ));
    }

    #[test]
    fn output_is_binary_with_input_dimensions() {
        let params = ChanVeseParams::new(30, 1e-3, 0.25, 1.0, 1.0, 0.5).unwrap();
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
        let params = ChanVeseParams::new(100, 1e-4, 0.1, 1.0, 1.0, 0.5).unwrap();
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
    fn non_convergence_is_still_success() {
        // Far too few iterations to converge on a noisy-ish input; the
        // partial mask is returned without error.
        let params = ChanVeseParams::new(10, 1e-6, 0.25, 1.0, 1.0, 0.5).unwrap();
        let result = params.compute(&square_image(), &Progress::silent());
        assert!(result.is_ok());
    }

    #[test]
    fn cancellation_aborts_the_iteration() {
        let token = CancelToken::new();
        token.cancel();
        let progress = Progress::new(&crate::progress::NullSink, token);
        let params = ChanVeseParams::default();
        assert!(matches!(
            params.compute(&square_image(), &progress),
            Err(OperationError::Cancelled),
        ));
    }

    #[test]
    fn checkerboard_alternates_sign() {
        let phi = checkerboard_level_set(10, 10);
        // Opposite corners of a half-period cell have opposite signs.
        assert!(phi[10 * 2 + 2] * phi[10 * 2 + 7] < 0.0);
    }

    #[test]
    fn region_means_split_a_two_level_signal() {
        let intensity = vec![0.0, 0.0, 1.0, 1.0];
        let phi = vec![-1.0, -1.0, 1.0, 1.0];
        let (c1, c2) = region_means(&intensity, &phi);
        assert!((c1 - 1.0).abs() < f64::EPSILON);
        assert!(c2.abs() < f64::EPSILON);
    }
}
