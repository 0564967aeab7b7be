//! The in-memory image value passed between operations.
//!
//! Display-ready images are always 8-bit: single-channel [`Gray`](Image::Gray),
//! three-channel [`Rgb`](Image::Rgb), or four-channel [`Rgba`](Image::Rgba).
//! Floating-point `[0, 1]` buffers ([`GrayF32`], [`RgbF32`]) exist only as
//! intermediates inside operation compute steps and never leave this crate.
//!
//! Operations never mutate their input. Every transform borrows an `Image`
//! and returns a freshly allocated one.

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, RgbaImage};

use crate::error::OperationError;

/// Re-export the raster buffer types so downstream crates can construct
/// images without depending on `image` directly.
pub use image::{GrayImage as GrayBuffer, RgbImage as RgbBuffer, RgbaImage as RgbaBuffer};

/// Single-channel floating-point intermediate, values in `[0, 1]`.
pub type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Three-channel floating-point intermediate, values in `[0, 1]`.
pub type RgbF32 = ImageBuffer<Rgb<f32>, Vec<f32>>;

/// Luma weights for RGB-to-grayscale conversion (ITU-R 709 primaries,
/// as used by the reference filters this catalog mirrors).
pub(crate) const LUMA_WEIGHTS: [f32; 3] = [0.2125, 0.7154, 0.0721];

/// A display-ready 8-bit image in one of the three supported layouts.
#[derive(Debug, Clone, PartialEq)]
pub enum Image {
    /// Two-dimensional single-channel image.
    Gray(GrayImage),
    /// Three-channel color image.
    Rgb(RgbImage),
    /// Four-channel color image. The alpha channel is stripped before
    /// any computation.
    Rgba(RgbaImage),
}

impl Image {
    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::Gray(b) => b.width(),
            Self::Rgb(b) => b.width(),
            Self::Rgba(b) => b.width(),
        }
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            Self::Gray(b) => b.height(),
            Self::Rgb(b) => b.height(),
            Self::Rgba(b) => b.height(),
        }
    }

    /// `(width, height)` in pixels.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Number of channels in the stored layout.
    #[must_use]
    pub const fn channels(&self) -> u8 {
        match self {
            Self::Gray(_) => 1,
            Self::Rgb(_) => 3,
            Self::Rgba(_) => 4,
        }
    }

    /// Returns `true` if the image holds no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Shared validation applied to every operation input: the image must
    /// hold at least one pixel. (The 2-or-3-dimension rule of the contract
    /// is carried by the type itself — every variant is a valid layout.)
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for an empty image.
    pub fn validate_shape(&self) -> Result<(), OperationError> {
        if self.is_empty() {
            return Err(OperationError::InvalidInput(
                "input image is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Weighted-luma conversion to a single-channel 8-bit image.
    ///
    /// Strips the alpha channel if present. Gray input is returned as a
    /// copy unchanged.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_luma(&self) -> GrayImage {
        let luma = |r: u8, g: u8, b: u8| -> u8 {
            let [wr, wg, wb] = LUMA_WEIGHTS;
            let y = wb.mul_add(
                f32::from(b),
                wr.mul_add(f32::from(r), wg * f32::from(g)),
            );
            y.round().clamp(0.0, 255.0) as u8
        };
        match self {
            Self::Gray(buf) => buf.clone(),
            Self::Rgb(buf) => GrayImage::from_fn(buf.width(), buf.height(), |x, y| {
                let [r, g, b] = buf.get_pixel(x, y).0;
                Luma([luma(r, g, b)])
            }),
            Self::Rgba(buf) => GrayImage::from_fn(buf.width(), buf.height(), |x, y| {
                let [r, g, b, _] = buf.get_pixel(x, y).0;
                Luma([luma(r, g, b)])
            }),
        }
    }

    /// Grayscale preparation shared by thresholding, edge detection, and
    /// segmentation: alpha stripped, weighted luma, normalized to `[0, 1]`.
    #[must_use]
    pub fn to_gray_f32(&self) -> GrayF32 {
        gray_to_f32(&self.to_luma())
    }

    /// Convert to a three-channel floating-point buffer in `[0, 1]`,
    /// stripping alpha if present.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for single-channel input.
    pub fn to_rgb_f32(&self) -> Result<RgbF32, OperationError> {
        let convert = |r: u8, g: u8, b: u8| {
            Rgb([
                f32::from(r) / 255.0,
                f32::from(g) / 255.0,
                f32::from(b) / 255.0,
            ])
        };
        match self {
            Self::Gray(_) => Err(OperationError::InvalidInput(
                "a color image (3 channels) is required".to_string(),
            )),
            Self::Rgb(buf) => Ok(RgbF32::from_fn(buf.width(), buf.height(), |x, y| {
                let [r, g, b] = buf.get_pixel(x, y).0;
                convert(r, g, b)
            })),
            Self::Rgba(buf) => Ok(RgbF32::from_fn(buf.width(), buf.height(), |x, y| {
                let [r, g, b, _] = buf.get_pixel(x, y).0;
                convert(r, g, b)
            })),
        }
    }

    /// Format a `[0, 1]` single-channel buffer as a display-ready image.
    /// Values are clipped before quantization.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn gray_from_f32(buf: &GrayF32) -> Self {
        Self::Gray(GrayImage::from_fn(buf.width(), buf.height(), |x, y| {
            let v = buf.get_pixel(x, y).0[0];
            Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
        }))
    }

    /// Format a `[0, 1]` three-channel buffer as a display-ready image.
    /// Values are clipped before quantization.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn rgb_from_f32(buf: &RgbF32) -> Self {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::Rgb(RgbImage::from_fn(buf.width(), buf.height(), |x, y| {
            let [r, g, b] = buf.get_pixel(x, y).0;
            Rgb([quantize(r), quantize(g), quantize(b)])
        }))
    }

    /// Build a binary 8-bit image (`0` / `255`) from a per-pixel predicate.
    pub(crate) fn gray_from_mask(
        width: u32,
        height: u32,
        mask: impl Fn(u32, u32) -> bool,
    ) -> Self {
        Self::Gray(GrayImage::from_fn(width, height, |x, y| {
            Luma([if mask(x, y) { 255 } else { 0 }])
        }))
    }
}

/// Normalize an 8-bit single-channel buffer to floating point `[0, 1]`.
#[must_use]
pub(crate) fn gray_to_f32(buf: &GrayImage) -> GrayF32 {
    GrayF32::from_fn(buf.width(), buf.height(), |x, y| {
        Luma([f32::from(buf.get_pixel(x, y).0[0]) / 255.0])
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn channels_match_layout() {
        assert_eq!(Image::Gray(GrayImage::new(2, 2)).channels(), 1);
        assert_eq!(Image::Rgb(RgbImage::new(2, 2)).channels(), 3);
        assert_eq!(Image::Rgba(RgbaImage::new(2, 2)).channels(), 4);
    }

    #[test]
    fn empty_image_fails_shape_validation() {
        let img = Image::Gray(GrayImage::new(0, 0));
        assert!(matches!(
            img.validate_shape(),
            Err(OperationError::InvalidInput(_)),
        ));
    }

    #[test]
    fn non_empty_image_passes_shape_validation() {
        let img = Image::Rgb(RgbImage::new(3, 5));
        assert!(img.validate_shape().is_ok());
    }

    #[test]
    fn luma_weights_order_green_brightest() {
        let red = Image::Rgb(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])));
        let green = Image::Rgb(RgbImage::from_pixel(1, 1, Rgb([0, 255, 0])));
        let blue = Image::Rgb(RgbImage::from_pixel(1, 1, Rgb([0, 0, 255])));

        let r = red.to_luma().get_pixel(0, 0).0[0];
        let g = green.to_luma().get_pixel(0, 0).0[0];
        let b = blue.to_luma().get_pixel(0, 0).0[0];
        assert!(
            g > r && r > b,
            "expected green > red > blue luminance, got R={r} G={g} B={b}",
        );
    }

    #[test]
    fn luma_of_gray_is_identity() {
        let buf = GrayImage::from_fn(4, 4, |x, y| Luma([u8::try_from(x * 16 + y).unwrap_or(0)]));
        let img = Image::Gray(buf.clone());
        assert_eq!(img.to_luma(), buf);
    }

    #[test]
    fn alpha_is_stripped_in_luma() {
        let opaque = Image::Rgba(RgbaImage::from_pixel(2, 2, image::Rgba([80, 120, 40, 255])));
        let transparent =
            Image::Rgba(RgbaImage::from_pixel(2, 2, image::Rgba([80, 120, 40, 0])));
        assert_eq!(opaque.to_luma(), transparent.to_luma());
    }

    #[test]
    fn gray_f32_is_normalized() {
        let img = Image::Gray(GrayImage::from_pixel(2, 2, Luma([255])));
        let f = img.to_gray_f32();
        for p in f.pixels() {
            assert!((p.0[0] - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn rgb_f32_rejects_gray_input() {
        let img = Image::Gray(GrayImage::new(2, 2));
        assert!(matches!(
            img.to_rgb_f32(),
            Err(OperationError::InvalidInput(_)),
        ));
    }

    #[test]
    fn gray_from_f32_clips_out_of_range() {
        let mut buf = GrayF32::new(2, 1);
        buf.put_pixel(0, 0, Luma([-0.5]));
        buf.put_pixel(1, 0, Luma([1.5]));
        let Image::Gray(out) = Image::gray_from_f32(&buf) else {
            unreachable!("gray_from_f32 returns a gray image");
        };
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn mask_image_contains_only_binary_values() {
        let img = Image::gray_from_mask(4, 4, |x, _| x % 2 == 0);
        let Image::Gray(buf) = img else {
            unreachable!("gray_from_mask returns a gray image");
        };
        for p in buf.pixels() {
            assert!(p.0[0] == 0 || p.0[0] == 255);
        }
    }
}
