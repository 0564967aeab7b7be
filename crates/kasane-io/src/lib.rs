//! kasane-io: image file loading and saving.
//!
//! Maps decoded files (PNG, JPEG, BMP, TIFF) onto the [`Image`] layout
//! invariants: 8-bit gray, RGB, or RGBA. Anything else the decoder
//! produces (16-bit, float, palette) is converted to 8-bit RGB. Saving
//! encodes by file extension.
//!
//! The session core treats these as collaborator functions; a loaded
//! image satisfies the shape invariants before it enters a session.

use std::path::Path;

use image::DynamicImage;
use kasane_ops::Image;

/// Errors from loading or saving image files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying filesystem error.
        source: std::io::Error,
    },

    /// The file contents were empty.
    #[error("image file is empty")]
    EmptyFile,

    /// The bytes could not be decoded as a supported image format.
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// The image could not be encoded or written.
    #[error("failed to save image: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decode raw image bytes into an [`Image`].
///
/// 8-bit gray/RGB/RGBA layouts are taken as-is; everything else is
/// converted to 8-bit RGB.
///
/// # Errors
///
/// Returns [`IoError::EmptyFile`] for empty input and [`IoError::Decode`]
/// for unrecognized or corrupt data.
pub fn decode(bytes: &[u8]) -> Result<Image, IoError> {
    if bytes.is_empty() {
        return Err(IoError::EmptyFile);
    }
    let decoded = image::load_from_memory(bytes).map_err(IoError::Decode)?;
    Ok(match decoded {
        DynamicImage::ImageLuma8(buf) => Image::Gray(buf),
        DynamicImage::ImageRgb8(buf) => Image::Rgb(buf),
        DynamicImage::ImageRgba8(buf) => Image::Rgba(buf),
        other => Image::Rgb(other.to_rgb8()),
    })
}

/// Load an image file from disk.
///
/// # Errors
///
/// Returns [`IoError::Read`] when the file cannot be read, plus the
/// [`decode`] errors.
pub fn load(path: &Path) -> Result<Image, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.display().to_string(),
        source,
    })?;
    decode(&bytes)
}

/// Save an image to disk; the format follows the file extension.
///
/// # Errors
///
/// Returns [`IoError::Encode`] when encoding or writing fails (including
/// an unrecognized extension).
pub fn save(image: &Image, path: &Path) -> Result<(), IoError> {
    match image {
        Image::Gray(buf) => buf.save(path),
        Image::Rgb(buf) => buf.save(path),
        Image::Rgba(buf) => buf.save(path),
    }
    .map_err(IoError::Encode)
}
