//! The operation catalog: every concrete operation kind, its family, and
//! the declarative parameter descriptors front ends render from.
//!
//! # Strategy pattern
//!
//! Each variant of [`OperationKind`] carries its validated parameter
//! bundle; dispatch happens by matching on the variant. Front ends never
//! probe parameter structs for fields — [`catalog`] and the per-kind
//! `PARAMS` tables describe every tunable declaratively.

use serde::{Deserialize, Serialize};

use crate::chan_vese::ChanVeseParams;
use crate::conversion::{
    AdaptiveThresholdParams, BinaryThresholdParams, GrayscaleParams, HsvParams,
};
use crate::edge::{EdgeDetectParams, EdgeFilterKind};
use crate::error::OperationError;
use crate::types::Image;
use crate::morph_snakes::MorphSnakesParams;
use crate::progress::Progress;
use crate::segmentation::MultiOtsuParams;

/// One of the three operation families. Families share a validation and
/// preprocessing strategy; they also decide whether an operation insists
/// on the pristine source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    /// Colorspace conversions and thresholding.
    Conversion,
    /// Gradient-based edge detectors.
    EdgeDetection,
    /// Region segmentation.
    Segmentation,
}

impl Family {
    /// Whether operations of this family must always receive the pristine
    /// source image rather than chaining from a previous result.
    ///
    /// Declared metadata: the coordinator currently feeds every run from
    /// the original source regardless (see DESIGN.md).
    #[must_use]
    pub const fn uses_original_source(self) -> bool {
        matches!(self, Self::Conversion | Self::Segmentation)
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Conversion => "Conversion",
            Self::EdgeDetection => "Edge Detection",
            Self::Segmentation => "Segmentation",
        }
    }
}

/// A concrete, parameterized operation selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Grayscale conversion with brightness/contrast adjustment.
    Grayscale(GrayscaleParams),
    /// HSV adjustment (hue shift, saturation/value scaling).
    Hsv(HsvParams),
    /// Fixed binary threshold.
    BinaryThreshold(BinaryThresholdParams),
    /// Local-mean adaptive threshold.
    AdaptiveThreshold(AdaptiveThresholdParams),
    /// Gradient edge detection (Roberts, Sobel, Scharr, or Prewitt).
    EdgeDetect(EdgeDetectParams),
    /// Multi-Otsu histogram segmentation.
    MultiOtsu(MultiOtsuParams),
    /// Chan-Vese active-contour segmentation.
    ChanVese(ChanVeseParams),
    /// Morphological ACWE segmentation.
    MorphSnakes(MorphSnakesParams),
}

impl OperationKind {
    /// Stable human-readable name, used for history labels and log
    /// messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Grayscale(_) => "RGB to Grayscale",
            Self::Hsv(_) => "RGB to HSV",
            Self::BinaryThreshold(_) => "Binary Threshold",
            Self::AdaptiveThreshold(_) => "Adaptive Threshold",
            Self::EdgeDetect(p) => p.filter().name(),
            Self::MultiOtsu(_) => "Multi-Otsu Segmentation",
            Self::ChanVese(_) => "Chan-Vese Segmentation",
            Self::MorphSnakes(_) => "Morphological Snakes (ACWE)",
        }
    }

    /// The family this kind belongs to.
    #[must_use]
    pub const fn family(&self) -> Family {
        match self {
            Self::Grayscale(_)
            | Self::Hsv(_)
            | Self::BinaryThreshold(_)
            | Self::AdaptiveThreshold(_) => Family::Conversion,
            Self::EdgeDetect(_) => Family::EdgeDetection,
            Self::MultiOtsu(_) | Self::ChanVese(_) | Self::MorphSnakes(_) => Family::Segmentation,
        }
    }

    /// Kind-specific input validation beyond the shared shape checks.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] when the image does not
    /// meet this kind's channel requirements.
    pub(crate) fn validate(&self, image: &Image) -> Result<(), OperationError> {
        match self {
            Self::Grayscale(_) => {
                if image.channels() < 3 {
                    return Err(OperationError::InvalidInput(
                        "input must be an RGB image (3 channels)".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Hsv(_) => {
                if image.channels() < 3 {
                    return Err(OperationError::InvalidInput(
                        "HSV conversion requires an RGB image (3 channels)".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Delegate to the kind's transform.
    pub(crate) fn compute(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        match self {
            Self::Grayscale(p) => p.compute(image, progress),
            Self::Hsv(p) => p.compute(image, progress),
            Self::BinaryThreshold(p) => p.compute(image, progress),
            Self::AdaptiveThreshold(p) => p.compute(image, progress),
            Self::EdgeDetect(p) => p.compute(image, progress),
            Self::MultiOtsu(p) => p.compute(image, progress),
            Self::ChanVese(p) => p.compute(image, progress),
            Self::MorphSnakes(p) => p.compute(image, progress),
        }
    }

    /// Re-run construction-time validation on parameters that may have
    /// bypassed the constructors (e.g. a deserialized configuration).
    /// Normalizations (odd block size, class clamping, iteration floors)
    /// are re-applied the same way.
    ///
    /// # Errors
    ///
    /// Returns the same [`OperationError::Parameter`] the constructor
    /// would have produced.
    pub fn validated(self) -> Result<Self, OperationError> {
        Ok(match self {
            Self::Grayscale(p) => {
                Self::Grayscale(GrayscaleParams::new(p.brightness(), p.contrast())?)
            }
            Self::Hsv(p) => Self::Hsv(HsvParams::new(
                p.hue_shift(),
                p.saturation_scale(),
                p.value_scale(),
            )?),
            Self::BinaryThreshold(p) => {
                Self::BinaryThreshold(BinaryThresholdParams::new(p.threshold(), p.invert())?)
            }
            Self::AdaptiveThreshold(p) => Self::AdaptiveThreshold(AdaptiveThresholdParams::new(
                p.block_size(),
                p.constant(),
            )?),
            Self::EdgeDetect(p) => {
                Self::EdgeDetect(EdgeDetectParams::new(p.filter(), p.threshold(), p.sigma())?)
            }
            Self::MultiOtsu(p) => Self::MultiOtsu(MultiOtsuParams::new(p.classes())),
            Self::ChanVese(p) => p.validated().map(Self::ChanVese)?,
            Self::MorphSnakes(p) => p.validated().map(Self::MorphSnakes)?,
        })
    }
}

/// Kind of a single tunable parameter, with bounds and default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamKind {
    /// Floating-point value within `[min, max]`.
    Float {
        /// Smallest accepted value.
        min: f64,
        /// Largest accepted value.
        max: f64,
        /// Default value.
        default: f64,
    },
    /// Integer value within `[min, max]`.
    Int {
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
        /// Default value.
        default: i64,
    },
    /// Boolean flag.
    Bool {
        /// Default value.
        default: bool,
    },
    /// Floating-point value within `[min, max]`, or unset.
    OptionalFloat {
        /// Smallest accepted value.
        min: f64,
        /// Largest accepted value.
        max: f64,
    },
}

/// Declarative description of one tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    /// Parameter name as accepted by the constructors.
    pub name: &'static str,
    /// Value kind with bounds and default.
    pub kind: ParamKind,
    /// One-line help text.
    pub help: &'static str,
}

/// Declarative description of one catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OpDescriptor {
    /// Stable operation name (matches [`OperationKind::name`]).
    pub name: &'static str,
    /// Family the operation belongs to.
    pub family: Family,
    /// The operation's parameter table.
    pub params: &'static [ParamSpec],
}

/// Every operation the engine ships, in menu order.
#[must_use]
pub const fn catalog() -> &'static [OpDescriptor] {
    const CATALOG: &[OpDescriptor] = &[
        OpDescriptor {
            name: "RGB to Grayscale",
            family: Family::Conversion,
            params: GrayscaleParams::PARAMS,
        },
        OpDescriptor {
            name: "RGB to HSV",
            family: Family::Conversion,
            params: HsvParams::PARAMS,
        },
        OpDescriptor {
            name: "Binary Threshold",
            family: Family::Conversion,
            params: BinaryThresholdParams::PARAMS,
        },
        OpDescriptor {
            name: "Adaptive Threshold",
            family: Family::Conversion,
            params: AdaptiveThresholdParams::PARAMS,
        },
        OpDescriptor {
            name: "Roberts Edge Detection",
            family: Family::EdgeDetection,
            params: EdgeDetectParams::PARAMS,
        },
        OpDescriptor {
            name: "Sobel Edge Detection",
            family: Family::EdgeDetection,
            params: EdgeDetectParams::PARAMS,
        },
        OpDescriptor {
            name: "Scharr Edge Detection",
            family: Family::EdgeDetection,
            params: EdgeDetectParams::PARAMS,
        },
        OpDescriptor {
            name: "Prewitt Edge Detection",
            family: Family::EdgeDetection,
            params: EdgeDetectParams::PARAMS,
        },
        OpDescriptor {
            name: "Multi-Otsu Segmentation",
            family: Family::Segmentation,
            params: MultiOtsuParams::PARAMS,
        },
        OpDescriptor {
            name: "Chan-Vese Segmentation",
            family: Family::Segmentation,
            params: ChanVeseParams::PARAMS,
        },
        OpDescriptor {
            name: "Morphological Snakes (ACWE)",
            family: Family::Segmentation,
            params: MorphSnakesParams::PARAMS,
        },
    ];
    CATALOG
}
