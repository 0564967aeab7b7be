//! The operation contract.
//!
//! [`Operation`] pairs a catalog kind with the transient input snapshot
//! taken at the top of each run. [`Operation::apply`] is the single entry
//! point every front end goes through; it owns the four-phase sequence
//! (snapshot, shared validation, kind validation, compute) and the
//! log-and-return error path, so the concrete transforms stay free of
//! error-recovery logic.

use crate::catalog::OperationKind;
use crate::error::OperationError;
use crate::types::Image;
use crate::progress::Progress;

/// A named, parameterized transform from one image to another.
#[derive(Debug, Clone)]
pub struct Operation {
    kind: OperationKind,
    last_input: Option<Image>,
}

impl Operation {
    /// Wrap a catalog kind into a runnable operation.
    #[must_use]
    pub const fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            last_input: None,
        }
    }

    /// The underlying catalog kind.
    #[must_use]
    pub const fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// Stable human-readable name, used for history labels and log
    /// messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Whether this operation must always receive the pristine source
    /// image. Declared metadata; see the family policy.
    #[must_use]
    pub const fn uses_original_source(&self) -> bool {
        self.kind.family().uses_original_source()
    }

    /// The input snapshot captured by the most recent [`apply`](Self::apply)
    /// call — the legacy single-step in-operation undo, independent of the
    /// session history.
    #[must_use]
    pub const fn last_input(&self) -> Option<&Image> {
        self.last_input.as_ref()
    }

    /// Run the operation.
    ///
    /// Phases: report start, snapshot the input, shared shape validation,
    /// kind-specific validation, compute, report completion. Any failure
    /// is logged with the operation name, reported as a terminal progress
    /// message, and returned unchanged — the previous output of whoever
    /// called us stays authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for images violating the
    /// shape or channel contracts, [`OperationError::Cancelled`] when the
    /// run's token is flipped, and [`OperationError::Computation`] when
    /// the transform itself fails.
    pub fn apply(
        &mut self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        let name = self.name();
        progress.report(0, &format!("Starting {name}..."));

        // Snapshot before validation, as the contract requires.
        self.last_input = Some(image.clone());

        let result = self.apply_inner(image, progress);
        match result {
            Ok(output) => {
                progress.report(100, &format!("{name} complete."));
                Ok(output)
            }
            Err(err) => {
                log::error!("{name} failed: {err}");
                progress.report(100, &format!("Error: {err}"));
                Err(err)
            }
        }
    }

    fn apply_inner(
        &self,
        image: &Image,
        progress: &Progress<'_>,
    ) -> Result<Image, OperationError> {
        image.validate_shape()?;
        self.kind.validate(image)?;
        progress.report(10, "Input validated.");
        progress.checkpoint()?;
        self.kind.compute(image, progress)
    }
}

impl From<OperationKind> for Operation {
    fn from(kind: OperationKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use image::{GrayImage, Rgb, RgbImage};

    use crate::catalog::OperationKind;
    use crate::conversion::{BinaryThresholdParams, GrayscaleParams};
    use crate::edge::{EdgeDetectParams, EdgeFilterKind};
    use crate::progress::{CancelToken, ProgressSink};

    use super::*;

    struct Recorder(RefCell<Vec<(u8, String)>>);

    impl ProgressSink for Recorder {
        fn report(&self, percent: u8, message: &str) {
            self.0.borrow_mut().push((percent, message.to_string()));
        }
    }

    fn rgb_image() -> Image {
        Image::Rgb(RgbImage::from_fn(8, 8, |x, y| {
            Rgb([
                u8::try_from(x * 30).unwrap_or(255),
                u8::try_from(y * 30).unwrap_or(255),
                100,
            ])
        }))
    }

    #[test]
    fn apply_reports_start_and_completion() {
        let sink = Recorder(RefCell::new(Vec::new()));
        let progress = Progress::new(&sink, CancelToken::new());
        let mut op = Operation::new(OperationKind::Grayscale(GrayscaleParams::default()));
        op.apply(&rgb_image(), &progress).unwrap();

        let reports = sink.0.borrow();
        assert_eq!(reports.first().map(|(p, _)| *p), Some(0));
        assert_eq!(reports.last().map(|(p, _)| *p), Some(100));
        assert!(reports.last().unwrap().1.contains("complete"));
    }

    #[test]
    fn apply_snapshots_the_input_even_on_failure() {
        // Grayscale rejects single-channel input, but the snapshot is
        // taken before validation runs.
        let gray = Image::Gray(GrayImage::new(4, 4));
        let mut op = Operation::new(OperationKind::Grayscale(GrayscaleParams::default()));
        let result = op.apply(&gray, &Progress::silent());
        assert!(matches!(result, Err(OperationError::InvalidInput(_))));
        assert_eq!(op.last_input(), Some(&gray));
    }

    #[test]
    fn failed_apply_reports_a_terminal_error_message() {
        let sink = Recorder(RefCell::new(Vec::new()));
        let progress = Progress::new(&sink, CancelToken::new());
        let mut op = Operation::new(OperationKind::Grayscale(GrayscaleParams::default()));
        let gray = Image::Gray(GrayImage::new(4, 4));
        assert!(op.apply(&gray, &progress).is_err());

        let reports = sink.0.borrow();
        let (percent, message) = reports.last().unwrap();
        assert_eq!(*percent, 100);
        assert!(message.starts_with("Error:"), "got {message:?}");
    }

    #[test]
    fn empty_image_is_rejected_before_compute() {
        let empty = Image::Gray(GrayImage::new(0, 0));
        let mut op =
            Operation::new(OperationKind::BinaryThreshold(BinaryThresholdParams::default()));
        assert!(matches!(
            op.apply(&empty, &Progress::silent()),
            Err(OperationError::InvalidInput(_)),
        ));
    }

    #[test]
    fn cancellation_short_circuits_after_validation() {
        let token = CancelToken::new();
        token.cancel();
        let progress = Progress::new(&crate::progress::NullSink, token);
        let mut op =
            Operation::new(OperationKind::BinaryThreshold(BinaryThresholdParams::default()));
        assert!(matches!(
            op.apply(&rgb_image(), &progress),
            Err(OperationError::Cancelled),
        ));
    }

    #[test]
    fn output_preserves_input_dimensions() {
        let img = rgb_image();
        for kind in [
            OperationKind::Grayscale(GrayscaleParams::default()),
            OperationKind::BinaryThreshold(BinaryThresholdParams::default()),
            OperationKind::EdgeDetect(
                EdgeDetectParams::new(EdgeFilterKind::Sobel, None, 0.0).unwrap(),
            ),
        ] {
            let mut op = Operation::new(kind);
            let out = op.apply(&img, &Progress::silent()).unwrap();
            assert_eq!(out.dimensions(), img.dimensions(), "{}", op.name());
        }
    }

    #[test]
    fn source_policy_follows_the_family() {
        let conversion = Operation::new(OperationKind::Grayscale(GrayscaleParams::default()));
        assert!(conversion.uses_original_source());
        let edge = Operation::new(OperationKind::EdgeDetect(
            EdgeDetectParams::new(EdgeFilterKind::Prewitt, None, 0.0).unwrap(),
        ));
        assert!(!edge.uses_original_source());
    }
}
