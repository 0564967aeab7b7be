//! kasane-ops: Operation execution core (sans-IO).
//!
//! Defines the polymorphic operation model a front end drives:
//!
//! - [`Image`]: the 8-bit display-ready image value, with floating-point
//!   `[0, 1]` preparation helpers used inside transforms.
//! - [`Operation`]: the apply contract — snapshot, validate, compute —
//!   with logging, progress milestones, and cooperative cancellation.
//! - [`OperationKind`]: the catalog of concrete operations in three
//!   families (Conversion, Edge Detection, Segmentation), each carrying
//!   validated parameters and described declaratively by [`catalog`].
//!
//! This crate has **no I/O dependencies** — it transforms in-memory
//! images and returns structured errors. File loading and session
//! history live in `kasane-io` and `kasane-session`.

pub mod catalog;
pub mod chan_vese;
pub mod conversion;
pub mod edge;
pub mod error;
pub mod morph_snakes;
pub mod operation;
pub mod progress;
pub mod segmentation;
pub mod types;

pub use catalog::{Family, OpDescriptor, OperationKind, ParamKind, ParamSpec, catalog};
pub use error::OperationError;
pub use operation::Operation;
pub use progress::{CancelToken, NullSink, Progress, ProgressSink};
pub use types::Image;
