//! Error taxonomy for the operation execution core.

/// Errors surfaced by operation construction and execution.
///
/// All computation-layer failures are caught once, at the
/// [`Operation::apply`](crate::Operation::apply) boundary, logged with the
/// operation name, and returned unchanged to the caller. Nothing in this
/// crate recovers from them.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The input image failed the shared shape checks or an
    /// operation-specific channel-count requirement. Raised before any
    /// computation; no partial state change.
    #[error("invalid input image: {0}")]
    InvalidInput(String),

    /// An operation was constructed with an out-of-range or non-finite
    /// parameter. Raised at construction time, before any run.
    #[error("invalid parameter {name}: {reason}")]
    Parameter {
        /// Name of the offending parameter, as it appears in the catalog.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The transform step itself failed.
    #[error("computation failed: {0}")]
    Computation(String),

    /// The run was cancelled through its [`CancelToken`](crate::CancelToken)
    /// before completing.
    #[error("operation cancelled")]
    Cancelled,
}

impl OperationError {
    /// Shorthand for a [`Parameter`](Self::Parameter) error.
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Parameter {
            name,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_error_display_names_the_parameter() {
        let err = OperationError::parameter("sigma", "must be non-negative, got -1");
        assert_eq!(
            err.to_string(),
            "invalid parameter sigma: must be non-negative, got -1",
        );
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(OperationError::Cancelled.to_string(), "operation cancelled");
    }
}
