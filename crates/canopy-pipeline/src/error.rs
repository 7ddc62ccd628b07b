use canopy_core::{CanopyError, StoreError};
use thiserror::Error;

/// Errors that stop the pipeline from finalizing a run.
///
/// Strategy failures are not errors: they end up in the run's
/// [`FailureCause`](canopy_core::FailureCause).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Target lookup or other core failure
    #[error("{0}")]
    Core(#[from] CanopyError),

    /// The snapshot store rejected or failed to persist a run
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias using `PipelineError`.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::from(CanopyError::TargetNotFound {
            target_id: "north-side".to_string(),
        });
        assert_eq!(err.to_string(), "target not found: north-side");

        let err = PipelineError::from(StoreError::Backend("disk full".to_string()));
        assert_eq!(err.to_string(), "store error: storage backend error: disk full");
    }
}
