use aigpic_core::error::CoreError;

/// Errors surfaced to callers of the orchestrator.
///
/// Provider and execution failures never appear here; they become the
/// `failed` state of the job instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
