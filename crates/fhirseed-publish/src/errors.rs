use thiserror::Error;

/// Errors that stop a publish run before or outside per-record handling.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid publish options: {0}")]
    Options(String),
    #[error(transparent)]
    Core(#[from] fhirseed_core::Error),
    #[error("publish task failed: {0}")]
    Task(String),
}
