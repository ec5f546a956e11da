use thiserror::Error;

use fhirseed_core::EntityKind;

/// Errors emitted while assembling or writing a record graph.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("catalog '{0}' is missing or empty")]
    CatalogMiss(String),
    #[error("catalog '{catalog}' entry {index} is malformed: {reason}")]
    CatalogEntry {
        catalog: String,
        index: usize,
        reason: String,
    },
    #[error("{kind} requires a {link} reference")]
    MissingLink { kind: EntityKind, link: &'static str },
    #[error("pool of {0} records is empty")]
    EmptyPool(EntityKind),
    #[error(transparent)]
    Core(#[from] fhirseed_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("output document is malformed: {0}")]
    Document(String),
}
