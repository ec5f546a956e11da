use thiserror::Error;

use crate::kind::EntityKind;
use crate::reference::LocalId;

/// Core error type shared across fhirseed crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The record graph violates a structural invariant.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
    /// A kind name did not match any known entity kind.
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
    /// A schema version string was not recognised.
    #[error("unknown schema version: {0}")]
    UnknownVersion(String),
    /// A reference field was rewritten a second time.
    #[error("reference {path} on {kind}/{local_id} is already linked")]
    AlreadyLinked {
        kind: EntityKind,
        local_id: LocalId,
        path: String,
    },
    /// The identifier map already holds a store id for this record.
    #[error("store id already recorded for {kind}/{local_id}")]
    DuplicateIdentifier { kind: EntityKind, local_id: LocalId },
    /// A reference target has no store identifier.
    #[error("no store id for {kind}/{local_id}")]
    Unresolved { kind: EntityKind, local_id: LocalId },
}

/// Convenience alias for results returned by fhirseed crates.
pub type Result<T> = std::result::Result<T, Error>;
