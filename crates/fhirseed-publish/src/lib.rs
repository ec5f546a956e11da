//! Dependency-ordered publishing of a record graph to a FHIR store.
//!
//! Kinds are published in the topological order of the dependency DAG;
//! every kind a record depends on is fully created before the record is
//! submitted, and each reference is rewritten to the store-assigned id
//! exactly once.

pub mod errors;
pub mod http;
pub mod memory;
pub mod model;
pub mod publisher;
pub mod report;
pub mod transport;

pub use errors::PublishError;
pub use http::HttpTransport;
pub use memory::{MemoryStore, StoreBehavior};
pub use model::{DEFAULT_IGNORED_WARNINGS, OnError, PublishOptions};
pub use publisher::{PublishOutcome, Publisher, RecordState};
pub use report::{
    FailureClass, KindOutcome, PublishFailure, PublishReport, PublishWarning, VerificationFinding,
    render_summary,
};
pub use transport::{Created, Issue, Severity, StoreError, StoreTransport};
