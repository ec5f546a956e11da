//! Core contracts for fhirseed.
//!
//! This crate defines entity kinds and their dependency DAG, typed
//! references, records and record graphs, the identifier map filled in by
//! publishing, and the validation helpers shared by the other crates.

pub mod error;
pub mod graph;
pub mod identifiers;
pub mod kind;
pub mod record;
pub mod reference;
pub mod validation;
pub mod version;

pub use error::{Error, Result};
pub use graph::{DependencyGraph, DependencyGraphReport, DependencyGraphSummary};
pub use identifiers::{IdentifierEntry, IdentifierMap};
pub use kind::EntityKind;
pub use record::{Record, RecordGraph, ReferenceTriple};
pub use reference::{
    FieldPath, LocalId, PathSegment, Reference, ReferenceField, ReferenceStyle, StoreId,
};
pub use validation::{validate_graph, validate_links};
pub use version::FhirVersion;
