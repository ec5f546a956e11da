//! Generation configuration contracts and validation.
//!
//! The configuration document decides pool sizes, per-subject quantities and
//! explicit subject overrides. It is validated eagerly, first structurally
//! against its JSON Schema and then semantically, before anything is built.

pub mod errors;
pub mod model;
pub mod schema;
pub mod validate;

pub use errors::{IssueSeverity, PlanError, Result, ValidationIssue, ValidationReport};
pub use model::{
    AllergySpec, BaseCounts, ConditionSpec, DependentKind, Gender, GeneratorConfig, LinkKind,
    MedicationSpec, QuantityEntry, QuantityRule, SubjectOverride,
};
pub use schema::config_json_schema;
pub use validate::{
    ValidatedConfig, load_config_file, validate_config, validate_config_json, validate_semantics,
};
