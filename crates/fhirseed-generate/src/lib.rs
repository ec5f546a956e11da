//! Record graph synthesis.
//!
//! Builds the shared clinic and practitioner pools, then one subject at a
//! time every dependent record the quantity rules ask for, drawing values
//! from the catalogs. All randomness flows from a single seed, so equal
//! inputs produce byte-identical output in either FHIR version.

pub mod assembler;
pub mod catalog;
pub mod errors;
pub mod factory;
pub mod model;
pub mod output;
pub mod planner;
pub mod pools;

pub use assembler::{Assembly, GraphAssembler};
pub use catalog::{Catalog, CatalogSet, CatalogTable};
pub use errors::GenerationError;
pub use model::{DEFAULT_SEED, GenerateOptions, GenerationIssue, GenerationReport, KindReport};
pub use output::json::{GraphDocument, parse_graph, read_graph, write_graph};
pub use planner::QuantityPlanner;
