pub mod schema;
pub mod tree;
pub mod validate;

pub use schema::{Step, StepType, Trace, TraceMetadata};
pub use tree::{aggregate_metadata, delegations, find_by_agent, walk_preorder, AggregateMetadata};
pub use validate::{validate, TraceValidation};
