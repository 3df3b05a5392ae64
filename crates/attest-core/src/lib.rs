//! Core evaluation engine for AI agent traces.
//!
//! The crate is organized around four subsystems:
//!
//! - [`trace`]: the canonical trace shape plus tree walking, aggregation and
//!   structural validation.
//! - [`providers`]: LLM and embedding capabilities behind narrow traits, with
//!   rate-limited and mock variants.
//! - [`assertions`]: the typed registry of evaluators sharing one result
//!   contract.
//! - [`pipeline`]: batch evaluation with per-assertion cost and latency
//!   accounting.
//!
//! [`sim`] hosts multi-turn user simulations and [`report`] renders batch
//! results for humans and machines.

pub mod assertions;
pub mod errors;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod sim;
pub mod trace;

pub use errors::EngineError;
pub use model::{Assertion, AssertionResult, AssertionStatus, BatchResult};
pub use trace::schema::{Step, StepType, Trace, TraceMetadata};
