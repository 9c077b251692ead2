//! The text-to-SQL pipeline.
//!
//! [`Pipeline`] wires context retrieval, SQL generation, syntax checking,
//! execution, and answer synthesis into a bounded-retry workflow. It runs
//! behind the admission controller; one [`state::PipelineState`] is created
//! per question and discarded with the response.

pub mod engine;
pub mod prompts;
pub mod state;

pub use engine::{Pipeline, QueryEngine};
pub use state::{PipelineOutcome, PipelineState};
