//! Judge module - per-case execution and request orchestration
//!
//! - `executor`: runs one case in a leased sandbox slot and grades it
//! - `grader`: output normalization and comparison
//! - `orchestrator`: compiles a request and fans its cases out

pub mod executor;
pub mod grader;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::CaseExecutor;
pub use grader::{normalize_output, outputs_match};
pub use orchestrator::JudgeEngine;
