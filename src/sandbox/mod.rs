//! Sandbox module - isolation runtime plumbing
//!
//! This module handles:
//! - The slot pool that leases isolate boxes to cases
//! - The runtime interface and its isolate implementation
//! - Parsing of isolate metadata reports
//!
//! The sandbox module does NOT:
//! - Grade output or decide verdicts
//! - Know about languages or compilation

pub mod isolate;
pub mod meta;
pub mod pool;
pub mod runtime;

// Re-exports for convenience
pub use isolate::IsolateRuntime;
pub use meta::{parse_meta, MetaReport, RunStatusCode};
pub use pool::{SlotLease, SlotPool};
pub use runtime::{RawRun, RunSpec, SandboxRuntime};
