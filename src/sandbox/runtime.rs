//! Sandbox runtime interface
//!
//! The judge talks to the isolation runtime only through [`SandboxRuntime`],
//! so the isolate-backed implementation can be swapped for a fake in tests.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::SandboxError;

/// Everything needed to run one program inside a box
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Host path of the compiled program
    pub executable: PathBuf,
    /// Directory bound read-write into the box; holds the stdio files
    pub work_dir: PathBuf,
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    /// Where the runtime writes its metadata report (outside `work_dir`)
    pub meta: PathBuf,
    pub time_limit_ms: u32,
    /// Grace period after `time_limit_ms` before the program is killed
    pub extra_time_ms: u32,
    pub memory_limit_kb: u32,
}

/// Raw result of invoking the runtime; details are in the metadata report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRun {
    /// Runtime reported that the program finished normally
    pub success: bool,
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Prepare a fresh box
    async fn init(&self, box_id: u32) -> Result<(), SandboxError>;

    /// Run a program in an initialized box
    async fn run(&self, box_id: u32, spec: &RunSpec) -> Result<RawRun, SandboxError>;

    /// Tear the box down
    async fn cleanup(&self, box_id: u32) -> Result<(), SandboxError>;
}
