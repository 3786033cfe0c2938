//! In-process fakes for the sandbox runtime and the compiler

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::fs;

use crate::compiler::Compiler;
use crate::error::{CompileError, SandboxError};
use crate::sandbox::{RawRun, RunSpec, SandboxRuntime};

/// What a fake run produces
pub struct FakeRun {
    pub success: bool,
    pub meta: String,
    pub stdout: String,
}

impl FakeRun {
    pub fn ok(meta: &str, stdout: &str) -> Self {
        Self {
            success: true,
            meta: meta.to_string(),
            stdout: stdout.to_string(),
        }
    }

    pub fn failed(meta: &str) -> Self {
        Self {
            success: false,
            meta: meta.to_string(),
            stdout: String::new(),
        }
    }
}

type Script = Box<dyn Fn(&str) -> Result<FakeRun, SandboxError> + Send + Sync>;

/// Sandbox runtime that "runs" a script keyed on the case input
pub struct FakeRuntime {
    script: Script,
    delay: Duration,
    boxes: Mutex<HashSet<u32>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    double_leases: AtomicUsize,
    cleanups: AtomicUsize,
}

impl FakeRuntime {
    pub fn scripted(
        script: impl Fn(&str) -> Result<FakeRun, SandboxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            boxes: Mutex::new(HashSet::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            double_leases: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
        }
    }

    /// Copies stdin to stdout, reporting 10ms and 2048KB
    pub fn echo() -> Self {
        Self::scripted(|input| Ok(FakeRun::ok("time:0.010\nmax-rss:2048\n", input)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most boxes that were initialized at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Times a box was initialized while already in use
    pub fn double_leases(&self) -> usize {
        self.double_leases.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    async fn init(&self, box_id: u32) -> Result<(), SandboxError> {
        if !self.boxes.lock().unwrap().insert(box_id) {
            self.double_leases.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(())
    }

    async fn run(&self, _box_id: u32, spec: &RunSpec) -> Result<RawRun, SandboxError> {
        let input = fs::read_to_string(&spec.stdin).await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let run = (self.script)(&input)?;
        fs::write(&spec.meta, &run.meta).await?;
        fs::write(&spec.stdout, &run.stdout).await?;
        Ok(RawRun {
            success: run.success,
        })
    }

    async fn cleanup(&self, box_id: u32) -> Result<(), SandboxError> {
        self.boxes.lock().unwrap().remove(&box_id);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Compiler that writes a placeholder executable, or fails on `#error`
#[derive(Default)]
pub struct FakeCompiler {
    calls: AtomicUsize,
}

impl FakeCompiler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(
        &self,
        source: &str,
        _link_libs: &[String],
        out_dir: &Path,
    ) -> Result<PathBuf, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if source.contains("#error") {
            return Err(CompileError::Failed("main.cpp:1:2: error: #error".into()));
        }
        let executable = out_dir.join("main");
        fs::write(&executable, source).await?;
        Ok(executable)
    }
}
