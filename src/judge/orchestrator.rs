//! Judging orchestrator
//!
//! Compiles a submission once, then fans its test cases out to one tokio task
//! each. The slot pool limits how many of those tasks are inside a sandbox at
//! the same time; the rest wait for a slot. Results are collected from every
//! task before aggregation.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::executor::CaseExecutor;
use crate::compiler::{Compiler, GxxCompiler};
use crate::config::Settings;
use crate::error::JudgeError;
use crate::protocol::{CaseId, CaseResult, JudgeRequest, JudgeResponse, Language};
use crate::sandbox::{IsolateRuntime, SandboxRuntime, SlotPool};

pub struct JudgeEngine {
    compiler: Arc<dyn Compiler>,
    executor: Arc<CaseExecutor>,
    work_dir: PathBuf,
}

impl JudgeEngine {
    pub fn new(
        settings: &Settings,
        compiler: Arc<dyn Compiler>,
        runtime: Arc<dyn SandboxRuntime>,
    ) -> Self {
        let pool = SlotPool::new(settings.pool_size, settings.box_id_offset);
        Self {
            compiler,
            executor: Arc::new(CaseExecutor::new(pool, runtime)),
            work_dir: settings.work_dir.clone(),
        }
    }

    /// Engine backed by g++ and isolate
    pub fn from_settings(settings: &Settings) -> Self {
        let compiler = Arc::new(GxxCompiler::new(&settings.compiler));
        let runtime = Arc::new(IsolateRuntime::new(
            settings.isolate_path.clone(),
            settings.use_cgroups,
        ));
        Self::new(settings, compiler, runtime)
    }

    pub fn pool(&self) -> &Arc<SlotPool> {
        self.executor.pool()
    }

    /// Compile and run every case of `request`
    pub async fn judge(&self, request: JudgeRequest) -> Result<JudgeResponse, JudgeError> {
        let language = Language::parse(&request.language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(request.language.clone()))?;

        // Accepted for compatibility; grading does not consult it
        if request.no_score_check {
            debug!("noSC requested; ignored");
        }

        info!(
            "Judging {:?} submission: cases={}, link_libs={:?}",
            language,
            request.cases.len(),
            request.link_libs
        );

        fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| JudgeError::Internal(format!("cannot create work dir: {}", e)))?;
        let request_dir = tempfile::Builder::new()
            .prefix("request-")
            .tempdir_in(&self.work_dir)
            .map_err(|e| JudgeError::Internal(format!("cannot create request dir: {}", e)))?;

        let executable = self
            .compiler
            .compile(&request.code, &request.link_libs, request_dir.path())
            .await?;

        let scratch = request_dir.path().to_path_buf();
        let mut tasks = CaseTasks::with_capacity(request.cases.len());
        for case in request.cases {
            let executor = Arc::clone(&self.executor);
            let executable = executable.clone();
            let scratch = scratch.clone();
            let id = case.id.clone();
            let handle =
                tokio::spawn(async move { executor.execute(&case, &executable, &scratch).await });
            tasks.push(id, handle);
        }

        let results = tasks.join_all().await;

        let response = JudgeResponse::from_results(results);
        info!(
            "Judge summary: cases={}, total_score={}, max_time_ms={}, max_memory_kb={}",
            response.cases.len(),
            response.total_score,
            response.max_elapsed_ms,
            response.max_peak_memory_kb
        );

        // request_dir (and the executable in it) is removed here, after every case finished
        Ok(response)
    }
}

/// Case tasks of one request
///
/// Dropping the set aborts every task still running, so a dropped request
/// stops leasing slots once its scratch directory is gone.
struct CaseTasks {
    handles: Vec<(CaseId, JoinHandle<CaseResult>)>,
}

impl CaseTasks {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, id: CaseId, handle: JoinHandle<CaseResult>) {
        self.handles.push((id, handle));
    }

    /// Wait for every case in submission order; a panicked task becomes `InternalError`
    async fn join_all(mut self) -> Vec<CaseResult> {
        let mut results = Vec::with_capacity(self.handles.len());
        for (id, handle) in self.handles.iter_mut() {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Case {} task failed: {}", id, e);
                    results.push(CaseResult::internal_error(
                        id.clone(),
                        format!("case task failed: {}", e),
                    ));
                }
            }
        }
        results
    }
}

impl Drop for CaseTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}
