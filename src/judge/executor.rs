//! Case executor
//!
//! Runs one test case against one compiled program: prepares a private case
//! directory, leases a sandbox slot, runs the program under the case limits,
//! and grades the result. Every failure is turned into a `CaseResult`, so a
//! broken case never affects its siblings.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, warn};

use super::grader::outputs_match;
use crate::error::SandboxError;
use crate::protocol::{CaseResult, CaseStatus, TestCase};
use crate::sandbox::{parse_meta, MetaReport, RawRun, RunSpec, RunStatusCode, SandboxRuntime, SlotPool};

pub struct CaseExecutor {
    pool: Arc<SlotPool>,
    runtime: Arc<dyn SandboxRuntime>,
}

impl CaseExecutor {
    pub fn new(pool: Arc<SlotPool>, runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self { pool, runtime }
    }

    pub fn pool(&self) -> &Arc<SlotPool> {
        &self.pool
    }

    /// Run `case` against `executable`, using `scratch` for the case directory
    pub async fn execute(&self, case: &TestCase, executable: &Path, scratch: &Path) -> CaseResult {
        match self.try_execute(case, executable, scratch).await {
            Ok(result) => {
                debug!(
                    "Case {} finished: status={}, time_ms={}, memory_kb={}",
                    case.id, result.status, result.elapsed_ms, result.peak_memory_kb
                );
                result
            }
            Err(e) => {
                warn!("Case {} failed internally: {}", case.id, e);
                CaseResult::internal_error(case.id.clone(), e.to_string())
            }
        }
    }

    async fn try_execute(
        &self,
        case: &TestCase,
        executable: &Path,
        scratch: &Path,
    ) -> Result<CaseResult, SandboxError> {
        let case_dir = tempfile::Builder::new()
            .prefix("case-")
            .tempdir_in(scratch)?;
        let io_dir = case_dir.path().join("io");
        fs::create_dir(&io_dir).await?;

        let spec = RunSpec {
            executable: executable.to_path_buf(),
            stdin: io_dir.join("input.txt"),
            stdout: io_dir.join("output.txt"),
            stderr: io_dir.join("error.txt"),
            meta: case_dir.path().join("meta.txt"),
            work_dir: io_dir,
            time_limit_ms: case.time_limit_ms,
            extra_time_ms: case.extra_time_ms,
            memory_limit_kb: case.memory_limit_kb,
        };
        fs::write(&spec.stdin, &case.input).await?;

        let raw = {
            let lease = self.pool.acquire().await?;
            let box_id = lease.box_id();
            let run = self.run_in_box(box_id, &spec).await;
            // Tear down before the lease returns the slot to the pool
            if let Err(e) = self.runtime.cleanup(box_id).await {
                warn!("Failed to clean up box {}: {}", box_id, e);
            }
            run?
        };

        let report = parse_meta(&fs::read_to_string(&spec.meta).await?)?;

        if !raw.success || !report.is_ok() {
            let status = failure_status(&report, case.memory_limit_kb);
            let message = report
                .message
                .clone()
                .unwrap_or_else(|| status.to_string());
            return Ok(CaseResult::failed(case.id.clone(), status, Some(message)));
        }

        let elapsed_ms = report
            .time_ms
            .ok_or_else(|| SandboxError::Meta("missing `time`".into()))?;
        let peak_memory_kb = report
            .peak_memory_kb()
            .ok_or_else(|| SandboxError::Meta("missing `max-rss`".into()))?;

        let stdout = read_output(&spec.stdout).await?;
        let (status, score) = if outputs_match(&stdout, &case.expected_output) {
            (CaseStatus::Accepted, case.score_weight)
        } else {
            (CaseStatus::WrongAnswer, 0)
        };

        Ok(CaseResult {
            id: case.id.clone(),
            elapsed_ms: i64::from(elapsed_ms),
            peak_memory_kb: i64::from(peak_memory_kb),
            score,
            status,
            message: None,
        })
    }

    async fn run_in_box(&self, box_id: u32, spec: &RunSpec) -> Result<RawRun, SandboxError> {
        self.runtime.init(box_id).await?;
        self.runtime.run(box_id, spec).await
    }
}

/// Map a non-OK metadata report to a case status
fn failure_status(report: &MetaReport, memory_limit_kb: u32) -> CaseStatus {
    match report.status {
        Some(RunStatusCode::TimeOut) => CaseStatus::TimeLimitExceeded,
        Some(RunStatusCode::Signal) | Some(RunStatusCode::RuntimeError) => {
            let over_memory = report
                .peak_memory_kb()
                .is_some_and(|peak| peak > memory_limit_kb);
            if report.oom_killed || over_memory {
                CaseStatus::MemoryLimitExceeded
            } else {
                CaseStatus::RuntimeError
            }
        }
        Some(RunStatusCode::InternalError) | Some(RunStatusCode::Other(_)) | None => {
            CaseStatus::InternalError
        }
    }
}

/// Stdout of a program that never wrote anything may not exist
async fn read_output(path: &Path) -> Result<String, SandboxError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::testing::{FakeRun, FakeRuntime};
    use crate::protocol::{CaseId, NOT_MEASURED};

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            id: CaseId::from(1),
            input: input.to_string(),
            expected_output: expected.to_string(),
            score_weight: 10,
            time_limit_ms: 1000,
            extra_time_ms: 500,
            memory_limit_kb: 65536,
        }
    }

    fn executor(runtime: Arc<FakeRuntime>) -> CaseExecutor {
        CaseExecutor::new(SlotPool::new(1, 0), runtime)
    }

    #[tokio::test]
    async fn test_echo_is_accepted() {
        let scratch = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::echo());
        let executor = executor(runtime.clone());

        let result = executor
            .execute(&case("5\n", "5"), Path::new("/bin/main"), scratch.path())
            .await;

        assert_eq!(result.status, CaseStatus::Accepted);
        assert_eq!(result.score, 10);
        assert_eq!(result.elapsed_ms, 10);
        assert_eq!(result.peak_memory_kb, 2048);
        assert_eq!(result.message, None);
        assert_eq!(runtime.cleanups(), 1);
        assert_eq!(executor.pool().in_use(), 0);
    }

    #[tokio::test]
    async fn test_wrong_output_scores_zero() {
        let scratch = tempfile::tempdir().unwrap();
        let executor = executor(Arc::new(FakeRuntime::echo()));

        let result = executor
            .execute(&case("a b", "ab"), Path::new("/bin/main"), scratch.path())
            .await;

        assert_eq!(result.status, CaseStatus::WrongAnswer);
        assert_eq!(result.score, 0);
        assert!(result.elapsed_ms >= 0);
    }

    #[tokio::test]
    async fn test_time_limit_uses_sentinels() {
        let scratch = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::scripted(|_| {
            Ok(FakeRun::failed(
                "time:1.010\ntime-wall:1.502\nmax-rss:1500\nkilled:1\nstatus:TO\nmessage:Time limit exceeded\n",
            ))
        });
        let executor = executor(Arc::new(runtime));

        let result = executor
            .execute(&case("", ""), Path::new("/bin/main"), scratch.path())
            .await;

        assert_eq!(result.status, CaseStatus::TimeLimitExceeded);
        assert_eq!(result.elapsed_ms, NOT_MEASURED);
        assert_eq!(result.peak_memory_kb, NOT_MEASURED);
        assert_eq!(result.score, 0);
        assert_eq!(result.message.as_deref(), Some("Time limit exceeded"));
    }

    #[tokio::test]
    async fn test_oom_kill_is_memory_limit() {
        let scratch = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::scripted(|_| {
            Ok(FakeRun::failed(
                "status:SG\nexitsig:9\ncg-oom-killed:1\nmessage:Caught fatal signal 9\n",
            ))
        });
        let executor = executor(Arc::new(runtime));

        let result = executor
            .execute(&case("", ""), Path::new("/bin/main"), scratch.path())
            .await;

        assert_eq!(result.status, CaseStatus::MemoryLimitExceeded);
        assert_eq!(result.message.as_deref(), Some("Caught fatal signal 9"));
    }

    #[tokio::test]
    async fn test_crash_is_runtime_error() {
        let scratch = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::scripted(|_| {
            Ok(FakeRun::failed("time:0.001\nmax-rss:900\nexitcode:3\nstatus:RE\n"))
        });
        let executor = executor(Arc::new(runtime));

        let result = executor
            .execute(&case("", ""), Path::new("/bin/main"), scratch.path())
            .await;

        assert_eq!(result.status, CaseStatus::RuntimeError);
        // Falls back to the status name when isolate gives no message
        assert_eq!(result.message.as_deref(), Some("RuntimeError"));
    }

    #[tokio::test]
    async fn test_runtime_failure_is_internal_error_and_releases_slot() {
        let scratch = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::scripted(|_| {
            Err(SandboxError::Run {
                box_id: 0,
                reason: "isolate exploded".into(),
            })
        }));
        let executor = executor(runtime.clone());

        let result = executor
            .execute(&case("", ""), Path::new("/bin/main"), scratch.path())
            .await;

        assert_eq!(result.status, CaseStatus::InternalError);
        assert_eq!(result.elapsed_ms, NOT_MEASURED);
        assert!(result.message.unwrap().contains("isolate exploded"));
        assert_eq!(runtime.cleanups(), 1);
        assert_eq!(executor.pool().in_use(), 0);
    }

    #[tokio::test]
    async fn test_malformed_meta_is_internal_error() {
        let scratch = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::scripted(|_| Ok(FakeRun::ok("time:soon\n", "")));
        let executor = executor(Arc::new(runtime));

        let result = executor
            .execute(&case("", ""), Path::new("/bin/main"), scratch.path())
            .await;

        assert_eq!(result.status, CaseStatus::InternalError);
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_missing_scratch_dir_is_internal_error() {
        let executor = executor(Arc::new(FakeRuntime::echo()));

        let result = executor
            .execute(
                &case("", ""),
                Path::new("/bin/main"),
                Path::new("/nonexistent/scratch/dir"),
            )
            .await;

        assert_eq!(result.status, CaseStatus::InternalError);
        assert_eq!(result.id, CaseId::from(1));
    }

    #[test]
    fn test_failure_status_mapping() {
        let report = |status| MetaReport {
            status: Some(status),
            ..MetaReport::default()
        };

        assert_eq!(
            failure_status(&report(RunStatusCode::TimeOut), 1024),
            CaseStatus::TimeLimitExceeded
        );
        assert_eq!(
            failure_status(&report(RunStatusCode::Signal), 1024),
            CaseStatus::RuntimeError
        );
        assert_eq!(
            failure_status(&report(RunStatusCode::InternalError), 1024),
            CaseStatus::InternalError
        );

        let over = MetaReport {
            status: Some(RunStatusCode::RuntimeError),
            max_rss_kb: Some(4096),
            ..MetaReport::default()
        };
        assert_eq!(failure_status(&over, 1024), CaseStatus::MemoryLimitExceeded);
    }

    #[test]
    fn test_timeout_wins_over_high_memory() {
        let slow_and_big = MetaReport {
            status: Some(RunStatusCode::TimeOut),
            max_rss_kb: Some(4096),
            ..MetaReport::default()
        };
        assert_eq!(
            failure_status(&slow_and_big, 1024),
            CaseStatus::TimeLimitExceeded
        );

        let internal_and_big = MetaReport {
            status: Some(RunStatusCode::InternalError),
            cg_mem_kb: Some(4096),
            ..MetaReport::default()
        };
        assert_eq!(
            failure_status(&internal_and_big, 1024),
            CaseStatus::InternalError
        );
    }
}
