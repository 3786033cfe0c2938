//! Isolate-backed sandbox runtime
//!
//! Drives the isolate binary with explicit argument vectors (never a shell).
//! The case directory and the directory of the executable are bound into the
//! box, so stdio files and the metadata report stay on the host side.
//!
//! See: https://github.com/ioi/isolate

use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::runtime::{RawRun, RunSpec, SandboxRuntime};
use crate::error::SandboxError;

/// Mount point of the case directory inside the box
const CASE_MOUNT: &str = "/judge";
/// Mount point of the executable's directory inside the box
const PROGRAM_MOUNT: &str = "/program";

/// Isolate exit code for "program failed" (details in the meta file)
const EXIT_PROGRAM_FAILED: i32 = 1;

#[derive(Debug, Clone)]
pub struct IsolateRuntime {
    isolate_path: PathBuf,
    use_cgroups: bool,
}

impl IsolateRuntime {
    pub fn new(isolate_path: impl Into<PathBuf>, use_cgroups: bool) -> Self {
        Self {
            isolate_path: isolate_path.into(),
            use_cgroups,
        }
    }

    fn command(&self, box_id: u32) -> Command {
        let mut cmd = Command::new(&self.isolate_path);
        cmd.arg(format!("--box-id={}", box_id));
        if self.use_cgroups {
            cmd.arg("--cg");
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Build the `--run` argument list for a spec
    fn run_args(&self, spec: &RunSpec) -> Result<Vec<String>, SandboxError> {
        let (program_dir, program_name) = split_program(&spec.executable)?;

        let time_secs = ms_to_secs(spec.time_limit_ms);
        let extra_secs = ms_to_secs(spec.extra_time_ms);
        let wall_secs = ms_to_secs(spec.time_limit_ms.saturating_add(spec.extra_time_ms));

        let mut args = vec![
            format!("--time={}", time_secs),
            format!("--extra-time={}", extra_secs),
            format!("--wall-time={}", wall_secs),
        ];

        if self.use_cgroups {
            args.push(format!("--cg-mem={}", spec.memory_limit_kb));
        } else {
            args.push(format!("--mem={}", spec.memory_limit_kb));
        }

        args.extend([
            format!("--meta={}", spec.meta.display()),
            format!("--dir={}={}:rw", CASE_MOUNT, spec.work_dir.display()),
            format!("--dir={}={}", PROGRAM_MOUNT, program_dir.display()),
            format!("--stdin={}", in_box(&spec.work_dir, &spec.stdin)?),
            format!("--stdout={}", in_box(&spec.work_dir, &spec.stdout)?),
            format!("--stderr={}", in_box(&spec.work_dir, &spec.stderr)?),
            "--env=PATH=/usr/local/bin:/usr/bin:/bin".to_string(),
            "--run".to_string(),
            "--".to_string(),
            format!("{}/{}", PROGRAM_MOUNT, program_name),
        ]);

        Ok(args)
    }
}

fn ms_to_secs(ms: u32) -> String {
    format!("{:.3}", f64::from(ms) / 1000.0)
}

fn split_program(executable: &Path) -> Result<(&Path, String), SandboxError> {
    let dir = executable.parent();
    let name = executable.file_name().map(|n| n.to_string_lossy().into_owned());
    match (dir, name) {
        (Some(dir), Some(name)) => Ok((dir, name)),
        _ => Err(invalid_input(format!(
            "executable path has no file name: {:?}",
            executable
        ))),
    }
}

fn invalid_input(message: String) -> SandboxError {
    SandboxError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        message,
    ))
}

/// Translate a host path inside the case directory into its in-box path
fn in_box(work_dir: &Path, file: &Path) -> Result<String, SandboxError> {
    let relative = file.strip_prefix(work_dir).map_err(|_| {
        invalid_input(format!(
            "{:?} is outside the case directory {:?}",
            file, work_dir
        ))
    })?;
    Ok(format!("{}/{}", CASE_MOUNT, relative.display()))
}

#[async_trait]
impl SandboxRuntime for IsolateRuntime {
    async fn init(&self, box_id: u32) -> Result<(), SandboxError> {
        // A crashed previous run may have left the box behind
        let _ = self.command(box_id).arg("--cleanup").output().await;

        let output = self
            .command(box_id)
            .arg("--init")
            .output()
            .await
            .map_err(|e| SandboxError::Init {
                box_id,
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SandboxError::Init {
                box_id,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(
            "Initialized isolate box {} at {}",
            box_id,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn run(&self, box_id: u32, spec: &RunSpec) -> Result<RawRun, SandboxError> {
        // The sandbox user must be able to reach the bound directories
        fs::set_permissions(&spec.work_dir, std::fs::Permissions::from_mode(0o777)).await?;
        if let Some(dir) = spec.executable.parent() {
            fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).await?;
        }

        let args = self.run_args(spec)?;
        debug!("Running isolate box {} with args: {:?}", box_id, args);

        let output = self
            .command(box_id)
            .args(&args)
            .output()
            .await
            .map_err(|e| SandboxError::Run {
                box_id,
                reason: e.to_string(),
            })?;

        match output.status.code() {
            Some(0) => Ok(RawRun { success: true }),
            Some(EXIT_PROGRAM_FAILED) => Ok(RawRun { success: false }),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("isolate box {} exited with {:?}: {}", box_id, code, stderr.trim());
                Err(SandboxError::Run {
                    box_id,
                    reason: format!("isolate exited with {:?}: {}", code, stderr.trim()),
                })
            }
        }
    }

    async fn cleanup(&self, box_id: u32) -> Result<(), SandboxError> {
        let output = self
            .command(box_id)
            .arg("--cleanup")
            .output()
            .await
            .map_err(|e| SandboxError::Run {
                box_id,
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SandboxError::Run {
                box_id,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        info!("Cleaned up isolate box {}", box_id);
        Ok(())
    }
}
