//! Compiler module - Source code compilation
//!
//! Turns submitted source text into an executable on the host. The judge only
//! depends on the [`Compiler`] trait; [`GxxCompiler`] is the production
//! implementation for C++ submissions.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::CompilerSettings;
use crate::error::CompileError;

const SOURCE_FILE: &str = "main.cpp";
const EXECUTABLE_FILE: &str = "main";
/// Compiler diagnostics returned to the caller are cut to this many chars
const MAX_DIAGNOSTIC_CHARS: usize = 4096;

#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `source` inside `out_dir` and return the executable path
    async fn compile(
        &self,
        source: &str,
        link_libs: &[String],
        out_dir: &Path,
    ) -> Result<PathBuf, CompileError>;
}

/// Link library names are passed as `-l<name>`; keep them to a safe charset
fn validate_link_lib(name: &str) -> Result<(), CompileError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-'))
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(CompileError::InvalidLibrary(name.to_string()))
    }
}

/// Compiles C++ submissions with g++ (or a compatible driver)
#[derive(Debug, Clone)]
pub struct GxxCompiler {
    cxx: PathBuf,
    flags: Vec<String>,
    timeout_secs: u64,
}

impl GxxCompiler {
    pub fn new(settings: &CompilerSettings) -> Self {
        Self {
            cxx: settings.cxx.clone(),
            flags: settings.flags.clone(),
            timeout_secs: settings.timeout_secs,
        }
    }

    fn args(&self, link_libs: &[String]) -> Vec<String> {
        let mut args = self.flags.clone();
        args.extend([
            "-o".to_string(),
            EXECUTABLE_FILE.to_string(),
            SOURCE_FILE.to_string(),
        ]);
        // Libraries must follow the source file for the linker to resolve them
        args.extend(link_libs.iter().map(|lib| format!("-l{}", lib)));
        args
    }
}

#[async_trait]
impl Compiler for GxxCompiler {
    async fn compile(
        &self,
        source: &str,
        link_libs: &[String],
        out_dir: &Path,
    ) -> Result<PathBuf, CompileError> {
        for lib in link_libs {
            validate_link_lib(lib)?;
        }

        fs::write(out_dir.join(SOURCE_FILE), source).await?;

        let args = self.args(link_libs);
        debug!("Compiling with {:?} {:?}", self.cxx, args);

        let child = Command::new(&self.cxx)
            .args(&args)
            .current_dir(out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| CompileError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            if diagnostics.trim().is_empty() {
                diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            if diagnostics.trim().is_empty() {
                diagnostics = format!("compiler exited with {}", output.status);
            }
            let truncated: String = diagnostics.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
            return Err(CompileError::Failed(truncated));
        }

        let executable = out_dir.join(EXECUTABLE_FILE);
        info!("Compiled submission to {:?}", executable);
        Ok(executable)
    }
}
