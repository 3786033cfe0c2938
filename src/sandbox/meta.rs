//! Isolate meta file parser
//!
//! Isolate writes a line-oriented `key:value` report for every run. Only the
//! keys the judge needs are interpreted; unknown keys are ignored.

use crate::error::SandboxError;

/// Outcome codes isolate writes to the `status` key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatusCode {
    /// `TO` - time limit (CPU or wall) exceeded
    TimeOut,
    /// `SG` - killed by a signal
    Signal,
    /// `RE` - non-zero exit code
    RuntimeError,
    /// `XX` - internal error of the sandbox
    InternalError,
    /// Anything else isolate might add later
    Other(String),
}

impl RunStatusCode {
    fn parse(value: &str) -> Self {
        match value {
            "TO" => RunStatusCode::TimeOut,
            "SG" => RunStatusCode::Signal,
            "RE" => RunStatusCode::RuntimeError,
            "XX" => RunStatusCode::InternalError,
            other => RunStatusCode::Other(other.to_string()),
        }
    }
}

/// Parsed isolate meta file contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaReport {
    /// `status`; absent when the program exited with code 0
    pub status: Option<RunStatusCode>,
    /// Human readable `message`
    pub message: Option<String>,
    /// CPU time in milliseconds
    pub time_ms: Option<u32>,
    /// Wall clock time in milliseconds
    pub wall_time_ms: Option<u32>,
    /// Peak resident set size in KB (`max-rss`)
    pub max_rss_kb: Option<u32>,
    /// Peak cgroup memory in KB (`cg-mem`)
    pub cg_mem_kb: Option<u32>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    /// `killed:1` - the sandbox killed the program
    pub killed: bool,
    /// `cg-oom-killed:1` - the cgroup OOM killer fired
    pub oom_killed: bool,
}

impl MetaReport {
    /// Whether the run completed "OK" (no status line reported)
    pub fn is_ok(&self) -> bool {
        self.status.is_none()
    }

    /// Peak memory, preferring the larger of the cgroup and rss measurements
    pub fn peak_memory_kb(&self) -> Option<u32> {
        match (self.max_rss_kb, self.cg_mem_kb) {
            (Some(rss), Some(cg)) => Some(rss.max(cg)),
            (rss, cg) => rss.or(cg),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SandboxError> {
    value
        .parse::<T>()
        .map_err(|_| SandboxError::Meta(format!("invalid value for {}: {:?}", key, value)))
}

fn parse_seconds(key: &str, value: &str) -> Result<u32, SandboxError> {
    let secs: f64 = parse_number(key, value)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(SandboxError::Meta(format!(
            "invalid value for {}: {:?}",
            key, value
        )));
    }
    Ok((secs * 1000.0).round() as u32)
}

/// Parse isolate meta file content
pub fn parse_meta(content: &str) -> Result<MetaReport, SandboxError> {
    let mut meta = MetaReport::default();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "status" => meta.status = Some(RunStatusCode::parse(value)),
            "message" => meta.message = Some(value.to_string()),
            "time" => meta.time_ms = Some(parse_seconds(key, value)?),
            "time-wall" => meta.wall_time_ms = Some(parse_seconds(key, value)?),
            "max-rss" => meta.max_rss_kb = Some(parse_number(key, value)?),
            "cg-mem" => meta.cg_mem_kb = Some(parse_number(key, value)?),
            "exitcode" => meta.exit_code = Some(parse_number(key, value)?),
            "exitsig" => meta.exit_signal = Some(parse_number(key, value)?),
            "killed" => meta.killed = value == "1",
            "cg-oom-killed" => meta.oom_killed = value == "1",
            _ => {}
        }
    }

    Ok(meta)
}
