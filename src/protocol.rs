//! Wire types for the decrypted request and response payloads

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;

/// Opaque test case identifier, echoed back unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub serde_json::Value);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CaseId {
    fn from(id: i64) -> Self {
        CaseId(serde_json::Value::from(id))
    }
}

/// A single test case as sent by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: CaseId,
    #[serde(rename = "in")]
    pub input: String,
    #[serde(rename = "ou")]
    pub expected_output: String,
    #[serde(rename = "sc")]
    pub score_weight: u32,
    #[serde(rename = "ti")]
    pub time_limit_ms: u32,
    #[serde(rename = "et")]
    pub extra_time_ms: u32,
    #[serde(rename = "me")]
    pub memory_limit_kb: u32,
}

/// Decrypted judge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub code: String,
    #[serde(rename = "lan")]
    pub language: String,
    pub cases: Vec<TestCase>,
    #[serde(rename = "linkLibs")]
    pub link_libs: Vec<String>,
    /// "No score check"; accepted on the wire but not used by grading
    #[serde(rename = "noSC")]
    pub no_score_check: bool,
    /// Key the response envelope is encrypted with
    pub key: String,
}

/// Minimal view used to recover the response key from a request that
/// fails full validation
#[derive(Debug, Deserialize)]
struct KeyOnly {
    key: String,
}

impl JudgeRequest {
    /// Parse a decrypted request payload
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::Encoding)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Extract only the response key, if present
    pub fn key_from_slice(bytes: &[u8]) -> Option<String> {
        serde_json::from_slice::<KeyOnly>(bytes).ok().map(|k| k.key)
    }
}

/// Supported submission languages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Cpp,
}

impl Language {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Some(Language::Cpp),
            _ => None,
        }
    }
}

/// Per-case outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    InternalError,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseStatus::Accepted => "Accepted",
            CaseStatus::WrongAnswer => "WrongAnswer",
            CaseStatus::TimeLimitExceeded => "TimeLimitExceeded",
            CaseStatus::MemoryLimitExceeded => "MemoryLimitExceeded",
            CaseStatus::RuntimeError => "RuntimeError",
            CaseStatus::InternalError => "InternalError",
        };
        write!(f, "{}", s)
    }
}

/// Sentinel for time/memory values that were not measured
pub const NOT_MEASURED: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub id: CaseId,
    #[serde(rename = "ti")]
    pub elapsed_ms: i64,
    #[serde(rename = "me")]
    pub peak_memory_kb: i64,
    #[serde(rename = "sc")]
    pub score: u32,
    #[serde(rename = "st")]
    pub status: CaseStatus,
    #[serde(rename = "msg", skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl CaseResult {
    /// Result for a run that did not complete normally
    pub fn failed(id: CaseId, status: CaseStatus, message: Option<String>) -> Self {
        Self {
            id,
            elapsed_ms: NOT_MEASURED,
            peak_memory_kb: NOT_MEASURED,
            score: 0,
            status,
            message,
        }
    }

    pub fn internal_error(id: CaseId, message: impl Into<String>) -> Self {
        Self::failed(id, CaseStatus::InternalError, Some(message.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResponse {
    pub cases: Vec<CaseResult>,
    #[serde(rename = "maxTime")]
    pub max_elapsed_ms: i64,
    #[serde(rename = "maxMemory")]
    pub max_peak_memory_kb: i64,
    #[serde(rename = "totalScore")]
    pub total_score: u64,
}

impl JudgeResponse {
    /// Aggregate per-case results
    pub fn from_results(cases: Vec<CaseResult>) -> Self {
        let max_elapsed_ms = cases
            .iter()
            .map(|c| c.elapsed_ms)
            .fold(NOT_MEASURED, i64::max);
        let max_peak_memory_kb = cases
            .iter()
            .map(|c| c.peak_memory_kb)
            .fold(NOT_MEASURED, i64::max);
        let total_score = cases.iter().map(|c| u64::from(c.score)).sum();

        Self {
            cases,
            max_elapsed_ms,
            max_peak_memory_kb,
            total_score,
        }
    }
}

/// Body of an encrypted request-level failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub msg: String,
}
