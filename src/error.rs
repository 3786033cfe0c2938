//! Error taxonomy
//!
//! Each layer has its own error type. Startup errors (`ConfigError`) are fatal,
//! request errors (`CryptoError`, `ProtocolError`, `JudgeError`) abort a single
//! request, and `SandboxError` never leaves the case that produced it.

use std::path::PathBuf;
use thiserror::Error;

/// Settings could not be loaded or are invalid
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read settings file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Envelope encryption/decryption failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length {0} (expected at most 16, or exactly 24 or 32 bytes)")]
    InvalidKeyLength(usize),

    #[error("envelope too short: {0} bytes")]
    TooShort(usize),

    #[error("ciphertext length {0} is not a multiple of the block size")]
    Misaligned(usize),

    #[error("padding check failed (wrong key or corrupted ciphertext)")]
    BadPadding,
}

/// Decrypted payload is not a valid judge request
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request is not valid UTF-8")]
    Encoding,

    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Compilation of the submission failed
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compilation failed: {0}")]
    Failed(String),

    #[error("compilation timed out after {0}s")]
    Timeout(u64),

    #[error("invalid link library name: {0:?}")]
    InvalidLibrary(String),

    #[error("failed to run compiler")]
    Io(#[from] std::io::Error),
}

/// Failure while driving the sandbox runtime for one case
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to initialize box {box_id}: {reason}")]
    Init { box_id: u32, reason: String },

    #[error("sandbox runtime failed on box {box_id}: {reason}")]
    Run { box_id: u32, reason: String },

    #[error("sandbox pool is closed")]
    PoolClosed,

    #[error("malformed metadata report: {0}")]
    Meta(String),

    #[error("sandbox I/O error")]
    Io(#[from] std::io::Error),
}

/// Request-level judging failure
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl JudgeError {
    /// Short machine-readable kind used in error envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::Protocol(_) => "protocol_error",
            JudgeError::UnsupportedLanguage(_) => "unsupported_language",
            JudgeError::Compile(_) => "compile_error",
            JudgeError::Internal(_) => "internal_error",
        }
    }
}
