//! Sandboxed judging engine
//!
//! Decrypts judge requests, compiles the submission, runs every test case in
//! an isolate box leased from a fixed pool, grades the output and returns an
//! encrypted summary.

pub mod compiler;
pub mod config;
pub mod crypto;
pub mod error;
pub mod judge;
pub mod protocol;
pub mod sandbox;
pub mod server;
