//! Core domain modules.
//!
//! - `config` - Run configuration (YAML rule files)
//! - `error` - Structured error type and codes
//! - `rewrite` - The link rewriting engine
//! - `scan` - File scanning and change aggregation
//! - `git` - Git operations via the system binary
//! - `repo` - Repository context and credentials
//! - `remote` - Pull-request creation (GitHub API)
//! - `publish` - The publish transaction
//! - `pipeline` - End-to-end update runs

pub mod config;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod publish;
pub mod remote;
pub mod repo;
pub mod rewrite;
pub mod scan;

pub use error::{Error, ErrorCode, Result};
