//! # arena-proto
//!
//! Shared types and error definitions for Snake Arena.
//!
//! This crate provides the vocabulary used across all arena crates:
//! - `MatchResult` and `Outcome`, the uniform result of a local or remote match
//! - Job snapshots mirrored from the remote evaluation service
//! - The error taxonomy surfaced to the CLI layer

mod error;
mod job;
mod result;

pub use error::{Error, Result};
pub use job::{
    JobResult, JobSnapshot, JobStatus, MatchSummary, SubmitRequest, SubmitResponse,
};
pub use result::{MatchResult, Outcome};
