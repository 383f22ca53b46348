//! Testing utilities for deterministic runner and poll-loop tests.

pub mod mock_launcher;
pub mod scripted_status;

pub use mock_launcher::{EngineBehavior, MockLauncher, ServerBehavior};
pub use scripted_status::{ScriptStep, ScriptedStatusSource, job_snapshot, match_summary};
