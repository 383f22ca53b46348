//! Match results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a match from the candidate's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
    /// The match finished but no trustworthy winner could be determined.
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Draw => "draw",
            Outcome::Error => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of one match.
///
/// Produced either by parsing a local engine trace or from a remote job's
/// terminal payload. Immutable once constructed; use the `with_*` builders
/// while assembling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    outcome: Outcome,
    turn_count: u32,
    raw_winner_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    diagnostic: Option<String>,
    #[serde(default)]
    fallback: bool,
}

impl MatchResult {
    /// Creates a decided result.
    pub fn new(outcome: Outcome, turn_count: u32, raw_winner_label: impl Into<String>) -> Self {
        Self {
            outcome,
            turn_count,
            raw_winner_label: raw_winner_label.into(),
            diagnostic: None,
            fallback: false,
        }
    }

    /// Zero-turn draw standing in for a degenerate or missing trace.
    ///
    /// Flagged via [`MatchResult::is_fallback`] so that callers can tell it
    /// apart from a draw the engine actually decided.
    pub fn fallback_draw(diagnostic: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Draw,
            turn_count: 0,
            raw_winner_label: String::new(),
            diagnostic: Some(diagnostic.into()),
            fallback: true,
        }
    }

    /// A match that ended without a usable winner.
    pub fn error(diagnostic: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Error,
            turn_count: 0,
            raw_winner_label: String::new(),
            diagnostic: Some(diagnostic.into()),
            fallback: false,
        }
    }

    /// Attaches a diagnostic note.
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// Winner label exactly as reported by the engine or backend.
    pub fn raw_winner_label(&self) -> &str {
        &self.raw_winner_label
    }

    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// True when this result is the lenient stand-in for a degenerate trace.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} turns", self.outcome, self.turn_count)?;
        if !self.raw_winner_label.is_empty() {
            write!(f, " (winner: {})", self.raw_winner_label)?;
        }
        if let Some(diagnostic) = &self.diagnostic {
            write!(f, " [{diagnostic}]")?;
        }
        Ok(())
    }
}
