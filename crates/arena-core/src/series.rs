//! Best-of-N series against one reference opponent.

use arena_adapters::{ProcessLauncher, ServerSpec};
use arena_proto::{MatchResult, Outcome, Result};
use serde::Serialize;
use tracing::info;

use crate::runner::{EngineSetup, LocalMatchRunner};

/// Tally of a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeriesReport {
    pub candidate: String,
    pub reference: String,
    pub games: Vec<MatchResult>,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub errors: u32,
}

impl SeriesReport {
    pub fn new(candidate: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            reference: reference.into(),
            ..Self::default()
        }
    }

    /// Adds one game to the tally.
    pub fn record(&mut self, result: MatchResult) {
        match result.outcome() {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Error => self.errors += 1,
        }
        self.games.push(result);
    }

    /// Series winner: more wins than losses is a win, fewer a loss.
    pub fn outcome(&self) -> Outcome {
        match self.wins.cmp(&self.losses) {
            std::cmp::Ordering::Greater => Outcome::Win,
            std::cmp::Ordering::Less => Outcome::Loss,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }

    /// Number of games scored by the lenient degenerate-trace rule.
    pub fn fallback_count(&self) -> usize {
        self.games.iter().filter(|g| g.is_fallback()).count()
    }
}

impl std::fmt::Display for SeriesReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} vs {}: {} ({}W {}L {}D",
            self.candidate,
            self.reference,
            self.outcome(),
            self.wins,
            self.losses,
            self.draws
        )?;
        if self.errors > 0 {
            write!(f, " {}E", self.errors)?;
        }
        f.write_str(")")
    }
}

/// Plays `games` matches in sequence, each with its own servers and
/// teardown. With a seed, game `i` is seeded `seed + i`.
///
/// `on_game` sees every result as it lands. The first faulting game aborts
/// the series with that fault.
pub async fn run_series<L, F>(
    runner: &LocalMatchRunner<L>,
    candidate: &ServerSpec,
    reference: &ServerSpec,
    engine: &EngineSetup,
    games: u32,
    mut on_game: F,
) -> Result<SeriesReport>
where
    L: ProcessLauncher,
    F: FnMut(u32, &MatchResult),
{
    let mut report = SeriesReport::new(&candidate.label, &reference.label);
    for game in 0..games {
        let seed = engine.seed.map(|seed| seed.wrapping_add(u64::from(game)));
        let setup = engine.with_seed(seed);
        let result = runner.run_match(candidate, reference, &setup).await?;
        on_game(game + 1, &result);
        report.record(result);
    }
    info!(
        reference = %reference.label,
        wins = report.wins,
        losses = report.losses,
        draws = report.draws,
        "Series finished"
    );
    Ok(report)
}
