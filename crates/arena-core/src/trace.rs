//! Match trace parsing.
//!
//! The engine writes one JSON record per line. The last record is the
//! summary naming the winner; the one before it is the final simulated turn.

use arena_proto::{Error, MatchResult, Outcome, Result};
use serde::Deserialize;
use tracing::{debug, warn};

/// Trailing summary record.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    #[serde(default, alias = "winner")]
    winner_name: Option<String>,
    #[serde(default)]
    is_draw: bool,
}

/// Parses a trace strictly.
///
/// Fails with [`Error::MalformedOutput`] when fewer than two records are
/// present. A summary that is not valid JSON yields an `Error` outcome.
pub fn parse_trace(content: &str, candidate: &str, reference: &str) -> Result<MatchResult> {
    let records: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let (summary_line, turn_line) = match records.as_slice() {
        [.., turn, summary] => (*summary, *turn),
        _ => {
            return Err(Error::MalformedOutput(format!(
                "trace has {} record(s), expected a turn record and a summary",
                records.len()
            )));
        }
    };

    let turn_count = last_turn(turn_line);

    let summary: Summary = match serde_json::from_str(summary_line) {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "Trace summary is not valid JSON");
            return Ok(MatchResult::error(format!("unreadable trace summary: {e}")));
        }
    };

    let winner = summary.winner_name.unwrap_or_default();
    let result = if summary.is_draw || winner.is_empty() {
        MatchResult::new(Outcome::Draw, turn_count, winner)
    } else if winner == candidate {
        MatchResult::new(Outcome::Win, turn_count, winner)
    } else if winner == reference {
        MatchResult::new(Outcome::Loss, turn_count, winner)
    } else {
        let diagnostic = format!(
            "winner '{winner}' is neither '{candidate}' nor '{reference}'"
        );
        MatchResult::new(Outcome::Error, turn_count, winner).with_diagnostic(diagnostic)
    };

    debug!(outcome = %result.outcome(), turns = turn_count, "Parsed match trace");
    Ok(result)
}

/// Parses a trace, turning a degenerate one into a flagged zero-turn draw.
pub fn interpret_trace(content: &str, candidate: &str, reference: &str) -> MatchResult {
    match parse_trace(content, candidate, reference) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Degenerate match trace, scoring as draw");
            MatchResult::fallback_draw(e.to_string())
        }
    }
}

fn last_turn(line: &str) -> u32 {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Skipping unparseable trace record");
            return 0;
        }
    };
    value
        .get("turn")
        .or_else(|| value.get("tick"))
        .and_then(serde_json::Value::as_u64)
        .map_or(0, |turn| u32::try_from(turn).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANDIDATE: &str = "candidate";
    const REFERENCE: &str = "reference";

    #[test]
    fn test_win_with_turn_count() {
        let trace = r#"{"turn": 41}
{"turn": 42}
{"winnerName": "candidate", "isDraw": false}
"#;
        let result = parse_trace(trace, CANDIDATE, REFERENCE).unwrap();
        assert_eq!(result.outcome(), Outcome::Win);
        assert_eq!(result.turn_count(), 42);
        assert_eq!(result.raw_winner_label(), "candidate");
        assert!(!result.is_fallback());
    }

    #[test]
    fn test_winner_alias_and_tick() {
        let trace = "{\"tick\": 310}\n{\"winner\": \"A\", \"isDraw\": false}";
        let result = parse_trace(trace, "A", "B").unwrap();
        assert_eq!(result.outcome(), Outcome::Win);
        assert_eq!(result.turn_count(), 310);
    }

    #[test]
    fn test_loss() {
        let trace = "{\"turn\": 7}\n{\"winnerName\": \"reference\"}";
        let result = parse_trace(trace, CANDIDATE, REFERENCE).unwrap();
        assert_eq!(result.outcome(), Outcome::Loss);
        assert_eq!(result.turn_count(), 7);
    }

    #[test]
    fn test_draw_flag_and_empty_winner() {
        let flagged = "{\"turn\": 99}\n{\"winnerName\": \"candidate\", \"isDraw\": true}";
        assert_eq!(
            parse_trace(flagged, CANDIDATE, REFERENCE).unwrap().outcome(),
            Outcome::Draw
        );

        let empty = "{\"turn\": 99}\n{\"winnerName\": \"\"}";
        let result = parse_trace(empty, CANDIDATE, REFERENCE).unwrap();
        assert_eq!(result.outcome(), Outcome::Draw);
        assert_eq!(result.turn_count(), 99);
        assert!(!result.is_fallback());
    }

    #[test]
    fn test_unknown_winner_is_error() {
        let trace = "{\"turn\": 3}\n{\"winnerName\": \"someone-else\"}";
        let result = parse_trace(trace, CANDIDATE, REFERENCE).unwrap();
        assert_eq!(result.outcome(), Outcome::Error);
        assert!(result.diagnostic().unwrap().contains("someone-else"));
    }

    #[test]
    fn test_bad_turn_record_does_not_abort_summary() {
        let trace = "{\"turn\": 1}\nnot json at all\n{\"winnerName\": \"candidate\"}";
        let result = parse_trace(trace, CANDIDATE, REFERENCE).unwrap();
        assert_eq!(result.outcome(), Outcome::Win);
        assert_eq!(result.turn_count(), 0);
    }

    #[test]
    fn test_bad_summary_is_error_outcome() {
        let trace = "{\"turn\": 12}\n{\"winnerName\": ";
        let result = parse_trace(trace, CANDIDATE, REFERENCE).unwrap();
        assert_eq!(result.outcome(), Outcome::Error);
        assert!(result.diagnostic().is_some());
    }

    #[test]
    fn test_single_line_is_malformed() {
        let err = parse_trace("{\"winnerName\": \"candidate\"}\n\n", CANDIDATE, REFERENCE)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }

    #[test]
    fn test_single_line_interprets_as_fallback_draw() {
        let result = interpret_trace("{\"winnerName\": \"candidate\"}", CANDIDATE, REFERENCE);
        assert_eq!(result.outcome(), Outcome::Draw);
        assert_eq!(result.turn_count(), 0);
        assert!(result.is_fallback());
        assert!(!result.diagnostic().unwrap_or_default().is_empty());
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let trace = "\n{\"turn\": 5}\n\n  \n{\"winnerName\": \"reference\"}\n\n";
        let result = parse_trace(trace, CANDIDATE, REFERENCE).unwrap();
        assert_eq!(result.outcome(), Outcome::Loss);
        assert_eq!(result.turn_count(), 5);
    }
}
