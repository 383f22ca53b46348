//! `snake-arena submit`: remote evaluation with a live progress spinner.

use anyhow::{Context, Result, anyhow, bail};
use arena_adapters::{ClientError, RemoteJobClient};
use arena_core::{ArenaConfig, GameKind, PollPhase, PollProgress, SubmissionPollLoop};
use arena_proto::{MatchResult, MatchSummary, Outcome, SubmitRequest, SubmitResponse};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::{Output, OutputFormat, apply_game, paint};

#[derive(Parser, Debug)]
pub struct SubmitArgs {
    /// Strategy file to submit
    pub strategy: PathBuf,

    /// Name shown on the leaderboard
    #[arg(long)]
    pub name: String,

    /// Model that wrote the strategy, if any
    #[arg(long)]
    pub model: Option<String>,

    /// Source language (default: inferred from the file extension)
    #[arg(long)]
    pub language: Option<String>,

    /// Game to submit for (battlesnake, kurve)
    #[arg(long)]
    pub game: Option<GameKind>,

    /// Evaluation service URL (overrides config and SNAKE_ARENA_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,
}

pub async fn run(mut config: ArenaConfig, args: SubmitArgs, output: Output) -> Result<()> {
    apply_game(&mut config, args.game);

    let code = tokio::fs::read_to_string(&args.strategy)
        .await
        .with_context(|| format!("Failed to read strategy {}", args.strategy.display()))?;
    let language = match args.language {
        Some(language) => language,
        None => infer_language(&args.strategy).ok_or_else(|| {
            anyhow!(
                "cannot infer language of {}; pass --language",
                args.strategy.display()
            )
        })?,
    };
    let api_url = args
        .api_url
        .or_else(|| config.remote.api_url.clone())
        .context("no evaluation service configured; set remote.api_url or SNAKE_ARENA_API_URL")?;

    let client = RemoteJobClient::new(&api_url, config.remote.request_timeout())
        .context("Failed to create HTTP client")?
        .with_token(config.remote.token.clone());

    let request = SubmitRequest {
        code,
        language,
        name: args.name,
        model: args.model,
        game: config.game.as_str().to_string(),
    };

    info!(name = %request.name, language = %request.language, url = %api_url, "Submitting strategy");
    let job_id = match client.submit(&request).await {
        Ok(SubmitResponse::Queued { job_id }) => job_id,
        Ok(SubmitResponse::Completed(result)) => {
            info!("Evaluation answered synchronously");
            return finish(&result.to_match_result(), output);
        }
        Err(ClientError::RateLimited { retry_after }) => {
            return Err(rate_limited(retry_after));
        }
        Err(e) => {
            return Err(arena_proto::Error::from(e)).context("Submission failed");
        }
    };

    if output.format == OutputFormat::Table {
        println!("Submitted {} as job {job_id}", args.strategy.display());
    }

    let spinner = spinner();
    let match_spinner = spinner.clone();
    let use_colors = output.use_colors;
    let poll = SubmissionPollLoop::new(&client, config.poll_settings());
    let outcome = poll
        .await_with_progress(
            &job_id,
            |_, summary| match_spinner.println(match_line(summary, use_colors)),
            |progress| spinner.set_message(progress_message(progress)),
        )
        .await;
    spinner.finish_and_clear();

    let result = outcome.with_context(|| format!("Job {job_id} did not complete"))?;
    finish(&result, output)
}

/// Reports the final result. An `Error` outcome becomes the command's
/// failure, so in table mode it is reported once, by the caller.
fn finish(result: &MatchResult, output: Output) -> Result<()> {
    if result.outcome() != Outcome::Error {
        return print_result(result, output);
    }
    if output.format == OutputFormat::Json {
        print_result(result, output)?;
    }
    bail!(
        "evaluation failed: {}",
        result.diagnostic().unwrap_or("no details")
    )
}

/// Rate-limit fault carrying the user-facing wait estimate as its context.
fn rate_limited(retry_after: Duration) -> anyhow::Error {
    anyhow::Error::new(arena_proto::Error::RateLimited { retry_after })
        .context(rate_limit_message(retry_after))
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message("Waiting for the job to start");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn print_result(result: &MatchResult, output: Output) -> Result<()> {
    match output.format {
        OutputFormat::Table => {
            println!("Result: {}", paint(result.outcome(), &result.to_string(), output.use_colors));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}

/// Source language from the strategy's file extension.
fn infer_language(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let language = match extension.as_str() {
        "py" => "python",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        _ => return None,
    };
    Some(language.to_string())
}

fn match_line(summary: &MatchSummary, use_colors: bool) -> String {
    let outcome = paint(summary.outcome, summary.outcome.as_str(), use_colors);
    format!("  vs {}: {outcome} ({} turns)", summary.opponent, summary.turns)
}

fn progress_message(progress: &PollProgress) -> String {
    match (progress.phase, progress.total_opponents) {
        (PollPhase::AwaitingJob, _) => "Waiting for the job to start".to_string(),
        (_, Some(total)) => format!(
            "{} of {total} opponents completed",
            progress.matches_seen
        ),
        (_, None) => format!("{} matches completed", progress.matches_seen),
    }
}

/// User-facing wait estimate, rounded up to whole minutes.
fn rate_limit_message(retry_after: Duration) -> String {
    let minutes = retry_after.as_secs().div_ceil(60).max(1);
    let unit = if minutes == 1 { "minute" } else { "minutes" };
    format!("Rate limited: try again in about {minutes} {unit}")
}
