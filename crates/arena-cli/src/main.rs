//! # arena-cli
//!
//! Binary entry point for Snake Arena.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - `snake-arena test`: local best-of-N series against reference opponents
//! - `snake-arena submit`: remote evaluation with live progress
//! - Mapping of every fault to a one-line diagnostic and exit code

mod submit;

use anyhow::{Context, Result};
use arena_core::{ArenaConfig, GameKind};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

// Unix-specific process management for process group leadership
#[cfg(unix)]
mod process_management {
    use nix::unistd::{Pid, setpgid};
    use tracing::debug;

    /// Makes this process a process group leader so that decision servers and
    /// the engine share its group and receive terminal signals with it.
    pub fn setup_process_group() {
        let pid = Pid::this();
        if let Err(e) = setpgid(pid, pid) {
            // EPERM is OK - we're already a process group leader (e.g., started from shell)
            if e != nix::errno::Errno::EPERM {
                debug!("Note: Could not set process group ({}), continuing anyway", e);
            }
        }
        debug!("Process group initialized: PID {}", pid);
    }
}

#[cfg(not(unix))]
mod process_management {
    /// No-op on non-Unix platforms.
    pub fn setup_process_group() {}
}

/// Exit code when the user interrupts a run.
const EXIT_INTERRUPTED: i32 = 130;

/// Color output mode for terminal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    #[default]
    Table,
    /// JSON for programmatic access
    Json,
}

/// ANSI color codes for terminal output.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
}

/// Wraps text in an outcome color when colors are enabled.
pub(crate) fn paint(outcome: arena_proto::Outcome, text: &str, use_colors: bool) -> String {
    if !use_colors {
        return text.to_string();
    }
    let color = match outcome {
        arena_proto::Outcome::Win => colors::GREEN,
        arena_proto::Outcome::Loss => colors::RED,
        arena_proto::Outcome::Draw => colors::YELLOW,
        arena_proto::Outcome::Error => colors::DIM,
    };
    format!("{}{color}{text}{}", colors::BOLD, colors::RESET)
}

/// Snake Arena - test strategies locally and submit them for evaluation
#[derive(Parser, Debug)]
#[command(name = "snake-arena", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "arena.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a strategy against reference opponents on this machine
    Test(local_test::TestArgs),

    /// Submit a strategy for remote evaluation and wait for the result
    Submit(submit::SubmitArgs),
}

/// Options shared by every command after parsing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Output {
    pub format: OutputFormat,
    pub use_colors: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    process_management::setup_process_group();

    let code = tokio::select! {
        result = run(cli) => match result {
            Ok(()) => 0,
            Err(e) => report_failure(&e),
        },
        Ok(()) = tokio::signal::ctrl_c() => {
            // The dropped command future releases its servers on the way out.
            warn!("Interrupt received, stopping");
            eprintln!("Interrupted");
            EXIT_INTERRUPTED
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let output = Output {
        format: cli.format,
        use_colors: cli.color.should_use_colors(),
    };
    match cli.command {
        Commands::Test(args) => local_test::run(config, args, output).await,
        Commands::Submit(args) => submit::run(config, args, output).await,
    }
}

/// Loads, overrides and validates configuration.
fn load_config(path: &Path) -> Result<ArenaConfig> {
    let (mut config, found) = ArenaConfig::load_or_default(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if found {
        debug!(path = %path.display(), "Using config file");
    }
    config.apply_env_overrides();
    for warning in config.validate().context("Invalid configuration")? {
        warn!("{warning}");
    }
    Ok(config)
}

/// Applies a `--game` override.
pub(crate) fn apply_game(config: &mut ArenaConfig, game: Option<GameKind>) {
    if let Some(game) = game {
        config.game = game;
    }
}

/// Prints a one-line diagnostic and returns the exit code for the failure.
fn report_failure(error: &anyhow::Error) -> i32 {
    eprintln!("error: {error:#}");
    error
        .downcast_ref::<arena_proto::Error>()
        .map_or(1, arena_proto::Error::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_parses_test_command() {
        let cli = Cli::try_parse_from([
            "snake-arena",
            "test",
            "my_snake.py",
            "--opponent",
            "aggressive-hunter",
            "--opponent",
            "wall-hugger",
            "--games",
            "3",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, PathBuf::from("arena.yml"));
        match cli.command {
            Commands::Test(args) => {
                assert_eq!(args.strategy, PathBuf::from("my_snake.py"));
                assert_eq!(args.opponent, vec!["aggressive-hunter", "wall-hugger"]);
                assert_eq!(args.games, Some(3));
            }
            other @ Commands::Submit(_) => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_submit_command() {
        let cli = Cli::try_parse_from([
            "snake-arena",
            "-v",
            "submit",
            "bot.js",
            "--name",
            "speedy",
            "--game",
            "kurve",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.name, "speedy");
                assert_eq!(args.game, Some(GameKind::Kurve));
                assert!(args.language.is_none());
            }
            other @ Commands::Test(_) => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_failure_exit_codes() {
        let timeout = anyhow::Error::new(arena_proto::Error::MatchTimeout(Duration::from_secs(30)))
            .context("game 1 against wall-hugger");
        assert_eq!(report_failure(&timeout), 2);

        let start = anyhow::Error::new(arena_proto::Error::ProcessStartTimeout {
            side: "candidate".to_string(),
            reason: "exited".to_string(),
        });
        assert_eq!(report_failure(&start), 1);

        assert_eq!(report_failure(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn test_paint_respects_color_mode() {
        assert_eq!(paint(arena_proto::Outcome::Win, "win", false), "win");
        let painted = paint(arena_proto::Outcome::Loss, "loss", true);
        assert!(painted.contains(colors::RED));
        assert!(painted.ends_with(colors::RESET));
    }
}
