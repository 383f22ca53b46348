//! Configuration for Snake Arena.
//!
//! Loaded from `arena.yml`. Every section is optional; a missing file yields
//! the defaults, which match the stock Battlesnake setup.

use arena_adapters::{MatchEngineProcess, ServerSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::poll_loop::PollSettings;
use crate::runner::RunnerSettings;

/// Environment variable overriding `remote.api_url`.
pub const API_URL_ENV: &str = "SNAKE_ARENA_API_URL";

/// Environment variable carrying the remote API token.
pub const TOKEN_ENV: &str = "SNAKE_ARENA_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Which game is being played.
    #[serde(default)]
    pub game: GameKind,

    /// Local match harness settings.
    #[serde(default)]
    pub local: LocalConfig,

    /// Match engine invocation.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Reference opponents by name, each a strategy file.
    #[serde(default)]
    pub opponents: BTreeMap<String, PathBuf>,

    /// Remote evaluation service.
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl ArenaConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config = Self::parse_yaml(&content)?;
        debug!(
            game = %config.game,
            opponents = config.opponents.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parses configuration from a YAML string. An empty document yields the
    /// defaults.
    pub fn parse_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Loads `path` if it exists, otherwise falls back to the defaults.
    ///
    /// Returns whether the file was found so callers can tell the user.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<(Self, bool), ConfigError> {
        let path_ref = path.as_ref();
        if path_ref.exists() {
            Ok((Self::from_file(path_ref)?, true))
        } else {
            warn!(path = %path_ref.display(), "Config file not found, using defaults");
            Ok((Self::default(), false))
        }
    }

    /// Applies `SNAKE_ARENA_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(%url, "API URL overridden from environment");
            self.remote.api_url = Some(url);
        }
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.trim().is_empty()) {
            self.remote.token = Some(token);
        }
    }

    /// Checks the configuration.
    ///
    /// Values that make the harness unusable are errors; values that merely
    /// look wrong are returned as warnings.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let local = &self.local;
        let remote = &self.remote;

        for (field, value) in [
            ("local.ready_timeout_secs", local.ready_timeout_secs),
            ("local.match_timeout_secs", local.match_timeout_secs),
            ("remote.poll_interval_secs", remote.poll_interval_secs),
            ("remote.request_timeout_secs", remote.request_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if remote.max_polls == 0 {
            return Err(ConfigError::Invalid {
                field: "remote.max_polls".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if local.games == 0 {
            return Err(ConfigError::Invalid {
                field: "local.games".to_string(),
                message: "at least one game is required".to_string(),
            });
        }
        if local.candidate_port == local.reference_port {
            return Err(ConfigError::Invalid {
                field: "local.reference_port".to_string(),
                message: format!(
                    "both contestants would listen on port {}",
                    local.candidate_port
                ),
            });
        }
        if local.server.program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "local.server.program".to_string(),
                message: "no program configured".to_string(),
            });
        }

        let mut warnings = Vec::new();
        if remote.not_found_grace_polls >= remote.max_polls {
            warnings.push(ConfigWarning::IneffectiveValue {
                field: "remote.not_found_grace_polls".to_string(),
                message: format!(
                    "grace of {} polls is never reached before the {}-poll ceiling",
                    remote.not_found_grace_polls, remote.max_polls
                ),
            });
        }
        if local.games % 2 == 0 {
            warnings.push(ConfigWarning::IneffectiveValue {
                field: "local.games".to_string(),
                message: format!("{} games can end in a tied series", local.games),
            });
        }
        if self.opponents.is_empty() {
            warnings.push(ConfigWarning::MissingValue {
                field: "opponents".to_string(),
                message: "no reference opponents configured; pass --reference".to_string(),
            });
        }
        if let Some(url) = &remote.api_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                warnings.push(ConfigWarning::IneffectiveValue {
                    field: "remote.api_url".to_string(),
                    message: format!("'{url}' is not an http(s) URL"),
                });
            }
        }
        Ok(warnings)
    }

    /// Runner settings derived from the `local` section.
    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            ready_marker: self.local.ready_marker.clone(),
            ready_timeout: Duration::from_secs(self.local.ready_timeout_secs),
            match_timeout: Duration::from_secs(self.local.match_timeout_secs),
            work_root: self.local.work_dir.clone(),
        }
    }

    /// Poll settings derived from the `remote` section.
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.remote.poll_interval_secs),
            not_found_grace: self.remote.not_found_grace_polls,
            max_polls: self.remote.max_polls,
        }
    }
}

/// The game being played. Decides board defaults and the engine game type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameKind {
    #[default]
    Battlesnake,
    Kurve,
}

impl GameKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GameKind::Battlesnake => "battlesnake",
            GameKind::Kurve => "kurve",
        }
    }

    /// Board width and height used when the engine section gives none.
    pub fn default_board(self) -> (u32, u32) {
        match self {
            GameKind::Battlesnake => (11, 11),
            GameKind::Kurve => (640, 480),
        }
    }

    /// Game type name passed to the engine.
    pub fn engine_game_type(self) -> &'static str {
        match self {
            GameKind::Battlesnake => "standard",
            GameKind::Kurve => "kurve",
        }
    }
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GameKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "battlesnake" => Ok(GameKind::Battlesnake),
            "kurve" => Ok(GameKind::Kurve),
            other => Err(ConfigError::Invalid {
                field: "game".to_string(),
                message: format!("unknown game '{other}', expected 'battlesnake' or 'kurve'"),
            }),
        }
    }
}

/// Program that serves one strategy file on a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ServerCommand {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["_server_wrapper.py".to_string()],
        }
    }
}

/// Local match harness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub server: ServerCommand,

    /// Substring that marks a server as ready, matched case-insensitively.
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,

    #[serde(default = "default_candidate_port")]
    pub candidate_port: u16,

    #[serde(default = "default_reference_port")]
    pub reference_port: u16,

    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_match_timeout_secs")]
    pub match_timeout_secs: u64,

    /// Games per opponent.
    #[serde(default = "default_games")]
    pub games: u32,

    /// Base seed; game `i` uses `seed + i`.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Parent directory for per-match scratch directories. System temp dir
    /// when unset.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

fn default_ready_marker() -> String {
    crate::runner::DEFAULT_READY_MARKER.to_string()
}

fn default_candidate_port() -> u16 {
    8001
}

fn default_reference_port() -> u16 {
    8002
}

fn default_ready_timeout_secs() -> u64 {
    5
}

fn default_match_timeout_secs() -> u64 {
    30
}

fn default_games() -> u32 {
    5
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            server: ServerCommand::default(),
            ready_marker: default_ready_marker(),
            candidate_port: default_candidate_port(),
            reference_port: default_reference_port(),
            ready_timeout_secs: default_ready_timeout_secs(),
            match_timeout_secs: default_match_timeout_secs(),
            games: default_games(),
            seed: None,
            work_dir: None,
        }
    }
}

impl LocalConfig {
    /// Launch spec serving `strategy` as `label` on `port`.
    pub fn server_spec(&self, label: &str, strategy: &Path, port: u16) -> ServerSpec {
        let mut args = self.server.args.clone();
        args.push(strategy.display().to_string());
        ServerSpec {
            label: label.to_string(),
            program: self.server.program.clone(),
            args,
            port,
        }
    }
}

/// Match engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_program")]
    pub program: String,

    /// Arguments placed before the `play` subcommand.
    #[serde(default)]
    pub args: Vec<String>,

    /// Arguments appended after the generated ones.
    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,
}

fn default_engine_program() -> String {
    "battlesnake".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            args: Vec::new(),
            extra_args: Vec::new(),
            width: None,
            height: None,
        }
    }
}

impl EngineConfig {
    /// Builds the engine command line for one match.
    ///
    /// `contestants` are `(label, endpoint)` pairs in seating order.
    pub fn invocation(
        &self,
        game: GameKind,
        contestants: &[(&str, String)],
        output: &Path,
        seed: Option<u64>,
    ) -> MatchEngineProcess {
        let (default_width, default_height) = game.default_board();
        let width = self.width.unwrap_or(default_width);
        let height = self.height.unwrap_or(default_height);

        let mut arguments = self.args.clone();
        arguments.extend([
            "play".to_string(),
            "-W".to_string(),
            width.to_string(),
            "-H".to_string(),
            height.to_string(),
            "-g".to_string(),
            game.engine_game_type().to_string(),
        ]);
        for (label, endpoint) in contestants {
            arguments.extend([
                "--name".to_string(),
                (*label).to_string(),
                "--url".to_string(),
                endpoint.clone(),
            ]);
        }
        arguments.extend(["--output".to_string(), output.display().to_string()]);
        if let Some(seed) = seed {
            arguments.extend(["--seed".to_string(), seed.to_string()]);
        }
        arguments.extend(self.extra_args.iter().cloned());

        MatchEngineProcess::new(self.program.clone(), arguments, output)
    }
}

/// Remote evaluation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub api_url: Option<String>,

    /// Only ever read from the environment.
    #[serde(skip)]
    pub token: Option<String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_not_found_grace_polls")]
    pub not_found_grace_polls: u32,

    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_not_found_grace_polls() -> u32 {
    20
}

fn default_max_polls() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            token: None,
            poll_interval_secs: default_poll_interval_secs(),
            not_found_grace_polls: default_not_found_grace_polls(),
            max_polls: default_max_polls(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration warnings, surfaced but not fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A value that has no effect or a surprising one.
    IneffectiveValue { field: String, message: String },
    /// Something the user will probably have to supply another way.
    MissingValue { field: String, message: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::IneffectiveValue { field, message }
            | ConfigWarning::MissingValue { field, message } => {
                write!(f, "Warning [{}]: {}", field, message)
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },
}
