//! Configuration system for the Tarefas client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tarefas/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.
//!
//! Store credentials are optional. Without both an API key and a database
//! URL the client runs against the unauthenticated fallback REST store;
//! see [`ClientConfig::store_mode`].

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::view::status::StatusTimings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A configured endpoint is not a valid absolute URL.
    #[error("invalid {field} URL: {source}")]
    InvalidUrl {
        /// Which setting held the bad value.
        field: &'static str,
        /// Underlying parse error.
        source: url::ParseError,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    firebase: FirebaseFileConfig,
    fallback: FallbackFileConfig,
    ui: UiFileConfig,
}

/// `[firebase]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FirebaseFileConfig {
    api_key: Option<String>,
    database_url: Option<String>,
    auth_endpoint: Option<String>,
    token_endpoint: Option<String>,
}

/// `[fallback]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FallbackFileConfig {
    url: Option<String>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    poll_timeout_ms: Option<u64>,
    success_message_secs: Option<u64>,
    error_message_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Default password sign-in endpoint.
pub const DEFAULT_AUTH_ENDPOINT: &str = "https://identitytoolkit.googleapis.com";

/// Default fallback store: a locally running emulator.
pub const DEFAULT_FALLBACK_URL: &str = "http://127.0.0.1:9000/";

/// Credentials for the hosted store and its identity service.
#[derive(Clone, PartialEq, Eq)]
pub struct FirebaseCredentials {
    /// Web API key passed to the identity endpoints.
    pub api_key: String,
    /// Root of the document store.
    pub database_url: Url,
    /// Root of the identity service (`…/v1/accounts:*` lives below it).
    pub auth_endpoint: Url,
    /// Root of the token service (`…/v1/token`). Derived from
    /// `auth_endpoint` when unset.
    pub token_endpoint: Option<Url>,
}

impl std::fmt::Debug for FirebaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseCredentials")
            .field("database_url", &self.database_url.as_str())
            .field("auth_endpoint", &self.auth_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

/// The unauthenticated global-collection store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
    /// Root of the REST store.
    pub base_url: Url,
}

/// Which store the client talks to, decided once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    /// Per-user collections behind password sign-in.
    Configured(FirebaseCredentials),
    /// Global collection with no identity layer.
    Unconfigured(FallbackConfig),
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Store --
    /// Identity service API key.
    pub api_key: Option<String>,
    /// Document store root URL.
    pub database_url: Option<String>,
    /// Identity service root URL.
    pub auth_endpoint: String,
    /// Token service root URL; `None` derives it from `auth_endpoint`.
    pub token_endpoint: Option<String>,
    /// Fallback REST store root URL.
    pub fallback_url: String,
    /// Run against an in-process store with a demo account.
    pub offline: bool,

    // -- UI --
    /// Poll timeout for the TUI event loop.
    pub poll_timeout: Duration,
    /// How long a success message stays visible.
    pub success_message: Duration,
    /// How long an error message stays visible.
    pub error_message: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let timings = StatusTimings::default();
        Self {
            api_key: None,
            database_url: None,
            auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
            token_endpoint: None,
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            offline: false,
            poll_timeout: Duration::from_millis(50),
            success_message: timings.success,
            error_message: timings.error,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/tarefas/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_key: non_empty(cli.api_key.clone())
                .or_else(|| non_empty(file.firebase.api_key.clone())),
            database_url: non_empty(cli.database_url.clone())
                .or_else(|| non_empty(file.firebase.database_url.clone())),
            auth_endpoint: cli
                .auth_endpoint
                .clone()
                .or_else(|| file.firebase.auth_endpoint.clone())
                .unwrap_or(defaults.auth_endpoint),
            token_endpoint: non_empty(cli.token_endpoint.clone())
                .or_else(|| non_empty(file.firebase.token_endpoint.clone())),
            fallback_url: cli
                .fallback_url
                .clone()
                .or_else(|| file.fallback.url.clone())
                .unwrap_or(defaults.fallback_url),
            offline: cli.offline,
            poll_timeout: file
                .ui
                .poll_timeout_ms
                .map_or(defaults.poll_timeout, Duration::from_millis),
            success_message: file
                .ui
                .success_message_secs
                .map_or(defaults.success_message, Duration::from_secs),
            error_message: file
                .ui
                .error_message_secs
                .map_or(defaults.error_message, Duration::from_secs),
        }
    }

    /// Select the store variant.
    ///
    /// `Configured` needs both an API key and a database URL; anything
    /// less selects the fallback REST store. Missing credentials are never
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the URL for the selected
    /// variant does not parse.
    pub fn store_mode(&self) -> Result<StoreMode, ConfigError> {
        if let (Some(api_key), Some(database_url)) = (&self.api_key, &self.database_url) {
            return Ok(StoreMode::Configured(FirebaseCredentials {
                api_key: api_key.clone(),
                database_url: parse_url("database", database_url)?,
                auth_endpoint: parse_url("auth endpoint", &self.auth_endpoint)?,
                token_endpoint: self
                    .token_endpoint
                    .as_deref()
                    .map(|raw| parse_url("token endpoint", raw))
                    .transpose()?,
            }));
        }
        Ok(StoreMode::Unconfigured(FallbackConfig {
            base_url: parse_url("fallback", &self.fallback_url)?,
        }))
    }

    /// Lifetimes of transient status messages.
    #[must_use]
    pub const fn status_timings(&self) -> StatusTimings {
        StatusTimings {
            success: self.success_message,
            error: self.error_message,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal task list")]
pub struct CliArgs {
    /// Web API key of the identity service.
    #[arg(long, env = "TAREFAS_API_KEY")]
    pub api_key: Option<String>,

    /// Root URL of the document store.
    #[arg(long, env = "TAREFAS_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Root URL of the identity service.
    #[arg(long, env = "TAREFAS_AUTH_ENDPOINT")]
    pub auth_endpoint: Option<String>,

    /// Root URL of the token refresh service.
    #[arg(long, env = "TAREFAS_TOKEN_ENDPOINT")]
    pub token_endpoint: Option<String>,

    /// Root URL of the unauthenticated fallback store.
    #[arg(long, env = "TAREFAS_FALLBACK_URL")]
    pub fallback_url: Option<String>,

    /// Use an in-process store with a demo account instead of the network.
    #[arg(long)]
    pub offline: bool,

    /// Path to config file (default: `~/.config/tarefas/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TAREFAS_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tarefas.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { field, source })
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("tarefas").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
