//! Configuration for the store emulator.
//!
//! Layered with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tarefas-emulator/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

/// Errors that can occur when loading emulator configuration.
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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EmulatorConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    keep_alive_secs: Option<u64>,
    token_ttl_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the emulator.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Tarefas document store emulator")]
pub struct EmulatorCliArgs {
    /// Address to bind to.
    #[arg(short, long, env = "EMULATOR_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/tarefas-emulator/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seconds between keep-alive events on live streams.
    #[arg(long)]
    pub keep_alive_secs: Option<u64>,

    /// Lifetime of issued id tokens, in seconds.
    #[arg(long)]
    pub token_ttl_secs: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "EMULATOR_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved emulator configuration.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Address to bind the server to.
    pub bind_addr: String,
    /// Seconds between keep-alive events on live streams.
    pub keep_alive_secs: u64,
    /// Lifetime of issued id tokens, in seconds.
    pub token_ttl_secs: u64,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            keep_alive_secs: 30,
            token_ttl_secs: 3600,
            log_level: "info".to_string(),
        }
    }
}

impl EmulatorConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// An explicit `--config` that does not exist is an error; a missing
    /// default file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &EmulatorCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &EmulatorCliArgs, file: &EmulatorConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            keep_alive_secs: cli
                .keep_alive_secs
                .or(file.server.keep_alive_secs)
                .unwrap_or(defaults.keep_alive_secs)
                .max(1),
            token_ttl_secs: cli
                .token_ttl_secs
                .or(file.server.token_ttl_secs)
                .unwrap_or(defaults.token_ttl_secs)
                .max(1),
            log_level: cli.log_level.clone(),
        }
    }
}

fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<EmulatorConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(EmulatorConfigFile::default());
        };
        config_dir.join("tarefas-emulator").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EmulatorConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
