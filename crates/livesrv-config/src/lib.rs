//! Configuration management for livesrv.
//!
//! Parses `livesrv.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings are applied during load via [`CliSettings`] and take
//! precedence over file values.
//!
//! ## Environment Variable Expansion
//!
//! `server.host` and `serve.root` support `${VAR}` and `${VAR:-default}`.

mod expand;

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the directory to serve.
    pub root: Option<PathBuf>,
    /// Override reload-script injection.
    pub inject: Option<bool>,
    /// Override filesystem watching.
    pub watch: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "livesrv.toml";

/// Largest accepted watcher debounce window.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Raw `[serve]` section (root is a relative string from TOML).
    serve: ServeConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved directory to serve (set after loading).
    #[serde(skip)]
    pub root: PathBuf,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ServeConfigRaw {
    root: Option<String>,
}

/// How subscriber registry keys are derived.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientKeyMode {
    /// Remote endpoint plus a per-connection session id.
    #[default]
    Session,
    /// Remote endpoint only. Clients sharing an address overwrite each other.
    Remote,
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Inject the reload script into served HTML pages.
    pub inject: bool,
    /// Registry key derivation for subscribers.
    pub client_key: ClientKeyMode,
    /// Broadcast a reload when files under the root change.
    pub watch: bool,
    /// Glob patterns (relative to the root) the watcher reacts to.
    pub watch_patterns: Vec<String>,
    /// Quiet period before a batch of changes triggers a reload.
    pub debounce_ms: u64,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            inject: true,
            client_key: ClientKeyMode::default(),
            watch: false,
            watch_patterns: vec!["**/*".to_owned()],
            debounce_ms: 100,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`BIND_HOST`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `livesrv.toml` in the current directory and its parents, falling
    /// back to defaults rooted at the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit `config_path` doesn't exist, parsing fails,
    /// or the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root) = &settings.root {
            self.root.clone_from(root);
        }
        if let Some(inject) = settings.inject {
            self.live_reload.inject = inject;
        }
        if let Some(watch) = settings.watch {
            self.live_reload.watch = watch;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            serve: ServeConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            root: base.to_path_buf(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_live_reload()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Validation(
                "server.host cannot be empty".to_owned(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let live_reload = &self.live_reload;

        if live_reload.debounce_ms == 0 || live_reload.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "live_reload.debounce_ms must be between 1 and {MAX_DEBOUNCE_MS}"
            )));
        }

        if live_reload.watch && live_reload.watch_patterns.is_empty() {
            return Err(ConfigError::Validation(
                "live_reload.watch_patterns cannot be empty when watch is enabled".to_owned(),
            ));
        }

        for pattern in &live_reload.watch_patterns {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "live_reload.watch_patterns: invalid pattern {pattern:?}: {e}"
                )));
            }
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref root) = self.serve.root {
            self.serve.root = Some(expand::expand_env(root, "serve.root")?);
        }

        Ok(())
    }

    /// Resolve the serve root relative to the config file directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.root = config_dir.join(self.serve.root.as_deref().unwrap_or("."));
    }
}
