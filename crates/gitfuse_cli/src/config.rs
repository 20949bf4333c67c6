//! Configuration file support for gitfuse.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `GITFUSE_`, e.g., `GITFUSE_MOUNT__UPDATE_RATE`)
//! 3. Config file (~/.config/gitfuse/config.toml or ./gitfuse.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token_file = "~/.config/gitfuse/token"  # or token = "ghp_...", or GITFUSE_GITHUB_TOKEN
//! api_url = "https://api.github.com"      # GitHub Enterprise: https://ghe.example.com/api/v3
//!
//! [mount]
//! users = ["alice"]
//! orgs = ["acme"]
//! update_rate = 300        # seconds between catalog refreshes
//! concurrency = 4
//! fetch_timeout_secs = 20
//! requests_per_second = 10 # omit to disable proactive rate limiting
//! allow_other = false
//! auto_unmount = true
//!
//! [cache]
//! dir = "~/.cache/gitfuse"  # optional, this is the default
//! blob_capacity = 512
//! ```

use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use gitfuse::catalog::DEFAULT_CONCURRENCY;
use gitfuse::config::{DEFAULT_UPDATE_RATE_SECS, RawSettings};
use gitfuse::fs::DEFAULT_FETCH_TIMEOUT;
use gitfuse::github::{DEFAULT_API_URL, GitHubToken, TokenError};
use gitfuse::tree::DEFAULT_BLOB_CAPACITY;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable holding the GitHub token.
pub const TOKEN_ENV: &str = "GITFUSE_GITHUB_TOKEN";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// Mount and refresh options.
    pub mount: MountConfig,
    /// On-disk cache configuration.
    pub cache: CacheConfig,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    /// Can also be set via GITFUSE_GITHUB_TOKEN environment variable.
    pub token: Option<String>,
    /// File whose first line is the token. Takes precedence over `token`.
    pub token_file: Option<PathBuf>,
    /// REST API base URL.
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_file: None,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Mount and refresh options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub users: Vec<String>,
    pub orgs: Vec<String>,
    /// Seconds between catalog refreshes.
    pub update_rate: f64,
    /// Maximum owners fetched at once.
    pub concurrency: usize,
    /// Seconds to wait for a file tree or blob before giving up.
    pub fetch_timeout_secs: u64,
    /// Proactive request rate. Unset or zero disables the limiter.
    pub requests_per_second: Option<u32>,
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            orgs: Vec::new(),
            update_rate: DEFAULT_UPDATE_RATE_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            requests_per_second: None,
            allow_other: false,
            auto_unmount: true,
        }
    }
}

/// On-disk cache configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for the ETag cache.
    /// Defaults to `$XDG_CACHE_HOME/gitfuse` if not specified.
    pub dir: Option<PathBuf>,
    /// Maximum number of file contents kept in memory.
    pub blob_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            blob_capacity: DEFAULT_BLOB_CAPACITY,
        }
    }
}

/// Errors resolving the GitHub token.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(
        "No GitHub token configured. Pass --token-file, set github.token_file in the config file, \
         or set GITFUSE_GITHUB_TOKEN"
    )]
    Missing,

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/gitfuse/config.toml)
    /// 3. Local config file (./gitfuse.toml)
    /// 4. Environment variables with GITFUSE_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("gitfuse.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./gitfuse.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // GITFUSE_MOUNT__UPDATE_RATE -> mount.update_rate
        builder = builder.add_source(
            Environment::with_prefix("GITFUSE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("mount.users")
                .with_list_parse_key("mount.orgs")
                .try_parsing(true),
        );

        let mut config = match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        };

        // The single-underscore name is the documented one.
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.trim().is_empty()
        {
            config.github.token = Some(token);
        }

        config
    }

    /// Unvalidated library settings from the `[mount]` and `[cache]` sections.
    pub fn raw_settings(&self) -> RawSettings {
        RawSettings {
            users: self.mount.users.clone(),
            orgs: self.mount.orgs.clone(),
            update_rate: self.mount.update_rate,
            concurrency: self.mount.concurrency,
            fetch_timeout_secs: self.mount.fetch_timeout_secs,
            requests_per_second: self.mount.requests_per_second,
            blob_capacity: self.cache.blob_capacity,
        }
    }

    /// Resolve the GitHub token.
    ///
    /// A token file given on the command line wins, then `github.token_file`,
    /// then `github.token` (which `GITFUSE_GITHUB_TOKEN` overrides).
    pub fn github_token(&self, token_file: Option<&Path>) -> Result<GitHubToken, CredentialError> {
        if let Some(path) = token_file.or(self.github.token_file.as_deref()) {
            return Ok(GitHubToken::from_file(path)?);
        }
        match &self.github.token {
            Some(token) => Ok(GitHubToken::new(token)?),
            None => Err(CredentialError::Missing),
        }
    }

    /// Directory for the persistent ETag cache.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache.dir.clone().or_else(Self::default_cache_dir)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gitfuse").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default cache directory path.
    ///
    /// On Linux, this is `$XDG_CACHE_HOME/gitfuse` or `~/.cache/gitfuse`.
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gitfuse").map(|dirs| dirs.cache_dir().to_path_buf())
    }
}
