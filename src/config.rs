//! Configuration file loading and merging with CLI flags.
//!
//! An optional TOML file supplies defaults; explicit command-line flags win.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use catalog_mirror_core::download::DEFAULT_BATCH_SIZE;
use catalog_mirror_core::headers::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, HttpTimeouts, RequestHeaders,
};
use catalog_mirror_core::retry::DEFAULT_MAX_ATTEMPTS;
use serde::Deserialize;
use url::Url;

use crate::cli::Args;

/// Catalog queried when neither flag nor config names one.
pub const DEFAULT_CATALOG_URL: &str = "https://beatsaver.com";
/// Default artifact directory.
pub const DEFAULT_OUTPUT_DIR: &str = "songs";
/// Default database file.
pub const DEFAULT_DATABASE: &str = "catalog.db";
/// Default pause between catalog pages, in milliseconds.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 2_000;
/// Default pause between download batches, in milliseconds.
pub const DEFAULT_BATCH_DELAY_MS: u64 = 5_000;

const CONFIG_DIR_NAME: &str = "catalog-mirror";

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Base URL of the remote catalog.
    pub catalog_url: Option<String>,
    /// Directory downloaded artifacts are written to.
    pub output_dir: Option<PathBuf>,
    /// SQLite database file.
    pub database: Option<PathBuf>,
    /// Items per download batch (1..=64).
    pub batch_size: Option<usize>,
    /// Pause between catalog pages in milliseconds.
    pub page_delay_ms: Option<u64>,
    /// Pause between download batches in milliseconds.
    pub batch_delay_ms: Option<u64>,
    /// Attempts per catalog page before the run aborts.
    pub fetch_max_attempts: Option<u32>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
    /// User-Agent override for every request.
    pub user_agent: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_range("batch_size", self.batch_size, 1..=64)?;
        validate_range("page_delay_ms", self.page_delay_ms, 0..=60_000)?;
        validate_range("batch_delay_ms", self.batch_delay_ms, 0..=600_000)?;
        validate_range("fetch_max_attempts", self.fetch_max_attempts, 1..=100)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1..=3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1..=3600)?;

        if let Some(url) = &self.catalog_url {
            parse_catalog_url(url).context("Invalid config value for `catalog_url`")?;
        }
        if self
            .user_agent
            .as_deref()
            .is_some_and(|ua| ua.trim().is_empty())
        {
            bail!("Invalid config value for `user_agent`: must not be empty");
        }
        Ok(())
    }
}

fn validate_range<T>(field: &str, value: Option<T>, range: std::ops::RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    let Some(value) = value else {
        return Ok(());
    };
    if !range.contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Tracing filter directive for this verbosity.
    #[must_use]
    pub fn level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Config file location and contents, when one exists.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/catalog-mirror/config.toml`
/// 2. `$HOME/.config/catalog-mirror/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join(CONFIG_DIR_NAME).join("config.toml"));
    }
    Some(
        PathBuf::from(home?)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = std::env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path) if path.exists() => Some(load_file_config(path)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let cfg: FileConfig = toml::from_str(raw)?;
    cfg.validate()?;
    Ok(cfg)
}

fn parse_catalog_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("'{raw}' is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("'{raw}' must use http or https");
    }
    Ok(url)
}

/// Effective settings after merging CLI flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub catalog_url: Url,
    pub output_dir: PathBuf,
    pub database: PathBuf,
    pub batch_size: usize,
    pub page_delay: Duration,
    pub batch_delay: Duration,
    pub fetch_max_attempts: u32,
    pub timeouts: HttpTimeouts,
    pub user_agent: Option<String>,
    pub verbosity: Option<VerbositySetting>,
}

impl Settings {
    /// Merges `args` over `file`, falling back to built-in defaults.
    pub fn resolve(args: &Args, file: Option<&FileConfig>) -> Result<Self> {
        let file = file.cloned().unwrap_or_default();

        let catalog_url = args
            .catalog_url
            .clone()
            .or(file.catalog_url)
            .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string());

        Ok(Self {
            catalog_url: parse_catalog_url(&catalog_url).context("Invalid catalog URL")?,
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            database: args
                .database
                .clone()
                .or(file.database)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            batch_size: args
                .batch_size
                .or(file.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            page_delay: Duration::from_millis(
                args.page_delay_ms
                    .or(file.page_delay_ms)
                    .unwrap_or(DEFAULT_PAGE_DELAY_MS),
            ),
            batch_delay: Duration::from_millis(
                args.batch_delay_ms
                    .or(file.batch_delay_ms)
                    .unwrap_or(DEFAULT_BATCH_DELAY_MS),
            ),
            fetch_max_attempts: args
                .fetch_max_attempts
                .or(file.fetch_max_attempts)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            timeouts: HttpTimeouts {
                connect_secs: file
                    .connect_timeout_secs
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                read_secs: file.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
            },
            user_agent: file.user_agent,
            verbosity: file.verbosity,
        })
    }

    /// Request headers for both HTTP clients.
    #[must_use]
    pub fn request_headers(&self) -> RequestHeaders {
        match &self.user_agent {
            Some(ua) => RequestHeaders::default().with_user_agent(ua.clone()),
            None => RequestHeaders::default(),
        }
    }
}
