//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Try environment variables (client id and secret are required)
//! 2. Otherwise fall back to a config file
//! 3. Probe standard paths for that file
//! 4. JSON and TOML are both accepted
//!
//! ## Environment Variables
//! - `CATALINK_CLIENT_ID`, `CATALINK_CLIENT_SECRET`: required
//! - `CATALINK_EMAIL`: account email (production signing)
//! - `CATALINK_ENVIRONMENT`: `sandbox` (default) or `production`
//! - `CATALINK_BASE_URL`: API base URL override
//! - `CATALINK_CACHE_URL`: Redis URL of the shared token cache
//! - `CATALINK_RATE_LIMIT_RPS`, `CATALINK_RATE_LIMIT_BURST`: global bucket
//! - `CATALINK_MAX_RETRIES`: retry ceiling
//! - `CATALINK_WEBHOOK_SECRET`: webhook HMAC secret
//!
//! ## File Locations
//! `catalink.{json,toml}` then `config.{json,toml}`, in the working
//! directory and its two parents, then next to the executable.
//!
//! ```toml
//! [credentials]
//! client_id = "abc"
//! client_secret = "s3cret"
//! environment = "production"
//!
//! [client.retry]
//! max_retries = 5
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use catalink_domain::{CatalinkError, ClientConfig, Credentials, Environment, Result};
use serde::{Deserialize, Serialize};

/// Everything needed to construct a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedConfig {
    pub credentials: Credentials,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Load configuration, environment first, then file
///
/// # Errors
/// `ValidationError` when neither source yields a valid configuration.
pub fn load() -> Result<LoadedConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(err) => {
            tracing::debug!(error = %err, "environment incomplete, trying config file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `CATALINK_*` environment variables
///
/// # Errors
/// `ValidationError` if a required variable is missing or a value does not
/// parse.
pub fn load_from_env() -> Result<LoadedConfig> {
    from_lookup(|key| std::env::var(key).ok())
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<LoadedConfig> {
    let required = |key: &str| {
        lookup(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| config_error(format!("missing required environment variable: {key}")))
    };

    let environment = match lookup("CATALINK_ENVIRONMENT") {
        Some(value) => Environment::from_str(&value).map_err(config_error)?,
        None => Environment::default(),
    };
    let mut credentials = Credentials::new(
        required("CATALINK_CLIENT_ID")?,
        required("CATALINK_CLIENT_SECRET")?,
        environment,
    );
    credentials.email = lookup("CATALINK_EMAIL");

    let mut client = ClientConfig::default();
    client.base_url = lookup("CATALINK_BASE_URL");
    client.cache_url = lookup("CATALINK_CACHE_URL");
    client.webhook.secret = lookup("CATALINK_WEBHOOK_SECRET");
    if let Some(rps) = parsed::<f64>(&lookup, "CATALINK_RATE_LIMIT_RPS")? {
        client.rate_limit.global.requests_per_second = rps;
    }
    if let Some(burst) = parsed::<u32>(&lookup, "CATALINK_RATE_LIMIT_BURST")? {
        client.rate_limit.global.burst = burst;
    }
    if let Some(max_retries) = parsed::<u32>(&lookup, "CATALINK_MAX_RETRIES")? {
        client.retry.max_retries = max_retries;
    }
    if let Some(timeout_ms) = parsed::<u64>(&lookup, "CATALINK_CACHE_TIMEOUT_MS")? {
        client.cache_timeout_ms = timeout_ms;
    }

    client.validate()?;
    Ok(LoadedConfig { credentials, client })
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|err| config_error(format!("invalid {key} '{raw}': {err}")))
        })
        .transpose()
}

/// Load configuration from a file
///
/// With `path = None`, the first file found by [`probe_config_paths`] is
/// used. The format follows the extension (`.json` or `.toml`).
///
/// # Errors
/// `ValidationError` if the file is missing, unreadable, malformed, or
/// fails validation.
pub fn load_from_file(path: Option<PathBuf>) -> Result<LoadedConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(config_error(format!("config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths()
            .ok_or_else(|| config_error("no config file found in any of the standard locations"))?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|err| config_error(format!("failed to read config file: {err}")))?;

    let loaded = parse_config(&contents, &config_path)?;
    loaded.client.validate()?;
    Ok(loaded)
}

fn parse_config(contents: &str, path: &Path) -> Result<LoadedConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|err| config_error(format!("invalid TOML format: {err}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|err| config_error(format!("invalid JSON format: {err}"))),
        other => Err(config_error(format!("unsupported config format: {other}"))),
    }
}

const CONFIG_FILE_NAMES: [&str; 4] = ["catalink.json", "catalink.toml", "config.json", "config.toml"];

/// First existing config file in the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn config_error(message: impl Into<String>) -> CatalinkError {
    CatalinkError::validation(message).with_context("source", "config")
}
