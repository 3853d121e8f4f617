//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroU64, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    AddCommentArgs, CacheCommand, CliArgs, Command, CommentsCommand, DeleteCommentArgs,
    InvalidateArgs, ListCommentsArgs, SettingsOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "inkpost";
const DEFAULT_KV_TTL_SECS: u64 = 3600;
const DEFAULT_KV_HEALTH_CHECK_COOLDOWN_MS: u64 = 30_000;
const DEFAULT_KV_HEALTH_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_KV_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DOCUMENT_STORE_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub kv: KvSettings,
    pub document_store: DocumentStoreSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Key-value cache backend. A missing `url` or `token` leaves the cache
/// unconfigured, which is a valid degraded mode.
#[derive(Debug, Clone)]
pub struct KvSettings {
    pub url: Option<Url>,
    pub token: Option<String>,
    pub default_ttl_seconds: NonZeroU64,
    pub health_check_cooldown: Duration,
    pub health_check_interval: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DocumentStoreSettings {
    pub endpoint: Option<Url>,
    pub project_id: Option<String>,
    pub database_id: Option<String>,
    pub comments_collection_id: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("INKPOST").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    kv: RawKvSettings,
    document_store: RawDocumentStoreSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.kv_url.as_ref() {
            self.kv.url = Some(url.clone());
        }
        if let Some(token) = overrides.kv_token.as_ref() {
            self.kv.token = Some(token.clone());
        }
        if let Some(ttl) = overrides.kv_default_ttl_seconds {
            self.kv.default_ttl_seconds = Some(ttl);
        }
        if let Some(cooldown) = overrides.kv_health_check_cooldown_ms {
            self.kv.health_check_cooldown_ms = Some(cooldown);
        }
        if let Some(interval) = overrides.kv_health_check_interval_seconds {
            self.kv.health_check_interval_seconds = Some(interval);
        }
        if let Some(endpoint) = overrides.document_store_endpoint.as_ref() {
            self.document_store.endpoint = Some(endpoint.clone());
        }
        if let Some(project) = overrides.document_store_project_id.as_ref() {
            self.document_store.project_id = Some(project.clone());
        }
        if let Some(key) = overrides.document_store_api_key.as_ref() {
            self.document_store.api_key = Some(key.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            kv,
            document_store,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let kv = build_kv_settings(kv)?;
        let document_store = build_document_store_settings(document_store)?;

        Ok(Self {
            logging,
            kv,
            document_store,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_kv_settings(kv: RawKvSettings) -> Result<KvSettings, LoadError> {
    let url = non_blank(kv.url)
        .map(|value| parse_base_url(&value, "kv.url"))
        .transpose()?;
    let token = non_blank(kv.token);

    let ttl = kv.default_ttl_seconds.unwrap_or(DEFAULT_KV_TTL_SECS);
    let default_ttl_seconds = NonZeroU64::new(ttl)
        .ok_or_else(|| LoadError::invalid("kv.default_ttl_seconds", "must be greater than zero"))?;

    let health_check_cooldown = Duration::from_millis(
        kv.health_check_cooldown_ms
            .unwrap_or(DEFAULT_KV_HEALTH_CHECK_COOLDOWN_MS),
    );

    let health_check_interval = positive_seconds(
        kv.health_check_interval_seconds
            .unwrap_or(DEFAULT_KV_HEALTH_CHECK_INTERVAL_SECS),
        "kv.health_check_interval_seconds",
    )?;

    let request_timeout = positive_seconds(
        kv.request_timeout_seconds
            .unwrap_or(DEFAULT_KV_REQUEST_TIMEOUT_SECS),
        "kv.request_timeout_seconds",
    )?;

    Ok(KvSettings {
        url,
        token,
        default_ttl_seconds,
        health_check_cooldown,
        health_check_interval,
        request_timeout,
    })
}

fn build_document_store_settings(
    store: RawDocumentStoreSettings,
) -> Result<DocumentStoreSettings, LoadError> {
    let endpoint = non_blank(store.endpoint)
        .map(|value| parse_base_url(&value, "document_store.endpoint"))
        .transpose()?;

    let request_timeout = positive_seconds(
        store
            .request_timeout_seconds
            .unwrap_or(DEFAULT_DOCUMENT_STORE_REQUEST_TIMEOUT_SECS),
        "document_store.request_timeout_seconds",
    )?;

    Ok(DocumentStoreSettings {
        endpoint,
        project_id: non_blank(store.project_id),
        database_id: non_blank(store.database_id),
        comments_collection_id: non_blank(store.comments_collection_id),
        api_key: non_blank(store.api_key),
        request_timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawKvSettings {
    url: Option<String>,
    token: Option<String>,
    default_ttl_seconds: Option<u64>,
    health_check_cooldown_ms: Option<u64>,
    health_check_interval_seconds: Option<u64>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocumentStoreSettings {
    endpoint: Option<String>,
    project_id: Option<String>,
    database_id: Option<String>,
    comments_collection_id: Option<String>,
    api_key: Option<String>,
    request_timeout_seconds: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_base_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "url scheme must be http or https"));
    }
    Ok(url)
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
