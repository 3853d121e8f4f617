use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Inkpost binary.
#[derive(Debug, Parser)]
#[command(name = "inkpost", version, about = "Inkpost comment cache tooling")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INKPOST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Read and modify post comments through the cache.
    #[command(subcommand)]
    Comments(CommentsCommand),
    /// Inspect or maintain the comment cache.
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Run periodic cache health checks until interrupted.
    Monitor,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommentsCommand {
    /// List a post's comments, newest first.
    List(ListCommentsArgs),
    /// Add a comment to a post.
    Add(AddCommentArgs),
    /// Delete a comment from a post.
    Delete(DeleteCommentArgs),
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Exercise ping, set, get and delete against the cache backend.
    Check,
    /// Drop a post's cached comment list.
    Invalidate(InvalidateArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ListCommentsArgs {
    /// Post identifier.
    #[arg(value_name = "POST_ID")]
    pub post_id: String,

    /// Skip the cache read and reload from the document store.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force_refresh: bool,
}

#[derive(Debug, Args, Clone)]
pub struct AddCommentArgs {
    /// Post identifier.
    #[arg(value_name = "POST_ID")]
    pub post_id: String,

    #[arg(long = "author-id", value_name = "ID")]
    pub author_id: String,

    #[arg(long = "author-name", value_name = "NAME", default_value = "")]
    pub author_name: String,

    #[arg(long, value_name = "TEXT")]
    pub content: String,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteCommentArgs {
    /// Post identifier.
    #[arg(value_name = "POST_ID")]
    pub post_id: String,

    /// Comment identifier.
    #[arg(value_name = "COMMENT_ID")]
    pub comment_id: String,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    /// Post identifier.
    #[arg(value_name = "POST_ID")]
    pub post_id: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SettingsOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the key-value REST endpoint.
    #[arg(long = "kv-url", env = "UPSTASH_REDIS_REST_URL", value_name = "URL")]
    pub kv_url: Option<String>,

    /// Override the key-value bearer token.
    #[arg(
        long = "kv-token",
        env = "UPSTASH_REDIS_REST_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub kv_token: Option<String>,

    /// Override the lifetime of cached comment lists.
    #[arg(long = "kv-default-ttl-seconds", value_name = "SECONDS")]
    pub kv_default_ttl_seconds: Option<u64>,

    /// Override the minimum spacing between cache health probes.
    #[arg(long = "kv-health-check-cooldown-ms", value_name = "MILLISECONDS")]
    pub kv_health_check_cooldown_ms: Option<u64>,

    /// Override the period of the background health probe.
    #[arg(long = "kv-health-check-interval-seconds", value_name = "SECONDS")]
    pub kv_health_check_interval_seconds: Option<u64>,

    /// Override the document store endpoint.
    #[arg(long = "document-store-endpoint", value_name = "URL")]
    pub document_store_endpoint: Option<String>,

    /// Override the document store project.
    #[arg(long = "document-store-project-id", value_name = "ID")]
    pub document_store_project_id: Option<String>,

    /// Override the document store API key.
    #[arg(long = "document-store-api-key", value_name = "KEY")]
    pub document_store_api_key: Option<String>,
}
