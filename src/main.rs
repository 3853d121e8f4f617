use std::{process, sync::Arc};

use inkpost::{
    application::{error::AppError, repos::CommentsRepo},
    cache::{CacheConfig, CommentCache, GetOptions, KvStore},
    config::{self, CacheCommand, Command, CommentsCommand, Settings},
    domain::comments::NewComment,
    infra::{
        appwrite::{AppwriteCommentsRepo, UnconfiguredCommentsRepo},
        error::InfraError,
        kv::RestKvClient,
        telemetry,
    },
};
use serde::Serialize;
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let summary = error.report().summary();
    if dispatcher::has_been_set() {
        error!(error = %summary, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %summary, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        Command::Comments(command) => run_comments(&settings, command).await,
        Command::Cache(command) => run_cache(&settings, command).await,
        Command::Monitor => run_monitor(&settings).await,
    }
}

fn build_cache(
    settings: &Settings,
    comments: Arc<dyn CommentsRepo>,
) -> Result<Arc<CommentCache>, AppError> {
    let kv: Arc<dyn KvStore> = Arc::new(RestKvClient::new(&settings.kv)?);
    Ok(Arc::new(CommentCache::new(
        kv,
        comments,
        CacheConfig::from(&settings.kv),
    )))
}

fn cache_only(settings: &Settings) -> Result<Arc<CommentCache>, AppError> {
    build_cache(
        settings,
        Arc::new(UnconfiguredCommentsRepo::new(
            "not needed by cache commands",
        )),
    )
}

async fn run_comments(settings: &Settings, command: CommentsCommand) -> Result<(), AppError> {
    let repo: Arc<dyn CommentsRepo> = Arc::new(AppwriteCommentsRepo::new(&settings.document_store)?);
    let cache = build_cache(settings, repo)?;

    match command {
        CommentsCommand::List(args) => {
            let options = GetOptions {
                force_refresh: args.force_refresh,
            };
            let listing = cache.get_comments(&args.post_id, options).await?;
            print_json(&listing)
        }
        CommentsCommand::Add(args) => {
            let params = NewComment {
                post_id: args.post_id.clone(),
                author_id: args.author_id,
                author_name: args.author_name,
                content: args.content,
            };
            let comment = cache.add_comment(&args.post_id, params).await?;
            print_json(&comment)
        }
        CommentsCommand::Delete(args) => {
            cache
                .delete_comment(&args.post_id, &args.comment_id)
                .await?;
            print_json(&json!({
                "post_id": args.post_id,
                "comment_id": args.comment_id,
                "deleted": true,
            }))
        }
    }
}

async fn run_cache(settings: &Settings, command: CacheCommand) -> Result<(), AppError> {
    let cache = cache_only(settings)?;

    match command {
        CacheCommand::Check => {
            let report = cache.test_connection().await;
            print_json(&report)?;
            if report.overall {
                Ok(())
            } else {
                Err(AppError::unexpected("cache connection test failed"))
            }
        }
        CacheCommand::Invalidate(args) => {
            let invalidated = cache.invalidate(&args.post_id).await;
            print_json(&json!({
                "post_id": args.post_id,
                "invalidated": invalidated,
            }))
        }
    }
}

async fn run_monitor(settings: &Settings) -> Result<(), AppError> {
    let cache = cache_only(settings)?;
    cache.initialize().await;
    print_json(&cache.health())?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::unexpected(format!("failed to listen for shutdown: {err}")))?;

    info!("Shutdown signal received");
    cache.destroy();
    print_json(&cache.health())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
