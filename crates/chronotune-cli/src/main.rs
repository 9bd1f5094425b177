use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use chronotune_cli::{Cli, Command, OrganizeArgs, render};
use chronotune_core::config::DEFAULT_CACHE_PATH;
use chronotune_core::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::ClearCache => {
            let path = cli.cache.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH));
            clear_cache(&path).await
        }
        Command::Organize(args) => organize(args, cli.cache).await,
    }
}

async fn clear_cache(path: &Path) -> anyhow::Result<()> {
    CacheStore::reset(path).await?;
    info!(path = %path.display(), "cache cleared");
    println!("Cleared cache at {}", path.display());
    Ok(())
}

async fn organize(args: OrganizeArgs, cache_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = args.to_config(cache_path.as_deref())?;
    info!(root = %config.root.display(), dry_run = config.dry_run, "ChronoTune starting");

    let bounds = YearBounds::current();
    let cache = Arc::new(CacheStore::open(&config.cache_path)?);
    let external = external_resolver(&args, &config.lookup, bounds);
    let resolver = YearResolver::new(
        cache,
        Arc::new(LoftyMetadataReader::new()),
        external,
        bounds,
    );

    let context = Arc::new(RunContext::new(config));
    let organizer = Organizer::new(context.clone(), resolver);

    let cancel = context.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing the current file before stopping");
            cancel.cancel();
        }
    });
    let progress = tokio::spawn(log_progress(context.subscribe()));

    let report = organizer.run().await;
    progress.abort();
    let report = report?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

fn external_resolver(args: &OrganizeArgs, lookup: &LookupConfig, bounds: YearBounds) -> ExternalResolver {
    if !lookup.enabled {
        return ExternalResolver::disabled();
    }
    let Some(credentials) = args.credentials() else {
        info!("no catalog credentials, online lookup disabled");
        return ExternalResolver::disabled();
    };
    match SpotifyCatalog::new(credentials, lookup.timeout) {
        Ok(catalog) => ExternalResolver::new(Arc::new(catalog), lookup.clone(), bounds),
        Err(err) => {
            warn!(error = %err, "catalog client unavailable, online lookup disabled");
            ExternalResolver::disabled()
        }
    }
}

async fn log_progress(mut events: tokio::sync::broadcast::Receiver<RunEvent>) {
    let mut total = 0;
    let mut done = 0;
    loop {
        match events.recv().await {
            Ok(RunEvent::ScanFinished { files }) => total = files,
            Ok(RunEvent::Resolved { path, resolution }) => {
                done += 1;
                info!("[{done}/{total}] {} -> {resolution}", path.display());
            }
            Ok(RunEvent::Finished { .. }) => break,
            Ok(event) => debug!(?event, "run event"),
            Err(RecvError::Lagged(missed)) => debug!(missed, "progress fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
