use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::audio::AudioFile;
use crate::error::{ChronoError, Result};
use crate::events::{RunContext, RunEvent, RunStatus};
use crate::kv::KvBackend;
use crate::organize::{ExecutionReport, Plan, SkipReason, SkippedFile, execute, plan};
use crate::resolution::Resolution;
use crate::resolver::{ResolverStats, YearResolver};
use crate::scanner::LibraryScanner;

/// Everything a caller needs to summarise a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub files_scanned: usize,
    pub stats: ResolverStats,
    pub plan: Plan,
    /// `None` for a dry run.
    pub execution: Option<ExecutionReport>,
    pub cache_degraded: bool,
    pub lookup_active: bool,
    pub cancelled: bool,
}

/// Drives one run: scan, resolve, plan, then execute unless dry-running.
pub struct Organizer<B: KvBackend> {
    ctx: Arc<RunContext>,
    resolver: YearResolver<B>,
    running: Mutex<bool>,
}

impl<B: KvBackend> Organizer<B> {
    pub fn new(ctx: Arc<RunContext>, resolver: YearResolver<B>) -> Self {
        Self {
            ctx,
            resolver,
            running: Mutex::new(false),
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn resolver(&self) -> &YearResolver<B> {
        &self.resolver
    }

    fn begin(&self) -> Result<()> {
        let mut running = self.running.lock();
        if *running {
            return Err(ChronoError::Unsupported("a run is already in progress"));
        }
        *running = true;
        Ok(())
    }

    fn end(&self) {
        *self.running.lock() = false;
    }

    pub async fn run(&self) -> Result<RunReport> {
        self.begin()?;
        let outcome = self.run_inner().await;
        self.end();

        match outcome {
            Ok(report) => {
                self.ctx.set_status(RunStatus::Finished);
                Ok(report)
            }
            Err(err) => {
                self.ctx.set_status(RunStatus::Faulted(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_inner(&self) -> Result<RunReport> {
        let config = self.ctx.config.clone();
        config.validate()?;

        self.ctx.set_status(RunStatus::Scanning);
        let files = LibraryScanner::new(&config).scan().await?;
        info!(root = %config.root.display(), files = files.len(), "scan finished");
        self.ctx.emit(RunEvent::ScanFinished { files: files.len() });

        self.ctx.set_status(RunStatus::Resolving);
        let resolutions = self.resolve_all(&files, config.concurrency).await;
        let resolved = &files[..resolutions.len()];

        let mut plan = plan(resolved, &resolutions, &config);
        plan.skipped
            .extend(files[resolutions.len()..].iter().map(|file| SkippedFile {
                path: file.path.clone(),
                reason: SkipReason::Cancelled,
            }));
        let execution = if config.dry_run {
            info!(moves = plan.moves.len(), "dry run, nothing moved");
            None
        } else {
            self.ctx.set_status(RunStatus::Organizing);
            Some(execute(&plan, &self.ctx).await)
        };

        if let Err(err) = self.resolver.cache().flush().await {
            warn!(error = %err, "failed to flush cache");
        }

        let (moved, skipped, failed) = match &execution {
            Some(report) => (report.moved, report.skipped, report.failed),
            None => (0, plan.skipped.len(), 0),
        };
        self.ctx.emit(RunEvent::Finished {
            moved,
            skipped,
            failed,
        });
        info!(moved, skipped, failed, "run finished");

        Ok(RunReport {
            files_scanned: files.len(),
            stats: self.resolver.stats(),
            plan,
            execution,
            cache_degraded: self.resolver.cache().is_degraded(),
            lookup_active: self.resolver.external().is_active(),
            cancelled: self.ctx.is_cancelled(),
        })
    }

    /// Resolves files in order with up to `concurrency` in flight. Stops taking new
    /// files once the run is cancelled, so the result may be a prefix of `files`.
    async fn resolve_all(&self, files: &[AudioFile], concurrency: usize) -> Vec<Resolution> {
        let cancel = self.ctx.cancel.clone();
        stream::iter(files)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|file| async move {
                let resolution = self.resolver.resolve(file).await;
                self.ctx.emit(RunEvent::Resolved {
                    path: file.path.clone(),
                    resolution,
                });
                resolution
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}
