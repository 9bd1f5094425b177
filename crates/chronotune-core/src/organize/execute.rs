use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::events::{RunContext, RunEvent};

use super::{OrganizationPlan, Plan, SkipReason, disambiguate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    /// The backup copy could not be written; the source was left in place.
    BackupFailed(String),
    MoveFailed(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::BackupFailed(msg) => write!(f, "backup failed: {msg}"),
            FailureReason::MoveFailed(msg) => write!(f, "move failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Moved {
        destination: PathBuf,
        backup: Option<PathBuf>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        reason: FailureReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub moved: usize,
    pub backed_up: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl ExecutionReport {
    fn record(&mut self, ctx: &RunContext, source: &Path, outcome: FileOutcome) {
        let event = match &outcome {
            FileOutcome::Moved { destination, .. } => {
                self.moved += 1;
                RunEvent::Moved {
                    source: source.to_path_buf(),
                    destination: destination.clone(),
                }
            }
            FileOutcome::Skipped { reason } => {
                self.skipped += 1;
                RunEvent::Skipped {
                    path: source.to_path_buf(),
                    reason: *reason,
                }
            }
            FileOutcome::Failed { reason } => {
                self.failed += 1;
                RunEvent::Failed {
                    path: source.to_path_buf(),
                    reason: reason.clone(),
                }
            }
        };
        ctx.emit(event);
        self.files.push(FileReport {
            source: source.to_path_buf(),
            outcome,
        });
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &FailureReason)> {
        self.files.iter().filter_map(|file| match &file.outcome {
            FileOutcome::Failed { reason } => Some((file.source.as_path(), reason)),
            _ => None,
        })
    }
}

/// Carries out a plan one file at a time.
///
/// For each file the backup copy is finished before the move starts, and a failed
/// backup leaves the source untouched. Cancellation is honoured between files only.
/// No per-file failure stops the batch.
pub async fn execute(plan: &Plan, ctx: &RunContext) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for skipped in &plan.skipped {
        report.record(ctx, &skipped.path, FileOutcome::Skipped {
            reason: skipped.reason,
        });
    }

    for entry in &plan.moves {
        if ctx.is_cancelled() {
            report.record(ctx, &entry.source_path, FileOutcome::Skipped {
                reason: SkipReason::Cancelled,
            });
            continue;
        }

        let backup = match backup_step(entry).await {
            Ok(backup) => backup,
            Err(err) => {
                warn!(path = %entry.source_path.display(), error = %err, "backup failed, file not moved");
                report.record(ctx, &entry.source_path, FileOutcome::Failed {
                    reason: FailureReason::BackupFailed(err.to_string()),
                });
                continue;
            }
        };
        if let Some(backup) = &backup {
            report.backed_up += 1;
            ctx.emit(RunEvent::BackedUp {
                source: entry.source_path.clone(),
                backup: backup.clone(),
            });
        }

        let outcome = match move_file(&entry.source_path, &entry.destination_path).await {
            Ok(destination) => {
                info!(
                    from = %entry.source_path.display(),
                    to = %destination.display(),
                    "moved"
                );
                FileOutcome::Moved {
                    destination,
                    backup,
                }
            }
            Err(err) => {
                warn!(path = %entry.source_path.display(), error = %err, "move failed");
                FileOutcome::Failed {
                    reason: FailureReason::MoveFailed(err.to_string()),
                }
            }
        };
        report.record(ctx, &entry.source_path, outcome);
    }

    report
}

async fn backup_step(entry: &OrganizationPlan) -> io::Result<Option<PathBuf>> {
    match (&entry.backup_path, entry.requires_backup) {
        (Some(target), true) => backup_file(&entry.source_path, target).await.map(Some),
        (None, true) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "backup required but no backup path planned",
        )),
        (_, false) => Ok(None),
    }
}

/// Copies `source` to `target`. An identical file already at `target` is taken to
/// be the backup from an interrupted earlier run; a different one is kept and the
/// copy gets a suffixed name.
async fn backup_file(source: &Path, target: &Path) -> io::Result<PathBuf> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    let source_len = fs::metadata(source).await?.len();

    let target = match fs::metadata(target).await {
        Ok(existing) if existing.is_file() && existing.len() == source_len => {
            if same_contents(source, target).await? {
                debug!(path = %target.display(), "reusing existing backup");
                return Ok(target.to_path_buf());
            }
            disambiguate(target, |path| path.exists())
        }
        Ok(_) => disambiguate(target, |path| path.exists()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => target.to_path_buf(),
        Err(err) => return Err(err),
    };

    fs::copy(source, &target).await?;
    Ok(target)
}

async fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    let (a, b) = tokio::try_join!(fs::read(a), fs::read(b))?;
    Ok(a == b)
}

/// Renames `source` into place, re-suffixing if the planned name got taken since
/// planning. Falls back to copy and remove across file systems.
async fn move_file(source: &Path, planned: &Path) -> io::Result<PathBuf> {
    if let Some(parent) = planned.parent() {
        fs::create_dir_all(parent).await?;
    }
    let destination = disambiguate(planned, |path| path.exists());

    match fs::rename(source, &destination).await {
        Ok(()) => Ok(destination),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_remove(source, &destination).await?;
            Ok(destination)
        }
        Err(err) => Err(err),
    }
}

/// Leaves exactly one of `source` and `destination` on disk.
async fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    if let Err(err) = fs::copy(source, destination).await {
        let _ = fs::remove_file(destination).await;
        return Err(err);
    }
    if let Err(err) = fs::remove_file(source).await {
        let _ = fs::remove_file(destination).await;
        return Err(err);
    }
    Ok(())
}
