use std::fmt::Write;

use chronotune_core::prelude::*;

/// Human-readable end-of-run summary.
pub fn render(report: &RunReport) -> String {
    let mut out = String::new();
    let stats = &report.stats;

    let _ = writeln!(out, "Scanned {} audio files", report.files_scanned);
    let _ = writeln!(
        out,
        "Years found: {} cached, {} from tags, {} online, {} from file names, {} unresolved",
        stats.cache, stats.metadata, stats.external, stats.filename, stats.unresolved
    );

    match &report.execution {
        None => {
            let _ = writeln!(out, "Dry run, {} moves planned:", report.plan.moves.len());
            for entry in &report.plan.moves {
                let _ = writeln!(
                    out,
                    "  {} -> {} [{}]",
                    entry.source_path.display(),
                    entry.destination_path.display(),
                    entry.resolution
                );
            }
            for skipped in &report.plan.skipped {
                let _ = writeln!(out, "  skip {} ({})", skipped.path.display(), skipped.reason);
            }
        }
        Some(execution) => {
            let _ = writeln!(
                out,
                "Moved {}, backed up {}, skipped {}, failed {}",
                execution.moved, execution.backed_up, execution.skipped, execution.failed
            );
            for (path, reason) in execution.failures() {
                let _ = writeln!(out, "  failed {}: {reason}", path.display());
            }
        }
    }

    if report.cancelled {
        let _ = writeln!(out, "Run was interrupted; re-run to finish the remaining files");
    }
    if report.cache_degraded {
        let _ = writeln!(out, "Warning: cache was unreadable and started empty");
    }
    if !report.lookup_active && stats.external == 0 {
        let _ = writeln!(out, "Online lookup was not used");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chronotune_core::organize::{FileReport, OrganizationPlan};

    fn report(execution: Option<ExecutionReport>) -> RunReport {
        RunReport {
            files_scanned: 2,
            stats: ResolverStats {
                filename: 1,
                unresolved: 1,
                ..ResolverStats::default()
            },
            plan: Plan {
                moves: vec![OrganizationPlan {
                    source_path: PathBuf::from("/m/a/track_2024.mp3"),
                    destination_path: PathBuf::from("/m/2024/track_2024.mp3"),
                    requires_backup: true,
                    backup_path: Some(PathBuf::from("/m/backup_musicas/a/track_2024.mp3")),
                    resolution: Resolution::resolved(
                        Year::new(2024).unwrap(),
                        YearSource::Filename,
                    ),
                }],
                skipped: Vec::new(),
            },
            execution,
            cache_degraded: false,
            lookup_active: false,
            cancelled: false,
        }
    }

    #[test]
    fn dry_run_lists_planned_moves() {
        let text = render(&report(None));
        assert!(text.contains("Dry run, 1 moves planned"));
        assert!(text.contains("/m/a/track_2024.mp3 -> /m/2024/track_2024.mp3 [2024 (filename)]"));
        assert!(text.contains("1 from file names, 1 unresolved"));
    }

    #[test]
    fn executed_run_lists_failures() {
        let execution = ExecutionReport {
            moved: 0,
            backed_up: 0,
            skipped: 0,
            failed: 1,
            files: vec![FileReport {
                source: PathBuf::from("/m/a/track_2024.mp3"),
                outcome: FileOutcome::Failed {
                    reason: FailureReason::BackupFailed("disk full".into()),
                },
            }],
        };
        let text = render(&report(Some(execution)));
        assert!(text.contains("Moved 0, backed up 0, skipped 0, failed 1"));
        assert!(text.contains("failed /m/a/track_2024.mp3: backup failed: disk full"));
    }
}
