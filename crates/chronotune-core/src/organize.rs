//! Turning resolutions into file moves.
//!
//! Planning only reads the file system; `execute` is the single place that copies,
//! renames or creates folders.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::audio::AudioFile;
use crate::config::{Destination, OrganizerConfig};
use crate::resolution::Resolution;
use crate::year::Year;

mod execute;

pub use execute::{ExecutionReport, FailureReason, FileOutcome, FileReport, execute};

/// One pending move, optionally preceded by a backup copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationPlan {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub requires_backup: bool,
    /// Mirror of `source_path` under the backup root, set when `requires_backup`.
    pub backup_path: Option<PathBuf>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Unresolved,
    OutsideFilter { year: Year },
    AlreadyInPlace,
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unresolved => f.write_str("no year found"),
            SkipReason::OutsideFilter { year } => write!(f, "year {year} outside the filter"),
            SkipReason::AlreadyInPlace => f.write_str("already in its year folder"),
            SkipReason::Cancelled => f.write_str("run cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub moves: Vec<OrganizationPlan>,
    pub skipped: Vec<SkippedFile>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Computes where every resolved file should go.
///
/// Files are visited in path order. A destination name that already exists on
/// disk or was claimed earlier in this plan becomes `<stem>_<n><ext>` with the
/// smallest free `n`, so identical inputs always produce identical names.
pub fn plan(files: &[AudioFile], resolutions: &[Resolution], config: &OrganizerConfig) -> Plan {
    let mut pairs: Vec<(&AudioFile, &Resolution)> = files.iter().zip(resolutions).collect();
    pairs.sort_by(|(a, _), (b, _)| a.path.cmp(&b.path));

    let mut plan = Plan::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for (file, resolution) in pairs {
        let folder = match target_folder(resolution, config) {
            Ok(folder) => folder,
            Err(reason) => {
                plan.skipped.push(SkippedFile {
                    path: file.path.clone(),
                    reason,
                });
                continue;
            }
        };

        let target_dir = config.root.join(folder);
        if file.path.parent() == Some(target_dir.as_path()) {
            claimed.insert(file.path.clone());
            plan.skipped.push(SkippedFile {
                path: file.path.clone(),
                reason: SkipReason::AlreadyInPlace,
            });
            continue;
        }

        let Some(name) = file.path.file_name() else {
            continue;
        };
        let destination =
            disambiguate(&target_dir.join(name), |path| claimed.contains(path) || path.exists());
        claimed.insert(destination.clone());

        plan.moves.push(OrganizationPlan {
            source_path: file.path.clone(),
            destination_path: destination,
            requires_backup: config.backup,
            backup_path: config.backup.then(|| backup_path(&file.path, config)),
            resolution: *resolution,
        });
    }

    plan
}

fn target_folder(resolution: &Resolution, config: &OrganizerConfig) -> Result<String, SkipReason> {
    match resolution.year() {
        Some(year) if config.years.contains(year) => Ok(year.to_string()),
        Some(year) => match &config.out_of_filter {
            Destination::Route(name) => Ok(name.clone()),
            Destination::Leave => Err(SkipReason::OutsideFilter { year }),
        },
        None => match &config.unresolved {
            Destination::Route(name) => Ok(name.clone()),
            Destination::Leave => Err(SkipReason::Unresolved),
        },
    }
}

fn backup_path(source: &Path, config: &OrganizerConfig) -> PathBuf {
    let relative = source
        .strip_prefix(&config.root)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| source.file_name().map(PathBuf::from))
        .unwrap_or_default();
    config.backup_root().join(relative)
}

/// First of `candidate`, `<stem>_1<ext>`, `<stem>_2<ext>`... not `taken`.
pub(crate) fn disambiguate(candidate: &Path, mut taken: impl FnMut(&Path) -> bool) -> PathBuf {
    if !taken(candidate) {
        return candidate.to_path_buf();
    }
    let parent = candidate.parent().unwrap_or(Path::new(""));
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = candidate
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n: u32 = 1;
    loop {
        let next = parent.join(format!("{stem}_{n}{ext}"));
        if !taken(&next) {
            return next;
        }
        n += 1;
    }
}
