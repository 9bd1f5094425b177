use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tokio::task::spawn_blocking;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::audio::AudioFile;
use crate::config::{OrganizerConfig, YearFilter};
use crate::error::{ChronoError, Result};
use crate::year::Year;

/// Finds candidate audio files under the library root.
///
/// Top-level folders the tool writes into are not descended: the backup folder,
/// routed sentinel folders and year folders matching the filter. Re-running on an
/// organized tree therefore finds nothing new.
#[derive(Debug, Clone)]
pub struct LibraryScanner {
    root: PathBuf,
    reserved: BTreeSet<String>,
    years: YearFilter,
}

impl LibraryScanner {
    pub fn new(config: &OrganizerConfig) -> Self {
        Self {
            root: config.root.clone(),
            reserved: config.reserved_folders(),
            years: config.years.clone(),
        }
    }

    pub async fn scan(&self) -> Result<Vec<AudioFile>> {
        let scanner = self.clone();
        spawn_blocking(move || scanner.scan_blocking())
            .await
            .map_err(|err| ChronoError::Io(io::Error::other(err)))?
    }

    /// Fails only when the root itself cannot be listed; unreadable entries below it
    /// are logged and skipped.
    pub fn scan_blocking(&self) -> Result<Vec<AudioFile>> {
        std::fs::read_dir(&self.root).map_err(|source| ChronoError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_output_folder(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match AudioFile::probe(entry.path()) {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(err) => warn!(path = %entry.path().display(), error = %err, "cannot stat file"),
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(root = %self.root.display(), count = files.len(), "scan finished");
        Ok(files)
    }

    fn is_output_folder(&self, entry: &DirEntry) -> bool {
        if entry.depth() != 1 || !entry.file_type().is_dir() {
            return false;
        }
        let Some(name) = entry.file_name().to_str() else {
            return false;
        };
        self.reserved.contains(name) || self.is_year_folder(name)
    }

    fn is_year_folder(&self, name: &str) -> bool {
        name.len() == 4
            && name.bytes().all(|b| b.is_ascii_digit())
            && name
                .parse::<u16>()
                .ok()
                .and_then(Year::new)
                .is_some_and(|year| self.years.contains(year))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
