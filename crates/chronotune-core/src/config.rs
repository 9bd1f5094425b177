use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::year::Year;

pub const DEFAULT_BACKUP_DIR: &str = "backup_musicas";
pub const DEFAULT_CACHE_PATH: &str = "music_cache.sled";
pub const OTHER_YEARS_DIR: &str = "outros_anos";
pub const UNRESOLVED_DIR: &str = "nao_identificadas";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrganizerConfig {
    pub root: PathBuf,
    pub years: YearFilter,
    pub backup: bool,
    pub backup_dir_name: String,
    pub unresolved: Destination,
    pub out_of_filter: Destination,
    pub dry_run: bool,
    pub concurrency: usize,
    pub cache_path: PathBuf,
    pub lookup: LookupConfig,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            years: YearFilter::Any,
            backup: true,
            backup_dir_name: DEFAULT_BACKUP_DIR.into(),
            unresolved: Destination::Leave,
            out_of_filter: Destination::Leave,
            dry_run: false,
            concurrency: 1,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            lookup: LookupConfig::default(),
        }
    }
}

impl OrganizerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        serde_json::from_slice(&raw)
            .map_err(|err| ConfigValidationError::Malformed(err.to_string()).into())
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingRoot);
        }
        if !is_plain_folder_name(&self.backup_dir_name) {
            return Err(ConfigValidationError::InvalidFolderName(
                self.backup_dir_name.clone(),
            ));
        }
        for destination in [&self.unresolved, &self.out_of_filter] {
            if let Destination::Route(name) = destination {
                if !is_plain_folder_name(name) {
                    return Err(ConfigValidationError::InvalidFolderName(name.clone()));
                }
            }
        }
        if self.concurrency == 0 {
            return Err(ConfigValidationError::ZeroConcurrency);
        }
        self.lookup.validate()
    }

    pub fn backup_root(&self) -> PathBuf {
        self.root.join(&self.backup_dir_name)
    }

    /// Top-level folder names the tool writes into, skipped when scanning.
    pub fn reserved_folders(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        names.insert(self.backup_dir_name.clone());
        for destination in [&self.unresolved, &self.out_of_filter] {
            if let Destination::Route(name) = destination {
                names.insert(name.clone());
            }
        }
        names
    }
}

fn is_plain_folder_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

/// Where files that are not sorted into a year folder end up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Destination {
    Leave,
    Route(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LookupConfig {
    pub enabled: bool,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    pub requests_per_second: u32,
    pub max_retries: u32,
    #[serde(with = "duration_millis")]
    pub backoff: Duration,
    /// Longest single wait for a rate-limited catalog; a longer hint means the
    /// quota is spent.
    #[serde(with = "duration_millis")]
    pub max_backoff: Duration,
    pub min_score: f64,
    pub search_limit: u32,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(3),
            requests_per_second: 5,
            max_retries: 2,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            min_score: 0.35,
            search_limit: 15,
        }
    }
}

impl LookupConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.requests_per_second == 0 {
            return Err(ConfigValidationError::ZeroRate);
        }
        if self.timeout.is_zero() {
            return Err(ConfigValidationError::ZeroTimeout);
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ConfigValidationError::ScoreOutOfRange(self.min_score));
        }
        if self.search_limit == 0 || self.search_limit > 50 {
            return Err(ConfigValidationError::SearchLimit(self.search_limit));
        }
        Ok(())
    }
}

/// Client-credentials pair for the remote catalog.
#[derive(Clone, PartialEq, Eq)]
pub struct CatalogCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl CatalogCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Option<Self> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return None;
        }
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

impl fmt::Debug for CatalogCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// Restricts which resolved years get their own folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum YearFilter {
    Any,
    Years(BTreeSet<Year>),
    Range { start: Year, end: Year },
}

impl YearFilter {
    pub fn contains(&self, year: Year) -> bool {
        match self {
            YearFilter::Any => true,
            YearFilter::Years(years) => years.contains(&year),
            YearFilter::Range { start, end } => (*start..=*end).contains(&year),
        }
    }
}

impl FromStr for YearFilter {
    type Err = ConfigValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("any") {
            return Ok(YearFilter::Any);
        }

        let parse_year = |text: &str| -> Result<Year, ConfigValidationError> {
            text.trim()
                .parse::<u16>()
                .ok()
                .and_then(Year::new)
                .ok_or_else(|| ConfigValidationError::InvalidYearFilter(value.to_owned()))
        };

        if let Some((start, end)) = trimmed.split_once('-') {
            let start = parse_year(start)?;
            let end = parse_year(end)?;
            if start > end {
                return Err(ConfigValidationError::InvalidYearFilter(value.to_owned()));
            }
            return Ok(YearFilter::Range { start, end });
        }

        let years = trimmed
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(parse_year)
            .collect::<Result<BTreeSet<_>, _>>()?;
        if years.is_empty() {
            return Err(ConfigValidationError::InvalidYearFilter(value.to_owned()));
        }
        Ok(YearFilter::Years(years))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("library root must be provided")]
    MissingRoot,
    #[error("folder name {0:?} must be a single path component")]
    InvalidFolderName(String),
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("lookup rate must be at least one request per second")]
    ZeroRate,
    #[error("lookup timeout must be non-zero")]
    ZeroTimeout,
    #[error("match score threshold {0} is outside 0..=1")]
    ScoreOutOfRange(f64),
    #[error("search limit {0} is outside 1..=50")]
    SearchLimit(u32),
    #[error("invalid year filter {0:?}")]
    InvalidYearFilter(String),
    #[error("malformed configuration file: {0}")]
    Malformed(String),
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
