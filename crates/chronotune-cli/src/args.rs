use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use chronotune_core::config::{OTHER_YEARS_DIR, UNRESOLVED_DIR};
use chronotune_core::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "chronotune")]
#[command(about = "ChronoTune - sort a music library into release-year folders", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Location of the resolution cache
    #[arg(long, global = true, env = "CHRONOTUNE_CACHE")]
    pub cache: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve release years and move files into year folders
    Organize(OrganizeArgs),
    /// Forget every cached resolution; no files are touched
    ClearCache,
}

#[derive(Args, Debug)]
pub struct OrganizeArgs {
    /// Library root to organize
    pub root: PathBuf,

    /// Years to act on: `2020`, `2018,2020` or `2015-2020`
    #[arg(short, long)]
    pub years: Option<YearFilter>,

    /// Skip the backup copy before moving
    #[arg(long)]
    pub no_backup: bool,

    /// Never query the online catalog
    #[arg(long)]
    pub no_lookup: bool,

    /// Print the plan without moving anything
    #[arg(long)]
    pub dry_run: bool,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Files resolved in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Move files without a year into this folder instead of leaving them
    #[arg(long, num_args = 0..=1, default_missing_value = UNRESOLVED_DIR)]
    pub unknown_dir: Option<String>,

    /// Move files whose year is outside `--years` into this folder
    #[arg(long, num_args = 0..=1, default_missing_value = OTHER_YEARS_DIR)]
    pub other_years_dir: Option<String>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl OrganizeArgs {
    pub fn to_config(&self, cache: Option<&Path>) -> Result<OrganizerConfig> {
        let mut config = match &self.config {
            Some(path) => OrganizerConfig::from_json_file(path)?,
            None => OrganizerConfig::default(),
        };

        config.root = self.root.clone();
        if let Some(years) = &self.years {
            config.years = years.clone();
        }
        if self.no_backup {
            config.backup = false;
        }
        if self.no_lookup {
            config.lookup.enabled = false;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(dir) = &self.unknown_dir {
            config.unresolved = Destination::Route(dir.clone());
        }
        if let Some(dir) = &self.other_years_dir {
            config.out_of_filter = Destination::Route(dir.clone());
        }
        if let Some(cache) = cache {
            config.cache_path = cache.to_path_buf();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn credentials(&self) -> Option<CatalogCredentials> {
        CatalogCredentials::new(self.client_id.clone()?, self.client_secret.clone()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::tempdir;

    fn organize(args: &[&str]) -> OrganizeArgs {
        let cli = Cli::try_parse_from(
            ["chronotune", "organize"].iter().chain(args.iter()).copied(),
        )
        .expect("parse");
        match cli.command {
            Command::Organize(args) => args,
            Command::ClearCache => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn flags_map_onto_config() {
        let args = organize(&[
            "/music",
            "--years",
            "2015-2020",
            "--no-backup",
            "--dry-run",
            "--unknown-dir",
            "--concurrency",
            "4",
        ]);
        let config = args.to_config(Some(Path::new("/tmp/cache.sled"))).unwrap();

        assert_eq!(config.root, PathBuf::from("/music"));
        assert!(config.years.contains(Year::new(2017).unwrap()));
        assert!(!config.years.contains(Year::new(2021).unwrap()));
        assert!(!config.backup);
        assert!(config.dry_run);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.unresolved, Destination::Route(UNRESOLVED_DIR.into()));
        assert_eq!(config.out_of_filter, Destination::Leave);
        assert_eq!(config.cache_path, PathBuf::from("/tmp/cache.sled"));
    }

    #[test]
    fn bad_year_filter_is_rejected_by_the_parser() {
        let parsed = Cli::try_parse_from(["chronotune", "organize", "/music", "--years", "20x0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn config_file_values_are_overridden_by_flags() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chronotune.json");
        fs::write(&path, r#"{ "backup_dir_name": "safe", "concurrency": 8, "dry_run": false }"#)
            .unwrap();

        let args = organize(&["/music", "--config", path.to_str().unwrap(), "--concurrency", "2"]);
        let config = args.to_config(None).unwrap();
        assert_eq!(config.backup_dir_name, "safe");
        assert_eq!(config.concurrency, 2);
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let args = organize(&["/music", "--concurrency", "0"]);
        assert!(args.to_config(None).is_err());
    }

    #[test]
    fn credentials_need_both_halves() {
        let mut args = organize(&["/music"]);
        args.client_id = Some("id".into());
        args.client_secret = None;
        assert!(args.credentials().is_none());
        args.client_secret = Some("secret".into());
        assert!(args.credentials().is_some());
    }
}
