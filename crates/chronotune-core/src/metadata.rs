use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lofty::{Accessor, ItemKey, Tag, TaggedFileExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;

use crate::audio::{AudioFile, AudioFormat, TagScheme};
use crate::year::{Year, YearBounds};

mod asf;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unreadable tags in {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("tag reader task failed: {0}")]
    Task(String),
}

/// Year-bearing fields in precedence order: an explicit original release date beats
/// the recording date, which beats a bare year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum YearField {
    OriginalRelease,
    Recording,
    Year,
}

impl TagScheme {
    /// Keys consulted for each field, most specific first. ASF attributes are read
    /// by the `asf` module instead.
    fn year_keys(self) -> Vec<(YearField, ItemKey)> {
        match self {
            TagScheme::Id3 => vec![
                (YearField::OriginalRelease, ItemKey::OriginalReleaseDate),
                (YearField::OriginalRelease, ItemKey::Unknown("TORY".into())),
                (YearField::Recording, ItemKey::RecordingDate),
                (YearField::Year, ItemKey::Year),
                (YearField::Year, ItemKey::Unknown("TYER".into())),
            ],
            TagScheme::VorbisComments => vec![
                (YearField::OriginalRelease, ItemKey::OriginalReleaseDate),
                (YearField::OriginalRelease, ItemKey::Unknown("ORIGINALYEAR".into())),
                (YearField::Recording, ItemKey::RecordingDate),
                (YearField::Year, ItemKey::Year),
                (YearField::Year, ItemKey::Unknown("YEAR".into())),
            ],
            TagScheme::Mp4Atoms => vec![
                (YearField::OriginalRelease, ItemKey::OriginalReleaseDate),
                (YearField::Recording, ItemKey::RecordingDate),
                (YearField::Year, ItemKey::Year),
            ],
            TagScheme::RiffInfo => vec![
                (YearField::OriginalRelease, ItemKey::OriginalReleaseDate),
                (YearField::Recording, ItemKey::RecordingDate),
                (YearField::Year, ItemKey::Year),
            ],
            TagScheme::Asf => Vec::new(),
        }
    }
}

/// Embedded tag values relevant to year resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub original_release: Option<String>,
    pub recording_date: Option<String>,
    pub year: Option<String>,
}

impl EmbeddedTags {
    fn field(&self, field: YearField) -> Option<&str> {
        match field {
            YearField::OriginalRelease => self.original_release.as_deref(),
            YearField::Recording => self.recording_date.as_deref(),
            YearField::Year => self.year.as_deref(),
        }
    }

    fn field_mut(&mut self, field: YearField) -> &mut Option<String> {
        match field {
            YearField::OriginalRelease => &mut self.original_release,
            YearField::Recording => &mut self.recording_date,
            YearField::Year => &mut self.year,
        }
    }

    /// First parseable, plausible year following the `YearField` precedence.
    pub fn release_year(&self, bounds: &YearBounds) -> Option<Year> {
        [
            YearField::OriginalRelease,
            YearField::Recording,
            YearField::Year,
        ]
        .into_iter()
        .filter_map(|field| self.field(field))
        .filter_map(Year::from_date_prefix)
        .find_map(|year| bounds.accept(year))
    }

    fn absorb(&mut self, tag: &Tag, scheme: TagScheme) {
        fill(&mut self.title, tag.title().map(|v| v.into_owned()));
        fill(&mut self.artist, tag.artist().map(|v| v.into_owned()));
        fill(&mut self.album, tag.album().map(|v| v.into_owned()));
        for (field, key) in scheme.year_keys() {
            let value = tag.get_string(&key).map(str::to_owned);
            fill(self.field_mut(field), value);
        }
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_some() {
        return;
    }
    *slot = value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|v| !v.is_empty());
}

/// Reads embedded tags without modifying the file.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    async fn read(&self, file: &AudioFile) -> Result<EmbeddedTags, MetadataError>;
}

/// `MetadataReader` backed by lofty, dispatching on the container's tag scheme.
/// WMA headers are parsed directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyMetadataReader;

impl LoftyMetadataReader {
    pub fn new() -> Self {
        Self
    }

    fn read_sync(path: &Path, format: AudioFormat) -> Result<EmbeddedTags, MetadataError> {
        let scheme = format.tag_scheme();
        if scheme == TagScheme::Asf {
            return asf::read_tags(path);
        }

        let tagged = lofty::read_from_path(path).map_err(|err| MetadataError::Unreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let mut tags = EmbeddedTags::default();
        if let Some(primary) = tagged.primary_tag() {
            tags.absorb(primary, scheme);
        }
        for tag in tagged.tags() {
            tags.absorb(tag, scheme);
        }
        Ok(tags)
    }
}

#[async_trait]
impl MetadataReader for LoftyMetadataReader {
    async fn read(&self, file: &AudioFile) -> Result<EmbeddedTags, MetadataError> {
        let path = file.path.clone();
        let format = file.format;
        task::spawn_blocking(move || Self::read_sync(&path, format))
            .await
            .map_err(|err| MetadataError::Task(err.to_string()))?
    }
}
