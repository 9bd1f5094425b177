use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Container formats the organizer picks up while scanning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Mp4,
    Flac,
    Wav,
    Ogg,
    Opus,
    Wma,
    Aac,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 9] = [
        AudioFormat::Mp3,
        AudioFormat::M4a,
        AudioFormat::Mp4,
        AudioFormat::Flac,
        AudioFormat::Wav,
        AudioFormat::Ogg,
        AudioFormat::Opus,
        AudioFormat::Wma,
        AudioFormat::Aac,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        let lowered = ext.to_ascii_lowercase();
        let format = match lowered.as_str() {
            "mp3" => AudioFormat::Mp3,
            "m4a" => AudioFormat::M4a,
            "mp4" => AudioFormat::Mp4,
            "flac" => AudioFormat::Flac,
            "wav" => AudioFormat::Wav,
            "ogg" => AudioFormat::Ogg,
            "opus" => AudioFormat::Opus,
            "wma" => AudioFormat::Wma,
            "aac" => AudioFormat::Aac,
            _ => return None,
        };
        Some(format)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::Wma => "wma",
            AudioFormat::Aac => "aac",
        }
    }

    /// Tag layout the container carries its year in.
    pub fn tag_scheme(self) -> TagScheme {
        match self {
            AudioFormat::Mp3 | AudioFormat::Aac => TagScheme::Id3,
            AudioFormat::M4a | AudioFormat::Mp4 => TagScheme::Mp4Atoms,
            AudioFormat::Flac | AudioFormat::Ogg | AudioFormat::Opus => TagScheme::VorbisComments,
            AudioFormat::Wav => TagScheme::RiffInfo,
            AudioFormat::Wma => TagScheme::Asf,
        }
    }
}

/// The closed set of tag layouts a supported container may use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TagScheme {
    /// ID3v2 frames (`TDOR`/`TORY`, `TDRC`, `TYER`), also found as APE/ID3 on raw AAC.
    Id3,
    /// iTunes-style atoms (`©day`).
    Mp4Atoms,
    /// Vorbis comments (`ORIGINALDATE`/`ORIGINALYEAR`, `DATE`, `YEAR`).
    VorbisComments,
    /// RIFF `LIST/INFO` chunk (`ICRD`), optionally an embedded ID3v2 chunk.
    RiffInfo,
    /// Windows Media ASF attributes, no reader available.
    Asf,
}

/// Snapshot of an audio file taken once per resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub size: u64,
    pub modified: SystemTime,
}

impl AudioFile {
    /// Stats `path`; returns `None` for files outside the supported format set.
    pub fn probe(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();
        let Some(format) = AudioFormat::from_path(&path) else {
            return Ok(None);
        };
        let meta = std::fs::metadata(&path)?;
        Ok(Some(Self {
            path,
            format,
            size: meta.len(),
            modified: meta.modified()?,
        }))
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    pub fn file_stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    pub fn fingerprint(&self) -> FileFingerprint {
        FileFingerprint::of(self)
    }
}

/// Cache key for a file: SHA-256 over its path, size and modification time.
///
/// Rewriting the audio changes size or mtime and therefore the key, so a stale
/// year is never served for edited content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileFingerprint(String);

impl FileFingerprint {
    pub fn of(file: &AudioFile) -> Self {
        let mtime = file
            .modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(file.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(file.size.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(path: &str, size: u64, secs: u64) -> AudioFile {
        AudioFile {
            path: PathBuf::from(path),
            format: AudioFormat::Mp3,
            size,
            modified: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(AudioFormat::from_extension("FLAC"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::from_extension("Opus"), Some(AudioFormat::Opus));
        assert_eq!(AudioFormat::from_extension("txt"), None);
        for format in AudioFormat::ALL {
            assert_eq!(AudioFormat::from_extension(format.extension()), Some(format));
        }
    }

    #[test]
    fn formats_dispatch_to_their_tag_scheme() {
        assert_eq!(AudioFormat::Flac.tag_scheme(), TagScheme::VorbisComments);
        assert_eq!(AudioFormat::Opus.tag_scheme(), TagScheme::VorbisComments);
        assert_eq!(AudioFormat::M4a.tag_scheme(), TagScheme::Mp4Atoms);
        assert_eq!(AudioFormat::Mp3.tag_scheme(), TagScheme::Id3);
        assert_eq!(AudioFormat::Wma.tag_scheme(), TagScheme::Asf);
    }

    #[test]
    fn fingerprint_is_stable_for_same_snapshot() {
        let a = sample("/music/a.mp3", 100, 10);
        assert_eq!(a.fingerprint(), sample("/music/a.mp3", 100, 10).fingerprint());
        assert_eq!(a.fingerprint().as_str().len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_content_or_identity() {
        let base = sample("/music/a.mp3", 100, 10).fingerprint();
        assert_ne!(base, sample("/music/a.mp3", 101, 10).fingerprint());
        assert_ne!(base, sample("/music/a.mp3", 100, 11).fingerprint());
        assert_ne!(base, sample("/other/a.mp3", 100, 10).fingerprint());
    }

    #[test]
    fn probe_skips_unsupported_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert!(AudioFile::probe(&text).unwrap().is_none());

        let song = dir.path().join("song.MP3");
        std::fs::write(&song, b"abc").unwrap();
        let file = AudioFile::probe(&song).unwrap().expect("supported");
        assert_eq!(file.format, AudioFormat::Mp3);
        assert_eq!(file.size, 3);
        assert_eq!(file.file_stem(), "song");
    }
}
