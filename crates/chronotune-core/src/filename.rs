//! Evidence recovered from a file's name alone.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::year::{Year, YearBounds};

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("static regex"));
static VIDEO_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\([^)]*(official|video|audio|lyrics|hd|hq|4k|remix|edit)[^)]*\)")
        .expect("static regex")
});
static ARTIST_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*[-–—|/]\s*(.+)$").expect("static regex"));

/// Extracts a plausible year from a file name.
///
/// Only runs of exactly four digits count, so track numbers (`01`), bitrates
/// (`320kbps`) and catalogue numbers (`123456`) are ignored. The first run inside
/// `bounds` wins.
pub fn extract_year(file_name: &str, bounds: &YearBounds) -> Option<Year> {
    file_name
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4)
        .filter_map(|run| run.parse::<u16>().ok())
        .filter_map(Year::new)
        .find_map(|year| bounds.accept(year))
}

/// Artist and title guessed from a stem like `Artist - Title (Official Video)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameHints {
    pub artist: Option<String>,
    pub title: Option<String>,
}

pub fn parse_hints(stem: &str) -> NameHints {
    let cleaned = BRACKETED.replace_all(stem, "");
    let cleaned = VIDEO_NOISE.replace_all(&cleaned, "");
    let cleaned = collapse_whitespace(&cleaned);

    if let Some(captures) = ARTIST_TITLE.captures(&cleaned) {
        let artist = collapse_whitespace(&captures[1]);
        let title = collapse_whitespace(&captures[2]);
        return NameHints {
            artist: (!artist.is_empty()).then_some(artist),
            title: (!title.is_empty()).then_some(title),
        };
    }

    NameHints {
        artist: None,
        title: (!cleaned.is_empty()).then_some(cleaned),
    }
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
