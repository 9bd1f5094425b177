use once_cell::sync::Lazy;
use regex::Regex;

use crate::filename::collapse_whitespace;

const MAX_QUERY_CHARS: usize = 100;
const MIN_QUERY_CHARS: usize = 3;

static NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\((ao vivo|live)\)",
        r"(?i)\bdvd\b.*",
        r"(?i)\b(feat|ft)\b\.?.*",
        r"@\w+",
        r"\[[^\]]*\]",
        r"(?i)\bdeluxe\b",
        r"(?i)\bao vivo\b.*",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("static regex"))
    .collect()
});
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

/// One catalog search attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub label: &'static str,
    pub artist: Option<String>,
    pub title: String,
}

impl SearchQuery {
    /// Free-text form sent to the catalog, or `None` when too short to be useful.
    pub fn text(&self) -> Option<String> {
        let raw = match &self.artist {
            Some(artist) => format!("{artist} {}", self.title),
            None => self.title.clone(),
        };
        let stripped = NON_WORD.replace_all(&raw, " ");
        let text: String = collapse_whitespace(&stripped)
            .chars()
            .take(MAX_QUERY_CHARS)
            .collect();
        let text = text.trim().to_owned();
        (text.chars().count() >= MIN_QUERY_CHARS).then_some(text)
    }
}

fn strip_noise(value: &str) -> String {
    let mut cleaned = value.to_owned();
    for pattern in NOISE.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    collapse_whitespace(&cleaned)
}

/// Search attempts from most to least specific, deduplicated.
pub fn strategies(title: &str, artist: Option<&str>) -> Vec<SearchQuery> {
    let title = strip_noise(title);
    let title = collapse_whitespace(title.split(['|', '/']).next().unwrap_or_default());
    let artist = artist.map(strip_noise).filter(|a| !a.is_empty());
    if title.is_empty() {
        return Vec::new();
    }

    let words: Vec<&str> = title.split_whitespace().collect();
    let mut queries = Vec::new();

    if let Some(artist) = &artist {
        queries.push(SearchQuery {
            label: "artist+title",
            artist: Some(artist.clone()),
            title: title.clone(),
        });
    }
    queries.push(SearchQuery {
        label: "title",
        artist: None,
        title: title.clone(),
    });
    if let Some(artist) = artist.as_deref().filter(|a| a.contains(' ')) {
        let first = artist
            .split(['&', ','])
            .next()
            .map(str::trim)
            .unwrap_or(artist);
        queries.push(SearchQuery {
            label: "first-artist+title",
            artist: Some(first.to_owned()),
            title: title.clone(),
        });
    }
    if let Some(artist) = &artist {
        if words.len() > 3 {
            queries.push(SearchQuery {
                label: "artist+short-title",
                artist: Some(artist.clone()),
                title: words[..3].join(" "),
            });
        }
    }
    if words.len() >= 2 {
        queries.push(SearchQuery {
            label: "very-short-title",
            artist: artist.clone(),
            title: words[..2].join(" "),
        });
    }

    let mut seen = Vec::new();
    queries.retain(|query| {
        let key = (query.artist.clone(), query.title.clone());
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
    queries
}
