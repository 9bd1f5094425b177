use std::cmp::Ordering;

use strsim::normalized_levenshtein;

use crate::filename::collapse_whitespace;
use crate::year::{Year, YearBounds};

use super::CatalogTrack;

const TITLE_WEIGHT: f64 = 0.7;
const ARTIST_WEIGHT: f64 = 0.3;
/// Scores closer than this are the same confidence.
const SCORE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum MatchTier {
    Fuzzy(f64),
    Exact,
}

/// Picks a release year out of catalog hits.
///
/// Exact title+artist matches (after normalisation) always beat fuzzy ones. Within
/// the exact tier, and among fuzzy hits sharing the best score, the earliest release
/// year wins so reissues and compilations do not mask the original date. Fuzzy hits
/// below `min_score` are ignored.
pub fn select_year(
    candidates: &[CatalogTrack],
    title: &str,
    artist: Option<&str>,
    min_score: f64,
    bounds: &YearBounds,
) -> Option<Year> {
    let wanted_title = normalize(title);
    let wanted_artist = artist.map(normalize).filter(|a| !a.is_empty());
    if wanted_title.is_empty() {
        return None;
    }

    let mut best: Option<(MatchTier, Year)> = None;
    for candidate in candidates {
        let Some(year) = candidate.release_year().and_then(|y| bounds.accept(y)) else {
            continue;
        };
        let tier = classify(candidate, &wanted_title, wanted_artist.as_deref());
        if let MatchTier::Fuzzy(score) = tier {
            if score < min_score {
                continue;
            }
        }

        best = match best {
            None => Some((tier, year)),
            Some((current_tier, current_year)) => match compare_tiers(tier, current_tier) {
                Ordering::Greater => Some((tier, year)),
                Ordering::Equal if year < current_year => Some((current_tier, year)),
                _ => Some((current_tier, current_year)),
            },
        };
    }

    best.map(|(_, year)| year)
}

fn classify(candidate: &CatalogTrack, title: &str, artist: Option<&str>) -> MatchTier {
    let candidate_title = normalize(&candidate.title);
    let candidate_artists: Vec<String> = candidate.artists.iter().map(|a| normalize(a)).collect();

    let title_exact = candidate_title == title;
    let artist_exact = match artist {
        Some(artist) => candidate_artists.iter().any(|a| a == artist),
        None => true,
    };
    if title_exact && artist_exact {
        return MatchTier::Exact;
    }

    let title_score = normalized_levenshtein(title, &candidate_title);
    let score = match artist {
        Some(artist) => {
            let artist_score = candidate_artists
                .iter()
                .map(|a| normalized_levenshtein(artist, a))
                .fold(0.0, f64::max);
            title_score * TITLE_WEIGHT + artist_score * ARTIST_WEIGHT
        }
        None => title_score,
    };
    MatchTier::Fuzzy(score)
}

fn compare_tiers(a: MatchTier, b: MatchTier) -> Ordering {
    match (a, b) {
        (MatchTier::Exact, MatchTier::Exact) => Ordering::Equal,
        (MatchTier::Exact, MatchTier::Fuzzy(_)) => Ordering::Greater,
        (MatchTier::Fuzzy(_), MatchTier::Exact) => Ordering::Less,
        (MatchTier::Fuzzy(x), MatchTier::Fuzzy(y)) => {
            if (x - y).abs() < SCORE_EPSILON {
                Ordering::Equal
            } else if x > y {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
    }
}

/// Lowercase, punctuation-free, single-spaced.
pub(crate) fn normalize(value: &str) -> String {
    let lowered: String = value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> YearBounds {
        YearBounds {
            earliest: 1900,
            latest: 2030,
        }
    }

    fn track(title: &str, artist: &str, date: &str) -> CatalogTrack {
        CatalogTrack {
            title: title.into(),
            artists: vec![artist.into()],
            album: None,
            release_date: Some(date.into()),
        }
    }

    #[test]
    fn exact_match_beats_better_looking_fuzzy_year() {
        let hits = vec![
            track("Creep (Acoustic)", "Radiohead", "1992-01-01"),
            track("Creep", "Radiohead", "2008-05-01"),
        ];
        let year = select_year(&hits, "creep", Some("Radiohead"), 0.35, &bounds());
        assert_eq!(year.map(Year::get), Some(2008));
    }

    #[test]
    fn earliest_year_wins_among_exact_matches() {
        let hits = vec![
            track("Creep", "Radiohead", "2008"),
            track("Creep", "Radiohead", "1992-09-21"),
            track("Creep", "Radiohead", "1993"),
        ];
        let year = select_year(&hits, "Creep", Some("Radiohead"), 0.35, &bounds());
        assert_eq!(year.map(Year::get), Some(1992));
    }

    #[test]
    fn equal_fuzzy_scores_take_earliest_year() {
        let hits = vec![
            track("Song Remastered", "Band", "2011"),
            track("Song Remastered", "Band", "1979"),
        ];
        let year = select_year(&hits, "Song", Some("Band"), 0.1, &bounds());
        assert_eq!(year.map(Year::get), Some(1979));
    }

    #[test]
    fn weak_matches_are_rejected() {
        let hits = vec![track("Completely Different", "Nobody", "2001")];
        assert_eq!(select_year(&hits, "Creep", Some("Radiohead"), 0.35, &bounds()), None);
    }

    #[test]
    fn title_only_queries_match_any_artist() {
        let hits = vec![track("Hallelujah", "Leonard Cohen", "1984")];
        let year = select_year(&hits, "hallelujah", None, 0.35, &bounds());
        assert_eq!(year.map(Year::get), Some(1984));
    }

    #[test]
    fn candidates_without_plausible_dates_are_skipped() {
        let mut undated = track("Creep", "Radiohead", "");
        undated.release_date = None;
        let hits = vec![undated, track("Creep", "Radiohead", "0000")];
        assert_eq!(select_year(&hits, "Creep", Some("Radiohead"), 0.35, &bounds()), None);
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  AC/DC: Back-in Black! "), "ac dc back in black");
    }
}
