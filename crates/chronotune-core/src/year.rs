use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Earliest year accepted from tags, file names or the catalog.
pub const EARLIEST_PLAUSIBLE_YEAR: u16 = 1900;

/// A four-digit calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Year(u16);

impl Year {
    pub fn new(value: u16) -> Option<Self> {
        (1000..=9999).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    /// Parses the leading `YYYY` of a tag value such as `1994`, `1994-05-01` or `1994/05`.
    pub fn from_date_prefix(text: &str) -> Option<Self> {
        let text = text.trim();
        let digits = text.get(..4)?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if text
            .as_bytes()
            .get(4)
            .is_some_and(|next| next.is_ascii_digit())
        {
            return None;
        }
        digits.parse().ok().and_then(Self::new)
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Year {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("{value} is not a four-digit year"))
    }
}

impl From<Year> for u16 {
    fn from(value: Year) -> Self {
        value.0
    }
}

/// Inclusive window of years considered believable release dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearBounds {
    pub earliest: u16,
    pub latest: u16,
}

impl YearBounds {
    /// `1900..=current year + 1`, allowing pre-release tags for next year.
    pub fn current() -> Self {
        let this_year = chrono::Utc::now().year().clamp(0, u16::MAX as i32 - 1) as u16;
        Self {
            earliest: EARLIEST_PLAUSIBLE_YEAR,
            latest: this_year + 1,
        }
    }

    pub fn accept(&self, year: Year) -> Option<Year> {
        (self.earliest..=self.latest)
            .contains(&year.get())
            .then_some(year)
    }
}

impl Default for YearBounds {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_prefixes() {
        assert_eq!(Year::from_date_prefix("1994").map(Year::get), Some(1994));
        assert_eq!(Year::from_date_prefix("1994-05-01").map(Year::get), Some(1994));
        assert_eq!(Year::from_date_prefix(" 2009 ").map(Year::get), Some(2009));
        assert_eq!(Year::from_date_prefix("19945"), None);
        assert_eq!(Year::from_date_prefix("94"), None);
        assert_eq!(Year::from_date_prefix("0000"), None);
        assert_eq!(Year::from_date_prefix("May 1994"), None);
    }

    #[test]
    fn bounds_reject_implausible_years() {
        let bounds = YearBounds {
            earliest: 1900,
            latest: 2026,
        };
        assert!(bounds.accept(Year::new(1899).unwrap()).is_none());
        assert!(bounds.accept(Year::new(2027).unwrap()).is_none());
        assert!(bounds.accept(Year::new(2026).unwrap()).is_some());
    }

    #[test]
    fn current_bounds_include_next_year() {
        let next = chrono::Utc::now().year() as u16 + 1;
        let bounds = YearBounds::current();
        assert_eq!(bounds.latest, next);
    }
}
