use std::fmt;

use serde::{Deserialize, Serialize};

use crate::year::Year;

/// Evidence source a year came from, ordered from most to least trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearSource {
    Cache,
    Metadata,
    External,
    Filename,
    Unresolved,
}

impl YearSource {
    /// Ordinal rank: 4 for cache down to 0 for unresolved.
    pub fn confidence(self) -> u8 {
        match self {
            YearSource::Cache => 4,
            YearSource::Metadata => 3,
            YearSource::External => 2,
            YearSource::Filename => 1,
            YearSource::Unresolved => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            YearSource::Cache => "cache",
            YearSource::Metadata => "metadata",
            YearSource::External => "external",
            YearSource::Filename => "filename",
            YearSource::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for YearSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of resolving one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Resolved { year: Year, source: YearSource },
    Unresolved,
}

impl Resolution {
    pub fn resolved(year: Year, source: YearSource) -> Self {
        Resolution::Resolved { year, source }
    }

    pub fn year(&self) -> Option<Year> {
        match self {
            Resolution::Resolved { year, .. } => Some(*year),
            Resolution::Unresolved => None,
        }
    }

    pub fn source(&self) -> YearSource {
        match self {
            Resolution::Resolved { source, .. } => *source,
            Resolution::Unresolved => YearSource::Unresolved,
        }
    }

    pub fn confidence(&self) -> u8 {
        self.source().confidence()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Resolved { year, source } => write!(f, "{year} ({source})"),
            Resolution::Unresolved => f.write_str("unresolved"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_follows_priority_order() {
        let ordered = [
            YearSource::Cache,
            YearSource::Metadata,
            YearSource::External,
            YearSource::Filename,
            YearSource::Unresolved,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].confidence() > pair[1].confidence());
        }
    }

    #[test]
    fn unresolved_has_no_year() {
        assert_eq!(Resolution::Unresolved.year(), None);
        assert_eq!(Resolution::Unresolved.source(), YearSource::Unresolved);
        let resolved = Resolution::resolved(Year::new(1994).unwrap(), YearSource::Metadata);
        assert_eq!(resolved.to_string(), "1994 (metadata)");
    }
}
