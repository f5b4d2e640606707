//! User filter options and their post-hoc application.

use serde::{Deserialize, Serialize};

use super::{PaperRecord, SourceKind};
use crate::error::{SearchError, SearchResult};

/// Upper bound on what a single source is asked for per sentence.
pub const MAX_RESULTS_PER_SOURCE: usize = 100;

/// Inclusive publication year range, serialized as `[start, end]`.
///
/// `{"start": .., "end": ..}` is accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "YearRangeInput", into = "[i32; 2]")]
pub struct YearRange {
    /// First accepted year.
    pub start: i32,
    /// Last accepted year.
    pub end: i32,
}

impl YearRange {
    /// Create a range; see [`Filter::validate`] for the ordering check.
    #[must_use]
    pub const fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// True when `year` lies inside the range.
    #[must_use]
    pub const fn contains(self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }
}

impl From<[i32; 2]> for YearRange {
    fn from([start, end]: [i32; 2]) -> Self {
        Self { start, end }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum YearRangeInput {
    Pair([i32; 2]),
    Bounds { start: i32, end: i32 },
}

impl From<YearRangeInput> for YearRange {
    fn from(input: YearRangeInput) -> Self {
        match input {
            YearRangeInput::Pair(pair) => pair.into(),
            YearRangeInput::Bounds { start, end } => Self { start, end },
        }
    }
}

impl From<YearRange> for [i32; 2] {
    fn from(range: YearRange) -> Self {
        [range.start, range.end]
    }
}

/// Search filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Maximum results kept per query sentence.
    #[serde(default = "default_papers_limit")]
    pub papers_limit: usize,

    /// Minimum journal impact factor.
    #[serde(default)]
    pub min_if: Option<f64>,

    /// Inclusive publication year range.
    #[serde(default)]
    pub year_range: Option<YearRange>,

    /// Accepted JCR quartiles (empty accepts any).
    #[serde(default)]
    pub jcr_quartile: Vec<String>,

    /// Accepted CAS divisions (empty accepts any).
    #[serde(default)]
    pub cas_quartile: Vec<String>,

    /// Minimum citation count.
    #[serde(default)]
    pub min_citations: Option<u32>,

    /// Enabled sources.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceKind>,
}

fn default_papers_limit() -> usize {
    MAX_RESULTS_PER_SOURCE
}

fn default_sources() -> Vec<SourceKind> {
    vec![SourceKind::PubMed, SourceKind::SemanticScholar]
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            papers_limit: default_papers_limit(),
            min_if: None,
            year_range: None,
            jcr_quartile: Vec::new(),
            cas_quartile: Vec::new(),
            min_citations: None,
            sources: default_sources(),
        }
    }
}

impl Filter {
    /// Check the filter before any request is issued.
    pub fn validate(&self) -> SearchResult<()> {
        if self.papers_limit == 0 {
            return Err(SearchError::invalid_filter("papers_limit", "must be greater than 0"));
        }

        if let Some(min_if) = self.min_if {
            if !min_if.is_finite() || min_if < 0.0 {
                return Err(SearchError::invalid_filter(
                    "min_if",
                    format!("must be a non-negative number, got {min_if}"),
                ));
            }
        }

        if let Some(range) = self.year_range {
            if range.start > range.end {
                return Err(SearchError::invalid_filter(
                    "year_range",
                    format!("start year {} is after end year {}", range.start, range.end),
                ));
            }
        }

        for label in &self.jcr_quartile {
            if normalize_jcr(label).is_none() {
                return Err(SearchError::invalid_filter(
                    "jcr_quartile",
                    format!("unknown JCR quartile '{label}' (expected Q1-Q4)"),
                ));
            }
        }

        for label in &self.cas_quartile {
            if normalize_cas(label).is_none() {
                return Err(SearchError::invalid_filter(
                    "cas_quartile",
                    format!("unknown CAS division '{label}' (expected B1-B4)"),
                ));
            }
        }

        if self.sources.is_empty() {
            return Err(SearchError::invalid_filter("sources", "at least one source is required"));
        }

        Ok(())
    }

    /// Enabled sources with duplicates removed, first occurrence kept.
    #[must_use]
    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        let mut seen = Vec::with_capacity(self.sources.len());
        for kind in &self.sources {
            if !seen.contains(kind) {
                seen.push(*kind);
            }
        }
        seen
    }

    /// Number of results a single source should be asked for.
    #[must_use]
    pub fn per_source_limit(&self) -> usize {
        self.papers_limit.clamp(1, MAX_RESULTS_PER_SOURCE)
    }

    /// Whether a record passes every post-hoc filter.
    #[must_use]
    pub fn accepts(&self, record: &PaperRecord) -> bool {
        if let Some(min_if) = self.min_if {
            match record.metrics.impact_factor {
                Some(impact) if impact >= min_if => {}
                _ => return false,
            }
        }

        if let Some(range) = self.year_range {
            match record.year {
                Some(year) if range.contains(year) => {}
                _ => return false,
            }
        }

        if !label_accepted(&self.jcr_quartile, record.metrics.jcr_quartile.as_deref(), normalize_jcr)
        {
            return false;
        }

        if !label_accepted(&self.cas_quartile, record.metrics.cas_quartile.as_deref(), normalize_cas)
        {
            return false;
        }

        if let Some(min_citations) = self.min_citations {
            if record.citations() < min_citations {
                return false;
            }
        }

        true
    }
}

fn label_accepted(
    accepted: &[String],
    label: Option<&str>,
    normalize: fn(&str) -> Option<String>,
) -> bool {
    if accepted.is_empty() {
        return true;
    }
    let Some(label) = label.and_then(normalize) else {
        return false;
    };
    accepted.iter().filter_map(|a| normalize(a)).any(|a| a == label)
}

/// Normalize a JCR quartile label to `Q1`..`Q4`.
#[must_use]
pub fn normalize_jcr(label: &str) -> Option<String> {
    let label = label.trim().to_ascii_uppercase();
    let digit = label.strip_prefix('Q').unwrap_or(label.as_str());
    matches!(digit, "1" | "2" | "3" | "4").then(|| format!("Q{digit}"))
}

/// Normalize a CAS division label to `B1`..`B4`; bare digits are accepted.
#[must_use]
pub fn normalize_cas(label: &str) -> Option<String> {
    let label = label.trim().to_ascii_uppercase();
    let digit = label.strip_prefix('B').unwrap_or(label.as_str());
    matches!(digit, "1" | "2" | "3" | "4").then(|| format!("B{digit}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults_from_empty_json() {
        let filter: Filter = serde_json::from_str("{}").unwrap();
        assert_eq!(filter.papers_limit, 100);
        assert_eq!(filter.sources, vec![SourceKind::PubMed, SourceKind::SemanticScholar]);
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_year_range_array_and_object() {
        let filter: Filter = serde_json::from_str(r#"{"year_range": [2019, 2023]}"#).unwrap();
        assert_eq!(filter.year_range, Some(YearRange::new(2019, 2023)));

        let bounds: Filter = serde_json::from_str(r#"{"year_range": {"start": 2019, "end": 2023}}"#).unwrap();
        assert_eq!(bounds.year_range, Some(YearRange::new(2019, 2023)));
        assert_eq!(serde_json::to_value(bounds.year_range).unwrap(), serde_json::json!([2019, 2023]));
    }

    #[test]
    fn test_quartile_normalization() {
        assert_eq!(normalize_jcr("q2").as_deref(), Some("Q2"));
        assert_eq!(normalize_jcr("Q5"), None);
        assert_eq!(normalize_cas("3").as_deref(), Some("B3"));
        assert_eq!(normalize_cas(" b1 ").as_deref(), Some("B1"));
        assert_eq!(normalize_cas("N/A"), None);
    }

    #[test]
    fn test_enabled_sources_dedup() {
        let filter = Filter {
            sources: vec![SourceKind::Arxiv, SourceKind::PubMed, SourceKind::Arxiv],
            ..Filter::default()
        };
        assert_eq!(filter.enabled_sources(), vec![SourceKind::Arxiv, SourceKind::PubMed]);
    }

    #[test]
    fn test_per_source_limit_is_capped() {
        let filter = Filter { papers_limit: 500, ..Filter::default() };
        assert_eq!(filter.per_source_limit(), 100);
    }
}
