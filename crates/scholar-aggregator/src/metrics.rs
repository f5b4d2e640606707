//! Journal metrics reference table.
//!
//! Loaded from a JSON array of entries shaped like
//! `{"journal": "Nature", "issn": "0028-0836", "eissn": "1476-4687", "IF": 64.8, "Q": "Q1", "B": "1"}`.
//! Values such as `"N/A"` or empty strings are treated as missing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::models::{JournalMetrics, PaperRecord, normalize_cas, normalize_jcr};

/// Similarity a venue name must exceed to match a journal title.
pub const FUZZY_THRESHOLD: f64 = 0.85;

/// Venue fragments that never name a ranked journal.
const NON_JOURNAL_VENUES: [&str; 6] =
    ["arxiv", "unknown", "conference", "symposium", "proceedings", "dissertation"];

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct JournalEntry {
    #[serde(default)]
    journal: String,
    #[serde(default)]
    issn: String,
    #[serde(default)]
    eissn: String,
    #[serde(rename = "IF", default)]
    impact_factor: Value,
    #[serde(rename = "Q", default)]
    jcr_quartile: Value,
    #[serde(rename = "B", default)]
    cas_quartile: Value,
}

#[derive(Debug, Clone)]
struct Journal {
    title_key: String,
    metrics: JournalMetrics,
}

/// In-memory journal metrics keyed by ISSN and normalized title.
#[derive(Debug, Default, Clone)]
pub struct JournalMetricsTable {
    journals: Vec<Journal>,
    by_issn: HashMap<String, usize>,
    by_title: HashMap<String, usize>,
}

impl JournalMetricsTable {
    /// Table with no journals; every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a JSON array of entries.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading journal metrics from {}", path.display()))?;
        let table = Self::from_json_str(&raw)
            .with_context(|| format!("parsing journal metrics in {}", path.display()))?;
        tracing::info!(journals = table.len(), path = %path.display(), "Loaded journal metrics");
        Ok(table)
    }

    /// Build the table from JSON text.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let entries: Vec<JournalEntry> = serde_json::from_str(raw)?;
        let mut table = Self::default();

        for entry in entries {
            let issns: Vec<String> =
                [&entry.issn, &entry.eissn].into_iter().filter_map(|s| normalize_issn(s)).collect();
            let title_key = normalize_title(&entry.journal);
            if issns.is_empty() && title_key.is_empty() {
                continue;
            }

            let metrics = JournalMetrics {
                impact_factor: lenient_number(&entry.impact_factor),
                jcr_quartile: lenient_label(&entry.jcr_quartile).and_then(|l| normalize_jcr(&l)),
                cas_quartile: lenient_label(&entry.cas_quartile).and_then(|l| normalize_cas(&l)),
            };

            let index = table.journals.len();
            for issn in issns {
                table.by_issn.insert(issn, index);
            }
            if !title_key.is_empty() {
                table.by_title.entry(title_key.clone()).or_insert(index);
            }
            table.journals.push(Journal { title_key, metrics });
        }

        Ok(table)
    }

    /// Number of journals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.journals.len()
    }

    /// True when no journals are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.journals.is_empty()
    }

    /// Find metrics by ISSN first, then by venue name (exact, then fuzzy).
    #[must_use]
    pub fn lookup(&self, venue: Option<&str>, issn: Option<&str>) -> Option<&JournalMetrics> {
        if let Some(index) = issn.and_then(normalize_issn).and_then(|key| self.by_issn.get(&key)) {
            return Some(&self.journals[*index].metrics);
        }

        let name = normalize_title(venue?);
        if name.is_empty() || NON_JOURNAL_VENUES.iter().any(|skip| name.contains(skip)) {
            return None;
        }

        if let Some(index) = self.by_title.get(&name) {
            return Some(&self.journals[*index].metrics);
        }

        let mut best: Option<(f64, usize)> = None;
        for (index, journal) in self.journals.iter().enumerate() {
            let score = strsim::normalized_levenshtein(&name, &journal.title_key);
            if score > FUZZY_THRESHOLD && best.is_none_or(|(top, _)| score > top) {
                best = Some((score, index));
            }
        }

        best.map(|(score, index)| {
            tracing::debug!(venue = %name, matched = %self.journals[index].title_key, score, "fuzzy journal match");
            &self.journals[index].metrics
        })
    }

    /// Attach journal metrics to a record that has none yet.
    pub fn enrich(&self, record: &mut PaperRecord) {
        if !record.metrics.is_empty() || self.is_empty() {
            return;
        }
        if let Some(metrics) = self.lookup(record.venue.as_deref(), record.issn.as_deref()) {
            record.metrics = metrics.clone();
        }
    }
}

/// Lower-case, drop punctuation and collapse whitespace.
#[must_use]
pub fn normalize_title(name: &str) -> String {
    let lowered = name.to_lowercase();
    NON_WORD.replace_all(&lowered, "").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical `NNNN-NNNX` form, or `None` if the value is not an ISSN.
#[must_use]
pub fn normalize_issn(raw: &str) -> Option<String> {
    let compact: String =
        raw.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_uppercase()).collect();
    let valid = compact.len() == 8
        && compact[..7].chars().all(|c| c.is_ascii_digit())
        && compact[7..].chars().all(|c| c.is_ascii_digit() || c == 'X');
    valid.then(|| format!("{}-{}", &compact[..4], &compact[4..]))
}

fn lenient_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn lenient_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() && !s.trim().eq_ignore_ascii_case("N/A") => {
            Some(s.trim().to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
