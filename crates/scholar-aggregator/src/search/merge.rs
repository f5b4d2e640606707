//! Deduplication, post-filtering and deterministic ordering.

use std::cmp::Ordering;
use std::collections::HashMap;

use md5::{Digest, Md5};

use crate::models::{Filter, PaperRecord};

/// Lower-case, map non-alphanumerics to spaces, collapse whitespace.
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cross-source identity of a record.
///
/// MD5 of `normalized title|year`; records whose normalized title is empty
/// keep their `source:id` key so they never collapse into each other.
#[must_use]
pub fn dedup_key(record: &PaperRecord) -> String {
    let title = normalize_title(&record.title);
    if title.is_empty() {
        return record.key();
    }

    let mut hasher = Md5::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    if let Some(year) = record.year {
        hasher.update(year.to_string().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Collapse duplicates, keeping the richer record and filling its gaps.
///
/// Output keeps the position of each key's first occurrence.
#[must_use]
pub fn deduplicate(records: Vec<PaperRecord>) -> Vec<PaperRecord> {
    let mut slots: Vec<PaperRecord> = Vec::with_capacity(records.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());

    for record in records {
        let key = dedup_key(&record);
        match index.get(&key) {
            Some(&slot) => {
                let existing = &mut slots[slot];
                if richness(&record) > richness(existing) {
                    let loser = std::mem::replace(existing, record);
                    existing.absorb(loser);
                } else {
                    existing.absorb(record);
                }
            }
            None => {
                index.insert(key, slots.len());
                slots.push(record);
            }
        }
    }

    slots
}

/// Journal metrics first, then populated field count.
fn richness(record: &PaperRecord) -> (bool, usize) {
    (!record.metrics.is_empty(), record.populated_fields())
}

/// Result ordering: citations desc, year desc (missing last), title asc
/// (case-insensitive), then source and id.
#[must_use]
pub fn compare(a: &PaperRecord, b: &PaperRecord) -> Ordering {
    b.citations()
        .cmp(&a.citations())
        .then_with(|| match (a.year, b.year) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.id.cmp(&b.id))
}

/// Full pipeline for one sentence: dedup, filter, sort, truncate.
#[must_use]
pub fn merge(records: Vec<PaperRecord>, filter: &Filter) -> Vec<PaperRecord> {
    let total = records.len();
    let mut merged: Vec<PaperRecord> =
        deduplicate(records).into_iter().filter(|r| filter.accepts(r)).collect();
    merged.sort_by(compare);
    merged.truncate(filter.papers_limit);

    tracing::debug!(total, kept = merged.len(), "merged sentence results");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn record(source: SourceKind, id: &str, title: &str, year: Option<i32>) -> PaperRecord {
        let mut r = PaperRecord::new(source, id, title);
        r.year = year;
        r
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Deep-Learning: A  Review! "), "deep learning a review");
        assert_eq!(normalize_title("---"), "");
    }

    #[test]
    fn test_dedup_key_ignores_case_and_punctuation() {
        let a = record(SourceKind::PubMed, "1", "Deep learning.", Some(2020));
        let b = record(SourceKind::SemanticScholar, "x", "DEEP LEARNING", Some(2020));
        let c = record(SourceKind::SemanticScholar, "y", "Deep learning", Some(2021));
        assert_eq!(dedup_key(&a), dedup_key(&b));
        assert_ne!(dedup_key(&a), dedup_key(&c));
    }

    #[test]
    fn test_empty_titles_never_collapse() {
        let a = record(SourceKind::PubMed, "1", "", Some(2020));
        let b = record(SourceKind::PubMed, "2", "  ", Some(2020));
        assert_eq!(deduplicate(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_richer_duplicate_wins_and_absorbs() {
        let mut plain = record(SourceKind::SemanticScholar, "s2", "Graph Networks", Some(2019));
        plain.citation_count = Some(12);

        let mut rich = record(SourceKind::PubMed, "42", "Graph networks", Some(2019));
        rich.metrics.impact_factor = Some(9.1);

        let merged = deduplicate(vec![plain, rich]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source, SourceKind::PubMed);
        assert_eq!(merged[0].citation_count, Some(12));
    }

    #[test]
    fn test_ordering_rules() {
        let mut a = record(SourceKind::PubMed, "1", "beta", Some(2020));
        a.citation_count = Some(5);
        let mut b = record(SourceKind::PubMed, "2", "Alpha", Some(2020));
        b.citation_count = Some(5);
        let c = record(SourceKind::Arxiv, "3", "gamma", None);
        let d = record(SourceKind::Arxiv, "4", "delta", Some(2024));

        let mut all = vec![c.clone(), a.clone(), d.clone(), b.clone()];
        all.sort_by(compare);
        let ids: Vec<_> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "4", "3"]);
    }

    #[test]
    fn test_merge_truncates_after_filter() {
        let filter = Filter { papers_limit: 1, min_citations: Some(3), ..Filter::default() };
        let mut low = record(SourceKind::PubMed, "1", "Low", Some(2020));
        low.citation_count = Some(1);
        let mut high = record(SourceKind::PubMed, "2", "High", Some(2020));
        high.citation_count = Some(10);
        let mut mid = record(SourceKind::PubMed, "3", "Mid", Some(2020));
        mid.citation_count = Some(5);

        let merged = merge(vec![low, high, mid], &filter);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "2");
    }
}
