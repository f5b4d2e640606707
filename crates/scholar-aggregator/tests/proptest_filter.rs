//! Property-based tests for filtering and merging.

use proptest::prelude::*;

use scholar_aggregator::models::{
    Filter, JournalMetrics, PaperRecord, SourceKind, YearRange, normalize_cas, normalize_jcr,
};
use scholar_aggregator::search::merge::{compare, dedup_key, merge};

fn arb_source() -> impl Strategy<Value = SourceKind> {
    prop_oneof![Just(SourceKind::Arxiv), Just(SourceKind::PubMed), Just(SourceKind::SemanticScholar)]
}

/// Generate arbitrary records, some with metrics.
fn arb_record() -> impl Strategy<Value = PaperRecord> {
    (
        arb_source(),
        "[a-z0-9]{1,12}",                               // id
        "[A-Za-z ]{0,40}",                              // title
        proptest::option::of(1950i32..2030),            // year
        proptest::option::of(0u32..10_000),             // citations
        proptest::option::of(0.0f64..80.0),             // impact factor
        proptest::option::of(prop_oneof!["Q1", "Q2", "Q3", "Q4"]),
        proptest::option::of(prop_oneof!["B1", "B2", "B3", "B4"]),
    )
        .prop_map(|(source, id, title, year, citations, impact_factor, jcr, cas)| {
            let mut record = PaperRecord::new(source, id, title);
            record.year = year;
            record.citation_count = citations;
            record.metrics = JournalMetrics {
                impact_factor,
                jcr_quartile: jcr,
                cas_quartile: cas,
            };
            record
        })
}

fn arb_filter() -> impl Strategy<Value = Filter> {
    (
        1usize..60,
        proptest::option::of(0.0f64..40.0),
        proptest::option::of((1950i32..2030, 0i32..30)),
        proptest::option::of(0u32..5_000),
        proptest::collection::vec(prop_oneof!["Q1", "Q2", "q3", "4"], 0..3),
        proptest::collection::vec(prop_oneof!["B1", "2", "b3", " B4 "], 0..3),
    )
        .prop_map(|(papers_limit, min_if, years, min_citations, jcr, cas)| Filter {
            papers_limit,
            min_if,
            year_range: years.map(|(start, span)| YearRange::new(start, start + span)),
            min_citations,
            jcr_quartile: jcr,
            cas_quartile: cas,
            ..Filter::default()
        })
}

/// A record passes a non-empty label set only if it carries a label whose
/// normalized form is in the normalized set.
fn label_in_set(
    accepted: &[String],
    label: Option<&str>,
    normalize: fn(&str) -> Option<String>,
) -> bool {
    if accepted.is_empty() {
        return true;
    }
    let Some(normalized) = label.and_then(normalize) else {
        return false;
    };
    accepted.iter().filter_map(|a| normalize(a)).any(|a| a == normalized)
}

proptest! {
    /// Every merged record satisfies every active filter.
    #[test]
    fn merged_records_satisfy_filter(
        records in proptest::collection::vec(arb_record(), 0..80),
        filter in arb_filter(),
    ) {
        prop_assert!(filter.validate().is_ok());
        let merged = merge(records, &filter);

        prop_assert!(merged.len() <= filter.papers_limit);
        for record in &merged {
            if let Some(range) = filter.year_range {
                let year = record.year.expect("year filter drops undated records");
                prop_assert!(range.start <= year && year <= range.end);
            }
            if let Some(min_if) = filter.min_if {
                prop_assert!(record.metrics.impact_factor.is_some_and(|v| v >= min_if));
            }
            if let Some(min) = filter.min_citations {
                prop_assert!(record.citations() >= min);
            }
            prop_assert!(label_in_set(
                &filter.jcr_quartile,
                record.metrics.jcr_quartile.as_deref(),
                normalize_jcr,
            ));
            prop_assert!(label_in_set(
                &filter.cas_quartile,
                record.metrics.cas_quartile.as_deref(),
                normalize_cas,
            ));
        }
    }

    /// Quartile filtering agrees with normalized set membership, and a record
    /// without a label never passes a non-empty set.
    #[test]
    fn quartile_filters_match_normalized_membership(
        record in arb_record(),
        filter in arb_filter(),
    ) {
        let filter = Filter { min_if: None, year_range: None, min_citations: None, ..filter };
        let expected = label_in_set(
            &filter.jcr_quartile,
            record.metrics.jcr_quartile.as_deref(),
            normalize_jcr,
        ) && label_in_set(
            &filter.cas_quartile,
            record.metrics.cas_quartile.as_deref(),
            normalize_cas,
        );
        prop_assert_eq!(filter.accepts(&record), expected);

        if !filter.cas_quartile.is_empty() {
            let mut unlabeled = record.clone();
            unlabeled.metrics.cas_quartile = None;
            prop_assert!(!filter.accepts(&unlabeled));
        }
        if !filter.jcr_quartile.is_empty() {
            let mut unlabeled = record;
            unlabeled.metrics.jcr_quartile = None;
            prop_assert!(!filter.accepts(&unlabeled));
        }
    }

    /// Merged output is sorted and free of duplicate keys.
    #[test]
    fn merged_records_sorted_and_unique(records in proptest::collection::vec(arb_record(), 0..80)) {
        let merged = merge(records, &Filter { papers_limit: 1_000, ..Filter::default() });

        for pair in merged.windows(2) {
            prop_assert_ne!(compare(&pair[0], &pair[1]), std::cmp::Ordering::Greater);
        }
        let mut keys: Vec<String> = merged.iter().map(dedup_key).collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), merged.len());
    }

    /// Two sources reporting the same normalized title and year collapse to one record.
    #[test]
    fn cross_source_duplicates_collapse(
        title in "[A-Za-z]{3,10}( [A-Za-z]{2,10}){0,4}",
        year in 1990i32..2025,
        upper in any::<bool>(),
    ) {
        let mut a = PaperRecord::new(SourceKind::PubMed, "1", title.clone());
        a.year = Some(year);
        let variant = if upper { title.to_uppercase() } else { format!("{title}.") };
        let mut b = PaperRecord::new(SourceKind::SemanticScholar, "x", variant);
        b.year = Some(year);

        let merged = merge(vec![a, b], &Filter::default());
        prop_assert_eq!(merged.len(), 1);
    }

    /// Year ranges with start after end never validate.
    #[test]
    fn inverted_year_range_rejected(start in 1900i32..2100, gap in 1i32..100) {
        let filter = Filter { year_range: Some(YearRange::new(start, start - gap)), ..Filter::default() };
        prop_assert!(filter.validate().is_err());
    }
}
