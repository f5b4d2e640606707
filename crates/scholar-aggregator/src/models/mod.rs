//! Data models shared by sources, the search pipeline and export.
//!
//! Records serialize with snake_case keys to match the HTTP API.

mod filter;
mod paper;
mod source;

pub use filter::{Filter, MAX_RESULTS_PER_SOURCE, YearRange, normalize_cas, normalize_jcr};
pub use paper::{JournalMetrics, PaperRecord};
pub use source::{SourceKind, UnknownSource};
