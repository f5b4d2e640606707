//! Literature source identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One external literature API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    /// arXiv preprint server (Atom feed API).
    #[serde(rename = "arxiv")]
    Arxiv,
    /// NCBI PubMed via E-utilities.
    #[serde(rename = "pubmed")]
    PubMed,
    /// Semantic Scholar Graph API.
    #[serde(rename = "semanticscholar", alias = "semantic_scholar")]
    SemanticScholar,
}

impl SourceKind {
    /// Every supported source, in display order.
    pub const ALL: [Self; 3] = [Self::Arxiv, Self::PubMed, Self::SemanticScholar];

    /// Wire name used in requests, CSV rows and ledger keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arxiv => "arxiv",
            Self::PubMed => "pubmed",
            Self::SemanticScholar => "semanticscholar",
        }
    }

    /// Human-readable name for progress messages.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Arxiv => "arXiv",
            Self::PubMed => "PubMed",
            Self::SemanticScholar => "Semantic Scholar",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown source name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source '{0}' (expected arxiv, pubmed or semanticscholar)")]
pub struct UnknownSource(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arxiv" => Ok(Self::Arxiv),
            "pubmed" => Ok(Self::PubMed),
            "semanticscholar" | "semantic_scholar" | "semantic-scholar" | "s2" => {
                Ok(Self::SemanticScholar)
            }
            _ => Err(UnknownSource(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("ArXiv".parse::<SourceKind>(), Ok(SourceKind::Arxiv));
        assert_eq!("semantic_scholar".parse::<SourceKind>(), Ok(SourceKind::SemanticScholar));
        assert!("scopus".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SourceKind::SemanticScholar).unwrap();
        assert_eq!(json, "\"semanticscholar\"");

        let kind: SourceKind = serde_json::from_str("\"semantic_scholar\"").unwrap();
        assert_eq!(kind, SourceKind::SemanticScholar);
    }
}
