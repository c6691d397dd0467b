//! Data model shared by discovery, extraction and serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder written for a title or abstract the source does not provide
pub const MISSING: &str = "N/A";

/// Snapshot of the profile owner, taken once per run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub scholar_id: String,
    pub name: String,
    pub affiliation: Option<String>,
    pub email_domain: Option<String>,
    pub homepage: Option<String>,
    /// Research interests in display order
    pub interests: Vec<String>,
    /// All-time citations
    pub cited_by: Option<u64>,
    /// Citations over the trailing five years
    pub cited_by_5y: Option<u64>,
    /// Publications discovered on the profile
    pub total_publications: usize,
}

/// One publication as read from its detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// Title, `MISSING` when the page has none
    pub title: String,
    pub authors: Vec<String>,
    pub publication_date: Option<String>,
    pub journal: Option<String>,
    pub volume: Option<String>,
    pub pages: Option<String>,
    pub publisher: Option<String>,
    pub citations: Option<u64>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Detail page this record was read from
    pub source_url: String,
    /// Link to the work outside the profile host
    pub external_link: Option<String>,
    /// Labels not mapped to a field above, spaces replaced by underscores
    pub other_metadata: BTreeMap<String, String>,
}

impl PublicationRecord {
    /// An empty record for `source_url` with the title sentinel set.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            title: MISSING.to_string(),
            authors: Vec::new(),
            publication_date: None,
            journal: None,
            volume: None,
            pages: None,
            publisher: None,
            citations: None,
            abstract_text: None,
            source_url: source_url.into(),
            external_link: None,
            other_metadata: BTreeMap::new(),
        }
    }

    /// Four-digit year from the publication date, if any.
    pub fn year(&self) -> Option<&str> {
        let date = self.publication_date.as_deref()?;
        date.split(|c: char| !c.is_ascii_digit())
            .find(|part| part.len() == 4)
    }
}

/// Ordered detail locations found on a profile, plus its header if seen
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Detail page URLs in display order; duplicates are kept
    pub links: Vec<String>,
    pub author: Option<AuthorProfile>,
}

/// The document written to disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapeDocument {
    pub author: Option<AuthorProfile>,
    pub articles: Vec<PublicationRecord>,
}
