//! Source adapters: one uniform contract over ~heterogeneous external
//! capabilities. An adapter asynchronously produces zero or more raw
//! candidates for a request and never lets a failure escape past the
//! fan-out call site.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::AdapterError;
use crate::types::{Candidate, ResolutionRequest};

pub mod catalog;
pub mod knowledge;
pub mod llm_guess;
pub mod marketplace;
pub mod static_table;
pub mod vision;
pub mod websearch;

pub use catalog::{CatalogScraperSource, CatalogSite};
pub use knowledge::KnowledgeStoreSource;
pub use llm_guess::LlmGuessSource;
pub use marketplace::MarketplaceSource;
pub use static_table::StaticTableSource;
pub use vision::VisionLabelSource;
pub use websearch::WebSearchSource;

/// Coarse classification driving degraded-mode filtering and default
/// priority tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Catalog site scraper.
    Scraper,
    /// Structured marketplace miner.
    Marketplace,
    /// Generic search-engine miner.
    WebSearch,
    /// Language-model inference.
    Inference,
    /// Vision/OCR extraction.
    Vision,
    /// Local knowledge store.
    Local,
    /// Built-in static tables.
    Static,
}

impl SourceKind {
    /// Kinds that reach external services over the fetch proxy and are
    /// skipped in degraded mode. Local, static, and inference sources keep
    /// running.
    pub fn is_network_scraping(&self) -> bool {
        matches!(
            self,
            Self::Scraper | Self::Marketplace | Self::WebSearch | Self::Vision
        )
    }

    /// Kinds whose claims never satisfy the learning gate on their own.
    pub fn is_unverified_inference(&self) -> bool {
        matches!(self, Self::Inference)
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable name used for health tracking, grouping, and result audit.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Underlying site/dataset identity. Adapters that scrape the same site
    /// must return the same group so consensus cannot double-count them.
    fn group(&self) -> &str {
        self.name()
    }

    /// Request-scoped timeout for this adapter's calls.
    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    /// Produce candidates for the request. Must not mutate the request; any
    /// error is caught by the orchestrator and recorded as zero candidates.
    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError>;
}

static OEM_TOKEN_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // VAG style: 3-char group prefix, 6 digits, optional suffix letters.
        Regex::new(r"\b[0-9][A-Z0-9]{2}[ .]?[0-9]{3}[ .]?[0-9]{3}[ ]?[A-Z]{0,2}\b")
            .expect("vag token regex is valid"),
        // Mercedes style: A + 10 digits.
        Regex::new(r"\bA[0-9]{3}[ ]?[0-9]{3}[ ]?[0-9]{2}[ ]?[0-9]{2}\b")
            .expect("mercedes token regex is valid"),
        // BMW/PSA style: 7-11 plain digits.
        Regex::new(r"\b[0-9]{7,11}\b").expect("numeric token regex is valid"),
        // Toyota/Mazda style: 5-5 digit groups with a dash.
        Regex::new(r"\b[0-9]{5}-[0-9A-Z]{5}\b").expect("toyota token regex is valid"),
    ]
});

/// Extract OEM-shaped tokens from scraped text, deduplicated in first-seen
/// order. Years and other short numerics are rejected.
pub fn extract_oem_tokens(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for re in OEM_TOKEN_RES.iter() {
        for m in re.find_iter(&upper) {
            let raw = m.as_str().trim().to_string();
            let compact: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            if compact.len() < 7 || compact.len() > 14 {
                continue;
            }
            if !compact.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            if seen.insert(compact) {
                tokens.push(raw);
            }
        }
    }
    tokens
}

/// Build the search phrase shared by the scraping adapters: vehicle identity
/// first, then the part description and any engine narrowing the enricher
/// derived.
pub fn build_query(request: &ResolutionRequest) -> String {
    let v = &request.vehicle;
    let mut parts: Vec<String> = vec![v.make.clone(), v.model.clone()];
    if let Some(year) = v.year {
        parts.push(year.to_string());
    }
    if let Some(code) = &v.engine_code {
        parts.push(code.clone());
    }
    parts.push(request.part.text.clone());
    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Canned adapter for orchestrator tests.
    pub struct FixedAdapter {
        pub name: String,
        pub group: String,
        pub kind: SourceKind,
        pub candidates: Vec<Candidate>,
        pub fail: bool,
    }

    impl FixedAdapter {
        pub fn new(name: &str, kind: SourceKind, candidates: Vec<Candidate>) -> Self {
            Self {
                name: name.to_string(),
                group: name.to_string(),
                kind,
                candidates,
                fail: false,
            }
        }

        pub fn with_group(mut self, group: &str) -> Self {
            self.group = group.to_string();
            self
        }

        pub fn failing(name: &str, kind: SourceKind) -> Self {
            Self {
                name: name.to_string(),
                group: name.to_string(),
                kind,
                candidates: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn group(&self) -> &str {
            &self.group
        }

        async fn resolve_candidates(
            &self,
            _request: &ResolutionRequest,
        ) -> Result<Vec<Candidate>, AdapterError> {
            if self.fail {
                return Err(AdapterError::Network("fixture failure".into()));
            }
            Ok(self.candidates.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_backed_kinds_count_as_network_scraping() {
        for kind in [
            SourceKind::Scraper,
            SourceKind::Marketplace,
            SourceKind::WebSearch,
            SourceKind::Vision,
        ] {
            assert!(kind.is_network_scraping());
        }
        for kind in [SourceKind::Inference, SourceKind::Local, SourceKind::Static] {
            assert!(!kind.is_network_scraping());
        }
    }

    #[test]
    fn test_extract_oem_tokens_vag_and_mercedes() {
        let text = "Fits Golf VII. OE: 5Q0 615 301 F, compare A204 421 08 12.";
        let tokens = extract_oem_tokens(text);
        assert!(tokens.iter().any(|t| t.replace(' ', "") == "5Q0615301F"));
        assert!(tokens.iter().any(|t| t.replace(' ', "") == "A2044210812"));
    }

    #[test]
    fn test_extract_oem_tokens_rejects_years_and_short_numbers() {
        let tokens = extract_oem_tokens("Built 2015, 150 kW, order 12345");
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_build_query_includes_engine_code() {
        let mut request = ResolutionRequest::new(
            crate::types::Vehicle {
                make: "Volkswagen".into(),
                model: "Golf".into(),
                year: Some(2016),
                ..Default::default()
            },
            crate::types::PartQuery {
                text: "front brake disc".into(),
                ..Default::default()
            },
        );
        request.vehicle.engine_code = Some("CJSA".into());
        let q = build_query(&request);
        assert!(q.contains("Volkswagen"));
        assert!(q.contains("CJSA"));
        assert!(q.contains("front brake disc"));
    }
}
