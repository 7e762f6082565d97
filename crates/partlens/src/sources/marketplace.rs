//! Structured marketplace miner.
//!
//! Marketplace listings rarely lead with OEM numbers, but their
//! "OE/OEM reference" compatibility fields are a usable cross-reference:
//! both from vehicle query to OEM and from an aftermarket number back to its
//! documented OEM (the reverse cascade path).

use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::AdapterError;
use crate::fetch::FetchClient;
use crate::sources::{build_query, extract_oem_tokens, SourceAdapter, SourceKind};
use crate::types::{meta, Candidate, ResolutionRequest};

/// Listing lines that explicitly label a number as an OE reference.
static OE_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:OE|OEM)[\s\-]*(?:Nummer|number|ref(?:erence)?)?\s*[:=]\s*([A-Z0-9][A-Z0-9 ./\-]{5,18})")
        .expect("oe field regex is valid")
});

pub struct MarketplaceSource {
    fetch: Arc<dyn FetchClient>,
    search_url: String,
}

impl MarketplaceSource {
    pub const NAME: &'static str = "marketplace";

    pub fn new(fetch: Arc<dyn FetchClient>) -> Self {
        Self {
            fetch,
            search_url: "https://marketplace.example/search?q={query}".into(),
        }
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    fn extract_oe_fields(body: &str) -> Vec<String> {
        let mut out = Vec::new();
        for cap in OE_FIELD_RE.captures_iter(body) {
            if let Some(m) = cap.get(1) {
                // The labeled span can trail into listing prose; re-apply the
                // token shapes to cut it down.
                for token in extract_oem_tokens(m.as_str()) {
                    if !out.contains(&token) {
                        out.push(token);
                    }
                }
            }
        }
        out
    }

    /// Reverse cross-reference: search the marketplace for an aftermarket
    /// number and harvest the OE references its listings document.
    pub async fn cross_reference(&self, aftermarket: &str) -> Result<Vec<String>, AdapterError> {
        let url = self.search_url.replace("{query}", aftermarket);
        let body = self.fetch.fetch(&url).await?;
        let normalized_input: String = aftermarket
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();
        Ok(Self::extract_oe_fields(&body)
            .into_iter()
            .filter(|oem| {
                let compact: String = oem
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_uppercase();
                compact != normalized_input
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for MarketplaceSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Marketplace
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let query = build_query(request).replace(' ', "+");
        let url = self.search_url.replace("{query}", &query);
        let body = self.fetch.fetch(&url).await?;

        let candidates = Self::extract_oe_fields(&body)
            .into_iter()
            .take(5)
            .map(|oem| {
                Candidate::new(oem, Self::NAME, 0.60)
                    .with_brand(request.vehicle.make.clone())
                    .with_priority(4)
                    .with_meta(meta::DESCRIPTION, request.part.text.clone())
            })
            .collect();
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FixtureFetch;
    use crate::types::{PartQuery, Vehicle};

    #[tokio::test]
    async fn test_extracts_labeled_oe_fields_only() {
        let body = "Brake disc for Golf. Item no 98765. OE number: 5Q0615301F. Price 49,90";
        let fetch = Arc::new(FixtureFetch::new().with_page("marketplace.example", body));
        let source = MarketplaceSource::new(fetch);

        let request = ResolutionRequest::new(
            Vehicle {
                make: "Volkswagen".into(),
                model: "Golf".into(),
                ..Default::default()
            },
            PartQuery {
                text: "brake disc".into(),
                ..Default::default()
            },
        );
        let candidates = source.resolve_candidates(&request).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].oem, "5Q0615301F");
        assert_eq!(candidates[0].priority(), 4);
    }

    #[tokio::test]
    async fn test_cross_reference_excludes_the_input_number() {
        let body = "TRW DF4464 replacement. OEM ref: 5Q0615301F. OE: DF4464";
        let fetch = Arc::new(FixtureFetch::new().with_page("marketplace.example", body));
        let source = MarketplaceSource::new(fetch);

        let oems = source.cross_reference("DF4464").await.unwrap();
        assert_eq!(oems, vec!["5Q0615301F".to_string()]);
    }
}
