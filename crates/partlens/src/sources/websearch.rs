//! Generic search-engine miner.
//!
//! Scans result snippets for OEM-shaped tokens that co-occur with part
//! keywords. Cheap and noisy; lowest scraping tier, and the second leg of
//! the aftermarket reverse cascade.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdapterError;
use crate::fetch::FetchClient;
use crate::sources::{build_query, extract_oem_tokens, SourceAdapter, SourceKind};
use crate::types::{meta, Candidate, ResolutionRequest};

pub struct WebSearchSource {
    fetch: Arc<dyn FetchClient>,
    search_url: String,
}

impl WebSearchSource {
    pub const NAME: &'static str = "websearch";

    pub fn new(fetch: Arc<dyn FetchClient>) -> Self {
        Self {
            fetch,
            search_url: "https://websearch.example/?q={query}".into(),
        }
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Keep only tokens whose surrounding text mentions the part query, to
    /// avoid harvesting unrelated numbers from result pages.
    fn tokens_near_keywords(body: &str, part_text: &str) -> Vec<String> {
        let keywords: Vec<String> = part_text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| w.len() >= 4)
            .collect();
        let mut out = Vec::new();
        for line in body.lines() {
            let lower = line.to_lowercase();
            if keywords.is_empty() || keywords.iter().any(|k| lower.contains(k)) {
                for token in extract_oem_tokens(line) {
                    if !out.contains(&token) {
                        out.push(token);
                    }
                }
            }
        }
        out
    }

    /// Reverse cross-reference via web search: "<aftermarket number> OEM".
    pub async fn cross_reference(&self, aftermarket: &str) -> Result<Vec<String>, AdapterError> {
        let query = format!("{}+OEM", aftermarket);
        let url = self.search_url.replace("{query}", &query);
        let body = self.fetch.fetch(&url).await?;
        let input_compact: String = aftermarket
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();
        Ok(extract_oem_tokens(&body)
            .into_iter()
            .filter(|t| {
                let compact: String = t
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_uppercase();
                compact != input_compact
            })
            .take(3)
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for WebSearchSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::WebSearch
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let query = build_query(request).replace(' ', "+");
        let url = self.search_url.replace("{query}", &query);
        let body = self.fetch.fetch(&url).await?;

        Ok(Self::tokens_near_keywords(&body, &request.part.text)
            .into_iter()
            .take(4)
            .map(|oem| {
                Candidate::new(oem, Self::NAME, 0.50)
                    .with_brand(request.vehicle.make.clone())
                    .with_priority(3)
                    .with_meta(meta::DESCRIPTION, request.part.text.clone())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartQuery, Vehicle};
    use crate::fetch::testing::FixtureFetch;

    #[tokio::test]
    async fn test_tokens_require_part_keyword_on_line() {
        let body = "Golf brake disc OE 5Q0615301F fits 2013-2019\nUnrelated listing 1K0819644";
        let fetch = Arc::new(FixtureFetch::new().with_page("websearch.example", body));
        let source = WebSearchSource::new(fetch);

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
    }

    #[tokio::test]
    async fn test_cross_reference_strips_input_token() {
        let body = "TRW DF4464 is the aftermarket code for OEM 5Q0615301F";
        let fetch = Arc::new(FixtureFetch::new().with_page("websearch.example", body));
        let source = WebSearchSource::new(fetch);

        let oems = source.cross_reference("DF4464").await.unwrap();
        assert_eq!(oems, vec!["5Q0615301F".to_string()]);
    }
}
