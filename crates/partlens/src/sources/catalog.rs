//! Config-driven catalog-site scrapers.
//!
//! One struct covers every catalog site; a `CatalogSite` entry carries the
//! per-site query template, priority tier, and timeout. The browser/anti-bot
//! mechanics live behind the fetch proxy, not here.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdapterError;
use crate::fetch::FetchClient;
use crate::sources::{build_query, extract_oem_tokens, SourceAdapter, SourceKind};
use crate::types::{meta, Candidate, ResolutionRequest};

#[derive(Debug, Clone)]
pub struct CatalogSite {
    /// Adapter name, unique per configuration.
    pub name: String,
    /// Underlying site identity; two configs on the same site share this.
    pub site: String,
    /// URL template with a `{query}` placeholder.
    pub url_template: String,
    /// Source priority tier, 1-10.
    pub priority: u8,
    /// Base confidence for an extracted number before health weighting.
    pub base_confidence: f32,
    pub timeout_secs: u64,
}

impl CatalogSite {
    /// The catalog panel used by default. Two of these intentionally sit on
    /// the same underlying site via different entry points; consensus must
    /// collapse them into one group.
    pub fn default_sites() -> Vec<CatalogSite> {
        vec![
            CatalogSite {
                name: "partscat-oe".into(),
                site: "partscat".into(),
                url_template: "https://partscat.example/search?q={query}".into(),
                priority: 8,
                base_confidence: 0.78,
                timeout_secs: 20,
            },
            CatalogSite {
                name: "partscat-vin".into(),
                site: "partscat".into(),
                url_template: "https://partscat.example/vin-lookup?q={query}".into(),
                priority: 8,
                base_confidence: 0.76,
                timeout_secs: 20,
            },
            CatalogSite {
                name: "oemcatalog".into(),
                site: "oemcatalog".into(),
                url_template: "https://oemcatalog.example/parts?query={query}".into(),
                priority: 9,
                base_confidence: 0.80,
                timeout_secs: 25,
            },
            CatalogSite {
                name: "teilekatalog".into(),
                site: "teilekatalog".into(),
                url_template: "https://teilekatalog.example/suche?text={query}".into(),
                priority: 7,
                base_confidence: 0.72,
                timeout_secs: 30,
            },
        ]
    }
}

pub struct CatalogScraperSource {
    site: CatalogSite,
    fetch: Arc<dyn FetchClient>,
}

impl CatalogScraperSource {
    pub fn new(site: CatalogSite, fetch: Arc<dyn FetchClient>) -> Self {
        Self { site, fetch }
    }

    fn url_for(&self, request: &ResolutionRequest) -> String {
        let query = build_query(request);
        // Minimal percent-encoding for the query slot.
        let encoded: String = query
            .chars()
            .map(|c| if c == ' ' { '+' } else { c })
            .collect();
        self.site.url_template.replace("{query}", &encoded)
    }
}

#[async_trait]
impl SourceAdapter for CatalogScraperSource {
    fn name(&self) -> &str {
        &self.site.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Scraper
    }

    fn group(&self) -> &str {
        &self.site.site
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.site.timeout_secs)
    }

    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let body = self.fetch.fetch(&self.url_for(request)).await?;
        let make = request.vehicle.make.clone();
        let candidates = extract_oem_tokens(&body)
            .into_iter()
            .take(5)
            .map(|oem| {
                Candidate::new(oem, self.site.name.clone(), self.site.base_confidence)
                    .with_brand(make.clone())
                    .with_priority(self.site.priority)
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

    fn request() -> ResolutionRequest {
        ResolutionRequest::new(
            Vehicle {
                make: "Volkswagen".into(),
                model: "Golf".into(),
                year: Some(2016),
                ..Default::default()
            },
            PartQuery {
                text: "front brake disc".into(),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_scraper_extracts_candidates_from_page() {
        let fetch = Arc::new(FixtureFetch::new().with_page(
            "partscat.example",
            "Golf VII front axle. OE number 5Q0 615 301 F in stock.",
        ));
        let site = CatalogSite::default_sites().remove(0);
        let source = CatalogScraperSource::new(site, fetch);

        let candidates = source.resolve_candidates(&request()).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].oem.replace(' ', ""), "5Q0615301F");
        assert_eq!(candidates[0].priority(), 8);
        assert_eq!(candidates[0].source, "partscat-oe");
    }

    #[tokio::test]
    async fn test_scraper_propagates_fetch_failure() {
        let fetch = Arc::new(FixtureFetch::new());
        let site = CatalogSite::default_sites().remove(0);
        let source = CatalogScraperSource::new(site, fetch);
        assert!(source.resolve_candidates(&request()).await.is_err());
    }

    #[test]
    fn test_shared_site_configs_share_group() {
        let sites = CatalogSite::default_sites();
        assert_eq!(sites[0].site, sites[1].site);
        assert_ne!(sites[0].name, sites[1].name);
    }
}
