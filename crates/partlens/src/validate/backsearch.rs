//! Backsearch: independent re-querying of a fixed site panel for a
//! candidate OEM. A site only counts as a hit when the number co-occurs
//! with vehicle-identifying keywords, which rejects the
//! same-number-different-vehicle false positives plain number search
//! produces.

use std::collections::HashMap;
use std::sync::Arc;

use crate::consensus::normalize_oem;
use crate::fetch::FetchClient;
use crate::types::Vehicle;

#[derive(Debug, Clone)]
pub struct BacksearchSite {
    pub name: String,
    /// URL template with an `{oem}` placeholder.
    pub url_template: String,
}

/// Brand names as they appear on part listings, including common aliases.
pub fn brand_synonyms(brand: &str) -> Vec<String> {
    let brand = brand.trim().to_lowercase();
    let mut synonyms = vec![brand.clone()];
    let extra: &[&str] = match brand.as_str() {
        "volkswagen" => &["vw"],
        "vw" => &["volkswagen"],
        "mercedes-benz" => &["mercedes", "daimler", "mb"],
        "mercedes" => &["mercedes-benz", "daimler"],
        "bmw" => &["bayerische motoren werke"],
        "citroën" => &["citroen"],
        "skoda" => &["škoda"],
        _ => &[],
    };
    synonyms.extend(extra.iter().map(|s| s.to_string()));
    synonyms
}

pub struct BacksearchPanel {
    sites: Vec<BacksearchSite>,
    fetch: Arc<dyn FetchClient>,
}

impl BacksearchPanel {
    pub fn new(sites: Vec<BacksearchSite>, fetch: Arc<dyn FetchClient>) -> Self {
        Self { sites, fetch }
    }

    pub fn default_panel(fetch: Arc<dyn FetchClient>) -> Self {
        Self::new(
            vec![
                BacksearchSite {
                    name: "partscheck".into(),
                    url_template: "https://partscheck.example/oe/{oem}".into(),
                },
                BacksearchSite {
                    name: "oeverify".into(),
                    url_template: "https://oeverify.example/search?number={oem}".into(),
                },
                BacksearchSite {
                    name: "teilefinder".into(),
                    url_template: "https://teilefinder.example/?q={oem}".into(),
                },
            ],
            fetch,
        )
    }

    /// The page must contain the OEM (separator-insensitive), a brand
    /// synonym, and at least one model token.
    fn page_matches(body: &str, oem: &str, vehicle: &Vehicle) -> bool {
        let compact: String = body
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if !compact.contains(&normalize_oem(oem)) {
            return false;
        }
        let lower = body.to_lowercase();
        let brand_ok = brand_synonyms(&vehicle.make)
            .iter()
            .any(|b| lower.contains(b.as_str()));
        if !brand_ok {
            return false;
        }
        let model_tokens = vehicle.model_tokens();
        model_tokens.is_empty() || model_tokens.iter().any(|t| lower.contains(t.as_str()))
    }

    /// Query every panel site for the OEM. Per-site failures count as
    /// misses, not errors.
    pub async fn check(&self, oem: &str, vehicle: &Vehicle) -> HashMap<String, bool> {
        let mut hits = HashMap::new();
        for site in &self.sites {
            let url = site.url_template.replace("{oem}", &normalize_oem(oem));
            let hit = match self.fetch.fetch(&url).await {
                Ok(body) => Self::page_matches(&body, oem, vehicle),
                Err(e) => {
                    tracing::debug!(site = %site.name, error = %e, "backsearch site unreachable");
                    false
                }
            };
            hits.insert(site.name.clone(), hit);
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FixtureFetch;

    fn vehicle() -> Vehicle {
        Vehicle {
            make: "Volkswagen".into(),
            model: "Golf VII".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_page_needs_oem_and_vehicle_keywords() {
        let v = vehicle();
        let good = "Brake disc 5Q0 615 301 F fits VW Golf VII 2013-2019";
        assert!(BacksearchPanel::page_matches(good, "5Q0615301F", &v));

        // Same number, different vehicle context.
        let wrong_vehicle = "Part 5Q0615301F for industrial compressor unit";
        assert!(!BacksearchPanel::page_matches(wrong_vehicle, "5Q0615301F", &v));

        let no_number = "VW Golf brake disc overview";
        assert!(!BacksearchPanel::page_matches(no_number, "5Q0615301F", &v));
    }

    #[test]
    fn test_brand_synonym_accepted() {
        let v = vehicle();
        let page = "OE 5Q0615301F — VW Golf front axle";
        assert!(BacksearchPanel::page_matches(page, "5Q0615301F", &v));
    }

    #[tokio::test]
    async fn test_unreachable_site_counts_as_miss() {
        let fetch = Arc::new(
            FixtureFetch::new()
                .with_page("partscheck.example", "5Q0615301F VW Golf brake disc"),
        );
        let panel = BacksearchPanel::default_panel(fetch);
        let hits = panel.check("5Q0615301F", &vehicle()).await;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits["partscheck"], true);
        assert_eq!(hits["oeverify"], false);
        assert_eq!(hits["teilefinder"], false);
    }
}
