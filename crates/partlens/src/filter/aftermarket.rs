//! Aftermarket number classification and the aftermarket→OEM reverse
//! cascade.
//!
//! Reseller catalog numbers (Bosch, TRW, ATE, ...) are the single most
//! common wrong-answer class: shops surface them instead of OEM numbers and
//! they look plausible. They are filtered before consensus, but kept aside —
//! when nothing strong survives, their documented OEM cross-references are a
//! second, independent chance at the right answer.

use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;

use crate::sources::{MarketplaceSource, WebSearchSource};
use crate::types::{clamp_confidence, meta, Candidate, ResolutionRequest};

struct AftermarketPattern {
    maker: &'static str,
    regex: &'static LazyLock<Regex>,
}

static BOSCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0\s?(986|092|280|258|242)\s?[0-9]{3}\s?[0-9]{3}$").expect("bosch regex is valid")
});
static TRW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(DF|GDB|DTC|PHD)\s?[0-9]{3,5}[A-Z]?$").expect("trw regex is valid")
});
static ATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^24\.[0-9]{4}-[0-9]{4}\.[0-9]$").expect("ate regex is valid")
});
static BREMBO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0[89]\.[A-Z0-9]{4}\.[0-9]{2}$").expect("brembo regex is valid")
});
static ZIMMERMANN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{3}\.[0-9]{4}\.[0-9]{2}$").expect("zimmermann regex is valid")
});
static MANN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(W|HU|C|WK|CUK?)\s?[0-9]{3,5}(/[0-9]{1,2})?$").expect("mann regex is valid")
});
static MEYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{3}\s[0-9]{3}\s[0-9]{4}(/S)?$").expect("meyle regex is valid")
});

static PATTERNS: &[AftermarketPattern] = &[
    AftermarketPattern { maker: "bosch", regex: &BOSCH_RE },
    AftermarketPattern { maker: "trw", regex: &TRW_RE },
    AftermarketPattern { maker: "ate", regex: &ATE_RE },
    AftermarketPattern { maker: "brembo", regex: &BREMBO_RE },
    AftermarketPattern { maker: "zimmermann", regex: &ZIMMERMANN_RE },
    AftermarketPattern { maker: "mann", regex: &MANN_RE },
    AftermarketPattern { maker: "meyle", regex: &MEYLE_RE },
];

/// Known aftermarket brand names; a candidate whose own brand field names a
/// reseller is aftermarket no matter how its number is shaped.
const AFTERMARKET_BRANDS: &[&str] = &[
    "bosch", "trw", "ate", "brembo", "zimmermann", "mann", "meyle", "febi", "bilstein",
    "sachs", "valeo", "hella", "mahle", "ngk", "denso",
];

/// Classify a number against the reseller patterns. Matching is done on the
/// raw trimmed string: separators are part of these schemes.
pub fn classify_aftermarket(raw: &str) -> Option<&'static str> {
    let trimmed = raw.trim().to_uppercase();
    PATTERNS
        .iter()
        .find(|p| p.regex.is_match(&trimmed))
        .map(|p| p.maker)
}

pub struct AftermarketSplit {
    pub kept: Vec<Candidate>,
    /// (maker, candidate) pairs removed from the pipeline.
    pub discarded: Vec<(String, Candidate)>,
}

#[derive(Default)]
pub struct AftermarketFilter;

impl AftermarketFilter {
    pub fn split(&self, candidates: Vec<Candidate>) -> AftermarketSplit {
        let mut kept = Vec::new();
        let mut discarded = Vec::new();
        for candidate in candidates {
            // Reverse-lookup outputs deliberately started from an
            // aftermarket number; do not re-filter them.
            if candidate.is_reverse_lookup() {
                kept.push(candidate);
                continue;
            }
            let by_pattern = classify_aftermarket(&candidate.oem);
            let by_brand = candidate
                .brand
                .as_deref()
                .map(|b| b.trim().to_lowercase())
                .filter(|b| AFTERMARKET_BRANDS.contains(&b.as_str()));
            match by_pattern.map(str::to_string).or(by_brand) {
                Some(maker) => {
                    tracing::debug!(oem = %candidate.oem, maker = %maker, "aftermarket number filtered");
                    discarded.push((maker, candidate));
                }
                None => kept.push(candidate),
            }
        }
        AftermarketSplit { kept, discarded }
    }
}

/// Uses discarded aftermarket numbers as search keys to find their
/// documented OEM cross-reference on independent sources.
pub struct ReverseCascade {
    marketplace: Arc<MarketplaceSource>,
    websearch: Arc<WebSearchSource>,
    /// At most this many discarded numbers are cross-referenced per request.
    max_inputs: usize,
}

impl ReverseCascade {
    /// Cross-referenced OEMs are injected below the strong-candidate bar so
    /// they still need corroboration or validation to win.
    const INJECTED_CONFIDENCE: f32 = 0.65;

    pub fn new(marketplace: Arc<MarketplaceSource>, websearch: Arc<WebSearchSource>) -> Self {
        Self {
            marketplace,
            websearch,
            max_inputs: 3,
        }
    }

    pub async fn run(
        &self,
        request: &ResolutionRequest,
        discarded: &[(String, Candidate)],
    ) -> Vec<Candidate> {
        let mut injected: Vec<Candidate> = Vec::new();
        for (maker, candidate) in discarded.iter().take(self.max_inputs) {
            let number = candidate.oem.trim();
            let mut found = match self.marketplace.cross_reference(number).await {
                Ok(oems) => oems,
                Err(e) => {
                    tracing::debug!(number, error = %e, "marketplace cross-reference failed");
                    Vec::new()
                }
            };
            if found.is_empty() {
                found = match self.websearch.cross_reference(number).await {
                    Ok(oems) => oems,
                    Err(e) => {
                        tracing::debug!(number, error = %e, "websearch cross-reference failed");
                        Vec::new()
                    }
                };
            }
            for oem in found {
                let already = injected.iter().any(|c: &Candidate| {
                    crate::consensus::normalize_oem(&c.oem) == crate::consensus::normalize_oem(&oem)
                });
                if already {
                    continue;
                }
                injected.push(
                    Candidate::new(
                        oem,
                        format!("reverse-lookup:{}", maker),
                        clamp_confidence(Self::INJECTED_CONFIDENCE),
                    )
                    .with_brand(request.vehicle.make.clone())
                    .with_priority(6)
                    .with_meta(meta::REVERSE_LOOKUP, "true")
                    .with_meta(meta::DERIVATION, format!("cross-ref:{}", candidate.oem)),
                );
            }
        }
        injected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FixtureFetch;
    use crate::types::{PartQuery, Vehicle};

    #[test]
    fn test_classify_known_schemes() {
        assert_eq!(classify_aftermarket("0 986 479 088"), Some("bosch"));
        assert_eq!(classify_aftermarket("DF4464"), Some("trw"));
        assert_eq!(classify_aftermarket("24.0112-0139.1"), Some("ate"));
        assert_eq!(classify_aftermarket("09.A428.11"), Some("brembo"));
        assert_eq!(classify_aftermarket("W 712/95"), Some("mann"));
        assert_eq!(classify_aftermarket("5Q0615301F"), None);
        assert_eq!(classify_aftermarket("A0004212512"), None);
    }

    #[test]
    fn test_split_keeps_reverse_lookup_candidates() {
        let filter = AftermarketFilter;
        let oem = Candidate::new("5Q0615301F", "oemcatalog", 0.8);
        let aftermarket = Candidate::new("DF4464", "websearch", 0.6);
        let trusted = Candidate::new("DF4464", "reverse-lookup:trw", 0.6)
            .with_meta(meta::REVERSE_LOOKUP, "true");

        let split = filter.split(vec![oem, aftermarket, trusted]);
        assert_eq!(split.kept.len(), 2);
        assert_eq!(split.discarded.len(), 1);
        assert_eq!(split.discarded[0].0, "trw");
    }

    #[test]
    fn test_split_catches_aftermarket_by_brand_field() {
        let filter = AftermarketFilter;
        let candidate = Candidate::new("34116792219", "marketplace", 0.6).with_brand("Brembo");
        let split = filter.split(vec![candidate]);
        assert!(split.kept.is_empty());
        assert_eq!(split.discarded[0].0, "brembo");
    }

    #[tokio::test]
    async fn test_cascade_injects_cross_referenced_oem() {
        let fetch = Arc::new(FixtureFetch::new().with_page(
            "marketplace.example",
            "TRW DF4464 brake disc. OE number: 5Q0615301F",
        ));
        let cascade = ReverseCascade::new(
            Arc::new(MarketplaceSource::new(fetch.clone())),
            Arc::new(WebSearchSource::new(fetch)),
        );
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
        let discarded = vec![(
            "trw".to_string(),
            Candidate::new("DF4464", "websearch", 0.6),
        )];
        let injected = cascade.run(&request, &discarded).await;
        assert_eq!(injected.len(), 1);
        assert_eq!(injected[0].oem, "5Q0615301F");
        assert!(injected[0].is_reverse_lookup());
    }

    #[tokio::test]
    async fn test_cascade_empty_when_no_cross_reference_found() {
        let fetch = Arc::new(FixtureFetch::new());
        let cascade = ReverseCascade::new(
            Arc::new(MarketplaceSource::new(fetch.clone())),
            Arc::new(WebSearchSource::new(fetch)),
        );
        let request = ResolutionRequest::new(Vehicle::default(), PartQuery::default());
        let discarded = vec![(
            "trw".to_string(),
            Candidate::new("DF4464", "websearch", 0.6),
        )];
        assert!(cascade.run(&request, &discarded).await.is_empty());
    }
}
