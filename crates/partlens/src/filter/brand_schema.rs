//! Brand numbering-schema plausibility.
//!
//! Scores a candidate OEM string against brand-specific format rules on a
//! 0-2 scale: 2 = matches the brand's canonical layout, 1 = plausible but
//! not canonical, 0 = does not look like this brand at all.

use regex::Regex;
use std::sync::LazyLock;

use crate::consensus::normalize_oem;
use crate::types::{meta, Candidate, Vehicle};

struct BrandSchema {
    brands: &'static [&'static str],
    full: &'static LazyLock<Regex>,
    relaxed: &'static LazyLock<Regex>,
}

static VAG_FULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9][A-Z0-9]{2}[0-9]{6}[A-Z]{0,2}$").expect("vag full regex is valid")
});
static VAG_RELAXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9][A-Z0-9]{8,11}$").expect("vag relaxed regex is valid")
});
static BMW_FULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{11}$").expect("bmw full regex is valid"));
static BMW_RELAXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{7,11}$").expect("bmw relaxed regex is valid"));
static MB_FULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^A[0-9]{10}$").expect("mercedes full regex is valid"));
static MB_RELAXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[AN][0-9]{9,12}$").expect("mercedes relaxed regex is valid"));
static TOYOTA_FULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{5}[0-9A-Z]{5}$").expect("toyota full regex is valid"));
static TOYOTA_RELAXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{5}[0-9A-Z]{4,6}$").expect("toyota relaxed regex is valid"));
static NUMERIC_FULL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{8,10}$").expect("numeric full regex is valid"));
static NUMERIC_RELAXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6,11}$").expect("numeric relaxed regex is valid"));

static SCHEMAS: &[BrandSchema] = &[
    BrandSchema {
        brands: &["volkswagen", "vw", "audi", "seat", "skoda", "cupra", "porsche"],
        full: &VAG_FULL,
        relaxed: &VAG_RELAXED,
    },
    BrandSchema {
        brands: &["bmw", "mini"],
        full: &BMW_FULL,
        relaxed: &BMW_RELAXED,
    },
    BrandSchema {
        brands: &["mercedes-benz", "mercedes", "smart"],
        full: &MB_FULL,
        relaxed: &MB_RELAXED,
    },
    BrandSchema {
        brands: &["toyota", "lexus", "mazda", "honda", "nissan"],
        full: &TOYOTA_FULL,
        relaxed: &TOYOTA_RELAXED,
    },
    BrandSchema {
        brands: &["opel", "ford", "renault", "peugeot", "citroën", "citroen", "fiat", "volvo"],
        full: &NUMERIC_FULL,
        relaxed: &NUMERIC_RELAXED,
    },
];

/// Score OEM format plausibility for a brand. Unknown brands can earn at
/// most 1 by matching some known manufacturer layout.
pub fn schema_score(brand: Option<&str>, oem: &str) -> u8 {
    let normalized = normalize_oem(oem);
    if normalized.is_empty() {
        return 0;
    }
    let brand = brand.map(|b| b.trim().to_lowercase());
    match brand.as_deref() {
        Some(b) => {
            if let Some(schema) = SCHEMAS.iter().find(|s| s.brands.contains(&b)) {
                if schema.full.is_match(&normalized) {
                    return 2;
                }
                if schema.relaxed.is_match(&normalized) {
                    return 1;
                }
                return 0;
            }
            // Brand without a known schema: fall through to the generic scan.
            if SCHEMAS.iter().any(|s| s.full.is_match(&normalized)) {
                1
            } else {
                0
            }
        }
        None => {
            if SCHEMAS.iter().any(|s| s.full.is_match(&normalized)) {
                1
            } else {
                0
            }
        }
    }
}

/// Generic fallback: 5-14 characters with at least one digit.
pub fn generically_plausible(oem: &str) -> bool {
    let normalized = normalize_oem(oem);
    (5..=14).contains(&normalized.len()) && normalized.chars().any(|c| c.is_ascii_digit())
}

pub struct BrandSchemaFilter;

impl BrandSchemaFilter {
    /// Drop candidates whose format fails every heuristic, keep trusted
    /// reverse-lookups, and boost survivors whose reported year or power
    /// exactly matches the vehicle.
    pub fn filter(&self, vehicle: &Vehicle, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let brand_key = vehicle.brand_key();
        let brand = if brand_key.is_empty() { None } else { Some(brand_key.as_str()) };
        let mut kept = Vec::new();
        for candidate in candidates {
            let effective_brand = candidate
                .brand
                .as_deref()
                .map(|b| b.to_lowercase());
            let score = schema_score(
                effective_brand.as_deref().or(brand),
                &candidate.oem,
            );
            let keep = score > 0
                || candidate.is_reverse_lookup()
                || generically_plausible(&candidate.oem);
            if !keep {
                tracing::debug!(oem = %candidate.oem, "dropped by brand schema filter");
                continue;
            }

            let mut candidate = candidate;
            let year_matches = match (candidate.metadata.get(meta::YEAR), vehicle.year) {
                (Some(y), Some(vy)) => y.parse::<u16>().map(|y| y == vy).unwrap_or(false),
                _ => false,
            };
            let power_matches = match (candidate.metadata.get(meta::POWER_KW), vehicle.power_kw) {
                (Some(p), Some(vp)) => p.parse::<u16>().map(|p| p == vp).unwrap_or(false),
                _ => false,
            };
            if year_matches || power_matches {
                candidate.confidence = crate::types::clamp_confidence(candidate.confidence + 0.05);
            }
            kept.push(candidate);
        }
        kept
    }
}
