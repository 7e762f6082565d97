use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Clamp a confidence value into [0, 1]. Every component applies this before
/// a confidence leaves its boundary.
pub fn clamp_confidence(c: f32) -> f32 {
    if c.is_nan() {
        return 0.0;
    }
    c.clamp(0.0, 1.0)
}

/// Vehicle identification as supplied by the caller, possibly partial.
/// The enricher may fill in derived fields (engine code, option codes,
/// facelift era) on a copy; the original request is never mutated after
/// fan-out begins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vehicle {
    pub vin: Option<String>,
    /// German KBA manufacturer code (HSN).
    pub kba_hsn: Option<String>,
    /// German KBA type code (TSN).
    pub kba_tsn: Option<String>,
    pub make: String,
    pub model: String,
    pub year: Option<u16>,
    pub month: Option<u8>,
    pub power_kw: Option<u16>,
    pub engine_code: Option<String>,
    #[serde(default)]
    pub option_codes: Vec<String>,
    pub facelift: Option<String>,
}

impl Vehicle {
    /// Normalized lowercase brand key used for schema lookups and grouping.
    pub fn brand_key(&self) -> String {
        self.make.trim().to_lowercase()
    }

    /// Tokens a backsearch page must contain to count as a vehicle match.
    pub fn model_tokens(&self) -> Vec<String> {
        self.model
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() >= 2)
            .collect()
    }
}

/// Rough part taxonomy used for store keys, static tables, and the semantic
/// part-match filter. Free text that fits nothing maps to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartCategory {
    BrakeDisc,
    BrakePad,
    BrakeCaliper,
    Filter,
    Clutch,
    Suspension,
    Ignition,
    Cooling,
    Exhaust,
    Electrical,
    Lighting,
    Body,
    Other,
}

impl PartCategory {
    pub fn from_text(text: &str) -> Self {
        let t = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| t.contains(w));
        if has(&["bremsscheibe", "brake disc", "brake rotor", "disc rotor"]) {
            Self::BrakeDisc
        } else if has(&["bremsbelag", "bremsbeläge", "brake pad"]) {
            Self::BrakePad
        } else if has(&["bremssattel", "caliper"]) {
            Self::BrakeCaliper
        } else if has(&["filter", "luftfilter", "ölfilter", "pollenfilter"]) {
            Self::Filter
        } else if has(&["kupplung", "clutch"]) {
            Self::Clutch
        } else if has(&["stoßdämpfer", "federbein", "shock absorber", "strut", "control arm", "querlenker"]) {
            Self::Suspension
        } else if has(&["zündspule", "zündkerze", "spark plug", "ignition coil"]) {
            Self::Ignition
        } else if has(&["kühler", "thermostat", "wasserpumpe", "radiator", "water pump", "coolant"]) {
            Self::Cooling
        } else if has(&["auspuff", "katalysator", "exhaust", "muffler", "lambda"]) {
            Self::Exhaust
        } else if has(&["lichtmaschine", "anlasser", "alternator", "starter", "sensor"]) {
            Self::Electrical
        } else if has(&["scheinwerfer", "rückleuchte", "headlight", "tail light", "blinker"]) {
            Self::Lighting
        } else if has(&["kotflügel", "stoßstange", "spiegel", "fender", "bumper", "mirror", "grille"]) {
            Self::Body
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrakeDisc => "brake_disc",
            Self::BrakePad => "brake_pad",
            Self::BrakeCaliper => "brake_caliper",
            Self::Filter => "filter",
            Self::Clutch => "clutch",
            Self::Suspension => "suspension",
            Self::Ignition => "ignition",
            Self::Cooling => "cooling",
            Self::Exhaust => "exhaust",
            Self::Electrical => "electrical",
            Self::Lighting => "lighting",
            Self::Body => "body",
            Self::Other => "other",
        }
    }
}

/// What the caller is actually asking for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartQuery {
    /// Raw free-text description ("front brake discs", "Bremsscheiben vorne").
    pub text: String,
    pub category: Option<PartCategory>,
    /// A number the caller already suspects, OEM or aftermarket.
    pub suspected_number: Option<String>,
    /// URL of a part-label photo or scan; enables the vision/OCR source.
    #[serde(default)]
    pub label_url: Option<String>,
}

impl PartQuery {
    /// Category, deriving one from the free text when none was given.
    pub fn effective_category(&self) -> PartCategory {
        self.category
            .unwrap_or_else(|| PartCategory::from_text(&self.text))
    }
}

/// One resolution question. Immutable after fan-out begins; the enricher
/// works on a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub id: Uuid,
    pub vehicle: Vehicle,
    pub part: PartQuery,
}

impl ResolutionRequest {
    pub fn new(vehicle: Vehicle, part: PartQuery) -> Self {
        Self {
            id: Uuid::new_v4(),
            vehicle,
            part,
        }
    }
}

/// Metadata keys the core reads back out of the candidate bag.
pub mod meta {
    /// Source priority tier, "1"–"10".
    pub const PRIORITY: &str = "priority";
    /// Semantic relevance score from the part-match filter.
    pub const RELEVANCE: &str = "relevance";
    /// Which enrichment derivation produced this candidate.
    pub const DERIVATION: &str = "derivation";
    /// "true" when the candidate came from an aftermarket reverse lookup.
    pub const REVERSE_LOOKUP: &str = "reverse_lookup";
    /// The discontinued OEM this candidate superseded.
    pub const SUPERSEDED_FROM: &str = "superseded_from";
    /// Production year reported by the source, for exact-match boosting.
    pub const YEAR: &str = "year";
    /// Power rating reported by the source, for exact-match boosting.
    pub const POWER_KW: &str = "power_kw";
    /// Distinguishing text for variant detection ("312mm", "PR-1ZD").
    pub const VARIANT_NOTE: &str = "variant_note";
    /// Free-text description scraped alongside the number.
    pub const DESCRIPTION: &str = "description";
    /// Validation notes appended by the gate.
    pub const VALIDATION: &str = "validation";
}

/// One source's claim. Immutable value object; merging produces new
/// candidates rather than mutating inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Claimed OEM number, not yet guaranteed normalized.
    pub oem: String,
    pub brand: Option<String>,
    /// Adapter name; becomes a "+"-joined list after merging.
    pub source: String,
    /// Always in [0, 1].
    pub confidence: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Candidate {
    pub fn new(oem: impl Into<String>, source: impl Into<String>, confidence: f32) -> Self {
        Self {
            oem: oem.into(),
            brand: None,
            source: source.into(),
            confidence: clamp_confidence(confidence),
            metadata: HashMap::new(),
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_priority(self, tier: u8) -> Self {
        let tier = tier.clamp(1, 10);
        self.with_meta(meta::PRIORITY, tier.to_string())
    }

    /// Priority tier from metadata; unknown sources default to the middle.
    pub fn priority(&self) -> u8 {
        self.metadata
            .get(meta::PRIORITY)
            .and_then(|v| v.parse::<u8>().ok())
            .map(|t| t.clamp(1, 10))
            .unwrap_or(5)
    }

    pub fn is_reverse_lookup(&self) -> bool {
        self.metadata
            .get(meta::REVERSE_LOOKUP)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Contributing source identifiers (split on the merge separator).
    pub fn source_ids(&self) -> Vec<&str> {
        self.source.split('+').filter(|s| !s.is_empty()).collect()
    }
}

/// Output of the consensus engine: the elected OEM plus the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub primary: Option<String>,
    pub confidence: f32,
    /// Fraction of independent source groups endorsing the winner.
    pub agreement_ratio: f32,
    /// Distinct independent source groups endorsing the winner.
    pub group_count: usize,
    pub sources: Vec<String>,
    /// Full merged candidate set, ranked best-first.
    pub candidates: Vec<Candidate>,
}

impl ConsensusResult {
    pub fn empty() -> Self {
        Self {
            primary: None,
            confidence: 0.0,
            agreement_ratio: 0.0,
            group_count: 0,
            sources: Vec::new(),
            candidates: Vec::new(),
        }
    }
}

/// Result of independently re-verifying one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub oem: String,
    /// Per-site verdict from the backsearch panel.
    pub site_hits: HashMap<String, bool>,
    pub hit_count: usize,
    pub confidence: f32,
    pub validated: bool,
    pub reasoning: String,
}

/// One legitimately distinct part variant for the same request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartVariant {
    pub oem: String,
    pub description: String,
    pub distinguishing_factor: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantResult {
    pub has_variants: bool,
    #[serde(default)]
    pub variants: Vec<PartVariant>,
    /// Natural-language disambiguation question when variants exist.
    pub question: Option<String>,
}

/// Externally visible outcome. Constructed once per request, immutable after
/// return; never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub request_id: Uuid,
    /// None both on outright failure and on detected ambiguity.
    pub primary_oem: Option<String>,
    pub candidates: Vec<Candidate>,
    pub confidence: f32,
    pub notes: String,
    pub variants: Option<VariantResult>,
}

impl ResolutionResult {
    pub fn empty(request_id: Uuid, notes: impl Into<String>) -> Self {
        Self {
            request_id,
            primary_oem: None,
            candidates: Vec::new(),
            confidence: 0.0,
            notes: notes.into(),
            variants: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped_on_construction() {
        assert_eq!(Candidate::new("5Q0615301F", "test", 1.7).confidence, 1.0);
        assert_eq!(Candidate::new("5Q0615301F", "test", -0.2).confidence, 0.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn test_category_from_text() {
        assert_eq!(
            PartCategory::from_text("Bremsscheibe vorne 312mm"),
            PartCategory::BrakeDisc
        );
        assert_eq!(
            PartCategory::from_text("front brake pads"),
            PartCategory::BrakePad
        );
        assert_eq!(PartCategory::from_text("oil filter"), PartCategory::Filter);
        assert_eq!(PartCategory::from_text("gizmo"), PartCategory::Other);
    }

    #[test]
    fn test_source_ids_split_on_merge_separator() {
        let c = Candidate::new("1K0615301AA", "catalog-a+catalog-b+websearch", 0.9);
        assert_eq!(c.source_ids(), vec!["catalog-a", "catalog-b", "websearch"]);
    }

    #[test]
    fn test_priority_defaults_to_middle_tier() {
        let c = Candidate::new("A2044210812", "test", 0.5);
        assert_eq!(c.priority(), 5);
        assert_eq!(c.with_priority(12).priority(), 10);
    }
}
