//! Deep resolution enrichment.
//!
//! Derives structured hints (VIN fields, PR-code meaning, engine data,
//! facelift era) before fan-out. Every successful derivation both emits a
//! high-confidence candidate tagged with its method and writes the derived
//! field onto a copy of the request, so downstream sources query with better
//! terms. Single derivations fail silently; the rest proceed.

pub mod codes;
pub mod supersession;
pub mod vin;

use crate::filter::brand_schema::schema_score;
use crate::types::{meta, Candidate, ResolutionRequest};

pub struct EnrichmentOutput {
    /// Enriched copy; the incoming request is never mutated.
    pub request: ResolutionRequest,
    pub candidates: Vec<Candidate>,
}

#[derive(Default)]
pub struct Enricher;

impl Enricher {
    pub fn new() -> Self {
        Self
    }

    pub fn enrich(&self, request: &ResolutionRequest) -> EnrichmentOutput {
        let mut req = request.clone();
        let mut candidates = Vec::new();

        if let Some(vin) = req.vehicle.vin.clone() {
            match vin::decode_vin(&vin) {
                Ok(info) => {
                    if req.vehicle.make.trim().is_empty() {
                        if let Some(make) = info.make {
                            req.vehicle.make = make;
                        }
                    }
                    if req.vehicle.year.is_none() {
                        req.vehicle.year = info.year;
                    }
                    if !info.check_digit_ok {
                        tracing::debug!(request_id = %req.id, "VIN check digit mismatch, decoding anyway");
                    }
                }
                Err(e) => {
                    tracing::debug!(request_id = %req.id, error = %e, "VIN decode failed");
                }
            }
        }

        let brand = req.vehicle.brand_key();
        let category = req.part.effective_category();

        for code in req.vehicle.option_codes.clone() {
            let Some(info) = codes::lookup_pr_code(&brand, &code) else {
                tracing::debug!(code = %code, "unknown PR code");
                continue;
            };
            if info.category != category {
                continue;
            }
            if let Some(oem) = info.oem {
                candidates.push(
                    Candidate::new(oem, "enricher:pr-code", 0.88)
                        .with_brand(req.vehicle.make.clone())
                        .with_priority(9)
                        .with_meta(meta::DERIVATION, format!("pr-code:{}", info.code))
                        .with_meta(meta::VARIANT_NOTE, info.description)
                        .with_meta(meta::DESCRIPTION, info.description),
                );
            }
        }

        if let Some(code) = req.vehicle.engine_code.clone() {
            match codes::lookup_engine_code(&code) {
                Some(info) => {
                    if req.vehicle.power_kw.is_none() {
                        req.vehicle.power_kw = Some(info.power_kw);
                    }
                }
                None => tracing::debug!(code = %code, "unknown engine code"),
            }
        }

        if req.vehicle.facelift.is_none() {
            if let Some(year) = req.vehicle.year {
                req.vehicle.facelift =
                    codes::facelift_era(&brand, &req.vehicle.model, year).map(|t| t.to_string());
            }
        }

        if let Some(suspected) = req.part.suspected_number.clone() {
            // Only forward a user-suspected number that at least looks like
            // this brand's numbering; aftermarket shapes still pass through
            // so the aftermarket filter can capture them for the cascade.
            if schema_score(Some(brand.as_str()), &suspected) >= 1 || suspected.len() >= 5 {
                candidates.push(
                    Candidate::new(suspected, "enricher:suspected", 0.55)
                        .with_brand(req.vehicle.make.clone())
                        .with_priority(5)
                        .with_meta(meta::DERIVATION, "suspected-number"),
                );
            }
        }

        // Replace discontinued numbers with their current successor.
        for candidate in &mut candidates {
            if let Some((successor, hops)) = supersession::supersede(&candidate.oem) {
                tracing::debug!(from = %candidate.oem, to = %successor, hops, "applied supersession");
                candidate
                    .metadata
                    .insert(meta::SUPERSEDED_FROM.to_string(), candidate.oem.clone());
                candidate.oem = successor;
            }
        }

        EnrichmentOutput {
            request: req,
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartQuery, Vehicle};

    fn request() -> ResolutionRequest {
        ResolutionRequest::new(
            Vehicle {
                vin: Some("WVWZZZAUZGW123456".into()),
                make: "".into(),
                model: "Golf".into(),
                option_codes: vec!["1ZD".into()],
                ..Default::default()
            },
            PartQuery {
                text: "Bremsscheibe vorne".into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_vin_fills_make_and_year_on_copy() {
        let original = request();
        let out = Enricher::new().enrich(&original);
        assert_eq!(out.request.vehicle.make, "Volkswagen");
        assert_eq!(out.request.vehicle.year, Some(2016));
        // The incoming request is untouched.
        assert!(original.vehicle.make.is_empty());
    }

    #[test]
    fn test_pr_code_emits_candidate_and_facelift_derived() {
        let out = Enricher::new().enrich(&request());
        assert_eq!(out.request.vehicle.facelift.as_deref(), Some("pre-facelift"));
        let pr = out
            .candidates
            .iter()
            .find(|c| c.source == "enricher:pr-code")
            .expect("pr-code candidate");
        assert_eq!(pr.oem, "5Q0615301F");
        assert!(pr.confidence >= 0.85);
    }

    #[test]
    fn test_pr_code_for_other_category_is_skipped() {
        let mut req = request();
        req.part.text = "Ölfilter".into();
        let out = Enricher::new().enrich(&req);
        assert!(out.candidates.iter().all(|c| c.source != "enricher:pr-code"));
    }

    #[test]
    fn test_supersession_annotates_suspected_number() {
        let mut req = request();
        req.vehicle.option_codes.clear();
        req.part.suspected_number = Some("5Q0615301A".into());
        let out = Enricher::new().enrich(&req);
        let suspected = out
            .candidates
            .iter()
            .find(|c| c.source == "enricher:suspected")
            .expect("suspected candidate");
        assert_eq!(suspected.oem, "5Q0615301F");
        assert_eq!(
            suspected.metadata.get(meta::SUPERSEDED_FROM).map(|s| s.as_str()),
            Some("5Q0615301A")
        );
    }

    #[test]
    fn test_invalid_vin_is_silent() {
        let mut req = request();
        req.vehicle.vin = Some("NOTAVIN".into());
        req.vehicle.make = "Volkswagen".into();
        let out = Enricher::new().enrich(&req);
        assert_eq!(out.request.vehicle.make, "Volkswagen");
    }
}
