//! Variant detection.
//!
//! Some requests have no single right answer: the same vehicle shipped with
//! two incompatible parts depending on options (312mm vs 288mm discs, sport
//! vs standard suspension). When the evidence supports several genuinely
//! distinct variants, a confident single answer would be a coin flip, so the
//! result becomes a disambiguation question instead.

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::LazyLock;

use crate::consensus::normalize_oem;
use crate::llm::LlmClient;
use crate::types::{meta, Candidate, PartVariant, ResolutionRequest, VariantResult};

/// Structural dimensions in scraped descriptions: "312mm", "312x25",
/// "340 mm".
static DIMENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{2,3})\s?(?:x\s?\d{1,3})?\s?mm\b|\b(\d{2,3})x(\d{1,3})\b")
        .expect("dimension regex is valid")
});

pub struct VariantDetector {
    llm: Option<Arc<dyn LlmClient>>,
    /// Minimum per-variant support confidence.
    min_support: f32,
}

impl VariantDetector {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, min_support: f32) -> Self {
        Self { llm, min_support }
    }

    /// Distinguishing signature of a candidate, when it carries one.
    fn signature(candidate: &Candidate) -> Option<String> {
        let text = candidate
            .metadata
            .get(meta::VARIANT_NOTE)
            .or_else(|| candidate.metadata.get(meta::DESCRIPTION))?;
        let m = DIMENSION_RE.find(text)?;
        Some(m.as_str().to_lowercase().replace(' ', ""))
    }

    /// Inspect the merged candidate set for mutually exclusive variants.
    /// Runs independent of which candidate won consensus.
    pub async fn detect(
        &self,
        request: &ResolutionRequest,
        candidates: &[Candidate],
    ) -> VariantResult {
        // Signature → best supporting candidate.
        let mut by_signature: HashMap<String, &Candidate> = HashMap::new();
        for candidate in candidates {
            if candidate.confidence < self.min_support {
                continue;
            }
            let Some(sig) = Self::signature(candidate) else {
                continue;
            };
            match by_signature.get(&sig) {
                Some(existing) if existing.confidence >= candidate.confidence => {}
                _ => {
                    by_signature.insert(sig, candidate);
                }
            }
        }

        // Two signatures on the same OEM are one part described twice.
        let distinct_oems: std::collections::HashSet<String> = by_signature
            .values()
            .map(|c| normalize_oem(&c.oem))
            .collect();
        if by_signature.len() < 2 || distinct_oems.len() < 2 {
            return VariantResult::default();
        }

        let mut variants: Vec<PartVariant> = by_signature
            .iter()
            .map(|(sig, c)| PartVariant {
                oem: c.oem.clone(),
                description: c
                    .metadata
                    .get(meta::DESCRIPTION)
                    .cloned()
                    .unwrap_or_else(|| request.part.text.clone()),
                distinguishing_factor: sig.clone(),
                confidence: c.confidence,
            })
            .collect();
        variants.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.oem.cmp(&b.oem))
        });

        let question = self.build_question(request, &variants).await;
        tracing::info!(
            request_id = %request.id,
            variant_count = variants.len(),
            "ambiguous request, returning variants instead of a guess"
        );
        VariantResult {
            has_variants: true,
            variants,
            question: Some(question),
        }
    }

    async fn build_question(
        &self,
        request: &ResolutionRequest,
        variants: &[PartVariant],
    ) -> String {
        let factors: Vec<&str> = variants
            .iter()
            .map(|v| v.distinguishing_factor.as_str())
            .collect();
        let template = format!(
            "The {} {} was fitted with {} different versions of \"{}\" ({}). Which version does your vehicle have?",
            request.vehicle.make,
            request.vehicle.model,
            variants.len(),
            request.part.text.trim(),
            factors.join(" or "),
        );

        let Some(llm) = &self.llm else {
            return template;
        };
        let prompt = format!(
            "Rephrase this question to a vehicle owner in one short, friendly sentence. Output only the question.\n\n{}",
            template
        );
        match llm.complete(&prompt, false).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => template,
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

    fn disc(oem: &str, note: &str, confidence: f32) -> Candidate {
        Candidate::new(oem, "oemcatalog", confidence)
            .with_brand("Volkswagen")
            .with_meta(meta::VARIANT_NOTE, note)
            .with_meta(meta::DESCRIPTION, note)
    }

    #[tokio::test]
    async fn test_two_disc_sizes_detected_as_variants() {
        let detector = VariantDetector::new(None, 0.60);
        let result = detector
            .detect(
                &request(),
                &[
                    disc("5Q0615301F", "front disc 312x25mm vented", 0.82),
                    disc("1K0615301AA", "front disc 288x25mm vented", 0.71),
                ],
            )
            .await;
        assert!(result.has_variants);
        assert_eq!(result.variants.len(), 2);
        assert_eq!(result.variants[0].oem, "5Q0615301F");
        assert!(result.question.as_deref().unwrap().contains("Which version"));
    }

    #[tokio::test]
    async fn test_weakly_supported_variant_ignored() {
        let detector = VariantDetector::new(None, 0.60);
        let result = detector
            .detect(
                &request(),
                &[
                    disc("5Q0615301F", "front disc 312x25mm", 0.82),
                    disc("1K0615301AA", "front disc 288x25mm", 0.40),
                ],
            )
            .await;
        assert!(!result.has_variants);
        assert!(result.variants.is_empty());
    }

    #[tokio::test]
    async fn test_same_oem_twice_is_not_a_variant_pair() {
        let detector = VariantDetector::new(None, 0.60);
        let result = detector
            .detect(
                &request(),
                &[
                    disc("5Q0615301F", "312mm front", 0.82),
                    disc("5q0 615 301 f", "disc 340mm option", 0.75),
                ],
            )
            .await;
        assert!(!result.has_variants);
    }

    #[tokio::test]
    async fn test_candidates_without_signatures_never_trigger() {
        let detector = VariantDetector::new(None, 0.60);
        let plain = Candidate::new("5Q0615301F", "oemcatalog", 0.9);
        let result = detector.detect(&request(), &[plain]).await;
        assert!(!result.has_variants);
    }
}
