//! Validation gate: independent re-verification of the top-ranked
//! candidates before anything is returned as a primary answer.
//!
//! Sequential by design (each candidate is only tried if the previous one
//! failed to validate), so the whole loop sits inside one global timeout.
//! Timing out is not an error: the best outcome seen so far wins.

pub mod backsearch;

pub use backsearch::{brand_synonyms, BacksearchPanel, BacksearchSite};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::ValidationConfig;
use crate::filter::schema_score;
use crate::llm::{extract_json_object, LlmClient};
use crate::types::{
    clamp_confidence, Candidate, ConsensusResult, ResolutionRequest, ValidationOutcome,
};

const VERIFY_PROMPT: &str = r#"You are verifying whether an OEM part number is plausible for a vehicle and requested part. Output a single JSON object, nothing else:
{"compatible":<true|false>,"confidence":<0.0-1.0>,"reason":"<one sentence>"}"#;

pub struct ValidationGate {
    panel: BacksearchPanel,
    llm: Option<Arc<dyn LlmClient>>,
    config: ValidationConfig,
    accept: f32,
}

impl ValidationGate {
    pub fn new(
        panel: BacksearchPanel,
        llm: Option<Arc<dyn LlmClient>>,
        config: ValidationConfig,
        accept: f32,
    ) -> Self {
        Self {
            panel,
            llm,
            config,
            accept,
        }
    }

    async fn llm_adjustment(&self, request: &ResolutionRequest, oem: &str) -> f32 {
        if !self.config.enable_llm_verification {
            return 0.0;
        }
        let Some(llm) = &self.llm else { return 0.0 };
        let v = &request.vehicle;
        let prompt = format!(
            "{}\n\nVehicle: {} {} {}\nRequested part: {}\nOEM number: {}",
            VERIFY_PROMPT,
            v.make,
            v.model,
            v.year.map(|y| y.to_string()).unwrap_or_default(),
            request.part.text,
            oem
        );
        match llm.complete(&prompt, true).await {
            Ok(response) => match extract_json_object(&response) {
                Some(parsed) => {
                    let compatible = parsed["compatible"].as_bool().unwrap_or(false);
                    if compatible {
                        0.05
                    } else {
                        -0.08
                    }
                }
                None => 0.0,
            },
            Err(e) => {
                // Inconclusive, never fatal: the optional layer is skipped.
                tracing::debug!(error = %e, "llm verification unavailable");
                0.0
            }
        }
    }

    async fn validate_one(
        &self,
        request: &ResolutionRequest,
        candidate: &Candidate,
        base_confidence: f32,
    ) -> ValidationOutcome {
        let site_hits = self.panel.check(&candidate.oem, &request.vehicle).await;
        let hit_count = site_hits.values().filter(|h| **h).count();

        let brand = candidate
            .brand
            .as_deref()
            .map(|b| b.to_lowercase())
            .unwrap_or_else(|| request.vehicle.brand_key());
        let brand_score = schema_score(Some(brand.as_str()), &candidate.oem);
        let llm_adjust = self.llm_adjustment(request, &candidate.oem).await;

        let mut confidence = base_confidence + 0.06 * hit_count as f32 + 0.02 * brand_score as f32;
        if hit_count == 0 {
            confidence -= 0.05;
        }
        confidence = clamp_confidence(confidence + llm_adjust);
        let validated = hit_count >= 1 && confidence >= self.accept;

        let reasoning = format!(
            "backsearch {}/{} sites, brand pattern {}/2{}{}",
            hit_count,
            site_hits.len(),
            brand_score,
            if llm_adjust > 0.0 {
                ", model check agreed"
            } else if llm_adjust < 0.0 {
                ", model check disagreed"
            } else {
                ""
            },
            if validated { "" } else { ", not validated" },
        );

        ValidationOutcome {
            oem: candidate.oem.clone(),
            site_hits,
            hit_count,
            confidence,
            validated,
            reasoning,
        }
    }

    /// Validate the ranked consensus candidates, best first, stopping at the
    /// first validated one. Bounded by the global timeout; on expiry the
    /// best outcome seen so far is returned.
    pub async fn validate(
        &self,
        request: &ResolutionRequest,
        consensus: &ConsensusResult,
    ) -> Option<ValidationOutcome> {
        if consensus.candidates.is_empty() {
            return None;
        }

        // Vetted early-exit: broad agreement at high confidence only needs
        // the winner re-checked.
        let take = if consensus.group_count >= self.config.vetted_group_count
            && consensus.confidence >= self.config.vetted_confidence
        {
            1
        } else {
            self.config.top_n
        };
        let candidates: Vec<Candidate> =
            consensus.candidates.iter().take(take).cloned().collect();

        let best: Arc<Mutex<Option<ValidationOutcome>>> = Arc::new(Mutex::new(None));
        let best_writer = Arc::clone(&best);
        let loop_future = async {
            for (i, candidate) in candidates.iter().enumerate() {
                // The consensus winner carries the consensus confidence;
                // runners-up only their own merged confidence.
                let base = if i == 0 {
                    consensus.confidence
                } else {
                    candidate.confidence
                };
                let outcome = self.validate_one(request, candidate, base).await;
                let mut slot = best_writer.lock().await;
                let better = slot
                    .as_ref()
                    .map(|b| outcome.confidence > b.confidence)
                    .unwrap_or(true);
                if better {
                    *slot = Some(outcome.clone());
                }
                if outcome.validated {
                    break;
                }
            }
        };

        let timeout = Duration::from_millis(self.config.global_timeout_ms);
        if tokio::time::timeout(timeout, loop_future).await.is_err() {
            tracing::warn!(
                timeout_ms = self.config.global_timeout_ms,
                "validation gate timed out, using best pre-timeout outcome"
            );
        }

        let outcome = best.lock().await.take();
        match outcome {
            Some(outcome) => Some(outcome),
            None => {
                // Timed out inside the first candidate: fall back to the
                // ranked winner with its pre-validation confidence.
                let winner = &consensus.candidates[0];
                Some(ValidationOutcome {
                    oem: winner.oem.clone(),
                    site_hits: Default::default(),
                    hit_count: 0,
                    confidence: consensus.confidence,
                    validated: false,
                    reasoning: "validation timed out before first backsearch completed".into(),
                })
            }
        }
    }
}
