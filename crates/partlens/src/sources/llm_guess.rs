//! Grounded language-model OEM guess.
//!
//! Lowest-priority source: fluent and sometimes wrong, so its confidence is
//! capped and the learning gate never accepts it as sole evidence.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdapterError;
use crate::llm::{extract_json_object, LlmClient};
use crate::sources::{SourceAdapter, SourceKind};
use crate::types::{clamp_confidence, meta, Candidate, ResolutionRequest};

const GUESS_PROMPT: &str = r#"You are an automotive parts specialist. Given a vehicle and a requested spare part, answer with the manufacturer's original (OEM) part number if you are reasonably sure one exists.

Output a single JSON object, nothing else:
{"oem":"<number or empty string>","brand":"<vehicle make>","confidence":<0.0-1.0>,"note":"<one sentence>"}

RULES:
- Only genuine OEM numbers. Never aftermarket catalog numbers (Bosch, TRW, ATE, Brembo, Febi).
- If several variants exist and you cannot tell which fits, pick the most common one and say so in the note.
- If you do not know, use an empty "oem" and confidence 0."#;

pub struct LlmGuessSource {
    llm: Arc<dyn LlmClient>,
}

impl LlmGuessSource {
    pub const NAME: &'static str = "llm-guess";

    /// LLM claims are never trusted above this before any corroboration.
    const CONFIDENCE_CAP: f32 = 0.60;

    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn prompt_for(request: &ResolutionRequest) -> String {
        let v = &request.vehicle;
        let mut vehicle = format!("{} {}", v.make, v.model);
        if let Some(year) = v.year {
            vehicle.push_str(&format!(" ({})", year));
        }
        if let Some(code) = &v.engine_code {
            vehicle.push_str(&format!(", engine {}", code));
        }
        if let Some(kw) = v.power_kw {
            vehicle.push_str(&format!(", {} kW", kw));
        }
        format!(
            "{}\n\nVehicle: {}\nRequested part: {}",
            GUESS_PROMPT, vehicle, request.part.text
        )
    }
}

#[async_trait]
impl SourceAdapter for LlmGuessSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Inference
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let response = self
            .llm
            .complete(&Self::prompt_for(request), true)
            .await
            .map_err(AdapterError::Inference)?;

        let Some(parsed) = extract_json_object(&response) else {
            return Err(AdapterError::Parse("model output had no JSON object".into()));
        };
        let oem = parsed["oem"].as_str().unwrap_or("").trim().to_string();
        if oem.is_empty() {
            return Ok(Vec::new());
        }
        let raw_confidence = parsed["confidence"].as_f64().unwrap_or(0.0) as f32;
        let confidence = clamp_confidence(raw_confidence).min(Self::CONFIDENCE_CAP);

        let mut candidate = Candidate::new(oem, Self::NAME, confidence).with_priority(2);
        if let Some(brand) = parsed["brand"].as_str().filter(|b| !b.is_empty()) {
            candidate = candidate.with_brand(brand);
        } else if !request.vehicle.make.is_empty() {
            candidate = candidate.with_brand(request.vehicle.make.clone());
        }
        if let Some(note) = parsed["note"].as_str().filter(|n| !n.is_empty()) {
            candidate = candidate.with_meta(meta::VARIANT_NOTE, note);
        }
        Ok(vec![candidate])
    }
}
