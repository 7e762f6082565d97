//! Semantic part-match filter.
//!
//! Candidates can match on vehicle terms while belonging to the wrong part
//! entirely (a Golf mirror glass scraped during a brake-disc search). A
//! single model call classifies which candidates plausibly belong to the
//! requested category. Conservative on failure: a filter must never empty a
//! non-empty set because of its own problems.

use std::sync::Arc;

use crate::llm::{extract_json_object, LlmClient};
use crate::types::{meta, Candidate, PartCategory, ResolutionRequest};

const MATCH_PROMPT: &str = r#"You are checking which candidate part numbers plausibly belong to a requested spare part. You get the request and a numbered candidate list with whatever description text was scraped alongside each number.

Output a single JSON object, nothing else:
{"keep":[<indices of candidates that plausibly match the requested part>]}

Keep a candidate unless its description clearly names a DIFFERENT part category. When a candidate has no description, keep it."#;

pub struct PartMatchFilter {
    llm: Option<Arc<dyn LlmClient>>,
}

impl PartMatchFilter {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    /// Rule-based pre-pass: a description whose keyword category contradicts
    /// the requested one gets flagged so the model looks twice.
    fn category_mismatch(request: &ResolutionRequest, candidate: &Candidate) -> bool {
        let requested = request.part.effective_category();
        candidate
            .metadata
            .get(meta::DESCRIPTION)
            .map(|d| PartCategory::from_text(d))
            .map(|c| c != PartCategory::Other && c != requested)
            .unwrap_or(false)
    }

    fn prompt_for(request: &ResolutionRequest, candidates: &[Candidate]) -> String {
        let mut lines = vec![
            MATCH_PROMPT.to_string(),
            format!(
                "\nRequested part: {} ({} {})",
                request.part.text, request.vehicle.make, request.vehicle.model
            ),
            "Candidates:".to_string(),
        ];
        for (i, c) in candidates.iter().enumerate() {
            let description = c
                .metadata
                .get(meta::DESCRIPTION)
                .map(|d| d.as_str())
                .unwrap_or("(no description)");
            let flag = if Self::category_mismatch(request, c) {
                " [description names a different part category, double-check]"
            } else {
                ""
            };
            lines.push(format!("{}. {} — {}{}", i, c.oem, description, flag));
        }
        lines.join("\n")
    }

    pub async fn filter(
        &self,
        request: &ResolutionRequest,
        candidates: Vec<Candidate>,
    ) -> Vec<Candidate> {
        if candidates.len() <= 1 {
            return candidates;
        }
        let Some(llm) = &self.llm else {
            return candidates;
        };

        let prompt = Self::prompt_for(request, &candidates);
        let response = match llm.complete(&prompt, true).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "part-match classification failed, keeping all candidates");
                return candidates;
            }
        };
        let Some(parsed) = extract_json_object(&response) else {
            tracing::warn!("part-match response had no JSON, keeping all candidates");
            return candidates;
        };
        let Some(keep) = parsed["keep"].as_array() else {
            return candidates;
        };
        let indices: Vec<usize> = keep
            .iter()
            .filter_map(|v| v.as_u64().map(|i| i as usize))
            .collect();
        if indices.is_empty() {
            // An empty verdict is indistinguishable from a misfire.
            tracing::warn!("part-match returned empty keep set, keeping all candidates");
            return candidates;
        }

        candidates
            .into_iter()
            .enumerate()
            .filter(|(i, _)| indices.contains(i))
            .map(|(_, mut c)| {
                c.metadata
                    .insert(meta::RELEVANCE.to_string(), "llm-confirmed".to_string());
                c
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::llm::testing::ScriptedLlm;
    use crate::types::{PartQuery, Vehicle};

    fn request() -> ResolutionRequest {
        ResolutionRequest::new(
            Vehicle {
                make: "Volkswagen".into(),
                model: "Golf".into(),
                ..Default::default()
            },
            PartQuery {
                text: "front brake disc".into(),
                ..Default::default()
            },
        )
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate::new("5Q0615301F", "oemcatalog", 0.8)
                .with_meta(meta::DESCRIPTION, "Bremsscheibe vorne 312mm"),
            Candidate::new("5G0857522", "websearch", 0.5)
                .with_meta(meta::DESCRIPTION, "mirror glass right"),
        ]
    }

    #[tokio::test]
    async fn test_wrong_category_candidate_removed() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(r#"{"keep":[0]}"#.to_string())]));
        let filter = PartMatchFilter::new(Some(llm));
        let kept = filter.filter(&request(), candidates()).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].oem, "5Q0615301F");
    }

    #[tokio::test]
    async fn test_inference_failure_keeps_all() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(InferenceError::Timeout)]));
        let filter = PartMatchFilter::new(Some(llm));
        assert_eq!(filter.filter(&request(), candidates()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_keep_set_keeps_all() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(r#"{"keep":[]}"#.to_string())]));
        let filter = PartMatchFilter::new(Some(llm));
        assert_eq!(filter.filter(&request(), candidates()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_no_llm_configured_keeps_all() {
        let filter = PartMatchFilter::new(None);
        assert_eq!(filter.filter(&request(), candidates()).await.len(), 2);
    }
}
