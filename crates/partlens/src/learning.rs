//! Self-learning: validated resolutions written back to the knowledge store
//! so future identical requests resolve without network fan-out.
//!
//! Fire-and-forget: the upsert runs on a detached task and its failure can
//! never affect the already-computed result.

use chrono::Utc;
use std::sync::Arc;

use crate::config::LearningConfig;
use crate::filter::schema_score;
use crate::sources::SourceKind;
use crate::store::{KnowledgeStore, LearnedFact};
use crate::types::{ResolutionRequest, ResolutionResult};

pub struct Learner {
    store: Arc<dyn KnowledgeStore>,
    config: LearningConfig,
    accept: f32,
}

impl Learner {
    pub fn new(store: Arc<dyn KnowledgeStore>, config: LearningConfig, accept: f32) -> Self {
        Self {
            store,
            config,
            accept,
        }
    }

    /// Gate: a fact is only learned from a confident, brand-plausible answer
    /// with at least one non-inference source behind it.
    fn fact_from(
        &self,
        request: &ResolutionRequest,
        result: &ResolutionResult,
        source_kinds: &[(String, SourceKind)],
    ) -> Option<LearnedFact> {
        if !self.config.enabled {
            return None;
        }
        let oem = result.primary_oem.as_ref()?;
        if result.confidence < self.accept {
            return None;
        }
        let brand = request.vehicle.brand_key();
        if brand.is_empty() {
            return None;
        }
        if schema_score(Some(brand.as_str()), oem) == 0 {
            return None;
        }

        let winning_sources: Vec<&str> = result
            .candidates
            .iter()
            .find(|c| {
                crate::consensus::normalize_oem(&c.oem) == crate::consensus::normalize_oem(oem)
            })
            .map(|c| c.source_ids())
            .unwrap_or_default();
        if winning_sources.is_empty() {
            return None;
        }
        let has_verified_source = winning_sources.iter().any(|id| {
            source_kinds
                .iter()
                .find(|(name, _)| name == id)
                .map(|(_, kind)| !kind.is_unverified_inference())
                // Pipeline-internal sources (enricher, reverse lookup) are
                // not inference either.
                .unwrap_or(true)
        });
        if !has_verified_source {
            return None;
        }

        let year = request.vehicle.year.unwrap_or(0);
        let now = Utc::now();
        Some(LearnedFact {
            brand,
            model_or_code: request.vehicle.model.to_lowercase(),
            category: request.part.effective_category(),
            // Parts rarely change inside a two-year window around the build
            // date; wider ranges come from repeated agreeing resolutions.
            year_from: year.saturating_sub(1),
            year_to: year.saturating_add(1),
            oem: oem.clone(),
            sources: winning_sources.iter().map(|s| s.to_string()).collect(),
            confidence: result.confidence.min(self.config.first_write_cap),
            hits: 1,
            learned_at: now,
            updated_at: now,
        })
    }

    /// Spawn the learn write-back; returns whether the gate passed.
    pub fn learn(
        &self,
        request: &ResolutionRequest,
        result: &ResolutionResult,
        source_kinds: &[(String, SourceKind)],
    ) -> bool {
        let Some(fact) = self.fact_from(request, result, source_kinds) else {
            return false;
        };
        let store = Arc::clone(&self.store);
        let oem = fact.oem.clone();
        tokio::spawn(async move {
            if let Err(e) = store.upsert(fact).await {
                tracing::warn!(oem = %oem, error = %e, "learn write-back failed");
            }
        });
        true
    }
}
