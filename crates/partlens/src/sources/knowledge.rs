//! The local knowledge store exposed as a source adapter.
//!
//! Highest-priority source: everything in the store already passed the
//! validation gate once. Keyed lookup first (brand + model/engine-code +
//! category + year), free-text search as the net underneath.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdapterError;
use crate::sources::{SourceAdapter, SourceKind};
use crate::store::{KnowledgeStore, LearnedFact};
use crate::types::{clamp_confidence, meta, Candidate, ResolutionRequest};

pub struct KnowledgeStoreSource {
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeStoreSource {
    pub const NAME: &'static str = "knowledge-store";

    /// Stored confidence translates to candidate confidence, lightly boosted
    /// by repeat hits but never past this ceiling.
    const CONFIDENCE_CEILING: f32 = 0.95;

    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self { store }
    }

    fn to_candidate(&self, fact: &LearnedFact) -> Candidate {
        let hit_bonus = 0.01 * (fact.hits.saturating_sub(1).min(5)) as f32;
        let confidence =
            clamp_confidence(fact.confidence + hit_bonus).min(Self::CONFIDENCE_CEILING);
        Candidate::new(fact.oem.clone(), Self::NAME, confidence)
            .with_brand(fact.brand.clone())
            .with_priority(9)
            .with_meta(meta::DERIVATION, "learned-fact")
            .with_meta(meta::DESCRIPTION, fact.category.as_str())
    }
}

#[async_trait]
impl SourceAdapter for KnowledgeStoreSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(8)
    }

    async fn resolve_candidates(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<Candidate>, AdapterError> {
        let v = &request.vehicle;
        let category = request.part.effective_category();

        let mut facts = self
            .store
            .lookup(&v.brand_key(), &v.model.to_lowercase(), category, v.year)
            .await?;

        // Engine code is an alternate key for engine-specific parts.
        if facts.is_empty() {
            if let Some(code) = &v.engine_code {
                facts = self
                    .store
                    .lookup(&v.brand_key(), &code.to_lowercase(), category, v.year)
                    .await?;
            }
        }
        if facts.is_empty() {
            let query = format!("{} {} {}", v.make, v.model, request.part.text);
            facts = self.store.search(&query).await?;
            facts.retain(|f| f.category == category);
        }

        Ok(facts.iter().map(|f| self.to_candidate(f)).collect())
    }
}
