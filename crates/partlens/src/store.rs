//! Local knowledge store for learned OEM facts.
//!
//! In-memory fact list with JSON file persistence. The store is deliberately
//! simple: a few thousand facts at most, scanned linearly; the upsert rule
//! (max-confidence, hit-count increment) is commutative and idempotent so
//! concurrent writers and retries are harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::AdapterError;
use crate::types::PartCategory;

/// One validated resolution, keyed by (brand, model-or-code, category,
/// year range). Never deleted by this core; retention is external.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedFact {
    pub brand: String,
    /// Model name or engine code, lowercased.
    pub model_or_code: String,
    pub category: PartCategory,
    pub year_from: u16,
    pub year_to: u16,
    pub oem: String,
    pub sources: Vec<String>,
    pub confidence: f32,
    pub hits: u32,
    pub learned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearnedFact {
    fn same_key(&self, other: &LearnedFact) -> bool {
        self.brand == other.brand
            && self.model_or_code == other.model_or_code
            && self.category == other.category
            && self.year_from == other.year_from
            && self.year_to == other.year_to
            && crate::consensus::normalize_oem(&self.oem)
                == crate::consensus::normalize_oem(&other.oem)
    }
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Exact-key lookup; `year` must fall inside the stored range.
    async fn lookup(
        &self,
        brand: &str,
        model_or_code: &str,
        category: PartCategory,
        year: Option<u16>,
    ) -> Result<Vec<LearnedFact>, AdapterError>;

    /// Token-overlap free-text search over brand, model and OEM fields.
    async fn search(&self, free_text: &str) -> Result<Vec<LearnedFact>, AdapterError>;

    /// Insert-or-merge: existing facts keep the max confidence and gain a hit.
    async fn upsert(&self, fact: LearnedFact) -> Result<(), AdapterError>;
}

/// File-backed store implementation.
pub struct JsonFileStore {
    facts: RwLock<Vec<LearnedFact>>,
    path: Option<PathBuf>,
}

impl JsonFileStore {
    /// Purely in-memory store, mostly for tests and degraded setups.
    pub fn in_memory() -> Self {
        Self {
            facts: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Load from `path` if it exists, otherwise start empty and create the
    /// parent directory.
    pub fn open(path: PathBuf) -> Result<Self, AdapterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AdapterError::Network(e.to_string()))?;
        }
        let facts = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| AdapterError::Parse(format!("corrupt store file: {}", e)))?,
            Err(_) => Vec::new(),
        };
        Ok(Self {
            facts: RwLock::new(facts),
            path: Some(path),
        })
    }

    fn persist(&self, facts: &[LearnedFact]) {
        let Some(path) = &self.path else { return };
        match serde_json::to_string_pretty(facts) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!(error = %e, path = %path.display(), "failed to persist knowledge store");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize knowledge store"),
        }
    }

    pub fn len(&self) -> usize {
        self.facts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeStore for JsonFileStore {
    async fn lookup(
        &self,
        brand: &str,
        model_or_code: &str,
        category: PartCategory,
        year: Option<u16>,
    ) -> Result<Vec<LearnedFact>, AdapterError> {
        let brand = brand.to_lowercase();
        let model_or_code = model_or_code.to_lowercase();
        let facts = self.facts.read();
        Ok(facts
            .iter()
            .filter(|f| {
                f.brand == brand
                    && f.model_or_code == model_or_code
                    && f.category == category
                    && year.map(|y| y >= f.year_from && y <= f.year_to).unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn search(&self, free_text: &str) -> Result<Vec<LearnedFact>, AdapterError> {
        let tokens: Vec<String> = free_text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() >= 3)
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let facts = self.facts.read();
        let mut scored: Vec<(usize, LearnedFact)> = facts
            .iter()
            .filter_map(|f| {
                let haystack = format!(
                    "{} {} {} {}",
                    f.brand,
                    f.model_or_code,
                    f.category.as_str(),
                    f.oem.to_lowercase()
                );
                let overlap = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
                // Require at least two overlapping tokens so a lone brand
                // mention does not match every fact for that make.
                if overlap >= 2 {
                    Some((overlap, f.clone()))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().map(|(_, f)| f).take(10).collect())
    }

    async fn upsert(&self, fact: LearnedFact) -> Result<(), AdapterError> {
        let mut fact = fact;
        fact.brand = fact.brand.to_lowercase();
        fact.model_or_code = fact.model_or_code.to_lowercase();
        fact.confidence = crate::types::clamp_confidence(fact.confidence);

        let snapshot;
        {
            let mut facts = self.facts.write();
            if let Some(existing) = facts.iter_mut().find(|f| f.same_key(&fact)) {
                existing.hits += 1;
                existing.confidence = existing.confidence.max(fact.confidence);
                for source in &fact.sources {
                    if !existing.sources.contains(source) {
                        existing.sources.push(source.clone());
                    }
                }
                existing.updated_at = Utc::now();
            } else {
                facts.push(fact);
            }
            snapshot = facts.clone();
        }
        self.persist(&snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(oem: &str, confidence: f32) -> LearnedFact {
        LearnedFact {
            brand: "volkswagen".into(),
            model_or_code: "golf".into(),
            category: PartCategory::BrakeDisc,
            year_from: 2013,
            year_to: 2019,
            oem: oem.into(),
            sources: vec!["catalog-a".into()],
            confidence,
            hits: 1,
            learned_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_confidence() {
        let store = JsonFileStore::in_memory();
        store.upsert(fact("5Q0615301F", 0.85)).await.unwrap();
        store.upsert(fact("5Q0615301F", 0.85)).await.unwrap();

        let facts = store
            .lookup("volkswagen", "golf", PartCategory::BrakeDisc, Some(2016))
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].hits, 2);
        assert!((facts[0].confidence - 0.85).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_upsert_never_decreases_confidence() {
        let store = JsonFileStore::in_memory();
        store.upsert(fact("5Q0615301F", 0.88)).await.unwrap();
        store.upsert(fact("5Q0615301F", 0.70)).await.unwrap();

        let facts = store
            .lookup("volkswagen", "golf", PartCategory::BrakeDisc, Some(2016))
            .await
            .unwrap();
        assert!((facts[0].confidence - 0.88).abs() < 1e-6);
        assert_eq!(facts[0].hits, 2);
    }

    #[tokio::test]
    async fn test_lookup_respects_year_range() {
        let store = JsonFileStore::in_memory();
        store.upsert(fact("5Q0615301F", 0.85)).await.unwrap();

        let hit = store
            .lookup("volkswagen", "golf", PartCategory::BrakeDisc, Some(2015))
            .await
            .unwrap();
        assert_eq!(hit.len(), 1);

        let miss = store
            .lookup("volkswagen", "golf", PartCategory::BrakeDisc, Some(2022))
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn test_search_requires_multiple_token_overlap() {
        let store = JsonFileStore::in_memory();
        store.upsert(fact("5Q0615301F", 0.85)).await.unwrap();

        let hits = store.search("volkswagen golf brake_disc").await.unwrap();
        assert_eq!(hits.len(), 1);

        let weak = store.search("volkswagen unrelated thing").await.unwrap();
        assert!(weak.is_empty());
    }

    #[tokio::test]
    async fn test_file_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.json");

        let store = JsonFileStore::open(path.clone()).unwrap();
        store.upsert(fact("5Q0615301F", 0.85)).await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(path).unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
