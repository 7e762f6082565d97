//! Resolution orchestrator.
//!
//! One call drives the whole pipeline: enrichment, local-first lookup with
//! early exit, concurrent source fan-out under the health monitor,
//! aftermarket filtering with the reverse cascade, semantic part matching,
//! merging, consensus, the validation gate, variant detection, and finally
//! learning and metrics off the result path. No stage failure after input
//! validation ever surfaces as an error; it costs confidence instead.

use futures::future::join_all;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ResolverConfig;
use crate::consensus::{CandidateMerger, ConsensusEngine};
use crate::enrich::Enricher;
use crate::error::{AdapterError, ResolveError};
use crate::fetch::FetchClient;
use crate::filter::{AftermarketFilter, BrandSchemaFilter, PartMatchFilter, ReverseCascade};
use crate::health::HealthRegistry;
use crate::learning::Learner;
use crate::llm::LlmClient;
use crate::metrics::{LogSink, MetricsSink, ResolutionEvent};
use crate::sources::{
    CatalogScraperSource, CatalogSite, KnowledgeStoreSource, LlmGuessSource, MarketplaceSource,
    SourceAdapter, SourceKind, StaticTableSource, VisionLabelSource, WebSearchSource,
};
use crate::store::{JsonFileStore, KnowledgeStore};
use crate::types::{clamp_confidence, Candidate, ResolutionRequest, ResolutionResult};
use crate::validate::{BacksearchPanel, ValidationGate};
use crate::variants::VariantDetector;

pub struct PartResolver {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    adapter_kinds: Vec<(String, SourceKind)>,
    enricher: Enricher,
    aftermarket: AftermarketFilter,
    cascade: ReverseCascade,
    part_match: PartMatchFilter,
    merger: CandidateMerger,
    brand_schema: BrandSchemaFilter,
    consensus: ConsensusEngine,
    gate: ValidationGate,
    variants: VariantDetector,
    health: Arc<HealthRegistry>,
    learner: Learner,
    metrics: Arc<dyn MetricsSink>,
    config: ResolverConfig,
    cache: Mutex<LruCache<String, ResolutionResult>>,
}

pub struct PartResolverBuilder {
    config: ResolverConfig,
    fetch: Option<Arc<dyn FetchClient>>,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn KnowledgeStore>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl PartResolverBuilder {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            fetch: None,
            llm: None,
            store: None,
            metrics: None,
            adapters: Vec::new(),
        }
    }

    pub fn with_fetch(mut self, fetch: Arc<dyn FetchClient>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add an adapter. When any adapter is added explicitly, the default
    /// roster is not wired in.
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> anyhow::Result<PartResolver> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid resolver config: {e}"))?;
        let fetch = self
            .fetch
            .ok_or_else(|| anyhow::anyhow!("a fetch client is required"))?;
        let store: Arc<dyn KnowledgeStore> = self
            .store
            .unwrap_or_else(|| Arc::new(JsonFileStore::in_memory()));
        let metrics: Arc<dyn MetricsSink> = self.metrics.unwrap_or_else(|| Arc::new(LogSink));

        let mut adapters = self.adapters;
        if adapters.is_empty() {
            adapters = Self::default_adapters(&fetch, &store, self.llm.as_ref());
        }
        let adapter_kinds: Vec<(String, SourceKind)> = adapters
            .iter()
            .map(|a| (a.name().to_string(), a.kind()))
            .collect();
        let groups: HashMap<String, String> = adapters
            .iter()
            .map(|a| (a.name().to_string(), a.group().to_string()))
            .collect();

        let config = self.config;
        let cache_size = NonZeroUsize::new(config.fanout.result_cache_size)
            .ok_or_else(|| anyhow::anyhow!("result cache size must be non-zero"))?;

        Ok(PartResolver {
            cascade: ReverseCascade::new(
                Arc::new(MarketplaceSource::new(Arc::clone(&fetch))),
                Arc::new(WebSearchSource::new(Arc::clone(&fetch))),
            ),
            part_match: PartMatchFilter::new(self.llm.clone()),
            merger: CandidateMerger::new(config.thresholds.merge_cap_bonus),
            consensus: ConsensusEngine::new(
                groups,
                config.thresholds.consensus_cap,
                config.thresholds.single_group_ceiling,
            ),
            gate: ValidationGate::new(
                BacksearchPanel::default_panel(Arc::clone(&fetch)),
                self.llm.clone(),
                config.validation.clone(),
                config.thresholds.accept,
            ),
            variants: VariantDetector::new(self.llm, config.thresholds.variant_support),
            health: Arc::new(HealthRegistry::new(config.health.clone())),
            learner: Learner::new(
                store,
                config.learning.clone(),
                config.thresholds.accept,
            ),
            enricher: Enricher::new(),
            aftermarket: AftermarketFilter,
            brand_schema: BrandSchemaFilter,
            cache: Mutex::new(LruCache::new(cache_size)),
            adapters,
            adapter_kinds,
            metrics,
            config,
        })
    }

    fn default_adapters(
        fetch: &Arc<dyn FetchClient>,
        store: &Arc<dyn KnowledgeStore>,
        llm: Option<&Arc<dyn LlmClient>>,
    ) -> Vec<Arc<dyn SourceAdapter>> {
        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for site in CatalogSite::default_sites() {
            adapters.push(Arc::new(CatalogScraperSource::new(site, Arc::clone(fetch))));
        }
        adapters.push(Arc::new(MarketplaceSource::new(Arc::clone(fetch))));
        adapters.push(Arc::new(WebSearchSource::new(Arc::clone(fetch))));
        adapters.push(Arc::new(VisionLabelSource::new(Arc::clone(fetch))));
        if let Some(llm) = llm {
            adapters.push(Arc::new(LlmGuessSource::new(Arc::clone(llm))));
        }
        adapters.push(Arc::new(KnowledgeStoreSource::new(Arc::clone(store))));
        adapters.push(Arc::new(StaticTableSource));
        adapters
    }
}

impl PartResolver {
    pub fn builder(config: ResolverConfig) -> PartResolverBuilder {
        PartResolverBuilder::new(config)
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    fn cache_key(request: &ResolutionRequest) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            request.vehicle.brand_key(),
            request.vehicle.model.trim().to_lowercase(),
            request.vehicle.year.map(|y| y.to_string()).unwrap_or_default(),
            request.vehicle.vin.as_deref().unwrap_or(""),
            request.part.text.trim().to_lowercase(),
            request.part.suspected_number.as_deref().unwrap_or(""),
            request.part.label_url.as_deref().unwrap_or(""),
        )
    }

    /// Resolve one request end to end. The only error is an unusable input;
    /// every downstream failure degrades the result instead.
    pub async fn resolve(
        &self,
        request: ResolutionRequest,
    ) -> Result<ResolutionResult, ResolveError> {
        let started = Instant::now();
        if request.part.text.trim().is_empty() {
            return Err(ResolveError::InvalidRequest(
                "part description is empty".into(),
            ));
        }
        if request.vehicle.make.trim().is_empty() && request.vehicle.vin.is_none() {
            return Err(ResolveError::InvalidRequest(
                "vehicle needs at least a make or a VIN".into(),
            ));
        }

        let key = Self::cache_key(&request);
        let cached = self.cache.lock().get(&key).cloned();
        if let Some(hit) = cached {
            tracing::debug!(request_id = %request.id, "served from result cache");
            let result = ResolutionResult {
                request_id: request.id,
                ..hit
            };
            self.emit(&request, &result, false, true, started);
            return Ok(result);
        }

        let enrichment = self.enricher.enrich(&request);
        let enriched = enrichment.request;
        let mut raw = enrichment.candidates;

        // Local-first pass: stored knowledge and static tables are cheap and
        // can make the whole network fan-out unnecessary.
        raw.extend(
            self.run_adapters(&enriched, |k| matches!(k, SourceKind::Local | SourceKind::Static))
                .await,
        );

        let degraded = self.health.degraded(&self.adapter_kinds);
        let early_exit = raw
            .iter()
            .any(|c| c.confidence >= self.config.thresholds.early_exit);
        if early_exit {
            tracing::info!(request_id = %enriched.id, "local candidate above early-exit threshold, skipping fan-out");
        } else {
            if degraded {
                tracing::warn!(request_id = %enriched.id, "degraded mode, skipping network scraping sources");
            }
            let fanned = self
                .run_adapters(&enriched, |k| {
                    !matches!(k, SourceKind::Local | SourceKind::Static)
                        && !(degraded && k.is_network_scraping())
                })
                .await;
            raw.extend(fanned);
        }

        let split = self.aftermarket.split(raw);
        let mut survivors = split.kept;
        let strongest = survivors
            .iter()
            .map(|c| c.confidence)
            .fold(0.0_f32, f32::max);
        if !split.discarded.is_empty()
            && strongest < self.config.thresholds.reverse_cascade_trigger
        {
            tracing::info!(
                request_id = %enriched.id,
                discarded = split.discarded.len(),
                "weak evidence, running aftermarket reverse cascade"
            );
            survivors.extend(self.cascade.run(&enriched, &split.discarded).await);
        }

        let survivors = self.part_match.filter(&enriched, survivors).await;
        let raw_for_stats = survivors.clone();
        let merged = self.merger.merge(survivors);
        let merged = self.brand_schema.filter(&enriched.vehicle, merged);
        if merged.is_empty() {
            let result = ResolutionResult::empty(request.id, "no plausible candidates found");
            self.emit(&enriched, &result, degraded, false, started);
            return Ok(result);
        }

        let consensus = self
            .consensus
            .evaluate(&enriched.vehicle, &raw_for_stats, merged);

        let variant_result = self.variants.detect(&enriched, &consensus.candidates).await;
        if variant_result.has_variants {
            let notes = variant_result
                .question
                .clone()
                .unwrap_or_else(|| "multiple incompatible part variants found".into());
            let result = ResolutionResult {
                request_id: request.id,
                primary_oem: None,
                candidates: consensus.candidates,
                confidence: 0.0,
                notes,
                variants: Some(variant_result),
            };
            self.cache.lock().put(key, result.clone());
            self.emit(&enriched, &result, degraded, false, started);
            return Ok(result);
        }

        let outcome = self.gate.validate(&enriched, &consensus).await;
        let validated = outcome.as_ref().map(|o| o.validated).unwrap_or(false);
        let result = match outcome {
            Some(outcome) if outcome.confidence >= self.config.thresholds.accept => {
                ResolutionResult {
                    request_id: request.id,
                    primary_oem: Some(outcome.oem),
                    candidates: consensus.candidates,
                    confidence: outcome.confidence,
                    notes: outcome.reasoning,
                    variants: None,
                }
            }
            Some(outcome) => ResolutionResult {
                request_id: request.id,
                primary_oem: None,
                candidates: consensus.candidates,
                confidence: outcome.confidence,
                notes: format!(
                    "best candidate {} below acceptance threshold ({})",
                    outcome.oem, outcome.reasoning
                ),
                variants: None,
            },
            None => ResolutionResult::empty(request.id, "no candidates survived consensus"),
        };

        if result.primary_oem.is_some() {
            if validated {
                self.learner.learn(&enriched, &result, &self.adapter_kinds);
            }
            self.cache.lock().put(key, result.clone());
        }
        self.emit(&enriched, &result, degraded, false, started);
        Ok(result)
    }

    /// Run the enabled adapters matching the kind filter concurrently, each
    /// under its clamped timeout, and fold outcomes into the health registry.
    async fn run_adapters(
        &self,
        request: &ResolutionRequest,
        select: impl Fn(SourceKind) -> bool,
    ) -> Vec<Candidate> {
        let min = Duration::from_secs(self.config.fanout.min_adapter_timeout_secs);
        let max = Duration::from_secs(self.config.fanout.max_adapter_timeout_secs);
        let selected: Vec<&Arc<dyn SourceAdapter>> = self
            .adapters
            .iter()
            .filter(|a| select(a.kind()))
            .filter(|a| self.health.is_enabled(a.name()))
            .collect();

        let futures = selected.iter().map(|adapter| async move {
            let budget = adapter.timeout().clamp(min, max);
            let outcome = match tokio::time::timeout(budget, adapter.resolve_candidates(request))
                .await
            {
                Ok(Ok(candidates)) => Ok(candidates),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(AdapterError::Timeout(budget)),
            };
            (adapter.name().to_string(), outcome)
        });

        let mut out = Vec::new();
        for (name, outcome) in join_all(futures).await {
            match outcome {
                Ok(candidates) => {
                    self.health.record_success(&name);
                    let weight = self.health.weight(&name);
                    for mut candidate in candidates {
                        candidate.confidence = clamp_confidence(candidate.confidence * weight);
                        out.push(candidate);
                    }
                }
                Err(e) => {
                    tracing::warn!(adapter = %name, error = %e, "source adapter failed");
                    if self.health.record_failure(&name) {
                        let sink = Arc::clone(&self.metrics);
                        tokio::spawn(async move {
                            sink.source_disabled(&name).await;
                        });
                    }
                }
            }
        }
        out
    }

    fn emit(
        &self,
        request: &ResolutionRequest,
        result: &ResolutionResult,
        degraded: bool,
        cached: bool,
        started: Instant,
    ) {
        let event = ResolutionEvent {
            request_id: result.request_id,
            brand: {
                let brand = request.vehicle.brand_key();
                (!brand.is_empty()).then_some(brand)
            },
            resolved: result.primary_oem.is_some(),
            ambiguous: result
                .variants
                .as_ref()
                .map(|v| v.has_variants)
                .unwrap_or(false),
            confidence: result.confidence,
            latency_ms: started.elapsed().as_millis() as u64,
            degraded,
            cached,
        };
        let sink = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            sink.resolution_completed(event).await;
        });
    }
}
