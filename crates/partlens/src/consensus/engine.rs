//! Consensus scoring and election.
//!
//! Sources are first collapsed into source groups (adapters observing the
//! same underlying site count once), then each OEM is scored by a weighted
//! blend of source priority, independent-group coverage, and confidence.
//! Sheer adapter count must never manufacture certainty: a winner carried by
//! one group is hard-capped regardless of its raw confidence.

use std::collections::{HashMap, HashSet};

use crate::consensus::normalize_oem;
use crate::filter::schema_score;
use crate::types::{clamp_confidence, Candidate, ConsensusResult, Vehicle};

const PRIORITY_WEIGHT: f32 = 0.50;
const GROUP_WEIGHT: f32 = 0.30;
const CONFIDENCE_WEIGHT: f32 = 0.20;

pub struct ConsensusEngine {
    /// Source identifier → group identifier. Unmapped sources are their own
    /// group.
    groups: HashMap<String, String>,
    consensus_cap: f32,
    single_group_ceiling: f32,
}

struct OemStats {
    groups: HashSet<String>,
    avg_confidence: f32,
    avg_priority: f32,
    score: f32,
}

impl ConsensusEngine {
    pub fn new(
        groups: HashMap<String, String>,
        consensus_cap: f32,
        single_group_ceiling: f32,
    ) -> Self {
        Self {
            groups,
            consensus_cap,
            single_group_ceiling,
        }
    }

    fn group_of(&self, source_id: &str) -> String {
        self.groups
            .get(source_id)
            .cloned()
            .unwrap_or_else(|| source_id.to_string())
    }

    fn stats_for(&self, total_groups: usize, members: &[&Candidate]) -> OemStats {
        let mut groups = HashSet::new();
        let mut confidence_sum = 0.0_f32;
        let mut priority_sum = 0.0_f32;
        for member in members {
            for id in member.source_ids() {
                groups.insert(self.group_of(id));
            }
            confidence_sum += member.confidence;
            priority_sum += member.priority() as f32;
        }
        let n = members.len().max(1) as f32;
        let avg_confidence = confidence_sum / n;
        let avg_priority = priority_sum / n;
        let group_share = if total_groups > 0 {
            groups.len() as f32 / total_groups as f32
        } else {
            0.0
        };
        let score = PRIORITY_WEIGHT * (avg_priority / 10.0)
            + GROUP_WEIGHT * group_share
            + CONFIDENCE_WEIGHT * avg_confidence;
        OemStats {
            groups,
            avg_confidence,
            avg_priority,
            score,
        }
    }

    /// Elect the best OEM from the merged candidates, using the raw
    /// (pre-merge) candidates for per-source statistics. The merged list is
    /// returned ranked best-first; ties break on the OEM string so adapter
    /// completion order never changes the answer.
    pub fn evaluate(
        &self,
        vehicle: &Vehicle,
        raw: &[Candidate],
        merged: Vec<Candidate>,
    ) -> ConsensusResult {
        if merged.is_empty() {
            return ConsensusResult::empty();
        }

        let mut by_oem: HashMap<String, Vec<&Candidate>> = HashMap::new();
        let mut all_groups: HashSet<String> = HashSet::new();
        for candidate in raw {
            by_oem
                .entry(normalize_oem(&candidate.oem))
                .or_default()
                .push(candidate);
            for id in candidate.source_ids() {
                all_groups.insert(self.group_of(id));
            }
        }
        let total_groups = all_groups.len();

        let stats: HashMap<String, OemStats> = by_oem
            .iter()
            .map(|(key, members)| (key.clone(), self.stats_for(total_groups, members)))
            .collect();

        let mut ranked = merged;
        ranked.sort_by(|a, b| {
            let sa = stats.get(&normalize_oem(&a.oem)).map(|s| s.score).unwrap_or(0.0);
            let sb = stats.get(&normalize_oem(&b.oem)).map(|s| s.score).unwrap_or(0.0);
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| normalize_oem(&a.oem).cmp(&normalize_oem(&b.oem)))
        });

        let winner = ranked[0].clone();
        let winner_key = normalize_oem(&winner.oem);
        // A merged list built outside the normal pipeline may carry an OEM
        // absent from `raw`; score the winner from its own record then.
        let winner_only = self.stats_for(total_groups, &[&winner]);
        let winner_stats = stats.get(&winner_key).unwrap_or(&winner_only);
        let group_count = winner_stats.groups.len();
        let agreement_ratio = if total_groups > 0 {
            group_count as f32 / total_groups as f32
        } else {
            0.0
        };

        let mut confidence = winner.confidence;
        if group_count >= 3 {
            confidence += 0.08;
        } else if group_count >= 2 {
            confidence += 0.05;
        }
        if agreement_ratio >= 0.7 {
            confidence += 0.05;
        }
        confidence = confidence.min(self.consensus_cap);
        if group_count <= 1 {
            confidence = confidence.min(self.single_group_ceiling);
        }

        // Brand-pattern post-adjustment on the elected number.
        let brand = winner
            .brand
            .as_deref()
            .map(|b| b.to_lowercase())
            .unwrap_or_else(|| vehicle.brand_key());
        match schema_score(Some(brand.as_str()), &winner.oem) {
            2 => confidence = (confidence + 0.05).min(self.consensus_cap),
            0 => confidence -= 0.10,
            _ => {}
        }
        if group_count <= 1 {
            confidence = confidence.min(self.single_group_ceiling);
        }
        let confidence = clamp_confidence(confidence);

        tracing::debug!(
            oem = %winner.oem,
            confidence,
            group_count,
            agreement_ratio,
            avg_priority = winner_stats.avg_priority,
            avg_confidence = winner_stats.avg_confidence,
            "consensus elected"
        );

        ConsensusResult {
            primary: Some(winner.oem.clone()),
            confidence,
            agreement_ratio,
            group_count,
            sources: winner.source_ids().iter().map(|s| s.to_string()).collect(),
            candidates: ranked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::CandidateMerger;

    fn engine(groups: &[(&str, &str)]) -> ConsensusEngine {
        ConsensusEngine::new(
            groups
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            0.96,
            0.85,
        )
    }

    fn candidate(oem: &str, source: &str, confidence: f32, priority: u8) -> Candidate {
        Candidate::new(oem, source, confidence)
            .with_brand("Volkswagen")
            .with_priority(priority)
    }

    fn vehicle() -> Vehicle {
        Vehicle {
            make: "Volkswagen".into(),
            model: "Golf".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_three_independent_groups_full_agreement() {
        let raw = vec![
            candidate("5Q0615301F", "catalog-a", 0.80, 8),
            candidate("5Q0615301F", "catalog-b", 0.75, 8),
            candidate("5Q0615301F", "catalog-c", 0.78, 9),
        ];
        let merged = CandidateMerger::new(0.15).merge(raw.clone());
        let result = engine(&[]).evaluate(&vehicle(), &raw, merged);

        assert_eq!(result.primary.as_deref(), Some("5Q0615301F"));
        assert_eq!(result.group_count, 3);
        assert!((result.agreement_ratio - 1.0).abs() < 1e-6);
        // 0.95 merged + 0.08 + 0.05 capped at 0.96, +0.05 brand boost recapped.
        assert!(result.confidence >= 0.90);
        assert!(result.confidence <= 0.96);
    }

    #[test]
    fn test_same_site_adapters_collapse_to_one_group() {
        let raw = vec![
            candidate("5Q0615301F", "partscat-oe", 0.80, 8),
            candidate("5Q0615301F", "partscat-vin", 0.78, 8),
        ];
        let merged = CandidateMerger::new(0.15).merge(raw.clone());
        let result = engine(&[("partscat-oe", "partscat"), ("partscat-vin", "partscat")])
            .evaluate(&vehicle(), &raw, merged);

        assert_eq!(result.group_count, 1);
        assert!((result.agreement_ratio - 1.0).abs() < 1e-6);
        // Single-group ceiling applies even after boosts.
        assert!(result.confidence <= 0.85);
    }

    #[test]
    fn test_single_group_ceiling() {
        let raw = vec![candidate("5Q0615301F", "oemcatalog", 0.95, 9)];
        let merged = CandidateMerger::new(0.15).merge(raw.clone());
        let result = engine(&[]).evaluate(&vehicle(), &raw, merged);
        assert!(result.confidence <= 0.85);
    }

    #[test]
    fn test_brand_pattern_penalty_applied() {
        // Mercedes-shaped number on a VW request, single source: 0.70 plus
        // the full-agreement boost, minus the brand-pattern penalty.
        let raw = vec![candidate("A0004212512", "websearch", 0.70, 3)];
        let merged = CandidateMerger::new(0.15).merge(raw.clone());
        let result = engine(&[]).evaluate(&vehicle(), &raw, merged);
        assert!((result.confidence - 0.65).abs() < 1e-6);
    }

    #[test]
    fn test_agreement_boost_granted_to_single_group() {
        // One group, but everything that reported agrees: the agreement boost
        // applies without the multi-group bonus.
        let raw = vec![candidate("5Q0615301F", "oemcatalog", 0.70, 9)];
        let merged = CandidateMerger::new(0.15).merge(raw.clone());
        let result = engine(&[]).evaluate(&vehicle(), &raw, merged);
        // 0.70 + 0.05 agreement + 0.05 brand boost, under the 0.85 ceiling.
        assert!((result.confidence - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_merged_winner_missing_from_raw_does_not_panic() {
        let merged = vec![candidate("5Q0615301F", "oemcatalog", 0.80, 9)];
        let result = engine(&[]).evaluate(&vehicle(), &[], merged);
        assert_eq!(result.primary.as_deref(), Some("5Q0615301F"));
        assert_eq!(result.group_count, 1);
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn test_ranking_is_deterministic_under_reordering() {
        let mut raw = vec![
            candidate("5Q0615301F", "catalog-a", 0.80, 8),
            candidate("1K0615301AA", "catalog-b", 0.80, 8),
        ];
        let merger = CandidateMerger::new(0.15);
        let first = engine(&[]).evaluate(&vehicle(), &raw, merger.merge(raw.clone()));
        raw.reverse();
        let second = engine(&[]).evaluate(&vehicle(), &raw, merger.merge(raw.clone()));
        assert_eq!(first.primary, second.primary);
        // Equal scores tie-break on the OEM string.
        assert_eq!(first.primary.as_deref(), Some("1K0615301AA"));
    }

    #[test]
    fn test_higher_priority_outranks_more_confidence() {
        let raw = vec![
            candidate("5Q0615301F", "oemcatalog", 0.70, 9),
            candidate("1K0615301AA", "llm-guess", 0.85, 2),
        ];
        let merged = CandidateMerger::new(0.15).merge(raw.clone());
        let result = engine(&[]).evaluate(&vehicle(), &raw, merged);
        assert_eq!(result.primary.as_deref(), Some("5Q0615301F"));
    }

    #[test]
    fn test_empty_input_yields_empty_result() {
        let result = engine(&[]).evaluate(&vehicle(), &[], Vec::new());
        assert!(result.primary.is_none());
        assert_eq!(result.confidence, 0.0);
    }
}
