//! Candidate merging.
//!
//! Groups candidates by normalized OEM and combines their confidences as
//! independent positive signals, `1 − ∏(1 − cᵢ)`, capped at
//! `max(cᵢ) + bonus`. The cap is the anti-inflation invariant: correlated
//! weak scrapers must not be able to manufacture near-certainty.

use std::collections::HashMap;

use crate::types::{clamp_confidence, Candidate};

/// Case- and separator-insensitive OEM key: uppercase, alphanumerics only.
pub fn normalize_oem(oem: &str) -> String {
    oem.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub struct CandidateMerger {
    cap_bonus: f32,
}

impl CandidateMerger {
    pub fn new(cap_bonus: f32) -> Self {
        Self { cap_bonus }
    }

    /// Merge candidates sharing a normalized OEM into one candidate each,
    /// preserving input order of first appearance. Sources are joined with
    /// "+", metadata is unioned first-writer-wins, and the display OEM is
    /// taken from the most confident contributor.
    pub fn merge(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Candidate>> = HashMap::new();
        for candidate in candidates {
            let key = normalize_oem(&candidate.oem);
            if key.is_empty() {
                continue;
            }
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(candidate);
        }

        order
            .into_iter()
            .map(|key| {
                let members = groups.remove(&key).expect("group exists for ordered key");
                self.merge_group(members)
            })
            .collect()
    }

    fn merge_group(&self, members: Vec<Candidate>) -> Candidate {
        let best = members
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);

        let max_confidence = members[best].confidence;
        let combined = 1.0 - members.iter().fold(1.0_f32, |acc, c| acc * (1.0 - c.confidence));
        let capped = combined.min(max_confidence + self.cap_bonus);

        let mut sources: Vec<String> = Vec::new();
        for member in &members {
            for id in member.source_ids() {
                if !sources.iter().any(|s| s == id) {
                    sources.push(id.to_string());
                }
            }
        }

        let mut merged = Candidate::new(
            members[best].oem.clone(),
            sources.join("+"),
            clamp_confidence(capped),
        );
        merged.brand = members.iter().find_map(|m| m.brand.clone());
        for member in &members {
            for (k, v) in &member.metadata {
                merged.metadata.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        merged
    }
}
