use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub thresholds: ThresholdConfig,
    pub validation: ValidationConfig,
    pub health: HealthConfig,
    pub learning: LearningConfig,
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Enrichment/local candidates at or above this skip the network fan-out.
    pub early_exit: f32,
    /// Reverse cascade fires only when no survivor reaches this.
    pub reverse_cascade_trigger: f32,
    /// Minimum final confidence for returning a non-null primary OEM.
    pub accept: f32,
    /// Merged confidence may exceed the best input by at most this much.
    pub merge_cap_bonus: f32,
    /// Hard ceiling when a single source group carries the winner.
    pub single_group_ceiling: f32,
    /// Consensus confidence never exceeds this after boosts.
    pub consensus_cap: f32,
    /// Minimum per-signature support for the variant detector.
    pub variant_support: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// At most this many ranked candidates enter the gate.
    pub top_n: usize,
    /// Global timeout around the whole multi-candidate loop.
    pub global_timeout_ms: u64,
    /// Group count at which a high-confidence consensus skips to one candidate.
    pub vetted_group_count: usize,
    /// Consensus confidence for the vetted early-exit.
    pub vetted_confidence: f32,
    pub enable_llm_verification: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Rolling window size; counters reset once the window fills.
    pub window: u32,
    /// Minimum samples before the failure rate is trusted at all.
    pub min_samples: u32,
    /// Failure rate at which an adapter is disabled.
    pub disable_threshold: f32,
    /// Cooldown before a disabled adapter gets a recovery probe.
    pub cooldown_ms: u64,
    /// Fraction of network adapters that must be unhealthy to enter
    /// degraded mode.
    pub degraded_majority: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    pub enabled: bool,
    /// First write of a fact is capped at this confidence.
    pub first_write_cap: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Per-adapter timeouts are clamped into this range (seconds).
    pub min_adapter_timeout_secs: u64,
    pub max_adapter_timeout_secs: u64,
    /// Finished resolutions cached per process.
    pub result_cache_size: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig {
                early_exit: 0.90,
                reverse_cascade_trigger: 0.75,
                accept: 0.70,
                merge_cap_bonus: 0.15,
                single_group_ceiling: 0.85,
                consensus_cap: 0.96,
                variant_support: 0.60,
            },
            validation: ValidationConfig {
                top_n: 3,
                global_timeout_ms: 15_000,
                vetted_group_count: 3,
                vetted_confidence: 0.90,
                enable_llm_verification: true,
            },
            health: HealthConfig {
                window: 20,
                min_samples: 4,
                disable_threshold: 0.60,
                cooldown_ms: 60_000,
                degraded_majority: 0.50,
            },
            learning: LearningConfig {
                enabled: true,
                first_write_cap: 0.90,
            },
            fanout: FanoutConfig {
                min_adapter_timeout_secs: 8,
                max_adapter_timeout_secs: 60,
                result_cache_size: 256,
            },
        }
    }
}

impl ResolverConfig {
    /// Validate config values, returning errors for clearly broken setups.
    pub fn validate(&self) -> Result<(), String> {
        let unit = |name: &str, v: f32| -> Result<(), String> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(format!("{} must be in [0.0, 1.0], got {}", name, v))
            }
        };
        unit("thresholds.early_exit", self.thresholds.early_exit)?;
        unit(
            "thresholds.reverse_cascade_trigger",
            self.thresholds.reverse_cascade_trigger,
        )?;
        unit("thresholds.accept", self.thresholds.accept)?;
        unit("thresholds.single_group_ceiling", self.thresholds.single_group_ceiling)?;
        unit("thresholds.consensus_cap", self.thresholds.consensus_cap)?;
        unit("thresholds.variant_support", self.thresholds.variant_support)?;
        unit("health.disable_threshold", self.health.disable_threshold)?;
        unit("health.degraded_majority", self.health.degraded_majority)?;
        unit("learning.first_write_cap", self.learning.first_write_cap)?;
        if !(0.0..=0.5).contains(&self.thresholds.merge_cap_bonus) {
            return Err("thresholds.merge_cap_bonus must be in [0.0, 0.5]".into());
        }
        if self.validation.top_n == 0 {
            return Err("validation.top_n must be > 0".into());
        }
        if self.health.window == 0 {
            return Err("health.window must be > 0".into());
        }
        if self.fanout.min_adapter_timeout_secs > self.fanout.max_adapter_timeout_secs {
            return Err("fanout.min_adapter_timeout_secs must be <= max".into());
        }
        if self.fanout.result_cache_size == 0 {
            return Err("fanout.result_cache_size must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ResolverConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = ResolverConfig::default();
        config.thresholds.accept = 1.4;
        assert!(config.validate().is_err());

        let mut config = ResolverConfig::default();
        config.validation.top_n = 0;
        assert!(config.validate().is_err());
    }
}
