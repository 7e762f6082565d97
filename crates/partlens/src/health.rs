//! Per-adapter health registry.
//!
//! Rolling success/failure counters per source adapter, a derived
//! confidence-weight multiplier, and a disable/recover state machine:
//!
//! ```text
//!   Enabled ──(failure rate >= disable_threshold)──> Disabled
//!   Disabled ──(cooldown elapsed)──> Probing
//!   Probing ──(success)──> Enabled      Probing ──(failure)──> Disabled
//! ```
//!
//! Counters reset when the rolling window fills; this is the decay policy
//! (see DESIGN.md). The registry is the only cross-request shared mutable
//! state in the core, so everything here is atomic.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use crate::config::HealthConfig;
use crate::sources::SourceKind;

const STATE_ENABLED: u8 = 0;
const STATE_DISABLED: u8 = 1;
const STATE_PROBING: u8 = 2;

#[derive(Debug, Default)]
struct AdapterHealth {
    successes: AtomicU32,
    failures: AtomicU32,
    state: AtomicU8,
    /// Milliseconds since registry start at which the adapter was disabled.
    disabled_at_ms: AtomicU64,
}

pub struct HealthRegistry {
    entries: DashMap<String, AdapterHealth>,
    config: HealthConfig,
    started: Instant,
}

impl HealthRegistry {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            started: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn with_entry<R>(&self, adapter: &str, f: impl FnOnce(&AdapterHealth) -> R) -> R {
        let entry = self
            .entries
            .entry(adapter.to_string())
            .or_insert_with(AdapterHealth::default);
        f(entry.value())
    }

    pub fn record_success(&self, adapter: &str) {
        self.with_entry(adapter, |h| {
            h.successes.fetch_add(1, Ordering::Relaxed);
            if h.state.load(Ordering::Acquire) == STATE_PROBING {
                // Recovery probe succeeded: re-enable with a clean slate.
                h.successes.store(1, Ordering::Relaxed);
                h.failures.store(0, Ordering::Relaxed);
                h.state.store(STATE_ENABLED, Ordering::Release);
                tracing::info!(adapter, "adapter recovered, re-enabled");
            }
            self.maybe_reset_window(h);
        });
    }

    /// Record a failure. Returns true when this failure newly disabled the
    /// adapter, so the caller can emit a source-disablement event.
    pub fn record_failure(&self, adapter: &str) -> bool {
        let now = self.now_ms();
        self.with_entry(adapter, |h| {
            let failures = h.failures.fetch_add(1, Ordering::Relaxed) + 1;
            let successes = h.successes.load(Ordering::Relaxed);
            let total = failures + successes;

            let state = h.state.load(Ordering::Acquire);
            if state == STATE_PROBING {
                // Probe failed, back to disabled for another cooldown.
                h.disabled_at_ms.store(now, Ordering::Relaxed);
                h.state.store(STATE_DISABLED, Ordering::Release);
                return false;
            }
            if state == STATE_DISABLED {
                return false;
            }

            let rate = failures as f32 / total as f32;
            if total >= self.config.min_samples && rate >= self.config.disable_threshold {
                h.disabled_at_ms.store(now, Ordering::Relaxed);
                h.state.store(STATE_DISABLED, Ordering::Release);
                tracing::warn!(
                    adapter,
                    failure_rate = rate,
                    samples = total,
                    "adapter disabled"
                );
                return true;
            }
            self.maybe_reset_window(h);
            false
        })
    }

    fn maybe_reset_window(&self, h: &AdapterHealth) {
        let total = h.successes.load(Ordering::Relaxed) + h.failures.load(Ordering::Relaxed);
        if total >= self.config.window {
            h.successes.store(0, Ordering::Relaxed);
            h.failures.store(0, Ordering::Relaxed);
        }
    }

    /// Whether the adapter should be called. A disabled adapter whose
    /// cooldown elapsed transitions to probing and is allowed through once.
    pub fn is_enabled(&self, adapter: &str) -> bool {
        let now = self.now_ms();
        self.with_entry(adapter, |h| {
            match h.state.load(Ordering::Acquire) {
                STATE_ENABLED | STATE_PROBING => true,
                _ => {
                    let disabled_at = h.disabled_at_ms.load(Ordering::Relaxed);
                    if now.saturating_sub(disabled_at) >= self.config.cooldown_ms {
                        h.state.store(STATE_PROBING, Ordering::Release);
                        true
                    } else {
                        false
                    }
                }
            }
        })
    }

    /// Confidence-weight multiplier in (0, 1] applied to the adapter's raw
    /// candidate confidences. Fresh adapters get full weight.
    pub fn weight(&self, adapter: &str) -> f32 {
        self.with_entry(adapter, |h| {
            let failures = h.failures.load(Ordering::Relaxed);
            let successes = h.successes.load(Ordering::Relaxed);
            let total = failures + successes;
            if total < self.config.min_samples {
                return 1.0;
            }
            let rate = failures as f32 / total as f32;
            (1.0 - rate).max(0.2)
        })
    }

    /// Degraded mode: a majority of the network-scraping adapters are
    /// currently disabled. Local, static, and inference sources keep running.
    pub fn degraded(&self, adapters: &[(String, SourceKind)]) -> bool {
        let network: Vec<&String> = adapters
            .iter()
            .filter(|(_, kind)| kind.is_network_scraping())
            .map(|(name, _)| name)
            .collect();
        if network.is_empty() {
            return false;
        }
        let down = network
            .iter()
            .filter(|name| {
                self.with_entry(name.as_str(), |h| {
                    h.state.load(Ordering::Acquire) == STATE_DISABLED
                })
            })
            .count();
        down as f32 / network.len() as f32 >= self.config.degraded_majority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HealthRegistry {
        HealthRegistry::new(HealthConfig {
            window: 20,
            min_samples: 4,
            disable_threshold: 0.60,
            cooldown_ms: 50,
            degraded_majority: 0.50,
        })
    }

    #[test]
    fn test_adapter_disabled_after_failure_streak() {
        let reg = registry();
        assert!(reg.is_enabled("flaky"));
        let mut disabled_event = false;
        for _ in 0..4 {
            disabled_event |= reg.record_failure("flaky");
        }
        assert!(disabled_event);
        assert!(!reg.is_enabled("flaky"));
    }

    #[test]
    fn test_cooldown_allows_probe_and_success_recovers() {
        let reg = registry();
        for _ in 0..4 {
            reg.record_failure("flaky");
        }
        assert!(!reg.is_enabled("flaky"));

        std::thread::sleep(std::time::Duration::from_millis(60));
        // Cooldown elapsed: one probe allowed.
        assert!(reg.is_enabled("flaky"));
        reg.record_success("flaky");
        assert!(reg.is_enabled("flaky"));
        assert!((reg.weight("flaky") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_probe_failure_disables_again() {
        let reg = registry();
        for _ in 0..4 {
            reg.record_failure("flaky");
        }
        std::thread::sleep(std::time::Duration::from_millis(60));
        assert!(reg.is_enabled("flaky"));
        reg.record_failure("flaky");
        assert!(!reg.is_enabled("flaky"));
    }

    #[test]
    fn test_weight_shrinks_with_failure_rate() {
        let reg = registry();
        reg.record_success("meh");
        reg.record_success("meh");
        reg.record_failure("meh");
        reg.record_failure("meh");
        let w = reg.weight("meh");
        assert!((w - 0.5).abs() < 1e-6);
        assert!(reg.weight("fresh") == 1.0);
    }

    #[test]
    fn test_degraded_when_majority_of_scrapers_down() {
        let reg = registry();
        let adapters = vec![
            ("catalog-a".to_string(), SourceKind::Scraper),
            ("catalog-b".to_string(), SourceKind::Scraper),
            ("llm-guess".to_string(), SourceKind::Inference),
            ("knowledge-store".to_string(), SourceKind::Local),
        ];
        assert!(!reg.degraded(&adapters));
        for _ in 0..4 {
            reg.record_failure("catalog-a");
            reg.record_failure("catalog-b");
        }
        assert!(reg.degraded(&adapters));
    }
}
