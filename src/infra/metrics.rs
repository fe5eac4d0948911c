//! Lock-free provider metrics
//!
//! Counters are updated with Relaxed atomics from the orchestrator's hot
//! path; they are statistics only and never drive fallback decisions.

use crate::domain::types::{Capability, ProviderKind};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

const NUM_PROVIDERS: usize = ProviderKind::ALL.len();
const NUM_CAPABILITIES: usize = Capability::ALL.len();

#[derive(Default)]
struct ProviderCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    skips: AtomicU64,
}

/// Per-provider attempt outcomes and per-capability mock fallbacks
#[derive(Default)]
pub struct ProviderMetrics {
    providers: [ProviderCounters; NUM_PROVIDERS],
    mock_fallbacks: [AtomicU64; NUM_CAPABILITIES],
}

impl ProviderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider was invoked
    #[inline]
    pub fn record_attempt(&self, provider: ProviderKind) {
        self.providers[provider.index()].attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// A provider returned a usable result
    #[inline]
    pub fn record_success(&self, provider: ProviderKind) {
        self.providers[provider.index()].successes.fetch_add(1, Ordering::Relaxed);
    }

    /// A provider errored or returned nothing usable
    #[inline]
    pub fn record_failure(&self, provider: ProviderKind) {
        self.providers[provider.index()].failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A provider was not invoked because its credentials are absent
    #[inline]
    pub fn record_skip(&self, provider: ProviderKind) {
        self.providers[provider.index()].skips.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_mock_fallback(&self, capability: Capability) {
        self.mock_fallbacks[capability.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSummary {
        let providers = ProviderKind::ALL.map(|p| {
            let c = &self.providers[p.index()];
            ProviderSummary {
                provider: p,
                attempts: c.attempts.load(Ordering::Relaxed),
                successes: c.successes.load(Ordering::Relaxed),
                failures: c.failures.load(Ordering::Relaxed),
                skips: c.skips.load(Ordering::Relaxed),
            }
        });
        let mock_fallbacks = Capability::ALL
            .map(|c| (c, self.mock_fallbacks[c.index()].load(Ordering::Relaxed)));
        MetricsSummary { providers, mock_fallbacks }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSummary {
    pub provider: ProviderKind,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub skips: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub providers: [ProviderSummary; NUM_PROVIDERS],
    pub mock_fallbacks: [(Capability, u64); NUM_CAPABILITIES],
}

impl MetricsSummary {
    pub fn provider(&self, provider: ProviderKind) -> ProviderSummary {
        self.providers[provider.index()]
    }

    pub fn mock_fallbacks(&self, capability: Capability) -> u64 {
        self.mock_fallbacks[capability.index()].1
    }

    pub fn log(&self) {
        for p in &self.providers {
            info!(
                provider = p.provider.as_str(),
                attempts = p.attempts,
                successes = p.successes,
                failures = p.failures,
                skips = p.skips,
                "provider_metrics"
            );
        }
        let total_mock: u64 = self.mock_fallbacks.iter().map(|(_, n)| n).sum();
        info!(mock_fallbacks = total_mock, "fallback_metrics");
    }
}
