//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `commit_protocol_commits_total` - Transactions committed end to end
//! - `commit_protocol_conflicts_total` - Sequencer rejections
//! - `commit_protocol_counterparty_rejections_total` - Signature refusals

use prometheus::{IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Transactions committed end to end
    pub commits_total: IntCounter,

    /// Sequencer rejections (double-spend races lost)
    pub conflicts_total: IntCounter,

    /// Counter-party signature refusals
    pub counterparty_rejections_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let commits_total = IntCounter::with_opts(Opts::new(
            "commit_protocol_commits_total",
            "Transactions committed end to end",
        ))?;
        registry.register(Box::new(commits_total.clone()))?;

        let conflicts_total = IntCounter::with_opts(Opts::new(
            "commit_protocol_conflicts_total",
            "Sequencer rejections",
        ))?;
        registry.register(Box::new(conflicts_total.clone()))?;

        let counterparty_rejections_total = IntCounter::with_opts(Opts::new(
            "commit_protocol_counterparty_rejections_total",
            "Counter-party signature refusals",
        ))?;
        registry.register(Box::new(counterparty_rejections_total.clone()))?;

        Ok(Self {
            commits_total,
            conflicts_total,
            counterparty_rejections_total,
            registry,
        })
    }

    /// Record a completed commit
    pub fn record_commit(&self) {
        self.commits_total.inc();
    }

    /// Record a sequencer conflict
    pub fn record_conflict(&self) {
        self.conflicts_total.inc();
    }

    /// Record a counter-party rejection
    pub fn record_counterparty_rejection(&self) {
        self.counterparty_rejections_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.commits_total.get(), 0);
        assert_eq!(metrics.conflicts_total.get(), 0);
        assert_eq!(metrics.counterparty_rejections_total.get(), 0);
    }

    #[test]
    fn test_record_commit() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit();
        metrics.record_commit();
        assert_eq!(metrics.commits_total.get(), 2);
    }

    #[test]
    fn test_registry_gathers_all_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_conflict();
        assert_eq!(metrics.registry().gather().len(), 3);
    }
}
