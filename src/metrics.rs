//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Transactions
    pub transactions_sent: IntCounter,
    pub transactions_failed: IntCounter,
    pub transactions_confirmed: IntCounter,
    pub transactions_reverted: IntCounter,
    pub transactions_unconfirmed: IntCounter,

    // Nonce leases
    pub nonce_leases_released: IntCounter,
    pub nonce_invalidations: IntCounter,
    pub nonce_active_leases: IntGauge,

    // RPC and HTTP
    pub rpc_errors: IntCounterVec,
    pub retries_total: IntCounterVec,
    pub http_requests: IntCounter,

    // Quest pipeline
    pub tasks_total: IntCounterVec,
    pub claims_total: IntCounter,
    pub accounts_total: IntCounterVec,
    pub active_accounts: IntGauge,

    // Histograms
    pub rpc_latency: Histogram,
    pub build_latency: Histogram,
    pub confirmation_latency: Histogram,
    pub nonce_lease_lifetime: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("questbot".to_string()), None)?;

        let transactions_sent = IntCounter::with_opts(Opts::new(
            "transactions_sent_total",
            "Transactions accepted by the node",
        ))?;

        let transactions_failed = IntCounter::with_opts(Opts::new(
            "transactions_failed_total",
            "Signed transactions the node refused",
        ))?;

        let transactions_confirmed = IntCounter::with_opts(Opts::new(
            "transactions_confirmed_total",
            "Transactions with a successful receipt",
        ))?;

        let transactions_reverted = IntCounter::with_opts(Opts::new(
            "transactions_reverted_total",
            "Transactions with a failed receipt",
        ))?;

        let transactions_unconfirmed = IntCounter::with_opts(Opts::new(
            "transactions_unconfirmed_total",
            "Transactions without a receipt before the deadline",
        ))?;

        let nonce_leases_released = IntCounter::with_opts(Opts::new(
            "nonce_leases_released_total",
            "Nonce leases dropped without a broadcast",
        ))?;

        let nonce_invalidations = IntCounter::with_opts(Opts::new(
            "nonce_invalidations_total",
            "Nonce cursors reset after a node rejection",
        ))?;

        let nonce_active_leases = IntGauge::with_opts(Opts::new(
            "nonce_active_leases",
            "Number of currently held nonce leases",
        ))?;

        let rpc_errors = IntCounterVec::new(
            Opts::new("rpc_errors_total", "Failed RPC calls after retries"),
            &["category"],
        )?;

        let retries_total = IntCounterVec::new(
            Opts::new("retries_total", "Retried attempts per operation"),
            &["operation"],
        )?;

        let http_requests = IntCounter::with_opts(Opts::new(
            "http_requests_total",
            "Campaign API requests sent",
        ))?;

        let tasks_total = IntCounterVec::new(
            Opts::new("tasks_total", "Dispatched tasks by outcome"),
            &["outcome"],
        )?;

        let claims_total = IntCounter::with_opts(Opts::new("claims_total", "Rewards claimed"))?;

        let accounts_total = IntCounterVec::new(
            Opts::new("accounts_total", "Finished accounts by status"),
            &["status"],
        )?;

        let active_accounts = IntGauge::with_opts(Opts::new(
            "active_accounts",
            "Accounts currently running",
        ))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency including retries")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new("build_latency_seconds", "Transaction build latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new("confirmation_latency_seconds", "Time from broadcast to receipt")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
        )?;

        let nonce_lease_lifetime = Histogram::with_opts(
            HistogramOpts::new(
                "nonce_lease_lifetime_seconds",
                "Duration nonce leases are held",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(transactions_sent.clone()))?;
        registry.register(Box::new(transactions_failed.clone()))?;
        registry.register(Box::new(transactions_confirmed.clone()))?;
        registry.register(Box::new(transactions_reverted.clone()))?;
        registry.register(Box::new(transactions_unconfirmed.clone()))?;
        registry.register(Box::new(nonce_leases_released.clone()))?;
        registry.register(Box::new(nonce_invalidations.clone()))?;
        registry.register(Box::new(nonce_active_leases.clone()))?;
        registry.register(Box::new(rpc_errors.clone()))?;
        registry.register(Box::new(retries_total.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(tasks_total.clone()))?;
        registry.register(Box::new(claims_total.clone()))?;
        registry.register(Box::new(accounts_total.clone()))?;
        registry.register(Box::new(active_accounts.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;
        registry.register(Box::new(nonce_lease_lifetime.clone()))?;

        Ok(Self {
            registry,
            transactions_sent,
            transactions_failed,
            transactions_confirmed,
            transactions_reverted,
            transactions_unconfirmed,
            nonce_leases_released,
            nonce_invalidations,
            nonce_active_leases,
            rpc_errors,
            retries_total,
            http_requests,
            tasks_total,
            claims_total,
            accounts_total,
            active_accounts,
            rpc_latency,
            build_latency,
            confirmation_latency,
            nonce_lease_lifetime,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Holds a gauge incremented for as long as the guard lives. The matching
/// decrement runs on drop, so a panicking or aborted task still releases it.
#[derive(Debug)]
pub struct GaugeGuard {
    gauge: IntGauge,
}

impl GaugeGuard {
    pub fn new(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self { gauge: gauge.clone() }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
