//! Prometheus metrics

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Node metrics registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub stakes_total: IntCounter,
    pub module_completions_total: IntCounter,
    pub course_completions_total: IntCounter,
    /// Whole DATA minted through the API
    pub datacoins_minted_total: IntCounter,
    pub repositories_submitted_total: IntCounter,
    pub consumer_proofs_total: IntCounter,
    pub http_requests_total: IntCounterVec,
    pub http_errors_total: IntCounterVec,
    pub escrow_balance_gwei: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("poc".to_string()), None)?;

        let stakes_total = IntCounter::new("stakes_total", "Stakes accepted")?;
        let module_completions_total = IntCounter::new("module_completions_total", "Modules completed")?;
        let course_completions_total = IntCounter::new("course_completions_total", "Courses completed and refunded")?;
        let datacoins_minted_total = IntCounter::new("datacoins_minted_total", "Whole DATA minted as rewards")?;
        let repositories_submitted_total =
            IntCounter::new("repositories_submitted_total", "Repositories submitted for review")?;
        let consumer_proofs_total = IntCounter::new("consumer_proofs_total", "Consumer data proofs accepted")?;
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by method and status"),
            &["method", "status"],
        )?;
        let http_errors_total =
            IntCounterVec::new(Opts::new("http_errors_total", "HTTP error responses by status"), &["status"])?;
        let escrow_balance_gwei = IntGauge::new("escrow_balance_gwei", "Value held in escrow, in gwei")?;

        registry.register(Box::new(stakes_total.clone()))?;
        registry.register(Box::new(module_completions_total.clone()))?;
        registry.register(Box::new(course_completions_total.clone()))?;
        registry.register(Box::new(datacoins_minted_total.clone()))?;
        registry.register(Box::new(repositories_submitted_total.clone()))?;
        registry.register(Box::new(consumer_proofs_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(escrow_balance_gwei.clone()))?;

        Ok(Self {
            registry,
            stakes_total,
            module_completions_total,
            course_completions_total,
            datacoins_minted_total,
            repositories_submitted_total,
            consumer_proofs_total,
            http_requests_total,
            http_errors_total,
            escrow_balance_gwei,
        })
    }

    /// Count one HTTP response
    pub fn observe_response(&self, method: &str, status: u16) {
        let status = status.to_string();
        self.http_requests_total.with_label_values(&[method, &status]).inc();
        if status.starts_with('4') || status.starts_with('5') {
            self.http_errors_total.with_label_values(&[&status]).inc();
        }
    }

    /// Add a minted amount in the smallest unit
    pub fn add_minted(&self, amount: u128) {
        let whole = amount / poc_core::ONE_UNIT;
        self.datacoins_minted_total.inc_by(u64::try_from(whole).unwrap_or(u64::MAX));
    }

    pub fn set_escrow_balance(&self, wei: u128) {
        let gwei = wei / 1_000_000_000;
        self.escrow_balance_gwei.set(i64::try_from(gwei).unwrap_or(i64::MAX));
    }

    /// Text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_prefixed_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.stakes_total.inc();
        metrics.add_minted(3 * poc_core::ONE_UNIT);
        metrics.observe_response("POST", 201);
        metrics.observe_response("GET", 404);

        let text = metrics.render().unwrap();
        assert!(text.contains("poc_stakes_total 1"));
        assert!(text.contains("poc_datacoins_minted_total 3"));
        assert!(text.contains("poc_http_errors_total{status=\"404\"} 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.stakes_total.inc();
        assert_eq!(b.stakes_total.get(), 0);
    }
}
