use prometheus::{Encoder, Histogram, IntCounterVec, Registry, TextEncoder};

/// Prometheus collectors for bearer token authorization.
#[derive(Clone)]
pub struct AuthMetrics {
    pub registry: Registry,
    pub authorizations_total: IntCounterVec,
    pub authorization_duration_seconds: Histogram,
    pub health_checks_total: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let authorizations_total = IntCounterVec::new(
            prometheus::Opts::new(
                "oidc_authorizations_total",
                "Bearer token authorizations by outcome"
            ),
            &["outcome"]
        )?;
        let authorization_duration_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "oidc_authorization_duration_seconds",
                "Time spent authorizing a request, including key fetches"
            ).buckets(vec![0.0005,0.001,0.005,0.01,0.05,0.1,0.5,1.0,5.0])
        )?;
        let health_checks_total = IntCounterVec::new(
            prometheus::Opts::new(
                "oidc_health_checks_total",
                "Authorization health checks by status"
            ),
            &["status"]
        )?;
        registry.register(Box::new(authorizations_total.clone()))?;
        registry.register(Box::new(authorization_duration_seconds.clone()))?;
        registry.register(Box::new(health_checks_total.clone()))?;
        Ok(AuthMetrics {
            registry,
            authorizations_total,
            authorization_duration_seconds,
            health_checks_total,
        })
    }

    /// `outcome` is `"success"` or a failure code; keep it to a fixed set.
    pub fn record_authorization(&self, outcome: &str, seconds: f64) {
        self.authorizations_total.with_label_values(&[outcome]).inc();
        self.authorization_duration_seconds.observe(seconds);
    }

    pub fn record_health_check(&self, healthy: bool) {
        let status = if healthy { "healthy" } else { "unhealthy" };
        self.health_checks_total.with_label_values(&[status]).inc();
    }

    /// Text exposition format of everything in the registry.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
