use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Application metrics registry
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    // HTTP metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub http_requests_in_flight: IntCounterVec,

    // Database connection pool metrics
    pub db_pool_connections_active: IntGauge,
    pub db_pool_connections_idle: IntGauge,
    pub db_pool_connections_max: IntGauge,

    // Authentication metrics
    pub logins_total: IntCounterVec,
    pub lockouts_triggered_total: IntCounterVec,
    pub sessions_issued_total: IntCounter,
    pub sessions_revoked_total: IntCounter,
}

use prometheus::IntCounter;

impl Metrics {
    /// Create a new metrics registry with default metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests")
                .namespace("ward")
                .subsystem("api"),
            &["method", "endpoint", "status"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .namespace("ward")
            .subsystem("api")
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "endpoint"],
        )?;

        let http_requests_in_flight = IntCounterVec::new(
            Opts::new(
                "http_requests_in_flight",
                "Number of HTTP requests currently being processed",
            )
            .namespace("ward")
            .subsystem("api"),
            &["method", "endpoint"],
        )?;

        let db_pool_connections_active = IntGauge::new(
            "ward_db_pool_connections_active",
            "Number of active database connections currently in use",
        )?;

        let db_pool_connections_idle = IntGauge::new(
            "ward_db_pool_connections_idle",
            "Number of idle database connections in the pool",
        )?;

        let db_pool_connections_max = IntGauge::new(
            "ward_db_pool_connections_max",
            "Maximum number of database connections allowed",
        )?;

        let logins_total = IntCounterVec::new(
            Opts::new("logins_total", "Total number of login attempts")
                .namespace("ward")
                .subsystem("auth"),
            &["result"], // "success" or "failure"
        )?;

        let lockouts_triggered_total = IntCounterVec::new(
            Opts::new(
                "lockouts_triggered_total",
                "Total number of account/IP lockouts triggered",
            )
            .namespace("ward")
            .subsystem("auth"),
            &["scope"], // "account" or "ip"
        )?;

        let sessions_issued_total = IntCounter::with_opts(
            Opts::new("sessions_issued_total", "Total number of sessions issued")
                .namespace("ward")
                .subsystem("auth"),
        )?;

        let sessions_revoked_total = IntCounter::with_opts(
            Opts::new("sessions_revoked_total", "Total number of sessions revoked")
                .namespace("ward")
                .subsystem("auth"),
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(db_pool_connections_active.clone()))?;
        registry.register(Box::new(db_pool_connections_idle.clone()))?;
        registry.register(Box::new(db_pool_connections_max.clone()))?;
        registry.register(Box::new(logins_total.clone()))?;
        registry.register(Box::new(lockouts_triggered_total.clone()))?;
        registry.register(Box::new(sessions_issued_total.clone()))?;
        registry.register(Box::new(sessions_revoked_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            db_pool_connections_active,
            db_pool_connections_idle,
            db_pool_connections_max,
            logins_total,
            lockouts_triggered_total,
            sessions_issued_total,
            sessions_revoked_total,
        })
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }

    /// Update database connection pool metrics
    pub fn update_pool_metrics(&self, stats: &crate::db::PoolStats) {
        self.db_pool_connections_active
            .set(stats.connections_active as i64);
        self.db_pool_connections_idle
            .set(stats.connections_idle as i64);
        self.db_pool_connections_max
            .set(stats.connections_max as i64);
    }

    /// Normalize endpoint path for metrics (remove IDs and params)
    pub fn normalize_path(path: &str) -> String {
        let path = path.split('?').next().unwrap_or(path);

        let segments: Vec<&str> = path.split('/').collect();

        let normalized: Vec<String> = segments
            .iter()
            .map(|segment| {
                if segment.is_empty() {
                    return segment.to_string();
                }

                if (segment.len() == 36 && segment.contains('-'))
                    || segment.chars().all(|c| c.is_ascii_digit())
                {
                    ":id".to_string()
                } else {
                    segment.to_string()
                }
            })
            .collect();

        normalized.join("/")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics registry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics
            .http_requests_total
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(
            Metrics::normalize_path("/api/v1/sessions/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/sessions/:id"
        );

        assert_eq!(
            Metrics::normalize_path("/api/v1/auth/me?verbose=1"),
            "/api/v1/auth/me"
        );

        assert_eq!(Metrics::normalize_path("/health"), "/health");
    }

    #[test]
    fn test_metrics_render() {
        let metrics = Metrics::new().unwrap();

        metrics
            .http_requests_total
            .with_label_values(&["GET", "/health", "200"])
            .inc();

        let output = metrics.render().unwrap();
        assert!(output.contains("ward_api_http_requests_total"));
        assert!(output.contains("method=\"GET\""));
    }

    #[test]
    fn test_login_and_lockout_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.logins_total.with_label_values(&["failure"]).inc();
        metrics
            .lockouts_triggered_total
            .with_label_values(&["account"])
            .inc();
        metrics.sessions_issued_total.inc();

        let output = metrics.render().unwrap();
        assert!(output.contains("ward_auth_logins_total"));
        assert!(output.contains("ward_auth_lockouts_triggered_total"));
        assert!(output.contains("ward_auth_sessions_issued_total"));
    }
}
