use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, register_counter, register_gauge,
    register_histogram,
};

// metric names are static, registration only fails on a duplicate name
lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of proxied requests")
            .expect("register gateway_requests_total");
    pub static ref RATE_LIMITED: Counter =
        register_counter!("gateway_rate_limited_total", "Requests rejected by the rate limiter")
            .expect("register gateway_rate_limited_total");
    pub static ref BANNED: Counter =
        register_counter!("gateway_banned_total", "Requests rejected by an active ban")
            .expect("register gateway_banned_total");
    pub static ref AUDIT_BLOCKED: Counter =
        register_counter!("gateway_audit_blocked_total", "Requests blocked by a malicious verdict")
            .expect("register gateway_audit_blocked_total");
    pub static ref AUDIT_DEGRADED: Counter = register_counter!(
        "gateway_audit_degraded_total",
        "Audited requests allowed without a conclusive verdict"
    )
    .expect("register gateway_audit_degraded_total");
    pub static ref GREETING_TOTAL: Counter =
        register_counter!("gateway_greeting_total", "Greeting requests answered locally")
            .expect("register gateway_greeting_total");
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "gateway_upstream_latency_seconds",
        "Time to upstream response headers in seconds"
    )
    .expect("register gateway_upstream_latency_seconds");
    pub static ref ACTIVE_BANS: Gauge =
        register_gauge!("gateway_active_bans", "Credentials currently banned")
            .expect("register gateway_active_bans");
}

// Prometheus text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
