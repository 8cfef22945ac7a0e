//! Prometheus-compatible metrics for the oracle
//!
//! Endpoint: GET /metrics (on the oracle port, default 5000)

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

use crate::scorer::Verdict;

/// Counters updated from request handling
pub struct MetricsCounters {
    /// Requests per route
    pub requests: DashMap<String, AtomicU64>,
    /// Responses with a 4xx status
    pub client_errors: AtomicU64,
    /// Responses with a 5xx status
    pub server_errors: AtomicU64,
    pub verdict_fresh: AtomicU64,
    pub verdict_rotten: AtomicU64,
    /// Server start time
    pub start_time: Instant,
}

impl Default for MetricsCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCounters {
    pub fn new() -> Self {
        Self {
            requests: DashMap::new(),
            client_errors: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            verdict_fresh: AtomicU64::new(0),
            verdict_rotten: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn inc_request(&self, route: &str) {
        if let Some(counter) = self.requests.get(route) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.requests
            .entry(route.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_verdict(&self, verdict: Verdict) {
        match verdict {
            Verdict::Fresh => self.verdict_fresh.fetch_add(1, Ordering::Relaxed),
            Verdict::Rotten => self.verdict_rotten.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_status(&self, status: u16) {
        match status {
            400..=499 => {
                self.client_errors.fetch_add(1, Ordering::Relaxed);
            }
            500..=599 => {
                self.server_errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Generate Prometheus-format metrics text
pub fn render_metrics(c: &MetricsCounters, predictions_total: u64) -> String {
    let mut out = String::with_capacity(2048);

    write_help_type(&mut out, "produce_oracle_up", "Whether the oracle is up.", "gauge");
    writeln!(out, "produce_oracle_up 1").ok();

    write_help_type(
        &mut out,
        "produce_oracle_uptime_seconds_total",
        "Uptime since server boot in seconds.",
        "counter",
    );
    writeln!(
        out,
        "produce_oracle_uptime_seconds_total {:.3}",
        c.start_time.elapsed().as_secs_f64()
    )
    .ok();

    write_help_type(
        &mut out,
        "produce_oracle_predictions_total",
        "Total damage scores produced.",
        "counter",
    );
    writeln!(out, "produce_oracle_predictions_total {}", predictions_total).ok();

    write_help_type(
        &mut out,
        "produce_oracle_verdicts_total",
        "Verdicts returned by classification.",
        "counter",
    );
    writeln!(
        out,
        "produce_oracle_verdicts_total{{verdict=\"fresh\"}} {}",
        c.verdict_fresh.load(Ordering::Relaxed)
    )
    .ok();
    writeln!(
        out,
        "produce_oracle_verdicts_total{{verdict=\"rotten\"}} {}",
        c.verdict_rotten.load(Ordering::Relaxed)
    )
    .ok();

    write_help_type(
        &mut out,
        "produce_oracle_http_requests_total",
        "HTTP requests by route.",
        "counter",
    );
    let mut routes: Vec<(String, u64)> = c
        .requests
        .iter()
        .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
        .collect();
    routes.sort_unstable();
    for (route, count) in routes {
        write_counter_if_nonzero(&mut out, "produce_oracle_http_requests_total", "route", &route, count);
    }

    write_help_type(
        &mut out,
        "produce_oracle_http_errors_total",
        "HTTP error responses by class.",
        "counter",
    );
    writeln!(
        out,
        "produce_oracle_http_errors_total{{class=\"4xx\"}} {}",
        c.client_errors.load(Ordering::Relaxed)
    )
    .ok();
    writeln!(
        out,
        "produce_oracle_http_errors_total{{class=\"5xx\"}} {}",
        c.server_errors.load(Ordering::Relaxed)
    )
    .ok();

    out
}

fn write_help_type(out: &mut String, name: &str, help: &str, metric_type: &str) {
    writeln!(out, "# HELP {} {}", name, help).ok();
    writeln!(out, "# TYPE {} {}", name, metric_type).ok();
}

fn write_counter_if_nonzero(out: &mut String, name: &str, label: &str, value: &str, count: u64) {
    if count > 0 {
        writeln!(out, "{}{{{}=\"{}\"}} {}", name, label, value, count).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_counters() {
        let c = MetricsCounters::new();
        c.inc_request("/predict_hash");
        c.inc_request("/predict_hash");
        c.inc_request("/health");
        c.inc_verdict(Verdict::Fresh);
        c.record_status(400);
        c.record_status(503);
        c.record_status(200);

        let text = render_metrics(&c, 7);
        assert!(text.contains("produce_oracle_up 1"));
        assert!(text.contains("produce_oracle_predictions_total 7"));
        assert!(text.contains("produce_oracle_http_requests_total{route=\"/predict_hash\"} 2"));
        assert!(text.contains("produce_oracle_http_requests_total{route=\"/health\"} 1"));
        assert!(text.contains("produce_oracle_verdicts_total{verdict=\"fresh\"} 1"));
        assert!(text.contains("produce_oracle_http_errors_total{class=\"4xx\"} 1"));
        assert!(text.contains("produce_oracle_http_errors_total{class=\"5xx\"} 1"));
    }

    #[test]
    fn test_unused_routes_omitted() {
        let c = MetricsCounters::new();
        let text = render_metrics(&c, 0);
        assert!(!text.contains("route=\""));
        assert!(text.contains("# TYPE produce_oracle_http_requests_total counter"));
    }
}
