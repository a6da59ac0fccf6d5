//! Request counters.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::state::AppState;

/// Process-lifetime request counters, mirrored into `/healthcheck` and the
/// stats endpoint.
pub struct Monitor {
    started: Instant,
    requests: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    pub fn count_request(&self, error: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> MonitorStats {
        let uptime_hours = self.started.elapsed().as_secs_f64() / 3600.0;
        let requests = self.requests.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        let timeouts = self.timeouts.load(Ordering::Relaxed);
        MonitorStats {
            uptime_hours: (uptime_hours * 100.0).round() / 100.0,
            total_requests: requests,
            total_errors: errors,
            total_timeouts: timeouts,
            error_rate: if requests > 0 {
                errors as f64 / requests as f64
            } else {
                0.0
            },
            timeout_rate: if requests > 0 {
                timeouts as f64 / requests as f64
            } else {
                0.0
            },
            requests_per_hour: if uptime_hours > 0.0 {
                requests as f64 / uptime_hours
            } else {
                0.0
            },
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MonitorStats {
    pub uptime_hours: f64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_timeouts: u64,
    pub error_rate: f64,
    pub timeout_rate: f64,
    pub requests_per_hour: f64,
}

/// Axum middleware counting every request and whether it errored.
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    state.monitor.count_request(response.status().as_u16() >= 400);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let monitor = Monitor::new();
        monitor.count_request(false);
        monitor.count_request(true);
        monitor.count_timeout();

        let stats = monitor.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.total_timeouts, 1);
        assert!((stats.error_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rates_zero_when_idle() {
        let stats = Monitor::new().stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.timeout_rate, 0.0);
    }
}
