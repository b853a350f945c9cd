//! Call timing and per-service counters
//!
//! Every outbound call is wrapped in a [`Timer`]. Stopping the timer
//! records the duration and outcome into the [`Metrics`] table owned by
//! the caller's context. Counters are plain atomics so independent
//! fetches and summarizations can record concurrently.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Logical downstream services tracked by the counters table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Service {
    #[serde(rename = "messaging-api")]
    MessagingApi,
    #[serde(rename = "ai-service")]
    AiService,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::MessagingApi, Service::AiService];

    pub fn name(&self) -> &'static str {
        match self {
            Service::MessagingApi => "messaging-api",
            Service::AiService => "ai-service",
        }
    }

    fn index(&self) -> usize {
        match self {
            Service::MessagingApi => 0,
            Service::AiService => 1,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default)]
struct ServiceCounters {
    calls: AtomicU64,
    errors: AtomicU64,
    total_ms: AtomicU64,
}

/// Process-wide counters, shared by cloning the handle
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    counters: Arc<[ServiceCounters; 2]>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a call against `service`
    pub fn start(&self, service: Service, label: impl Into<String>) -> Timer {
        Timer {
            metrics: self.clone(),
            service,
            label: label.into(),
            started: Instant::now(),
        }
    }

    pub fn record(&self, service: Service, duration_ms: u64, success: bool) {
        let counters = &self.counters[service.index()];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        counters.total_ms.fetch_add(duration_ms, Ordering::Relaxed);
        if !success {
            counters.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn service(&self, service: Service) -> ServiceSnapshot {
        let counters = &self.counters[service.index()];
        let calls = counters.calls.load(Ordering::Relaxed);
        let total_ms = counters.total_ms.load(Ordering::Relaxed);

        ServiceSnapshot {
            calls,
            errors: counters.errors.load(Ordering::Relaxed),
            total_ms,
            avg_ms: if calls == 0 { 0.0 } else { total_ms as f64 / calls as f64 },
        }
    }

    /// Snapshot keyed by service name, for diagnostics
    pub fn snapshot(&self) -> BTreeMap<&'static str, ServiceSnapshot> {
        Service::ALL
            .iter()
            .map(|service| (service.name(), self.service(*service)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ServiceSnapshot {
    pub calls: u64,
    pub errors: u64,
    pub total_ms: u64,
    pub avg_ms: f64,
}

/// Result of stopping a [`Timer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timing {
    pub label: String,
    pub duration_ms: u64,
}

/// In-flight call measurement
#[must_use = "a timer records nothing until it is stopped"]
pub struct Timer {
    metrics: Metrics,
    service: Service,
    label: String,
    started: Instant,
}

impl Timer {
    /// Record a successful call
    pub fn stop(self) -> Timing {
        self.finish(true)
    }

    /// Record a failed call
    pub fn fail(self) -> Timing {
        self.finish(false)
    }

    pub fn finish(self, success: bool) -> Timing {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.metrics.record(self.service, duration_ms, success);

        debug!(
            service = %self.service,
            label = %self.label,
            duration_ms,
            success,
            "Call finished"
        );

        Timing {
            label: self.label,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate_per_service() {
        let metrics = Metrics::new();

        metrics.record(Service::MessagingApi, 10, true);
        metrics.record(Service::MessagingApi, 30, false);
        metrics.record(Service::AiService, 5, true);

        let messaging = metrics.service(Service::MessagingApi);
        assert_eq!(messaging.calls, 2);
        assert_eq!(messaging.errors, 1);
        assert_eq!(messaging.total_ms, 40);
        assert_eq!(messaging.avg_ms, 20.0);

        let ai = metrics.service(Service::AiService);
        assert_eq!(ai.calls, 1);
        assert_eq!(ai.errors, 0);
    }

    #[test]
    fn test_timer_returns_label_and_records_outcome() {
        let metrics = Metrics::new();

        let timing = metrics.start(Service::AiService, "generate").stop();
        assert_eq!(timing.label, "generate");

        let _ = metrics.start(Service::AiService, "generate").fail();

        let ai = metrics.service(Service::AiService);
        assert_eq!(ai.calls, 2);
        assert_eq!(ai.errors, 1);
    }

    #[test]
    fn test_snapshot_lists_every_service() {
        let snapshot = Metrics::new().snapshot();
        assert!(snapshot.contains_key("messaging-api"));
        assert!(snapshot.contains_key("ai-service"));
    }

    #[tokio::test]
    async fn test_concurrent_recording_keeps_counts() {
        let metrics = Metrics::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        metrics.record(Service::MessagingApi, 1, true);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let messaging = metrics.service(Service::MessagingApi);
        assert_eq!(messaging.calls, 800);
        assert_eq!(messaging.total_ms, 800);
    }
}
