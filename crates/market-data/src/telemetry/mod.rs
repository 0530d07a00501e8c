//! Error classification, structured logging, and rolling error statistics.
//!
//! Every externally-visible call in the provider, cache, and service
//! modules runs through [`ErrorMonitor::observe`], so timing and error
//! data are never recorded ad hoc. Failures are classified into a
//! [`Severity`] from their error code, logged at a level derived from it,
//! and counted per `(source, code)` pair. A pair that keeps recurring
//! within a rolling window produces a single "repeated error" warning;
//! critical failures additionally go to the pluggable [`AlertSink`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};

use crate::errors::FeedError;

/// Occurrences of one `(source, code)` pair within the rolling window
/// before the repeated-error warning fires.
const REPEAT_THRESHOLD: u64 = 10;

/// Length of the rolling window in seconds, measured from the first
/// occurrence in the current window.
const REPEAT_WINDOW_SECS: i64 = 3600;

/// Failure severity, derived from the error code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Classify an error code into a severity.
///
/// Fixed substring rules: rate-limit/quota problems are medium (the
/// failover path absorbs them), credential problems are high, a fetch
/// that exhausted every fallback is critical, everything else is low.
pub fn classify(code: &str) -> Severity {
    if code.contains("ALL_PROVIDERS") {
        Severity::Critical
    } else if code.contains("AUTH") || code.contains("KEY") {
        Severity::High
    } else if code.contains("RATE_LIMIT") || code.contains("QUOTA") {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Destination for critical-severity alerts.
///
/// Kept separate from classification so a real paging integration can be
/// swapped in without touching the monitor.
pub trait AlertSink: Send + Sync {
    fn alert(&self, source: &str, code: &str, message: &str);
}

/// Default sink: a structured error-level log emission.
pub struct ConsoleAlertSink;

impl AlertSink for ConsoleAlertSink {
    fn alert(&self, source: &str, code: &str, message: &str) {
        error!(
            "ALERT severity=critical source={} code={} message={}",
            source, code, message
        );
    }
}

/// Rolling statistics for one `(source, code)` pair.
#[derive(Clone, Debug)]
pub struct ErrorStats {
    /// Cumulative occurrences since start or last reset.
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    window_start: DateTime<Utc>,
    window_count: u64,
    warned: bool,
}

impl ErrorStats {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            first_seen: now,
            last_seen: now,
            window_start: now,
            window_count: 0,
            warned: false,
        }
    }
}

/// Error/telemetry sink.
///
/// Constructed once at service start and shared via `Arc`; tests build
/// isolated instances instead of going through global state.
pub struct ErrorMonitor {
    stats: Mutex<HashMap<(String, String), ErrorStats>>,
    alert_sink: Arc<dyn AlertSink>,
    repeated_warnings: AtomicU64,
}

impl ErrorMonitor {
    pub fn new() -> Self {
        Self::with_alert_sink(Arc::new(ConsoleAlertSink))
    }

    pub fn with_alert_sink(alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            stats: Mutex::new(HashMap::new()),
            alert_sink,
            repeated_warnings: AtomicU64::new(0),
        }
    }

    fn lock_stats(&self) -> MutexGuard<'_, HashMap<(String, String), ErrorStats>> {
        self.stats.lock().unwrap_or_else(|poisoned| {
            warn!("error monitor stats mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record a failure.
    ///
    /// Classifies severity, logs at the derived level, updates the
    /// per-(source, code) statistics, fires the repeated-error warning
    /// when the rolling threshold is crossed, and forwards critical
    /// failures to the alert sink.
    pub fn record(&self, source: &str, error: &FeedError, context: &str) {
        let code = error.code();
        let severity = classify(code);

        match severity {
            Severity::Critical | Severity::High => error!(
                "severity={} source={} code={} context={} error={}",
                severity, source, code, context, error
            ),
            Severity::Medium => warn!(
                "severity={} source={} code={} context={} error={}",
                severity, source, code, context, error
            ),
            Severity::Low => debug!(
                "severity={} source={} code={} context={} error={}",
                severity, source, code, context, error
            ),
        }

        let now = Utc::now();
        let mut stats = self.lock_stats();
        let entry = stats
            .entry((source.to_string(), code.to_string()))
            .or_insert_with(|| ErrorStats::new(now));

        entry.count += 1;
        entry.last_seen = now;

        if now - entry.window_start > chrono::Duration::seconds(REPEAT_WINDOW_SECS) {
            entry.window_start = now;
            entry.window_count = 1;
            entry.warned = false;
        } else {
            entry.window_count += 1;
        }

        if entry.window_count >= REPEAT_THRESHOLD && !entry.warned {
            entry.warned = true;
            self.repeated_warnings.fetch_add(1, Ordering::Relaxed);
            warn!(
                "repeated error: source={} code={} occurred {} times since {}",
                source, code, entry.window_count, entry.window_start
            );
        }
        drop(stats);

        if severity == Severity::Critical {
            self.alert_sink.alert(source, code, &error.to_string());
        }
    }

    /// Run an operation, logging its duration and recording any failure.
    pub async fn observe<T, F>(&self, source: &str, operation: &str, fut: F) -> Result<T, FeedError>
    where
        F: Future<Output = Result<T, FeedError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let elapsed_ms = start.elapsed().as_millis();

        match &result {
            Ok(_) => debug!(
                "operation={} source={} duration_ms={} status=ok",
                operation, source, elapsed_ms
            ),
            Err(e) => {
                self.record(source, e, &format!("{} ({}ms)", operation, elapsed_ms));
            }
        }

        result
    }

    /// Snapshot of the per-(source, code) statistics.
    pub fn stats(&self) -> HashMap<(String, String), ErrorStats> {
        self.lock_stats().clone()
    }

    /// Number of repeated-error warnings emitted so far.
    pub fn repeated_warning_count(&self) -> u64 {
        self.repeated_warnings.load(Ordering::Relaxed)
    }

    /// Clear all statistics. Operator action only.
    pub fn reset(&self) {
        self.lock_stats().clear();
        self.repeated_warnings.store(0, Ordering::Relaxed);
    }
}

impl Default for ErrorMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn timeout_error() -> FeedError {
        FeedError::Timeout {
            provider: "TWELVE_DATA".to_string(),
        }
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify("RATE_LIMITED"), Severity::Medium);
        assert_eq!(classify("QUOTA_EXHAUSTED"), Severity::Medium);
        assert_eq!(classify("AUTH_FAILED"), Severity::High);
        assert_eq!(classify("INVALID_API_KEY"), Severity::High);
        assert_eq!(classify("ALL_PROVIDERS_FAILED"), Severity::Critical);
        assert_eq!(classify("TIMEOUT"), Severity::Low);
        assert_eq!(classify("PROVIDER_ERROR"), Severity::Low);
    }

    #[test]
    fn test_stats_accumulate_monotonically() {
        let monitor = ErrorMonitor::new();

        for _ in 0..3 {
            monitor.record("primary", &timeout_error(), "stock:AAPL");
        }

        let stats = monitor.stats();
        let entry = &stats[&("primary".to_string(), "TIMEOUT".to_string())];
        assert_eq!(entry.count, 3);
        assert!(entry.last_seen >= entry.first_seen);
    }

    #[test]
    fn test_stats_keyed_per_source_and_code() {
        let monitor = ErrorMonitor::new();

        monitor.record("primary", &timeout_error(), "ctx");
        monitor.record("secondary", &timeout_error(), "ctx");

        let stats = monitor.stats();
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn test_repeated_warning_fires_exactly_once() {
        let monitor = ErrorMonitor::new();

        for _ in 0..9 {
            monitor.record("primary", &timeout_error(), "ctx");
        }
        assert_eq!(monitor.repeated_warning_count(), 0);

        // The tenth occurrence crosses the threshold.
        monitor.record("primary", &timeout_error(), "ctx");
        assert_eq!(monitor.repeated_warning_count(), 1);

        // Further occurrences in the same window stay quiet.
        for _ in 0..5 {
            monitor.record("primary", &timeout_error(), "ctx");
        }
        assert_eq!(monitor.repeated_warning_count(), 1);
    }

    #[test]
    fn test_reset_clears_stats() {
        let monitor = ErrorMonitor::new();
        monitor.record("primary", &timeout_error(), "ctx");

        monitor.reset();
        assert!(monitor.stats().is_empty());
    }

    /// Sink capturing alerts for assertions.
    struct CapturingSink {
        alerts: StdMutex<Vec<(String, String)>>,
    }

    impl AlertSink for CapturingSink {
        fn alert(&self, source: &str, code: &str, _message: &str) {
            self.alerts
                .lock()
                .unwrap()
                .push((source.to_string(), code.to_string()));
        }
    }

    #[test]
    fn test_critical_errors_reach_alert_sink() {
        let sink = Arc::new(CapturingSink {
            alerts: StdMutex::new(Vec::new()),
        });
        let monitor = ErrorMonitor::with_alert_sink(Arc::clone(&sink) as Arc<dyn AlertSink>);

        monitor.record(
            "aggregator",
            &FeedError::AllProvidersFailed {
                symbol: "AAPL".to_string(),
            },
            "stock:AAPL",
        );
        monitor.record("primary", &timeout_error(), "stock:AAPL");

        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].1, "ALL_PROVIDERS_FAILED");
    }

    #[tokio::test]
    async fn test_observe_records_failures() {
        let monitor = ErrorMonitor::new();

        let result: Result<(), FeedError> = monitor
            .observe("primary", "stock:AAPL", async { Err(timeout_error()) })
            .await;
        assert!(result.is_err());

        let stats = monitor.stats();
        assert_eq!(
            stats[&("primary".to_string(), "TIMEOUT".to_string())].count,
            1
        );
    }

    #[tokio::test]
    async fn test_observe_passes_success_through() {
        let monitor = ErrorMonitor::new();

        let result = monitor
            .observe("primary", "stock:AAPL", async { Ok(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert!(monitor.stats().is_empty());
    }
}
