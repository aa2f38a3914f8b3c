//! Engine metrics: counters, latency histograms, Prometheus text output.
//!
//! All state is relaxed atomics. A snapshot is a set of independent reads —
//! values across counters are only eventually consistent with each other,
//! which is fine for monotonic counters scraped on an interval. Consumers
//! should assert monotonicity, not cross-counter equalities.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Histogram bucket upper bounds in milliseconds; the final bucket is +Inf.
pub(crate) const LATENCY_BUCKET_UPPER_BOUNDS_MS: [f64; 12] =
    [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0];

const HISTOGRAM_BUCKETS: usize = LATENCY_BUCKET_UPPER_BOUNDS_MS.len() + 1;

const STATUS_CODE_MIN: u16 = 100;
const STATUS_CODE_MAX: u16 = 599;
const STATUS_CODE_SLOTS: usize = (STATUS_CODE_MAX - STATUS_CODE_MIN + 1) as usize;

type Histogram = [AtomicU64; HISTOGRAM_BUCKETS];

fn new_histogram() -> Histogram {
    std::array::from_fn(|_| AtomicU64::new(0))
}

fn observe(histogram: &Histogram, value_ms: f64) {
    let mut bucket = 0;
    while bucket < LATENCY_BUCKET_UPPER_BOUNDS_MS.len()
        && value_ms > LATENCY_BUCKET_UPPER_BOUNDS_MS[bucket]
    {
        bucket += 1;
    }
    histogram[bucket].fetch_add(1, Ordering::Relaxed);
}

pub struct EngineMetrics {
    requests_ok: AtomicU64,
    requests_fail: AtomicU64,
    render_errors: AtomicU64,
    pool_timeouts: AtomicU64,
    render_timeouts: AtomicU64,
    runtime_recycles: AtomicU64,
    render_count: AtomicU64,

    total_acquire_wait_us: AtomicU64,
    total_render_us: AtomicU64,
    total_wrap_us: AtomicU64,
    total_request_us: AtomicU64,

    acquire_wait_histogram: Histogram,
    render_latency_histogram: Histogram,
    request_latency_histogram: Histogram,
    request_code_counts: Vec<AtomicU64>,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            requests_ok: AtomicU64::new(0),
            requests_fail: AtomicU64::new(0),
            render_errors: AtomicU64::new(0),
            pool_timeouts: AtomicU64::new(0),
            render_timeouts: AtomicU64::new(0),
            runtime_recycles: AtomicU64::new(0),
            render_count: AtomicU64::new(0),
            total_acquire_wait_us: AtomicU64::new(0),
            total_render_us: AtomicU64::new(0),
            total_wrap_us: AtomicU64::new(0),
            total_request_us: AtomicU64::new(0),
            acquire_wait_histogram: new_histogram(),
            render_latency_histogram: new_histogram(),
            request_latency_histogram: new_histogram(),
            request_code_counts: (0..STATUS_CODE_SLOTS).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl EngineMetrics {
    pub(crate) fn increment_requests_ok(&self) {
        self.requests_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_requests_fail(&self) {
        self.requests_fail.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_render_errors(&self) {
        self.render_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_pool_timeouts(&self) {
        self.pool_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_render_timeouts(&self) {
        self.render_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_runtime_recycles(&self) {
        self.runtime_recycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Running render index, used only for log lines.
    pub(crate) fn next_render_index(&self) -> u64 {
        self.render_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn observe_acquire_wait(&self, value_ms: f64) {
        observe(&self.acquire_wait_histogram, value_ms);
    }

    pub(crate) fn observe_render_latency(&self, value_ms: f64) {
        observe(&self.render_latency_histogram, value_ms);
    }

    pub(crate) fn observe_request_latency(&self, value_ms: f64) {
        observe(&self.request_latency_histogram, value_ms);
    }

    pub(crate) fn observe_request_code(&self, status: u16) {
        if (STATUS_CODE_MIN..=STATUS_CODE_MAX).contains(&status) {
            self.request_code_counts[(status - STATUS_CODE_MIN) as usize]
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn add_durations_us(&self, acquire: u64, render: u64, wrap: u64, request: u64) {
        self.total_acquire_wait_us.fetch_add(acquire, Ordering::Relaxed);
        self.total_render_us.fetch_add(render, Ordering::Relaxed);
        self.total_wrap_us.fetch_add(wrap, Ordering::Relaxed);
        self.total_request_us.fetch_add(request, Ordering::Relaxed);
    }

    pub(crate) fn request_code_count(&self, status: u16) -> u64 {
        if (STATUS_CODE_MIN..=STATUS_CODE_MAX).contains(&status) {
            self.request_code_counts[(status - STATUS_CODE_MIN) as usize].load(Ordering::Relaxed)
        } else {
            0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_acquire_wait_us = self.total_acquire_wait_us.load(Ordering::Relaxed);
        let total_render_us = self.total_render_us.load(Ordering::Relaxed);
        let total_wrap_us = self.total_wrap_us.load(Ordering::Relaxed);
        let total_request_us = self.total_request_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_ok: self.requests_ok.load(Ordering::Relaxed),
            requests_fail: self.requests_fail.load(Ordering::Relaxed),
            render_errors: self.render_errors.load(Ordering::Relaxed),
            pool_timeouts: self.pool_timeouts.load(Ordering::Relaxed),
            render_timeouts: self.render_timeouts.load(Ordering::Relaxed),
            runtime_recycles: self.runtime_recycles.load(Ordering::Relaxed),
            total_acquire_wait_us,
            total_render_us,
            total_wrap_us,
            total_request_us,
            total_acquire_wait_ms: total_acquire_wait_us / 1000,
            total_render_ms: total_render_us / 1000,
            total_wrap_ms: total_wrap_us / 1000,
            total_request_ms: total_request_us / 1000,
        }
    }

    /// Render the OpenMetrics text exposition.
    pub fn prometheus(&self, pool_in_use: usize, pool_size: usize) -> String {
        let snapshot = self.snapshot();
        let total_requests = snapshot.requests_ok + snapshot.requests_fail;
        let mut out = String::with_capacity(4096);

        let emit_histogram = |out: &mut String,
                              name: &str,
                              help: &str,
                              histogram: &Histogram,
                              sum_ms: f64,
                              count: u64| {
            out.push_str(&format!("# HELP {name} {help}\n"));
            out.push_str(&format!("# TYPE {name} histogram\n"));
            let mut cumulative = 0u64;
            for (bucket, bound) in LATENCY_BUCKET_UPPER_BOUNDS_MS.iter().enumerate() {
                cumulative += histogram[bucket].load(Ordering::Relaxed);
                out.push_str(&format!(
                    "{name}_bucket{{le=\"{}\"}} {cumulative}\n",
                    *bound as u64
                ));
            }
            cumulative += histogram[LATENCY_BUCKET_UPPER_BOUNDS_MS.len()].load(Ordering::Relaxed);
            out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {cumulative}\n"));
            out.push_str(&format!("{name}_sum {sum_ms:.3}\n"));
            out.push_str(&format!("{name}_count {count}\n"));
        };

        emit_histogram(
            &mut out,
            "hydra_acquire_wait_ms",
            "Hydra runtime acquire wait histogram in milliseconds.",
            &self.acquire_wait_histogram,
            snapshot.total_acquire_wait_us as f64 / 1000.0,
            total_requests,
        );
        emit_histogram(
            &mut out,
            "hydra_render_latency_ms",
            "Hydra engine-side SSR render latency histogram in milliseconds.",
            &self.render_latency_histogram,
            snapshot.total_render_us as f64 / 1000.0,
            snapshot.requests_ok,
        );
        emit_histogram(
            &mut out,
            "hydra_request_total_ms",
            "Hydra end-to-end request latency histogram in milliseconds.",
            &self.request_latency_histogram,
            snapshot.total_request_us as f64 / 1000.0,
            total_requests,
        );

        out.push_str("# HELP hydra_pool_in_use Number of SSR runtimes currently leased.\n");
        out.push_str("# TYPE hydra_pool_in_use gauge\n");
        out.push_str(&format!("hydra_pool_in_use {pool_in_use}\n"));

        out.push_str("# HELP hydra_pool_size Total SSR runtimes in the pool.\n");
        out.push_str("# TYPE hydra_pool_size gauge\n");
        out.push_str(&format!("hydra_pool_size {pool_size}\n"));

        out.push_str("# HELP hydra_render_timeouts_total Total SSR render timeout terminations.\n");
        out.push_str("# TYPE hydra_render_timeouts_total counter\n");
        out.push_str(&format!("hydra_render_timeouts_total {}\n", snapshot.render_timeouts));

        out.push_str("# HELP hydra_recycles_total Total runtime recycle events.\n");
        out.push_str("# TYPE hydra_recycles_total counter\n");
        out.push_str(&format!("hydra_recycles_total {}\n", snapshot.runtime_recycles));

        out.push_str("# HELP hydra_render_errors_total Total SSR render failures.\n");
        out.push_str("# TYPE hydra_render_errors_total counter\n");
        out.push_str(&format!("hydra_render_errors_total {}\n", snapshot.render_errors));

        out.push_str("# HELP hydra_requests_total Total SSR requests by status.\n");
        out.push_str("# TYPE hydra_requests_total counter\n");
        out.push_str(&format!("hydra_requests_total{{status=\"ok\"}} {}\n", snapshot.requests_ok));
        out.push_str(&format!("hydra_requests_total{{status=\"fail\"}} {}\n", snapshot.requests_fail));

        out.push_str("# HELP hydra_requests_by_code_total Total SSR requests by HTTP status code.\n");
        out.push_str("# TYPE hydra_requests_by_code_total counter\n");
        for status in STATUS_CODE_MIN..=STATUS_CODE_MAX {
            let count = self.request_code_counts[(status - STATUS_CODE_MIN) as usize]
                .load(Ordering::Relaxed);
            if count == 0 {
                continue;
            }
            out.push_str(&format!("hydra_requests_by_code_total{{code=\"{status}\"}} {count}\n"));
        }

        out
    }
}

/// Point-in-time view of the counters. Independent atomic reads; see the
/// module docs for the consistency caveat.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub requests_ok: u64,
    pub requests_fail: u64,
    pub render_errors: u64,
    pub pool_timeouts: u64,
    pub render_timeouts: u64,
    pub runtime_recycles: u64,
    pub total_acquire_wait_us: u64,
    pub total_render_us: u64,
    pub total_wrap_us: u64,
    pub total_request_us: u64,
    pub total_acquire_wait_ms: u64,
    pub total_render_ms: u64,
    pub total_wrap_ms: u64,
    pub total_request_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = EngineMetrics::default();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_ok, 0);
        assert_eq!(snapshot.requests_fail, 0);
        assert_eq!(snapshot.render_timeouts, 0);
    }

    #[test]
    fn counters_are_monotonic() {
        let metrics = EngineMetrics::default();
        metrics.increment_requests_ok();
        let first = metrics.snapshot();
        metrics.increment_requests_ok();
        metrics.increment_requests_fail();
        let second = metrics.snapshot();
        assert!(second.requests_ok >= first.requests_ok);
        assert_eq!(second.requests_ok, 2);
        assert_eq!(second.requests_fail, 1);
    }

    #[test]
    fn histogram_buckets_are_cumulative_in_output() {
        let metrics = EngineMetrics::default();
        metrics.observe_request_latency(0.5);
        metrics.observe_request_latency(30.0);
        metrics.observe_request_latency(99999.0);
        metrics.increment_requests_ok();
        metrics.increment_requests_ok();
        metrics.increment_requests_ok();

        let text = metrics.prometheus(0, 4);
        assert!(text.contains("hydra_request_total_ms_bucket{le=\"1\"} 1\n"));
        assert!(text.contains("hydra_request_total_ms_bucket{le=\"25\"} 1\n"));
        assert!(text.contains("hydra_request_total_ms_bucket{le=\"50\"} 2\n"));
        assert!(text.contains("hydra_request_total_ms_bucket{le=\"10000\"} 2\n"));
        assert!(text.contains("hydra_request_total_ms_bucket{le=\"+Inf\"} 3\n"));
        assert!(text.contains("hydra_request_total_ms_count 3\n"));
    }

    #[test]
    fn sum_has_microsecond_resolution() {
        let metrics = EngineMetrics::default();
        metrics.add_durations_us(1500, 0, 0, 2750);
        let text = metrics.prometheus(0, 1);
        assert!(text.contains("hydra_acquire_wait_ms_sum 1.500\n"));
        assert!(text.contains("hydra_request_total_ms_sum 2.750\n"));
    }

    #[test]
    fn by_code_counters_suppress_zero_entries() {
        let metrics = EngineMetrics::default();
        metrics.observe_request_code(200);
        metrics.observe_request_code(200);
        metrics.observe_request_code(302);

        let text = metrics.prometheus(0, 1);
        assert!(text.contains("hydra_requests_by_code_total{code=\"200\"} 2\n"));
        assert!(text.contains("hydra_requests_by_code_total{code=\"302\"} 1\n"));
        assert!(!text.contains("code=\"404\""));
    }

    #[test]
    fn out_of_range_status_codes_are_dropped() {
        let metrics = EngineMetrics::default();
        metrics.observe_request_code(99);
        metrics.observe_request_code(600);
        let text = metrics.prometheus(0, 1);
        assert!(!text.contains("code=\"99\""));
        assert!(!text.contains("code=\"600\""));
    }

    #[test]
    fn gauges_reflect_pool_state() {
        let metrics = EngineMetrics::default();
        let text = metrics.prometheus(2, 8);
        assert!(text.contains("hydra_pool_in_use 2\n"));
        assert!(text.contains("hydra_pool_size 8\n"));
    }

    #[test]
    fn render_histogram_counts_only_ok_requests() {
        let metrics = EngineMetrics::default();
        metrics.increment_requests_ok();
        metrics.increment_requests_fail();
        let text = metrics.prometheus(0, 1);
        assert!(text.contains("hydra_render_latency_ms_count 1\n"));
        assert!(text.contains("hydra_acquire_wait_ms_count 2\n"));
    }

    #[test]
    fn snapshot_derives_millisecond_totals() {
        let metrics = EngineMetrics::default();
        metrics.add_durations_us(2000, 3500, 500, 6000);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_acquire_wait_ms, 2);
        assert_eq!(snapshot.total_render_ms, 3);
        assert_eq!(snapshot.total_request_ms, 6);
    }
}
