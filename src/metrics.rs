//! Ambient metrics, covering only the surface this crate actually needs:
//! no HTTP/DB/job-queue metrics, since this crate has no such surface.
//! Counters feed directly into the per-run summary line; `sysinfo` backs a
//! single process-memory gauge sampled once per scan.

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry};
use sysinfo::{Pid, System};

/// Prometheus-backed counters, histograms, and gauges for one reconciler
/// process. Cheap to clone: every field is an `Arc`-backed prometheus
/// handle, so cloning a collector shares the same underlying counters.
#[derive(Clone)]
pub struct ReconcilerMetrics {
    registry: Registry,

    albums_processed_total: Counter,
    albums_by_skip_reason: CounterVec,
    albums_updated_total: Counter,
    albums_pending_verification_total: Counter,
    albums_error_total: Counter,

    album_pipeline_duration_seconds: Histogram,
    retry_delay_seconds: Histogram,

    cache_entries: GaugeVec,
    process_memory_bytes: Gauge,
}

impl ReconcilerMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let albums_processed_total =
            Counter::with_opts(Opts::new("albums_processed_total", "Albums that entered the determination pipeline")).unwrap();
        let albums_by_skip_reason = CounterVec::new(
            Opts::new("albums_skipped_total", "Albums skipped by pre-check reason"),
            &["reason"],
        )
        .unwrap();
        let albums_updated_total =
            Counter::with_opts(Opts::new("albums_updated_total", "Albums written with a determined year")).unwrap();
        let albums_pending_verification_total = Counter::with_opts(Opts::new(
            "albums_pending_verification_total",
            "Albums deferred to pending verification",
        ))
        .unwrap();
        let albums_error_total =
            Counter::with_opts(Opts::new("albums_error_total", "Albums that failed this run")).unwrap();

        let album_pipeline_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "album_pipeline_duration_seconds",
            "Per-album pipeline latency: pre-checks through cache notify",
        ))
        .unwrap();
        let retry_delay_seconds = Histogram::with_opts(HistogramOpts::new(
            "retry_delay_seconds",
            "Computed backoff delay per retry attempt",
        ))
        .unwrap();

        let cache_entries = GaugeVec::new(Opts::new("cache_entries", "Entries currently held per cache layer"), &["layer"]).unwrap();
        let process_memory_bytes = Gauge::with_opts(Opts::new("process_memory_bytes", "Resident memory of this process")).unwrap();

        registry.register(Box::new(albums_processed_total.clone())).unwrap();
        registry.register(Box::new(albums_by_skip_reason.clone())).unwrap();
        registry.register(Box::new(albums_updated_total.clone())).unwrap();
        registry.register(Box::new(albums_pending_verification_total.clone())).unwrap();
        registry.register(Box::new(albums_error_total.clone())).unwrap();
        registry.register(Box::new(album_pipeline_duration_seconds.clone())).unwrap();
        registry.register(Box::new(retry_delay_seconds.clone())).unwrap();
        registry.register(Box::new(cache_entries.clone())).unwrap();
        registry.register(Box::new(process_memory_bytes.clone())).unwrap();

        Self {
            registry,
            albums_processed_total,
            albums_by_skip_reason,
            albums_updated_total,
            albums_pending_verification_total,
            albums_error_total,
            album_pipeline_duration_seconds,
            retry_delay_seconds,
            cache_entries,
            process_memory_bytes,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_skip(&self, reason: &str) {
        self.albums_processed_total.inc();
        self.albums_by_skip_reason.with_label_values(&[reason]).inc();
    }

    pub fn record_updated(&self) {
        self.albums_processed_total.inc();
        self.albums_updated_total.inc();
    }

    pub fn record_pending(&self) {
        self.albums_processed_total.inc();
        self.albums_pending_verification_total.inc();
    }

    pub fn record_error(&self) {
        self.albums_processed_total.inc();
        self.albums_error_total.inc();
    }

    pub fn observe_pipeline_duration(&self, seconds: f64) {
        self.album_pipeline_duration_seconds.observe(seconds);
    }

    pub fn observe_retry_delay(&self, seconds: f64) {
        self.retry_delay_seconds.observe(seconds);
    }

    pub fn set_cache_size(&self, layer: &str, size: usize) {
        self.cache_entries.with_label_values(&[layer]).set(size as f64);
    }

    /// Samples this process's resident memory via `sysinfo`, mirroring the
    /// teacher's system-resource gauges. Called once per scan rather than
    /// on a polling loop, since there is no long-lived server process here.
    pub fn sample_process_memory(&self) {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());
        system.refresh_process(pid);
        if let Some(process) = system.process(pid) {
            self.process_memory_bytes.set(process.memory() as f64);
        }
    }
}

impl Default for ReconcilerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_skip_increments_processed_and_the_labeled_reason() {
        let metrics = ReconcilerMetrics::new();
        metrics.record_skip("year_consistent");
        metrics.record_skip("year_consistent");
        metrics.record_skip("already_processed");

        assert_eq!(metrics.albums_processed_total.get(), 3.0);
        assert_eq!(metrics.albums_by_skip_reason.with_label_values(&["year_consistent"]).get(), 2.0);
        assert_eq!(metrics.albums_by_skip_reason.with_label_values(&["already_processed"]).get(), 1.0);
    }

    #[test]
    fn record_updated_and_pending_and_error_each_count_toward_processed() {
        let metrics = ReconcilerMetrics::new();
        metrics.record_updated();
        metrics.record_pending();
        metrics.record_error();

        assert_eq!(metrics.albums_processed_total.get(), 3.0);
        assert_eq!(metrics.albums_updated_total.get(), 1.0);
        assert_eq!(metrics.albums_pending_verification_total.get(), 1.0);
        assert_eq!(metrics.albums_error_total.get(), 1.0);
    }

    #[test]
    fn set_cache_size_is_readable_back_per_layer() {
        let metrics = ReconcilerMetrics::new();
        metrics.set_cache_size("album_year", 42);
        metrics.set_cache_size("api_response", 7);

        assert_eq!(metrics.cache_entries.with_label_values(&["album_year"]).get(), 42.0);
        assert_eq!(metrics.cache_entries.with_label_values(&["api_response"]).get(), 7.0);
    }

    #[test]
    fn registry_gathers_every_registered_metric_family() {
        let metrics = ReconcilerMetrics::new();
        metrics.record_updated();
        let families = metrics.registry().gather();
        assert!(families.iter().any(|f| f.get_name() == "albums_updated_total"));
    }

    #[test]
    fn sample_process_memory_does_not_panic() {
        let metrics = ReconcilerMetrics::new();
        metrics.sample_process_memory();
        assert!(metrics.process_memory_bytes.get() >= 0.0);
    }
}
