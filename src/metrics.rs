//! Process-wide Prometheus metrics.
//!
//! A single registry owns the service counters plus (on Linux) the default
//! process collector. Counter state lives for the process lifetime only.

use prometheus::{Histogram, HistogramOpts, HistogramTimer, IntCounter, Registry};

/// Histogram buckets for remote storage operation latency, in seconds.
const STORAGE_DURATION_BUCKETS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 5.0];

/// Handle over the metrics registry and the individual collectors.
///
/// Cheap to clone: Prometheus collectors are internally shared, so clones
/// observe into the same series.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    uploads_total: IntCounter,
    storage_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uploads_total = IntCounter::new(
            "filevault_uploads_total",
            "Total number of files uploaded to FileVault",
        )?;
        registry.register(Box::new(uploads_total.clone()))?;

        let storage_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "filevault_storage_duration_seconds",
                "Duration of remote blob storage operations in seconds",
            )
            .buckets(STORAGE_DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(storage_duration_seconds.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            uploads_total,
            storage_duration_seconds,
        })
    }

    /// Count one successful upload.
    pub fn record_upload(&self) {
        self.uploads_total.inc();
    }

    /// Start timing a remote storage operation. The duration is observed when
    /// the returned timer is dropped, so every exit path is recorded.
    pub fn start_storage_timer(&self) -> HistogramTimer {
        self.storage_duration_seconds.start_timer()
    }

    /// Render all registered metrics in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::{Encoder, TextEncoder};

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}
