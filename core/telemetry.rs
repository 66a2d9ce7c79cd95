use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Telemetry {
    conversions: AtomicU64,
    empty_results: AtomicU64,
    entries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    build_errors: AtomicU64,
    fetch_failures: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_conversion(&self, entries: usize) {
        self.conversions.fetch_add(1, Ordering::Relaxed);
        if entries == 0 {
            self.empty_results.fetch_add(1, Ordering::Relaxed);
        }
        self.entries.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_build_error(&self) {
        self.build_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, message: String) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = Some(message);
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let last_error = self
            .last_error
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        TelemetrySnapshot {
            conversions: self.conversions.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
            entries: self.entries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            build_errors: self.build_errors.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TelemetrySnapshot {
    pub conversions: u64,
    pub empty_results: u64,
    pub entries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub build_errors: u64,
    pub fetch_failures: u64,
    pub errors: u64,
    pub last_error: Option<String>,
}
