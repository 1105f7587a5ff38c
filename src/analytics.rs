//! Last-batch readouts (C12): thread count, per-thread timings, backend
//! used, GPU attempt/success/fallback counters. Valid only until the next
//! batch call overwrites them (§4.11).

use crate::gpu::Backend;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Per-worker timing breakdown, recorded only when analytics are enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadTiming {
    pub layers_processed: u32,
    pub decode_time: Duration,
    pub scanline_time: Duration,
    pub compress_time: Duration,
}

/// GPU attempt/success/fallback counters for one batch call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuCounters {
    pub attempts: u32,
    pub successes: u32,
    pub fallbacks: u32,
    pub last_cuda_error: i32,
}

impl GpuCounters {
    pub(crate) fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub(crate) fn record_success(&mut self) {
        self.successes += 1;
    }

    pub(crate) fn record_fallback(&mut self, cuda_error: i32) {
        self.fallbacks += 1;
        self.last_cuda_error = cuda_error;
    }
}

/// A full snapshot of the most recently completed batch call.
#[derive(Debug, Clone, Default)]
pub struct BatchSnapshot {
    pub thread_count: u32,
    pub backend: Option<Backend>,
    pub gpu: GpuCounters,
    pub phased_mega_batch_ok: bool,
    pub per_thread: Vec<ThreadTiming>,
}

fn last_snapshot() -> &'static Mutex<BatchSnapshot> {
    static SNAPSHOT: OnceLock<Mutex<BatchSnapshot>> = OnceLock::new();
    SNAPSHOT.get_or_init(|| Mutex::new(BatchSnapshot::default()))
}

/// Replace the process-wide last-batch snapshot. Called once by each batch
/// pipeline after it finishes (success or failure leaves the prior snapshot
/// untouched — only a completed batch publishes a new one).
pub(crate) fn publish(snapshot: BatchSnapshot) {
    *last_snapshot().lock().unwrap() = snapshot;
}

/// Read the most recent batch's analytics snapshot.
pub fn last_batch_analytics() -> BatchSnapshot {
    last_snapshot().lock().unwrap().clone()
}

/// Convenience readout: `(backend, attempts, successes, fallbacks, last_cuda_error)`.
pub fn last_batch_backend_stats() -> (Option<Backend>, u32, u32, u32, i32) {
    let snapshot = last_batch_analytics();
    (
        snapshot.backend,
        snapshot.gpu.attempts,
        snapshot.gpu.successes,
        snapshot.gpu.fallbacks,
        snapshot.gpu.last_cuda_error,
    )
}
