//! Per-layer pipeline (C10): one worker pool, each worker fully processing
//! (decode → area stats → scanlines → compress → PNG-wrap) the layers it
//! claims (§4.9).
//!
//! **GPU-always-allowed quirk.** This pipeline hard-codes GPU-allowed to
//! true regardless of any caller preference, unlike the phased pipeline
//! which honours an explicit flag. Preserved verbatim — see DESIGN.md.

use super::{active_backend_for_analytics, resolve_thread_count, BatchOutput};
use crate::analytics::{self, BatchSnapshot, GpuCounters, ThreadTiming};
use crate::area::AreaStats;
use crate::config;
use crate::error::{Error, Result};
use crate::scanline::{self, Channels};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

const CLAIM_CHUNK: usize = 4;

struct Shared<'a> {
    inputs: &'a [&'a [u8]],
    layer_index_base: u32,
    encryption_key: u32,
    src_width: u32,
    height: u32,
    out_width: u32,
    channels: Channels,
    x_pixel_size_mm: f64,
    y_pixel_size_mm: f64,
    png_level: i32,
    outputs: Vec<Mutex<Option<Vec<u8>>>>,
    areas: Vec<Mutex<Option<AreaStats>>>,
    cursor: AtomicUsize,
    failed: AtomicBool,
    first_error: Mutex<Option<Error>>,
    gpu_counters: Mutex<GpuCounters>,
    used_gpu: AtomicBool,
    analytics_enabled: bool,
    thread_timings: Vec<Mutex<ThreadTiming>>,
}

impl<'a> Shared<'a> {
    fn claim(&self) -> Option<std::ops::Range<usize>> {
        if self.failed.load(Ordering::Acquire) {
            return None;
        }
        let start = self.cursor.fetch_add(CLAIM_CHUNK, Ordering::AcqRel);
        if start >= self.inputs.len() {
            return None;
        }
        Some(start..(start + CLAIM_CHUNK).min(self.inputs.len()))
    }

    fn mark_failed(&self, err: Error) {
        log::error!("layer batch worker failed: {}", crate::error::ErrChain(&err));
        let mut first = self.first_error.lock().unwrap();
        if first.is_none() {
            *first = Some(err);
        }
        self.failed.store(true, Ordering::Release);
    }

    fn process_one(&self, index: usize, thread_slot: usize) {
        let mut pixels = vec![0u8; self.src_width as usize * self.height as usize];

        let decode_start = Instant::now();
        let decode_result = crate::rle::decode_layer(
            self.inputs[index],
            self.layer_index_base + index as u32,
            self.encryption_key,
            &mut pixels,
        )
        .and_then(|()| {
            crate::area::compute_area_stats(&pixels, self.src_width, self.height, self.x_pixel_size_mm, self.y_pixel_size_mm)
        });
        let decode_elapsed = decode_start.elapsed();

        let area = match decode_result {
            Ok(area) => area,
            Err(err) => return self.mark_failed(err),
        };

        let scanline_start = Instant::now();
        let mut scanlines = vec![0u8; scanline::scanlines_len(self.out_width, self.height, self.channels)];
        let scanline_result = super::build_scanlines_with_gpu(
            &pixels,
            self.src_width,
            self.height,
            self.out_width,
            self.channels,
            &mut scanlines,
            true, // GPU always allowed, see module doc.
            &self.gpu_counters,
        );
        let scanline_elapsed = scanline_start.elapsed();
        if let Err(err) = scanline_result {
            return self.mark_failed(err);
        }

        let compress_start = Instant::now();
        let png = match crate::png::write_png(self.out_width, self.height, self.channels as u32, &scanlines, self.png_level) {
            Ok(png) => png,
            Err(err) => return self.mark_failed(err),
        };
        let compress_elapsed = compress_start.elapsed();

        if self.gpu_counters.lock().unwrap().successes > 0 {
            self.used_gpu.store(true, Ordering::Relaxed);
        }

        *self.outputs[index].lock().unwrap() = Some(png);
        *self.areas[index].lock().unwrap() = Some(area);

        if self.analytics_enabled {
            let mut timing = self.thread_timings[thread_slot].lock().unwrap();
            timing.layers_processed += 1;
            timing.decode_time += decode_elapsed;
            timing.scanline_time += scanline_elapsed;
            timing.compress_time += compress_elapsed;
        }
    }
}

/// Process a batch of encoded layers: decode, analyse, scanline-build and
/// PNG-wrap each one, distributing work over up to `thread_count` workers.
#[allow(clippy::too_many_arguments)]
pub fn process_layers_batch(
    inputs: &[&[u8]],
    layer_index_base: u32,
    encryption_key: u32,
    src_width: u32,
    height: u32,
    out_width: u32,
    channels: Channels,
    x_pixel_size_mm: f64,
    y_pixel_size_mm: f64,
    png_level: i32,
    thread_count: Option<usize>,
) -> Result<BatchOutput> {
    if inputs.is_empty() {
        return Err(Error::invalid("process_layers_batch: empty input"));
    }
    if src_width == 0 || height == 0 || out_width == 0 {
        return Err(Error::invalid("process_layers_batch: zero dimension"));
    }

    let threads = resolve_thread_count(thread_count, config::batch_threads_default(), inputs.len());
    let analytics_enabled = config::batch_analytics_enabled();

    let shared = Shared {
        inputs,
        layer_index_base,
        encryption_key,
        src_width,
        height,
        out_width,
        channels,
        x_pixel_size_mm,
        y_pixel_size_mm,
        png_level,
        outputs: (0..inputs.len()).map(|_| Mutex::new(None)).collect(),
        areas: (0..inputs.len()).map(|_| Mutex::new(None)).collect(),
        cursor: AtomicUsize::new(0),
        failed: AtomicBool::new(false),
        first_error: Mutex::new(None),
        gpu_counters: Mutex::new(GpuCounters::default()),
        used_gpu: AtomicBool::new(false),
        analytics_enabled,
        thread_timings: (0..threads).map(|_| Mutex::new(ThreadTiming::default())).collect(),
    };

    if threads == 1 {
        for i in 0..inputs.len() {
            if shared.failed.load(Ordering::Acquire) {
                break;
            }
            shared.process_one(i, 0);
        }
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::capacity(format!("failed to build batch thread pool: {e}")))?;
        pool.scope(|scope| {
            for thread_slot in 0..threads {
                let shared = &shared;
                scope.spawn(move |_| {
                    while let Some(range) = shared.claim() {
                        for i in range {
                            shared.process_one(i, thread_slot);
                        }
                    }
                });
            }
        });
    }

    if shared.failed.load(Ordering::Acquire) {
        let err = shared
            .first_error
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Error::capacity("process_layers_batch: worker failed with no recorded error"));
        return Err(Error::BatchFailed(Box::new(err)));
    }

    let used_gpu = shared.used_gpu.load(Ordering::Relaxed);
    let gpu = *shared.gpu_counters.lock().unwrap();
    let per_thread = if analytics_enabled {
        shared.thread_timings.iter().map(|m| *m.lock().unwrap()).collect()
    } else {
        Vec::new()
    };

    analytics::publish(BatchSnapshot {
        thread_count: threads as u32,
        backend: active_backend_for_analytics(used_gpu),
        gpu,
        phased_mega_batch_ok: false,
        per_thread,
    });

    let pngs = shared.outputs.into_iter().map(|slot| slot.into_inner().unwrap().unwrap()).collect();
    let areas = shared.areas.into_iter().map(|slot| slot.into_inner().unwrap().unwrap()).collect();
    Ok(BatchOutput { pngs, areas })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processes_a_small_batch_end_to_end() {
        // Empty input decodes (tolerantly) to an all-zero layer — enough to
        // exercise the pipeline's plumbing without an RLE encoder.
        let layer_a: Vec<u8> = vec![];
        let layer_b: Vec<u8> = vec![];
        let inputs: Vec<&[u8]> = vec![&layer_a, &layer_b];

        let result = process_layers_batch(&inputs, 0, 0, 4, 4, 4, Channels::Grey, 0.05, 0.05, 6, Some(1)).unwrap();
        assert_eq!(result.pngs.len(), 2);
        assert_eq!(result.areas.len(), 2);
        for png in &result.pngs {
            assert_eq!(&png[0..4], &[0x89, 0x50, 0x4E, 0x47]);
        }
    }

    #[test]
    fn rejects_empty_batch() {
        let inputs: Vec<&[u8]> = vec![];
        assert!(process_layers_batch(&inputs, 0, 0, 4, 4, 4, Channels::Grey, 0.05, 0.05, 6, Some(1)).is_err());
    }
}
