//! Phased pipeline (C11): decode, scanline, and compress run as three
//! barrier-synchronised phases per chunk, with chunk size bounded by a host
//! memory budget, an optional GPU VRAM budget, and the mega-batch hard cap
//! (§4.10).

use super::{active_backend_for_analytics, build_scanlines_with_gpu, resolve_thread_count, BatchOutput};
use crate::analytics::{self, BatchSnapshot, GpuCounters};
use crate::area::AreaStats;
use crate::config;
use crate::error::{Error, Result};
use crate::gpu::{self, Backend, MEGA_BATCH_HARD_CAP};
use crate::scanline::{self, Channels};
use std::sync::Mutex;

const HOST_MEMORY_BUDGET_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Process a batch of encoded layers via the decode/scanline/compress
/// phased pipeline, chunked to respect a host memory budget and (when
/// `use_gpu_batch` is set) the active GPU's mega-batch limits.
#[allow(clippy::too_many_arguments)]
pub fn process_layers_batch_phased(
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
    use_gpu_batch: bool,
) -> Result<BatchOutput> {
    if inputs.is_empty() {
        return Err(Error::invalid("process_layers_batch_phased: empty input"));
    }
    if src_width == 0 || height == 0 || out_width == 0 {
        return Err(Error::invalid("process_layers_batch_phased: zero dimension"));
    }

    let threads = resolve_thread_count(thread_count, config::batch_threads_default(), inputs.len());
    let pixel_count = src_width as u64 * height as u64;
    let scanlines_len = scanline::scanlines_len(out_width, height, channels) as u64;

    let max_chunk = compute_chunk_size(inputs.len(), pixel_count, scanlines_len, use_gpu_batch, out_width, height, channels);

    let mut pngs: Vec<Vec<u8>> = Vec::with_capacity(inputs.len());
    let mut areas: Vec<AreaStats> = Vec::with_capacity(inputs.len());
    let gpu_counters = Mutex::new(GpuCounters::default());
    let mut any_mega_batch_ok = false;

    let mut start = 0usize;
    while start < inputs.len() {
        let end = (start + max_chunk).min(inputs.len());
        let chunk = &inputs[start..end];

        let (chunk_pngs, chunk_areas, mega_batch_ok) = process_chunk(
            chunk,
            layer_index_base + start as u32,
            encryption_key,
            src_width,
            height,
            out_width,
            channels,
            x_pixel_size_mm,
            y_pixel_size_mm,
            png_level,
            threads,
            use_gpu_batch,
            &gpu_counters,
        )?;

        any_mega_batch_ok |= mega_batch_ok;
        pngs.extend(chunk_pngs);
        areas.extend(chunk_areas);
        start = end;
    }

    let gpu = *gpu_counters.lock().unwrap();
    analytics::publish(BatchSnapshot {
        thread_count: threads as u32,
        backend: if any_mega_batch_ok {
            Some(Backend::Cuda)
        } else {
            active_backend_for_analytics(gpu.attempts > 0)
        },
        gpu,
        phased_mega_batch_ok: any_mega_batch_ok,
        per_thread: Vec::new(),
    });

    Ok(BatchOutput { pngs, areas })
}

fn compute_chunk_size(
    count: usize,
    pixel_count: u64,
    scanlines_len: u64,
    use_gpu_batch: bool,
    out_width: u32,
    height: u32,
    channels: Channels,
) -> usize {
    let per_layer_mem = pixel_count + 2 * scanlines_len + pixel_count / 4;
    let mut max_chunk = count as u64;
    if let Some(budget_chunk) = HOST_MEMORY_BUDGET_BYTES.checked_div(per_layer_mem) {
        max_chunk = max_chunk.min(budget_chunk.max(1));
    }

    if use_gpu_batch {
        if let Some(backend) = gpu::active_backend_impl() {
            if backend.kind() == Backend::Cuda {
                let advisory = backend.max_concurrent_layers(pixel_count as u32, height, out_width, channels);
                let capped = advisory.clamp(1, MEGA_BATCH_HARD_CAP) as u64;
                max_chunk = max_chunk.min(capped);
            }
        }
    }

    max_chunk.max(1) as usize
}

/// Process one chunk end-to-end across its three phases.
#[allow(clippy::too_many_arguments)]
fn process_chunk(
    chunk: &[&[u8]],
    layer_index_base: u32,
    encryption_key: u32,
    src_width: u32,
    height: u32,
    out_width: u32,
    channels: Channels,
    x_pixel_size_mm: f64,
    y_pixel_size_mm: f64,
    png_level: i32,
    threads: usize,
    use_gpu_batch: bool,
    gpu_counters: &Mutex<GpuCounters>,
) -> Result<(Vec<Vec<u8>>, Vec<AreaStats>, bool)> {
    let n = chunk.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| Error::capacity(format!("failed to build batch thread pool: {e}")))?;

    let run_parallel = |f: &(dyn Fn(usize) -> Result<()> + Sync)| -> Result<()> {
        if threads <= 1 {
            for i in 0..n {
                f(i)?;
            }
            Ok(())
        } else {
            let failure: Mutex<Option<Error>> = Mutex::new(None);
            pool.install(|| {
                use rayon::prelude::*;
                (0..n).into_par_iter().for_each(|i| {
                    if let Err(err) = f(i) {
                        let mut slot = failure.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                });
            });
            match failure.into_inner().unwrap() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    };

    // Phase 1: decode + area stats.
    let pixel_buffers: Vec<Mutex<Option<Vec<u8>>>> = (0..n).map(|_| Mutex::new(None)).collect();
    let areas: Vec<Mutex<Option<AreaStats>>> = (0..n).map(|_| Mutex::new(None)).collect();
    run_parallel(&|i| {
        let mut pixels = vec![0u8; src_width as usize * height as usize];
        crate::rle::decode_layer(chunk[i], layer_index_base + i as u32, encryption_key, &mut pixels)?;
        let area = crate::area::compute_area_stats(&pixels, src_width, height, x_pixel_size_mm, y_pixel_size_mm)?;
        *areas[i].lock().unwrap() = Some(area);
        *pixel_buffers[i].lock().unwrap() = Some(pixels);
        Ok(())
    })?;

    // Phase 2: scanlines, attempting a CUDA mega-batch first when requested.
    let scanline_size = scanline::scanlines_len(out_width, height, channels);
    let scanlines: Vec<Mutex<Option<Vec<u8>>>> = (0..n).map(|_| Mutex::new(None)).collect();
    let mut mega_batch_ok = false;

    if use_gpu_batch && n <= MEGA_BATCH_HARD_CAP as usize {
        if let Some(backend) = gpu::active_backend_impl() {
            if backend.kind() == Backend::Cuda {
                let mut concatenated = Vec::with_capacity(n * src_width as usize * height as usize);
                for buf in &pixel_buffers {
                    concatenated.extend_from_slice(buf.lock().unwrap().as_ref().unwrap());
                }
                let mut batch_out = vec![0u8; n * scanline_size];
                gpu_counters.lock().unwrap().record_attempt();
                match backend.build_batch(&concatenated, n as u32, src_width, height, out_width, channels, &mut batch_out) {
                    Some(Ok(())) => {
                        gpu_counters.lock().unwrap().record_success();
                        for (i, slot) in scanlines.iter().enumerate() {
                            *slot.lock().unwrap() = Some(batch_out[i * scanline_size..(i + 1) * scanline_size].to_vec());
                        }
                        mega_batch_ok = true;
                    }
                    Some(Err(Error::GpuKernel { code, .. })) => {
                        log::warn!("CUDA mega-batch failed (code {code}), falling back to per-layer scanline build");
                        gpu_counters.lock().unwrap().record_fallback(code);
                    }
                    Some(Err(other)) => return Err(other),
                    None => {}
                }
            }
        }
    }

    if !mega_batch_ok {
        run_parallel(&|i| {
            let pixels_guard = pixel_buffers[i].lock().unwrap();
            let pixels = pixels_guard.as_ref().unwrap();
            let mut buf = vec![0u8; scanline_size];
            build_scanlines_with_gpu(pixels, src_width, height, out_width, channels, &mut buf, use_gpu_batch, gpu_counters)?;
            drop(pixels_guard);
            *scanlines[i].lock().unwrap() = Some(buf);
            Ok(())
        })?;
    }

    // Phase 3: compress + PNG-wrap.
    let pngs: Vec<Mutex<Option<Vec<u8>>>> = (0..n).map(|_| Mutex::new(None)).collect();
    run_parallel(&|i| {
        let scanlines_guard = scanlines[i].lock().unwrap();
        let png = crate::png::write_png(out_width, height, channels as u32, scanlines_guard.as_ref().unwrap(), png_level)?;
        *pngs[i].lock().unwrap() = Some(png);
        Ok(())
    })?;

    let pngs = pngs.into_iter().map(|slot| slot.into_inner().unwrap().unwrap()).collect();
    let areas = areas.into_iter().map(|slot| slot.into_inner().unwrap().unwrap()).collect();
    Ok((pngs, areas, mega_batch_ok))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processes_a_small_batch_with_the_cpu_path() {
        let layer_a: Vec<u8> = vec![];
        let layer_b: Vec<u8> = vec![];
        let layer_c: Vec<u8> = vec![];
        let inputs: Vec<&[u8]> = vec![&layer_a, &layer_b, &layer_c];

        let result = process_layers_batch_phased(&inputs, 0, 0, 4, 4, 4, Channels::Rgb, 0.05, 0.05, 6, Some(2), false).unwrap();
        assert_eq!(result.pngs.len(), 3);
        assert_eq!(result.areas.len(), 3);
    }

    #[test]
    fn chunk_size_respects_hard_cap_and_is_never_zero() {
        let size = compute_chunk_size(1000, 4_000_000, 4_000_004, false, 2000, 2000, Channels::Rgb);
        assert!(size >= 1);
    }

    #[test]
    fn rejects_empty_batch() {
        let inputs: Vec<&[u8]> = vec![];
        assert!(process_layers_batch_phased(&inputs, 0, 0, 4, 4, 4, Channels::Rgb, 0.05, 0.05, 6, Some(1), false).is_err());
    }
}
