//! Batch layer-processing orchestration: the per-layer pipeline (C10) and
//! the phased pipeline (C11). Both turn a batch of encoded layers into PNG
//! bytes plus area statistics, differing only in how much work is
//! barrier-synchronised between layers (§4.9/§4.10).

mod per_layer;
mod phased;

pub use per_layer::process_layers_batch;
pub use phased::process_layers_batch_phased;

use crate::analytics::GpuCounters;
use crate::area::AreaStats;
use crate::error::{Error, Result};
use crate::gpu::{self, Backend};
use crate::scanline::{self, Channels};
use std::sync::Mutex;

/// The output of either batch pipeline: one PNG and one [`AreaStats`] per
/// input layer, in input order.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub pngs: Vec<Vec<u8>>,
    pub areas: Vec<AreaStats>,
}

pub(crate) fn resolve_thread_count(explicit: Option<usize>, default_hint: i32, count: usize) -> usize {
    let base = explicit.unwrap_or_else(|| {
        if default_hint > 0 {
            default_hint as usize
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }
    });
    base.max(1).min(count.max(1))
}

/// Build one layer's scanlines, attempting the active GPU backend first
/// (when allowed) and falling back to the CPU path on kernel failure.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_scanlines_with_gpu(
    pixels: &[u8],
    src_width: u32,
    height: u32,
    out_width: u32,
    channels: Channels,
    scanlines: &mut [u8],
    allow_gpu: bool,
    gpu_counters: &Mutex<GpuCounters>,
) -> Result<()> {
    if allow_gpu {
        if let Some(backend) = gpu::active_backend_impl() {
            gpu_counters.lock().unwrap().record_attempt();
            match backend.build_single(pixels, src_width, height, out_width, channels, scanlines) {
                Ok(()) => {
                    gpu_counters.lock().unwrap().record_success();
                    return Ok(());
                }
                Err(Error::GpuKernel { code, .. }) => {
                    log::warn!("GPU scanline build failed (code {code}), falling back to CPU");
                    gpu_counters.lock().unwrap().record_fallback(code);
                }
                Err(other) => return Err(other),
            }
        }
    }
    scanline::build_scanlines(pixels, src_width, height, out_width, channels, scanlines)
}

pub(crate) fn active_backend_for_analytics(used_gpu: bool) -> Option<Backend> {
    if used_gpu {
        Some(gpu::active())
    } else {
        None
    }
}
