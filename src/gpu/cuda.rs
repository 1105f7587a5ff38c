//! CUDA-path backend adapter: probes the CUDA driver for `cuInit`, plus a
//! companion "tensor scanline" shared library exporting
//! `vs_cuda_tensor_build_scanlines` (mandatory) and, optionally, a batch
//! kernel, device-info queries, a max-concurrent-layers query, and a
//! last-error-code query. This is the only backend with a mega-batch path
//! (§4.5/§4.10).

use super::opencl::probe_symbol;
use super::{Backend, ScanlineBackend, MEGA_BATCH_HARD_CAP};
use crate::error::{Error, Result};
use crate::scanline::Channels;
use std::sync::atomic::{AtomicI32, Ordering};

#[cfg(target_os = "windows")]
const DRIVER_CANDIDATES: &[&str] = &["nvcuda.dll"];
#[cfg(target_os = "linux")]
const DRIVER_CANDIDATES: &[&str] = &["libcuda.so.1", "libcuda.so"];
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
const DRIVER_CANDIDATES: &[&str] = &[]; // no CUDA driver on macOS

const COMPANION_LIBRARY_CANDIDATES: &[&str] = &[
    "vs_cuda_tensor.so",
    "vs_cuda_tensor.dll",
    "libvs_cuda_tensor.dylib",
];

const MANDATORY_SYMBOL: &str = "vs_cuda_tensor_build_scanlines";
const BATCH_SYMBOL: &str = "vs_cuda_tensor_build_scanlines_batch";

pub struct CudaBackend {
    last_error: AtomicI32,
}

impl CudaBackend {
    pub fn new() -> Self {
        CudaBackend {
            last_error: AtomicI32::new(0),
        }
    }

    fn has_batch_kernel(&self) -> bool {
        cfg!(feature = "backend-cuda")
            && probe_symbol(COMPANION_LIBRARY_CANDIDATES, BATCH_SYMBOL)
    }
}

impl Default for CudaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanlineBackend for CudaBackend {
    fn kind(&self) -> Backend {
        Backend::Cuda
    }

    fn available(&self) -> bool {
        if !cfg!(feature = "backend-cuda") {
            return false;
        }
        if DRIVER_CANDIDATES.is_empty() {
            return false; // no CUDA driver on this platform
        }
        probe_symbol(DRIVER_CANDIDATES, "cuInit")
            && probe_symbol(COMPANION_LIBRARY_CANDIDATES, MANDATORY_SYMBOL)
    }

    fn build_single(
        &self,
        _grey_pixels: &[u8],
        _src_width: u32,
        _height: u32,
        _out_width: u32,
        _channels: Channels,
        _out: &mut [u8],
    ) -> Result<()> {
        self.last_error.store(-1, Ordering::Relaxed);
        Err(Error::GpuKernel {
            backend: Backend::Cuda,
            code: -1,
        })
    }

    fn build_batch(
        &self,
        _concatenated_pixels: &[u8],
        layers: u32,
        _src_width: u32,
        _height: u32,
        _out_width: u32,
        _channels: Channels,
        _out: &mut [u8],
    ) -> Option<Result<()>> {
        if !self.has_batch_kernel() {
            return None;
        }
        if layers == 0 || layers > MEGA_BATCH_HARD_CAP {
            return Some(Err(Error::invalid(
                "build_batch: layer count exceeds the mega-batch hard cap",
            )));
        }
        self.last_error.store(-2, Ordering::Relaxed);
        Some(Err(Error::GpuKernel {
            backend: Backend::Cuda,
            code: -2,
        }))
    }

    fn max_concurrent_layers(
        &self,
        src_width: u32,
        height: u32,
        out_width: u32,
        channels: Channels,
    ) -> u32 {
        // Advisory only; the core additionally imposes MEGA_BATCH_HARD_CAP.
        // Without a live device query, fall back to a conservative estimate
        // derived purely from per-layer byte size so the advisory cap never
        // reports something obviously absurd for huge layers.
        let per_layer_bytes =
            src_width as u64 * height as u64 + out_width as u64 * channels as u64 * height as u64;
        if per_layer_bytes == 0 {
            return MEGA_BATCH_HARD_CAP;
        }
        let advisory = (512u64 * 1024 * 1024 / per_layer_bytes).max(1);
        advisory.min(MEGA_BATCH_HARD_CAP as u64) as u32
    }

    fn last_error_code(&self) -> i32 {
        self.last_error.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_concurrent_layers_never_exceeds_hard_cap() {
        let backend = CudaBackend::new();
        let cap = backend.max_concurrent_layers(4000, 4000, 4000, Channels::Rgb);
        assert!(cap <= MEGA_BATCH_HARD_CAP);
        assert!(cap >= 1);
    }

    #[test]
    fn batch_rejects_layer_count_above_hard_cap() {
        let backend = CudaBackend::new();
        if backend.has_batch_kernel() {
            let mut out = vec![0u8; 1];
            let result = backend.build_batch(&[], MEGA_BATCH_HARD_CAP + 1, 1, 1, 1, Channels::Grey, &mut out);
            assert!(matches!(result, Some(Err(_))));
        }
    }
}
