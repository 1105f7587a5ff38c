//! Metal backend adapter (macOS only): probes the system Metal framework
//! for `MTLCreateSystemDefaultDevice`.

use super::opencl::probe_symbol;
use super::{Backend, ScanlineBackend};
use crate::error::{Error, Result};
use crate::scanline::Channels;

#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &["/System/Library/Frameworks/Metal.framework/Metal"];
#[cfg(not(target_os = "macos"))]
const CANDIDATES: &[&str] = &[];

pub struct MetalBackend;

impl MetalBackend {
    pub fn new() -> Self {
        MetalBackend
    }
}

impl Default for MetalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanlineBackend for MetalBackend {
    fn kind(&self) -> Backend {
        Backend::Metal
    }

    fn available(&self) -> bool {
        if cfg!(feature = "backend-metal") {
            !CANDIDATES.is_empty() && probe_symbol(CANDIDATES, "MTLCreateSystemDefaultDevice")
        } else {
            // Force-disabled at build time, matching the C build switch.
            false
        }
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
        Err(Error::GpuKernel {
            backend: Backend::Metal,
            code: -1,
        })
    }
}
