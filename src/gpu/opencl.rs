//! OpenCL backend adapter: probes the platform's OpenCL ICD loader for
//! `clGetPlatformIDs`. No actual OpenCL context is created by this crate —
//! kernel dispatch is the out-of-scope external collaborator.

use super::{Backend, ScanlineBackend};
use crate::error::{Error, Result};
use crate::scanline::Channels;

#[cfg(target_os = "windows")]
const CANDIDATES: &[&str] = &["OpenCL.dll"];
#[cfg(target_os = "macos")]
const CANDIDATES: &[&str] = &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const CANDIDATES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

pub struct OpenClBackend;

impl OpenClBackend {
    pub fn new() -> Self {
        OpenClBackend
    }
}

impl Default for OpenClBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanlineBackend for OpenClBackend {
    fn kind(&self) -> Backend {
        Backend::OpenCl
    }

    fn available(&self) -> bool {
        cfg!(feature = "backend-opencl") && probe_symbol(CANDIDATES, "clGetPlatformIDs")
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
            backend: Backend::OpenCl,
            code: -1,
        })
    }

    fn max_concurrent_layers(
        &self,
        _src_width: u32,
        _height: u32,
        _out_width: u32,
        _channels: Channels,
    ) -> u32 {
        1
    }
}

/// Try each candidate library name in order, returning true on the first
/// one that both loads and exports `symbol`.
pub(super) fn probe_symbol(candidates: &[&str], symbol: &str) -> bool {
    for name in candidates {
        // SAFETY: dynamic library probing is inherently unsafe FFI; we only
        // ever look up a symbol's presence, never call through it unless a
        // backend's own kernel-invocation path does so explicitly.
        let lib = unsafe { libloading::Library::new(name) };
        let Ok(lib) = lib else { continue };
        let found: std::result::Result<libloading::Symbol<*const ()>, _> =
            unsafe { lib.get(symbol.as_bytes()) };
        if found.is_ok() {
            log::debug!("probed {symbol} in {name}: available");
            return true;
        }
    }
    log::debug!("probed {symbol} in {candidates:?}: not available");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_library_is_unavailable() {
        assert!(!probe_symbol(&["definitely-not-a-real-library.so"], "whatever"));
    }
}
