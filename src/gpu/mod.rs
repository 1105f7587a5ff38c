//! GPU backend registry: probing, preference, selection, and the
//! scanline-kernel contract that every backend must satisfy.
//!
//! The concrete backends in this module perform real dynamic-library
//! probing (so `available()` genuinely reflects what is installed on the
//! host), but none of them vendor an actual device kernel — invoking
//! `build_single`/`build_batch` always returns [`crate::error::Error::GpuKernel`]
//! unless a real companion library with the documented symbol set is
//! present. The contract (trait shape, registry, selection policy,
//! fallback) is what this crate owns; the kernels themselves are the
//! out-of-scope external collaborator described by the top-level spec.

mod cuda;
mod metal;
mod opencl;

pub use cuda::CudaBackend;
pub use metal::MetalBackend;
pub use opencl::OpenClBackend;

use crate::error::Result;
use crate::scanline::Channels;
use std::sync::{Mutex, OnceLock};

/// The four states a "which backend" value can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Backend {
    None = 0,
    OpenCl = 1,
    Metal = 2,
    Cuda = 3,
}

impl Backend {
    /// Parse a backend code as used by the analytics/last-error surface.
    pub fn from_code(code: i32) -> Option<Backend> {
        match code {
            0 => Some(Backend::None),
            1 => Some(Backend::OpenCl),
            2 => Some(Backend::Metal),
            3 => Some(Backend::Cuda),
            _ => None,
        }
    }
}

/// Caller-selected backend preference. `Auto` defers to the registry's
/// built-in priority order (Metal, then CUDA, then OpenCL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Preference {
    Auto = 0,
    OpenCl = 1,
    Metal = 2,
    Cuda = 3,
}

impl Preference {
    pub fn from_code(code: i32) -> Preference {
        match code {
            1 => Preference::OpenCl,
            2 => Preference::Metal,
            3 => Preference::Cuda,
            _ => Preference::Auto,
        }
    }

    fn as_backend(self) -> Option<Backend> {
        match self {
            Preference::Auto => None,
            Preference::OpenCl => Some(Backend::OpenCl),
            Preference::Metal => Some(Backend::Metal),
            Preference::Cuda => Some(Backend::Cuda),
        }
    }
}

/// The scanline-kernel contract every GPU backend implements. A conforming
/// backend produces byte-for-byte the same bytes as
/// [`crate::scanline::build_scanlines`] for the same inputs.
pub trait ScanlineBackend: Send + Sync {
    fn kind(&self) -> Backend;

    /// Whether this backend's dynamic library and required symbols are
    /// present on this host. Cheap to call repeatedly; callers should still
    /// prefer the cached [`Registry::active`] for hot paths.
    fn available(&self) -> bool;

    /// Build scanlines for one layer on the device.
    fn build_single(
        &self,
        grey_pixels: &[u8],
        src_width: u32,
        height: u32,
        out_width: u32,
        channels: Channels,
        out: &mut [u8],
    ) -> Result<()>;

    /// Build scanlines for up to [`MEGA_BATCH_HARD_CAP`] layers concatenated
    /// into one device buffer. `None` means this backend has no batch
    /// kernel (only CUDA does, per §4.5/§4.10).
    #[allow(clippy::too_many_arguments)]
    fn build_batch(
        &self,
        _concatenated_pixels: &[u8],
        _layers: u32,
        _src_width: u32,
        _height: u32,
        _out_width: u32,
        _channels: Channels,
        _out: &mut [u8],
    ) -> Option<Result<()>> {
        None
    }

    /// Advisory VRAM-based cap on how many layers fit in one mega-batch.
    /// The core additionally clamps this to [`MEGA_BATCH_HARD_CAP`].
    fn max_concurrent_layers(
        &self,
        _src_width: u32,
        _height: u32,
        _out_width: u32,
        _channels: Channels,
    ) -> u32 {
        1
    }

    /// The most recent device-reported error code, for diagnostics.
    fn last_error_code(&self) -> i32 {
        0
    }
}

/// Hard cap on a CUDA mega-batch regardless of what VRAM would allow.
pub const MEGA_BATCH_HARD_CAP: u32 = 8;

struct RegistryState {
    enabled: bool,
    preference: Preference,
    cached_active: Option<Backend>,
}

impl Default for RegistryState {
    fn default() -> Self {
        RegistryState {
            enabled: true,
            preference: Preference::Auto,
            cached_active: None,
        }
    }
}

fn state() -> &'static Mutex<RegistryState> {
    static STATE: OnceLock<Mutex<RegistryState>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(RegistryState::default()))
}

fn backends() -> &'static [Box<dyn ScanlineBackend>; 3] {
    static BACKENDS: OnceLock<[Box<dyn ScanlineBackend>; 3]> = OnceLock::new();
    BACKENDS.get_or_init(|| {
        [
            Box::new(MetalBackend::new()),
            Box::new(CudaBackend::new()),
            Box::new(OpenClBackend::new()),
        ]
    })
}

fn backend_by_kind(kind: Backend) -> Option<&'static dyn ScanlineBackend> {
    backends().iter().map(AsRef::as_ref).find(|b| b.kind() == kind)
}

/// Enable or disable GPU acceleration process-wide.
pub fn set_enabled(enabled: bool) {
    let mut s = state().lock().unwrap();
    s.enabled = enabled;
}

/// Set the preferred backend; invalidates the cached selection (§4.5).
pub fn set_preference(preference: Preference) {
    let mut s = state().lock().unwrap();
    s.preference = preference;
    s.cached_active = None;
    log::debug!("GPU backend preference set to {preference:?}, cache invalidated");
}

/// Probe whether a specific backend is available on this host right now.
pub fn available(backend: Backend) -> bool {
    if backend == Backend::None {
        return true;
    }
    backend_by_kind(backend).map(|b| b.available()).unwrap_or(false)
}

/// Probe availability from a raw backend code (as read back from the
/// analytics/last-error surface), returning `false` for an unknown code.
pub fn available_by_code(code: i32) -> bool {
    Backend::from_code(code).map(available).unwrap_or(false)
}

/// Resolve (and cache) which backend is active, honouring the preference
/// and falling back through Metal → CUDA → OpenCL → none.
pub fn active() -> Backend {
    let mut s = state().lock().unwrap();
    if let Some(cached) = s.cached_active {
        return if s.enabled { cached } else { Backend::None };
    }

    let resolved = resolve(s.preference);
    s.cached_active = Some(resolved);
    log::info!("GPU backend resolved to {resolved:?} (preference {:?})", s.preference);
    if s.enabled {
        resolved
    } else {
        Backend::None
    }
}

fn resolve(preference: Preference) -> Backend {
    if let Some(preferred) = preference.as_backend() {
        if available(preferred) {
            return preferred;
        }
    }
    for candidate in [Backend::Metal, Backend::Cuda, Backend::OpenCl] {
        if available(candidate) {
            return candidate;
        }
    }
    Backend::None
}

/// The backend the registry would select if asked right now (bypassing the
/// enabled/disabled flag) — used by diagnostics and `backend()` passthrough.
pub fn backend() -> Backend {
    active()
}

/// Look up the live backend implementation for [`active`], if any.
pub fn active_backend_impl() -> Option<&'static dyn ScanlineBackend> {
    #[cfg(test)]
    if let Some(over) = test_override::get() {
        return Some(over);
    }
    match active() {
        Backend::None => None,
        kind => backend_by_kind(kind),
    }
}
