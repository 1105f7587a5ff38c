//! The error taxonomy shared by every module in this crate.
//!
//! Every fallible public function returns [`Result<T>`], never a raw status
//! code. The out-of-tree FFI shim that exposes this crate across languages
//! is responsible for collapsing [`Error`] down to the `1`/`0` convention
//! described by the host ABI.

use std::fmt;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while decoding, analysing, or re-encoding a
/// layer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A caller-supplied argument was null, zero/negative where a positive
    /// dimension was required, or otherwise structurally invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A PNG byte stream did not parse: bad signature, truncated chunk,
    /// unsupported bit depth/colour type, or a CRC mismatch.
    #[error("malformed PNG: {0}")]
    MalformedPng(String),

    /// The system deflate provider reported failure.
    #[error("deflate failed: {0}")]
    Deflate(#[source] std::io::Error),

    /// The system inflate provider reported failure, or inflated to a size
    /// other than the one IHDR promised.
    #[error("inflate failed: {0}")]
    Inflate(#[source] std::io::Error),

    /// A GPU kernel call failed. Callers of the pipeline never see this
    /// directly — it is caught and turned into a CPU fallback — but backend
    /// implementations and tests observe it.
    #[error("GPU kernel failure (backend {backend:?}, code {code})")]
    GpuKernel {
        backend: crate::gpu::Backend,
        code: i32,
    },

    /// Plain I/O failure (file, or a worker thread failing to spawn).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A ZIP entry or the whole archive exceeded the STORE-only 32-bit
    /// format's limits.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// One worker in a batch failed; the batch was aborted and all partial
    /// output released. The inner error is the first failure observed.
    #[error("batch aborted: {0}")]
    BatchFailed(Box<Error>),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn malformed_png(msg: impl Into<String>) -> Self {
        Error::MalformedPng(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::Capacity(msg.into())
    }
}

/// A lightweight `Display` wrapper used when logging a chain of `Err` without
/// taking ownership, kept separate from `thiserror`'s derive so call sites
/// can log a reference.
pub(crate) struct ErrChain<'a>(pub &'a Error);

impl fmt::Display for ErrChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
