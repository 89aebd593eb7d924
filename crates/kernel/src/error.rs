//! Errors surfaced by kernel operations to the embedding host.

use thiserror::Error;

/// Result type used throughout the operation kernel.
pub type KernelResult<T> = Result<T, BridgeError>;

/// Failures that can cross the kernel/embedding boundary.
///
/// These are distinct from *normalised* host exceptions (see
/// [`crate::value::normalize_thrown`]): a `BridgeError` is never handed back
/// to the guest as a handle, it is the embedding's signal to trap the
/// current host function call, so it only ever comes from an operation that
/// propagates an uncaught exception to the host caller rather than wrapping
/// it into a guest-visible value.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Guest-provided byte span was not valid UTF-8.
    #[error("invalid UTF-8 in guest-provided string")]
    InvalidUtf8,
    /// `ptr..ptr+len` fell outside the guest's linear memory.
    #[error("guest memory slice out of bounds")]
    MemoryAccess,
    /// The guest instance does not export a `memory`.
    #[error("guest did not export a linear memory")]
    MemoryMissing,
    /// The guest's allocator export was missing, mis-typed, or returned a
    /// pointer that does not fit the requested length.
    #[error("guest allocator call failed")]
    AllocationFailed,
    /// A call through the guest's indirect function table failed to resolve
    /// or trapped.
    #[error("indirect call into guest function table failed: {0}")]
    IndirectCall(String),
    /// An uncaught exception reached an operation that does not normalise
    /// errors (property get/set on `null`/`undefined`, or an explicit
    /// `throw`).
    #[error("uncaught exception: {0}")]
    Thrown(String),
}
