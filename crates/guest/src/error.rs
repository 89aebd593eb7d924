//! Errors surfaced by the guest-side convenience layer.

use thiserror::Error;

/// Failures decoding host-provided data on the guest side.
#[derive(Debug, Error)]
pub enum GuestDecodeError {
    /// The host returned a null pointer where a string was expected.
    #[error("host returned a null pointer")]
    NullPointer,
    /// The host wrote bytes that are not valid UTF-8.
    #[error("invalid UTF-8 returned by host")]
    InvalidUtf8,
}
