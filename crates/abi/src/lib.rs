//! Wire-level types and the canonical name catalogue shared between the host
//! embedding and guest wasm32 modules.
//!
//! Everything here is a scalar type or a `&'static str` constant: the bridge
//! ABI never puts structured data across the guest/host boundary, so unlike a
//! typical hostcall layer there is nothing to (de)serialise.

pub mod names;
pub mod reserved;

/// A 32-bit handle naming a live host value for the duration of its
/// reference-counted lifetime inside the bridge.
pub type Handle = u32;

/// Byte offset into guest linear memory.
pub type GuestPtr = u32;

/// Byte length of a guest memory span.
pub type GuestLen = u32;

/// Index into the guest module's indirect call table, as passed to
/// `make_callback`.
pub type TableIndex = u32;

/// Reserved-handle threshold a concrete table was built with.
///
/// The extended variant seeds `null, undefined, false, true, global, console,
/// reserved-sentinel` (`R = 6`); the minimal variant drops `console` and the
/// sentinel (`R = 4`). Both share handles `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedVariant {
    /// `0=null, 1=undefined, 2=false, 3=true, 4=global`.
    Minimal,
    /// `0=null, 1=undefined, 2=false, 3=true, 4=global, 5=console, 6=sentinel`.
    Extended,
}

impl ReservedVariant {
    /// Highest reserved handle (`R`) for this variant.
    pub const fn max_reserved(self) -> Handle {
        match self {
            ReservedVariant::Minimal => reserved::GLOBAL,
            ReservedVariant::Extended => reserved::RESERVED_SENTINEL,
        }
    }
}

impl Default for ReservedVariant {
    fn default() -> Self {
        ReservedVariant::Extended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_reserved_matches_documented_thresholds() {
        assert_eq!(ReservedVariant::Minimal.max_reserved(), 4);
        assert_eq!(ReservedVariant::Extended.max_reserved(), 6);
    }
}
