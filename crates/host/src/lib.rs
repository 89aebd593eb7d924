//! Wasmtime embedding of the value-bridge ABI.
//!
//! This crate is the one piece of the workspace that knows Wasmtime exists:
//! it owns the `Store` instance data, adapts [`vbridge_kernel::ops`]'s
//! engine-neutral operations onto a `Linker`, and reads/writes guest linear
//! memory. Everything else (handle table semantics, coercions, invocation)
//! lives in `vbridge-kernel` untouched by any of this.

pub mod guest_memory;
pub mod linker;

use vbridge_abi::ReservedVariant;
use vbridge_kernel::HandleTable;

/// Per-instance state Wasmtime's `Store` carries: one handle table per
/// guest module instance, never shared across instances.
pub struct BridgeState {
    pub table: HandleTable,
}

impl BridgeState {
    pub fn new(variant: ReservedVariant) -> Self {
        BridgeState { table: HandleTable::new(variant) }
    }
}
