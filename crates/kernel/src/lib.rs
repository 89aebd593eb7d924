//! Engine-neutral implementation of the value-bridge ABI: the handle table
//! and the operation kernel built on top of it.
//!
//! Nothing in this crate knows about Wasmtime, guest memory layout, or a
//! wasm indirect call table beyond the [`ops::BridgeContext`] trait an
//! embedding implements. `crates/host` is the Wasmtime embedding; this crate
//! is what it wraps a `Linker` around.

pub mod error;
pub mod handle_table;
pub mod ops;
pub mod value;

pub use error::{BridgeError, KernelResult};
pub use handle_table::HandleTable;
pub use ops::BridgeContext;
pub use value::HostValue;
