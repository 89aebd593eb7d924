//! Guest linear-memory access plumbing: decoding guest-owned UTF-8 spans and
//! allocating guest-owned buffers to hand strings back.

use vbridge_abi::{GuestLen, GuestPtr};
use vbridge_kernel::BridgeError;
use wasmtime::Caller;

use crate::BridgeState;

fn memory(caller: &mut Caller<'_, BridgeState>) -> Result<wasmtime::Memory, BridgeError> {
    caller.get_export("memory").and_then(|export| export.into_memory()).ok_or(BridgeError::MemoryMissing)
}

/// Reads `ptr..ptr+len` out of guest memory and decodes it as UTF-8.
pub fn read_guest_utf8(caller: &mut Caller<'_, BridgeState>, ptr: GuestPtr, len: GuestLen) -> Result<String, BridgeError> {
    let memory = memory(caller)?;
    let start = ptr as usize;
    let end = start.checked_add(len as usize).ok_or(BridgeError::MemoryAccess)?;
    let bytes = memory.data(&caller).get(start..end).ok_or(BridgeError::MemoryAccess)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| BridgeError::InvalidUtf8)
}

/// Calls the guest's exported `vbridge_alloc(len) -> ptr` and writes `s`'s
/// UTF-8 bytes, plus a trailing NUL, into the returned buffer. The guest
/// owns the buffer from this point on.
pub fn write_guest_string(caller: &mut Caller<'_, BridgeState>, s: &str) -> Result<GuestPtr, BridgeError> {
    let alloc = caller
        .get_export("vbridge_alloc")
        .and_then(|export| export.into_func())
        .ok_or(BridgeError::AllocationFailed)?
        .typed::<u32, u32>(&caller)
        .map_err(|_| BridgeError::AllocationFailed)?;

    let len = u32::try_from(s.len() + 1).map_err(|_| BridgeError::AllocationFailed)?;
    let ptr = alloc.call(&mut *caller, len).map_err(|_| BridgeError::AllocationFailed)?;

    let memory = memory(caller)?;
    memory.write(&mut *caller, ptr as usize, s.as_bytes()).map_err(|_| BridgeError::MemoryAccess)?;
    memory.write(&mut *caller, ptr as usize + s.len(), &[0u8]).map_err(|_| BridgeError::MemoryAccess)?;
    Ok(ptr)
}
