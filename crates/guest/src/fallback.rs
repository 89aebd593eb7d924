//! Off-wasm32 stand-in for the `env` imports, backing [`crate::abi`] when
//! this crate's own tests run as a native binary instead of inside a real
//! guest. Implements the same operation kernel `vbridge-host` wires onto
//! Wasmtime, against a thread-local arena playing the part of guest linear
//! memory.

use std::cell::RefCell;

use vbridge_abi::{GuestLen, GuestPtr, Handle, TableIndex};
use vbridge_kernel::ops::{self, BridgeContext};
use vbridge_kernel::{BridgeError, HandleTable, KernelResult};

#[derive(Default)]
struct FallbackState {
    table: HandleTable,
    callbacks: Vec<extern "C" fn(u32, u32) -> u32>,
}

impl BridgeContext for FallbackState {
    fn table(&mut self) -> &mut HandleTable {
        &mut self.table
    }

    /// Guest and "host" share one real address space in this harness, so
    /// `ptr` is a genuine process pointer rather than an offset into some
    /// simulated linear memory -- the same address a guest's own `&str`
    /// already points at.
    fn read_guest_utf8(&mut self, ptr: GuestPtr, len: GuestLen) -> KernelResult<String> {
        if ptr == 0 {
            return Err(BridgeError::MemoryAccess);
        }
        let bytes = unsafe { std::slice::from_raw_parts(ptr as usize as *const u8, len as usize) };
        std::str::from_utf8(bytes).map(str::to_string).map_err(|_| BridgeError::InvalidUtf8)
    }

    /// Leaks a real, NUL-terminated buffer and hands back its address, the
    /// same contract `vbridge_alloc` gives a real wasm32 guest.
    fn write_guest_string(&mut self, s: &str) -> KernelResult<GuestPtr> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        let ptr = Box::into_raw(bytes.into_boxed_slice()) as *mut u8 as usize as GuestPtr;
        Ok(ptr)
    }

    /// Publishes this state back into the thread-local slot before invoking
    /// the "guest" function, and reclaims it afterwards -- a callback
    /// dispatched this way is free to call straight back into `abi::val_*`,
    /// which looks the state up the same way any top-level call does.
    fn call_indirect(&mut self, table_index: TableIndex, args: Handle, data: Handle) -> KernelResult<Handle> {
        let f = *self.callbacks.get(table_index as usize).ok_or_else(|| BridgeError::IndirectCall("unknown callback index".into()))?;
        let owned = std::mem::take(self);
        STATE.with(|s| *s.borrow_mut() = Some(owned));
        let result = f(args, data);
        let restored = STATE.with(|s| s.borrow_mut().take()).expect("fallback state missing after callback dispatch");
        *self = restored;
        Ok(result)
    }
}

thread_local! {
    static STATE: RefCell<Option<FallbackState>> = const { RefCell::new(None) };
}

fn with_state<R>(f: impl FnOnce(&mut FallbackState) -> R) -> R {
    let mut state = STATE.with(|s| s.borrow_mut().take()).unwrap_or_default();
    let result = f(&mut state);
    STATE.with(|s| *s.borrow_mut() = Some(state));
    result
}

/// Registers a native function as a guest callback target, returning the
/// index `make_callback` should be given. Only meaningful off wasm32: on a
/// real guest the function pointer's own value already is the table index.
pub fn register_callback(f: extern "C" fn(u32, u32) -> u32) -> TableIndex {
    with_state(|s| {
        s.callbacks.push(f);
        (s.callbacks.len() - 1) as TableIndex
    })
}

pub fn val_new_array() -> u32 {
    with_state(ops::new_array)
}
pub fn val_new_object() -> u32 {
    with_state(ops::new_object)
}
pub fn val_typeof(h: u32) -> u32 {
    with_state(|s| ops::typeof_(s, h)).expect("typeof never fails to materialise a type name string")
}
pub fn val_construct_new(cls: u32, argv: u32) -> u32 {
    with_state(|s| ops::construct_new(s, cls, argv))
}
pub fn val_func_call(func: u32, argv: u32) -> u32 {
    with_state(|s| ops::func_call(s, func, argv))
}
pub fn val_push(arr: u32, v: u32) {
    with_state(|s| ops::push(s, arr, v))
}
pub fn val_make_int(v: i32) -> u32 {
    with_state(|s| ops::make_int(s, v))
}
pub fn val_make_uint(v: u32) -> u32 {
    with_state(|s| ops::make_uint(s, v))
}
pub fn val_make_bigint(v: i64) -> u32 {
    with_state(|s| ops::make_bigint(s, v))
}
pub fn val_make_biguint(raw: i64) -> u32 {
    with_state(|s| ops::make_biguint(s, raw))
}
pub fn val_make_double(v: f64) -> u32 {
    with_state(|s| ops::make_double(s, v))
}
pub fn val_make_str(ptr: u32, len: u32) -> u32 {
    with_state(|s| ops::make_str(s, ptr, len)).expect("val_make_str traps on invalid UTF-8 or memory access")
}
pub fn val_get_value_int(h: u32) -> i32 {
    with_state(|s| ops::get_value_int(s, h))
}
pub fn val_get_value_uint(h: u32) -> u32 {
    with_state(|s| ops::get_value_uint(s, h))
}
pub fn val_get_value_bigint(h: u32) -> i64 {
    with_state(|s| ops::get_value_bigint(s, h))
}
pub fn val_get_value_biguint(h: u32) -> i64 {
    with_state(|s| ops::get_value_biguint(s, h)) as i64
}
pub fn val_get_value_double(h: u32) -> f64 {
    with_state(|s| ops::get_value_double(s, h))
}
pub fn val_get_value_string(h: u32) -> u32 {
    with_state(|s| ops::get_value_string(s, h)).expect("val_get_value_string never fails outside of allocation")
}
pub fn val_get(obj: u32, key: u32) -> u32 {
    with_state(|s| ops::get(s, obj, key)).expect("val_get traps on a null/undefined receiver")
}
pub fn val_set(obj: u32, key: u32, val: u32) {
    with_state(|s| ops::set(s, obj, key, val)).expect("val_set traps on a null/undefined receiver");
}
pub fn val_has(obj: u32, key: u32) -> u32 {
    with_state(|s| ops::has(s, obj, key)) as u32
}
pub fn val_is_string(h: u32) -> u32 {
    with_state(|s| ops::is_string(s, h)) as u32
}
pub fn val_is_number(h: u32) -> u32 {
    with_state(|s| ops::is_number(s, h)) as u32
}
pub fn val_not(h: u32) -> u32 {
    with_state(|s| ops::not(s, h)) as u32
}
pub fn val_gt(a: u32, b: u32) -> u32 {
    with_state(|s| ops::gt(s, a, b)) as u32
}
pub fn val_gte(a: u32, b: u32) -> u32 {
    with_state(|s| ops::gte(s, a, b)) as u32
}
pub fn val_lt(a: u32, b: u32) -> u32 {
    with_state(|s| ops::lt(s, a, b)) as u32
}
pub fn val_lte(a: u32, b: u32) -> u32 {
    with_state(|s| ops::lte(s, a, b)) as u32
}
pub fn val_equals(a: u32, b: u32) -> u32 {
    with_state(|s| ops::equals(s, a, b)) as u32
}
pub fn val_strictly_equals(a: u32, b: u32) -> u32 {
    with_state(|s| ops::strictly_equals(s, a, b)) as u32
}
pub fn val_instanceof(a: u32, b: u32) -> u32 {
    with_state(|s| ops::instanceof(s, a, b)) as u32
}
pub fn val_throw(h: u32) {
    let err = with_state(|s| ops::throw(s, h));
    panic!("{err}");
}
pub fn val_obj_call(obj: u32, name_ptr: u32, name_len: u32, argv: u32) -> u32 {
    with_state(|s| ops::obj_call(s, obj, name_ptr, name_len, argv)).expect("val_obj_call traps on a null/undefined receiver")
}
pub fn val_obj_has_own_prop(obj: u32, name_ptr: u32, name_len: u32) -> u32 {
    with_state(|s| ops::obj_has_own_prop(s, obj, name_ptr, name_len)).expect("val_obj_has_own_prop traps only on bad guest memory") as u32
}
pub fn val_make_callback(table_index: u32, data: u32) -> u32 {
    with_state(|s| ops::make_callback(s, table_index, data))
}
pub fn print_object_map() {
    with_state(ops::print_object_map)
}
pub fn reset_object_map() {
    with_state(ops::reset_object_map)
}
pub fn val_inc_ref(h: u32) {
    with_state(|s| ops::inc_ref(s, h))
}
pub fn val_dec_ref(h: u32) {
    with_state(|s| ops::dec_ref(s, h))
}
