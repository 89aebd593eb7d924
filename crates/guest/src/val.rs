//! Safe, RAII-managed wrapper around a bridge handle.
//!
//! Every constructor here returns a handle that already owns one reference
//! (the host-side operation that produced it called `add`, which seeds
//! `refs: 1`); [`Val`]'s `Drop` balances that with exactly one `dec_ref`, and
//! `Clone` bumps the count with `inc_ref` first. Guest code never touches a
//! raw [`vbridge_abi::Handle`] directly.

use vbridge_abi::{reserved, Handle, TableIndex};

use crate::abi;
use crate::error::GuestDecodeError;

/// A live reference to a host value.
#[derive(Debug)]
pub struct Val(Handle);

impl Val {
    /// Wraps an already-owned handle (one a bridge operation just returned).
    fn owned(handle: Handle) -> Self {
        Val(handle)
    }

    /// Wraps a handle without taking a reference -- only sound for the
    /// permanently-reserved prefix, whose `dec_ref` is a no-op by contract.
    fn reserved(handle: Handle) -> Self {
        Val(handle)
    }

    pub fn handle(&self) -> Handle {
        self.0
    }

    pub fn null() -> Self {
        Val::reserved(reserved::NULL)
    }

    pub fn undefined() -> Self {
        Val::reserved(reserved::UNDEFINED)
    }

    pub fn bool(b: bool) -> Self {
        Val::reserved(if b { reserved::TRUE } else { reserved::FALSE })
    }

    pub fn global() -> Self {
        Val::reserved(reserved::GLOBAL)
    }

    pub fn new_array() -> Self {
        Val::owned(unsafe { abi::val_new_array() })
    }

    pub fn new_object() -> Self {
        Val::owned(unsafe { abi::val_new_object() })
    }

    pub fn int(v: i32) -> Self {
        Val::owned(unsafe { abi::val_make_int(v) })
    }

    pub fn uint(v: u32) -> Self {
        Val::owned(unsafe { abi::val_make_uint(v) })
    }

    pub fn bigint(v: i64) -> Self {
        Val::owned(unsafe { abi::val_make_bigint(v) })
    }

    pub fn biguint(v: u64) -> Self {
        Val::owned(unsafe { abi::val_make_biguint(v as i64) })
    }

    pub fn double(v: f64) -> Self {
        Val::owned(unsafe { abi::val_make_double(v) })
    }

    pub fn str(s: &str) -> Self {
        Val::owned(unsafe { abi::val_make_str(s.as_ptr() as u32, s.len() as u32) })
    }

    /// Builds an `argv`-shaped array for `call`/`call_method`/`construct`:
    /// each element is pushed by raw handle, matching how the host resolves
    /// argument lists (`push` stores the raw handle, not the value).
    pub fn args(values: &[&Val]) -> Self {
        let argv = Val::new_array();
        for v in values {
            unsafe { abi::val_push(argv.0, v.0) };
        }
        argv
    }

    /// Registers a guest function as a callback the host can invoke later.
    /// `f` is called as `fn(args: Handle, data: Handle) -> Handle`; `args`
    /// resolves to a host array of the call's actual arguments.
    #[cfg(target_arch = "wasm32")]
    pub fn callback(f: extern "C" fn(u32, u32) -> u32, data: &Val) -> Self {
        let table_index = f as usize as TableIndex;
        Val::owned(unsafe { abi::val_make_callback(table_index, data.0) })
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn callback(f: extern "C" fn(u32, u32) -> u32, data: &Val) -> Self {
        let table_index = crate::fallback::register_callback(f);
        Val::owned(abi::val_make_callback(table_index, data.0))
    }

    pub fn type_name(&self) -> Result<String, GuestDecodeError> {
        read_cstr(unsafe { abi::val_typeof(self.0) })
    }

    pub fn as_i32(&self) -> i32 {
        unsafe { abi::val_get_value_int(self.0) }
    }

    pub fn as_u32(&self) -> u32 {
        unsafe { abi::val_get_value_uint(self.0) }
    }

    pub fn as_i64(&self) -> i64 {
        unsafe { abi::val_get_value_bigint(self.0) }
    }

    pub fn as_u64(&self) -> u64 {
        unsafe { abi::val_get_value_biguint(self.0) as u64 }
    }

    pub fn as_f64(&self) -> f64 {
        unsafe { abi::val_get_value_double(self.0) }
    }

    /// `Err(NullPointer)` iff the handle isn't a string (the host returns a
    /// null pointer rather than trapping for this one accessor).
    pub fn as_string(&self) -> Result<String, GuestDecodeError> {
        read_cstr(unsafe { abi::val_get_value_string(self.0) })
    }

    pub fn get(&self, key: &Val) -> Val {
        Val::owned(unsafe { abi::val_get(self.0, key.0) })
    }

    pub fn get_str(&self, key: &str) -> Val {
        self.get(&Val::str(key))
    }

    pub fn set(&self, key: &Val, value: &Val) {
        unsafe { abi::val_set(self.0, key.0, value.0) }
    }

    pub fn set_str(&self, key: &str, value: &Val) {
        self.set(&Val::str(key), value)
    }

    pub fn has(&self, key: &Val) -> bool {
        unsafe { abi::val_has(self.0, key.0) != 0 }
    }

    pub fn has_own_property(&self, name: &str) -> bool {
        unsafe { abi::val_obj_has_own_prop(self.0, name.as_ptr() as u32, name.len() as u32) != 0 }
    }

    /// Appends `v`'s raw handle to this array, per the documented `push`
    /// quirk -- reading the slot back yields `v`'s handle number, not the
    /// value `v` resolves to.
    pub fn push(&self, v: &Val) {
        unsafe { abi::val_push(self.0, v.0) }
    }

    pub fn call(&self, argv: &Val) -> Val {
        Val::owned(unsafe { abi::val_func_call(self.0, argv.0) })
    }

    pub fn call_method(&self, name: &str, argv: &Val) -> Val {
        Val::owned(unsafe { abi::val_obj_call(self.0, name.as_ptr() as u32, name.len() as u32, argv.0) })
    }

    pub fn construct(&self, argv: &Val) -> Val {
        Val::owned(unsafe { abi::val_construct_new(self.0, argv.0) })
    }

    pub fn is_string(&self) -> bool {
        unsafe { abi::val_is_string(self.0) != 0 }
    }

    pub fn is_number(&self) -> bool {
        unsafe { abi::val_is_number(self.0) != 0 }
    }

    pub fn not(&self) -> bool {
        unsafe { abi::val_not(self.0) != 0 }
    }

    pub fn gt(&self, other: &Val) -> bool {
        unsafe { abi::val_gt(self.0, other.0) != 0 }
    }

    pub fn gte(&self, other: &Val) -> bool {
        unsafe { abi::val_gte(self.0, other.0) != 0 }
    }

    pub fn lt(&self, other: &Val) -> bool {
        unsafe { abi::val_lt(self.0, other.0) != 0 }
    }

    pub fn lte(&self, other: &Val) -> bool {
        unsafe { abi::val_lte(self.0, other.0) != 0 }
    }

    pub fn equals(&self, other: &Val) -> bool {
        unsafe { abi::val_equals(self.0, other.0) != 0 }
    }

    pub fn strictly_equals(&self, other: &Val) -> bool {
        unsafe { abi::val_strictly_equals(self.0, other.0) != 0 }
    }

    pub fn instance_of(&self, ctor: &Val) -> bool {
        unsafe { abi::val_instanceof(self.0, ctor.0) != 0 }
    }

    /// Re-enters the host's own exception mechanism; never returns.
    pub fn throw(&self) -> ! {
        unsafe { abi::val_throw(self.0) };
        unreachable!("val_throw always traps the current host call")
    }
}

impl Clone for Val {
    fn clone(&self) -> Self {
        unsafe { abi::val_inc_ref(self.0) };
        Val(self.0)
    }
}

impl Drop for Val {
    fn drop(&mut self) {
        unsafe { abi::val_dec_ref(self.0) };
    }
}

/// Reads a NUL-terminated, UTF-8 buffer the host wrote into guest memory.
/// Valid on wasm32 because guest and host share the one linear memory, and
/// in the native fallback because `write_guest_string` there hands back a
/// real, leaked pointer rather than a simulated offset.
fn read_cstr(ptr: u32) -> Result<String, GuestDecodeError> {
    if ptr == 0 {
        return Err(GuestDecodeError::NullPointer);
    }
    unsafe {
        let base = ptr as usize as *const u8;
        let mut len = 0usize;
        while *base.add(len) != 0 {
            len += 1;
        }
        let bytes = core::slice::from_raw_parts(base, len);
        core::str::from_utf8(bytes).map(str::to_string).map_err(|_| GuestDecodeError::InvalidUtf8)
    }
}

/// Logs `message` to the host's `console.log`, the extended reserved-handle
/// variant's one built-in convenience object.
pub fn console_log(message: &str) {
    let console = Val::global().get_str("console");
    let argv = Val::args(&[&Val::str(message)]);
    let _ = console.call_method("log", &argv);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_primitives() {
        assert_eq!(Val::int(-7).as_i32(), -7);
        assert_eq!(Val::uint(7).as_u32(), 7);
        assert_eq!(Val::bigint(i64::MIN).as_i64(), i64::MIN);
        assert_eq!(Val::biguint(u64::MAX).as_u64(), u64::MAX);
        assert_eq!(Val::double(1.5).as_f64(), 1.5);
        assert_eq!(Val::str("hi").as_string().unwrap(), "hi");
    }

    #[test]
    fn typeof_null_reads_object() {
        assert_eq!(Val::null().type_name().unwrap(), "object");
        assert_eq!(Val::undefined().type_name().unwrap(), "undefined");
    }

    #[test]
    fn object_property_round_trip() {
        let obj = Val::new_object();
        obj.set_str("answer", &Val::int(42));
        assert!(obj.has_own_property("answer"));
        assert_eq!(obj.get_str("answer").as_i32(), 42);
    }

    #[test]
    fn console_log_does_not_panic() {
        console_log("hello from a guest test");
    }

    #[test]
    fn callback_round_trip_through_func_call() {
        extern "C" fn double_first_arg(args: u32, _data: u32) -> u32 {
            // `args` is a host array whose 0th element is the first call
            // argument, already resolved to its handle.
            let args = Val::owned(args);
            let first = args.get(&Val::uint(0));
            let doubled = Val::int(first.as_i32() * 2);
            std::mem::forget(args);
            let h = doubled.handle();
            std::mem::forget(doubled);
            h
        }

        let data = Val::undefined();
        let cb = Val::callback(double_first_arg, &data);
        let argv = Val::args(&[&Val::int(21)]);
        let result = cb.call(&argv);
        assert_eq!(result.as_i32(), 42);
    }

    #[test]
    fn construct_new_error_is_an_instance_of_error() {
        let error_ctor = Val::global().get_str("Error");
        let argv = Val::args(&[&Val::str("boom")]);
        let err = error_ctor.construct(&argv);
        assert!(err.instance_of(&error_ctor));
        assert_eq!(err.get_str("message").as_string().unwrap(), "boom");
    }
}
