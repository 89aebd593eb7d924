//! The host-side operation kernel.
//!
//! Every function here is engine-neutral -- it only touches a [`HandleTable`]
//! and a [`BridgeContext`] for the handful of operations that need guest
//! memory or the guest's indirect call table. `crates/host` wires these onto
//! a Wasmtime `Linker`; nothing in this module knows Wasmtime exists.

use std::rc::Rc;

use vbridge_abi::{GuestLen, GuestPtr, Handle, TableIndex};

use crate::error::{BridgeError, KernelResult};
use crate::handle_table::HandleTable;
use crate::value::{self, FunctionValue, HostValue, Object};

/// What an embedding must provide so the kernel can cross the guest/host
/// boundary: memory access and the guest's indirect function table.
pub trait BridgeContext {
    fn table(&mut self) -> &mut HandleTable;

    fn read_guest_utf8(&mut self, ptr: GuestPtr, len: GuestLen) -> KernelResult<String>;

    /// Allocates `s` inside guest memory (via the guest's exported
    /// allocator) and writes its UTF-8 bytes, returning the pointer. The
    /// guest owns the returned buffer once this call returns.
    fn write_guest_string(&mut self, s: &str) -> KernelResult<GuestPtr>;

    /// Invokes the guest function at `table_index` as
    /// `fn(args: Handle, data: Handle) -> Handle`, per `val_make_callback`'s
    /// calling convention.
    fn call_indirect(&mut self, table_index: TableIndex, args: Handle, data: Handle) -> KernelResult<Handle>;
}

fn thrown_to_string(thrown: &HostValue) -> String {
    thrown.display()
}

/// Wraps a thrown value that isn't already `Error`-shaped into one. Values
/// thrown from `Error` (or anything built through `new Error(...)`/a
/// callback that re-throws one) pass through unchanged.
pub fn normalize_thrown(table: &HandleTable, thrown: HostValue) -> HostValue {
    if let HostValue::Object(o) = &thrown {
        if o.borrow().ctor.as_ref().is_some_and(|c| c.same_identity(&table.error_ctor())) {
            return thrown;
        }
    }
    let message = thrown_to_string(&thrown);
    let mut props = std::collections::HashMap::new();
    props.insert("message".to_string(), HostValue::str(message));
    props.insert("cause".to_string(), thrown.clone());
    if let HostValue::Object(o) = &thrown {
        let b = o.borrow();
        if let Some(name) = b.props.get("name") {
            props.insert("name".to_string(), name.clone());
        }
        if let Some(code) = b.props.get("code") {
            props.insert("code".to_string(), code.clone());
        }
    }
    HostValue::object(Object { props, ctor: Some(table.error_ctor()) })
}

fn resolve_argv(table: &mut HandleTable, argv: Handle) -> Vec<HostValue> {
    match table.get(argv) {
        HostValue::Array(arr) => arr
            .borrow()
            .iter()
            .map(|el| {
                let h = match el {
                    HostValue::Number(n) => *n as u32,
                    _ => 0,
                };
                table.get(h)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Invokes `f` with `this`/`args`, dispatching through the guest's indirect
/// table when `f` is a registered callback (see `make_callback`).
fn invoke(ctx: &mut impl BridgeContext, f: &HostValue, this: &HostValue, args: &[HostValue]) -> Result<HostValue, HostValue> {
    let HostValue::Function(func) = f else {
        return Err(HostValue::str(format!("{} is not a function", f.display())));
    };
    match func.as_ref() {
        FunctionValue::Native(entry) => (entry.call)(this, args),
        FunctionValue::Callback { table_index, data } => {
            let argv = HostValue::array(args.to_vec());
            let a_handle = ctx.table().add(argv);
            // Intentionally not dec_ref'd: the packed argv array is never
            // reclaimed here, so a guest callback that wants to hold onto an
            // argument past the call must inc_ref it itself.
            match ctx.call_indirect(*table_index, a_handle, *data) {
                Ok(result_handle) => Ok(ctx.table().get(result_handle)),
                Err(e) => Err(HostValue::str(e.to_string())),
            }
        }
    }
}

fn finish_call(ctx: &mut impl BridgeContext, result: Result<HostValue, HostValue>) -> Handle {
    match result {
        Ok(v) => ctx.table().add(v),
        Err(thrown) => {
            let err = normalize_thrown(ctx.table(), thrown);
            ctx.table().add(err)
        }
    }
}

// --- Construction -----------------------------------------------------

pub fn new_array(ctx: &mut impl BridgeContext) -> Handle {
    ctx.table().add(HostValue::array(Vec::new()))
}

pub fn new_object(ctx: &mut impl BridgeContext) -> Handle {
    ctx.table().add(HostValue::object(Object::default()))
}

pub fn make_str(ctx: &mut impl BridgeContext, ptr: GuestPtr, len: GuestLen) -> KernelResult<Handle> {
    let s = ctx.read_guest_utf8(ptr, len)?;
    Ok(ctx.table().add(HostValue::str(s)))
}

pub fn make_int(ctx: &mut impl BridgeContext, v: i32) -> Handle {
    ctx.table().add(HostValue::Number(v as f64))
}

pub fn make_uint(ctx: &mut impl BridgeContext, v: u32) -> Handle {
    ctx.table().add(HostValue::Number(v as f64))
}

pub fn make_double(ctx: &mut impl BridgeContext, v: f64) -> Handle {
    ctx.table().add(HostValue::Number(v))
}

pub fn make_bigint(ctx: &mut impl BridgeContext, v: i64) -> Handle {
    ctx.table().add(HostValue::BigInt(v as i128))
}

pub fn make_biguint(ctx: &mut impl BridgeContext, raw: i64) -> Handle {
    ctx.table().add(HostValue::BigInt(value::widen_to_biguint(raw)))
}

pub fn make_callback(ctx: &mut impl BridgeContext, table_index: TableIndex, data: Handle) -> Handle {
    ctx.table().add(HostValue::Function(Rc::new(FunctionValue::Callback { table_index, data })))
}

// --- Reading back -------------------------------------------------------

pub fn typeof_(ctx: &mut impl BridgeContext, h: Handle) -> KernelResult<GuestPtr> {
    let v = ctx.table().get(h);
    ctx.write_guest_string(v.type_name())
}

pub fn get_value_int(ctx: &mut impl BridgeContext, h: Handle) -> i32 {
    value::to_i32(&ctx.table().get(h))
}

pub fn get_value_uint(ctx: &mut impl BridgeContext, h: Handle) -> u32 {
    value::to_u32(&ctx.table().get(h))
}

pub fn get_value_bigint(ctx: &mut impl BridgeContext, h: Handle) -> i64 {
    value::to_i64(&ctx.table().get(h))
}

pub fn get_value_biguint(ctx: &mut impl BridgeContext, h: Handle) -> u64 {
    value::to_u64_clamped(&ctx.table().get(h))
}

pub fn get_value_double(ctx: &mut impl BridgeContext, h: Handle) -> f64 {
    ctx.table().get(h).to_f64()
}

/// Returns a null guest pointer for a non-string handle rather than erroring
/// -- callers that need the distinction should check `val_is_string` first.
pub fn get_value_string(ctx: &mut impl BridgeContext, h: Handle) -> KernelResult<GuestPtr> {
    match ctx.table().get(h) {
        HostValue::Str(s) => ctx.write_guest_string(&s),
        _ => Ok(0),
    }
}

// --- Properties -----------------------------------------------------------

pub fn get(ctx: &mut impl BridgeContext, obj: Handle, key: Handle) -> KernelResult<Handle> {
    let obj_v = ctx.table().get(obj);
    let key_v = ctx.table().get(key);
    match value::get_property(&obj_v, &key_v) {
        Ok(result) => Ok(ctx.table().add(result)),
        Err(thrown) => Err(BridgeError::Thrown(thrown_to_string(&thrown))),
    }
}

pub fn set(ctx: &mut impl BridgeContext, obj: Handle, key: Handle, val: Handle) -> KernelResult<()> {
    let obj_v = ctx.table().get(obj);
    let key_v = ctx.table().get(key);
    let val_v = ctx.table().get(val);
    value::set_property(&obj_v, &key_v, val_v).map_err(|thrown| BridgeError::Thrown(thrown_to_string(&thrown)))
}

pub fn has(ctx: &mut impl BridgeContext, obj: Handle, key: Handle) -> bool {
    let obj_v = ctx.table().get(obj);
    let key_v = ctx.table().get(key);
    value::has_property(&obj_v, &key_v)
}

pub fn obj_has_own_prop(ctx: &mut impl BridgeContext, obj: Handle, ptr: GuestPtr, len: GuestLen) -> KernelResult<bool> {
    let name = ctx.read_guest_utf8(ptr, len)?;
    let obj_v = ctx.table().get(obj);
    Ok(value::has_property(&obj_v, &HostValue::str(name)))
}

/// Appends the raw handle `v` to `arr` -- not the value it resolves to.
/// `push` and `resolve_argv` are a matched pair: `push` stores the handle
/// number itself, and `resolve_argv` is what turns that number back into
/// the value it names when the array is later used as an argument list.
/// Reading either one on its own looks like a bug; only read together do
/// they make sense.
pub fn push(ctx: &mut impl BridgeContext, arr: Handle, v: Handle) {
    if let HostValue::Array(a) = ctx.table().get(arr) {
        a.borrow_mut().push(HostValue::Number(v as f64));
    }
}

// --- Predicates and comparisons -------------------------------------------

pub fn is_string(ctx: &mut impl BridgeContext, h: Handle) -> bool {
    ctx.table().get(h).is_string()
}

pub fn is_number(ctx: &mut impl BridgeContext, h: Handle) -> bool {
    ctx.table().get(h).is_number()
}

pub fn not(ctx: &mut impl BridgeContext, h: Handle) -> bool {
    !ctx.table().get(h).to_bool()
}

pub fn gt(ctx: &mut impl BridgeContext, a: Handle, b: Handle) -> bool {
    value::compare(&ctx.table().get(a), &ctx.table().get(b)) == Some(std::cmp::Ordering::Greater)
}

pub fn gte(ctx: &mut impl BridgeContext, a: Handle, b: Handle) -> bool {
    matches!(value::compare(&ctx.table().get(a), &ctx.table().get(b)), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))
}

pub fn lt(ctx: &mut impl BridgeContext, a: Handle, b: Handle) -> bool {
    value::compare(&ctx.table().get(a), &ctx.table().get(b)) == Some(std::cmp::Ordering::Less)
}

pub fn lte(ctx: &mut impl BridgeContext, a: Handle, b: Handle) -> bool {
    matches!(value::compare(&ctx.table().get(a), &ctx.table().get(b)), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))
}

pub fn equals(ctx: &mut impl BridgeContext, a: Handle, b: Handle) -> bool {
    value::loose_eq(&ctx.table().get(a), &ctx.table().get(b))
}

pub fn strictly_equals(ctx: &mut impl BridgeContext, a: Handle, b: Handle) -> bool {
    value::strict_eq(&ctx.table().get(a), &ctx.table().get(b))
}

pub fn instanceof(ctx: &mut impl BridgeContext, a: Handle, b: Handle) -> bool {
    value::instanceof(&ctx.table().get(a), &ctx.table().get(b))
}

// --- Invocation --------------------------------------------------------

pub fn func_call(ctx: &mut impl BridgeContext, func: Handle, argv: Handle) -> Handle {
    let f = ctx.table().get(func);
    let args = resolve_argv(ctx.table(), argv);
    let result = invoke(ctx, &f, &HostValue::Undefined, &args);
    finish_call(ctx, result)
}

pub fn obj_call(ctx: &mut impl BridgeContext, obj: Handle, ptr: GuestPtr, len: GuestLen, argv: Handle) -> KernelResult<Handle> {
    let name = ctx.read_guest_utf8(ptr, len)?;
    let obj_v = ctx.table().get(obj);
    let method = value::get_property(&obj_v, &HostValue::str(name)).unwrap_or(HostValue::Undefined);
    let args = resolve_argv(ctx.table(), argv);
    let result = invoke(ctx, &method, &obj_v, &args);
    Ok(finish_call(ctx, result))
}

pub fn construct_new(ctx: &mut impl BridgeContext, cls: Handle, argv: Handle) -> Handle {
    let cls_v = ctx.table().get(cls);
    let args = resolve_argv(ctx.table(), argv);
    match invoke(ctx, &cls_v, &HostValue::Undefined, &args) {
        Ok(value) => {
            if let HostValue::Object(o) = &value {
                o.borrow_mut().ctor = Some(cls_v);
            }
            ctx.table().add(value)
        }
        Err(thrown) => {
            let err = normalize_thrown(ctx.table(), thrown);
            ctx.table().add(err)
        }
    }
}

/// `val_throw`: re-enters the host's own exception mechanism, so this always
/// traps rather than returning a handle.
pub fn throw(ctx: &mut impl BridgeContext, h: Handle) -> BridgeError {
    let v = ctx.table().get(h);
    BridgeError::Thrown(thrown_to_string(&v))
}

// --- Lifecycle and diagnostics ---------------------------------------------

pub fn inc_ref(ctx: &mut impl BridgeContext, h: Handle) {
    ctx.table().inc_ref(h);
}

pub fn dec_ref(ctx: &mut impl BridgeContext, h: Handle) {
    ctx.table().dec_ref(h);
}

pub fn print_object_map(ctx: &mut impl BridgeContext) {
    for (handle, refs, type_name, rendering) in ctx.table().debug_entries() {
        tracing::info!(handle, refs, type_name, "{rendering}");
    }
}

pub fn reset_object_map(ctx: &mut impl BridgeContext) {
    ctx.table().reset();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle_table::HandleTable;
    use vbridge_abi::ReservedVariant;

    /// A `BridgeContext` with an in-process guest "memory": a plain `Vec<u8>`
    /// arena it bump-allocates from, and an indirect table of Rust closures
    /// standing in for guest functions. Good enough to exercise every kernel
    /// op without Wasmtime.
    struct FakeGuest {
        table: HandleTable,
        arena: Vec<u8>,
        functions: Vec<Box<dyn Fn(&mut FakeGuest, Handle, Handle) -> Handle>>,
    }

    impl FakeGuest {
        fn new() -> Self {
            FakeGuest { table: HandleTable::new(ReservedVariant::Extended), arena: Vec::new(), functions: Vec::new() }
        }

        fn register(&mut self, f: impl Fn(&mut FakeGuest, Handle, Handle) -> Handle + 'static) -> TableIndex {
            self.functions.push(Box::new(f));
            (self.functions.len() - 1) as TableIndex
        }
    }

    impl BridgeContext for FakeGuest {
        fn table(&mut self) -> &mut HandleTable {
            &mut self.table
        }

        fn read_guest_utf8(&mut self, ptr: GuestPtr, len: GuestLen) -> KernelResult<String> {
            let (ptr, len) = (ptr as usize, len as usize);
            let bytes = self.arena.get(ptr..ptr + len).ok_or(BridgeError::MemoryAccess)?;
            String::from_utf8(bytes.to_vec()).map_err(|_| BridgeError::InvalidUtf8)
        }

        fn write_guest_string(&mut self, s: &str) -> KernelResult<GuestPtr> {
            let ptr = self.arena.len() as GuestPtr;
            self.arena.extend_from_slice(s.as_bytes());
            Ok(ptr)
        }

        fn call_indirect(&mut self, table_index: TableIndex, args: Handle, data: Handle) -> KernelResult<Handle> {
            // Swap the table out so `self` is free for the closure to call
            // back into, then restore it.
            let functions = std::mem::take(&mut self.functions);
            let result = match functions.get(table_index as usize) {
                Some(f) => Ok(f(self, args, data)),
                None => Err(BridgeError::IndirectCall("unknown index".into())),
            };
            self.functions = functions;
            result
        }
    }

    fn write_str(g: &mut FakeGuest, s: &str) -> (GuestPtr, GuestLen) {
        let ptr = g.write_guest_string(s).unwrap();
        (ptr, s.len() as GuestLen)
    }

    #[test]
    fn object_round_trip_through_get_set() {
        let mut g = FakeGuest::new();
        let obj = new_object(&mut g);
        let (ptr, len) = write_str(&mut g, "answer");
        let key = make_str(&mut g, ptr, len).unwrap();
        let val = make_int(&mut g, 42);
        set(&mut g, obj, key, val).unwrap();
        let got = get(&mut g, obj, key).unwrap();
        assert_eq!(get_value_int(&mut g, got), 42);
        assert!(has(&mut g, obj, key));
    }

    #[test]
    fn get_on_null_traps() {
        let mut g = FakeGuest::new();
        let key = make_int(&mut g, 0);
        assert!(get(&mut g, vbridge_abi::reserved::NULL, key).is_err());
    }

    #[test]
    fn func_call_invokes_native_console_log_without_trapping() {
        let mut g = FakeGuest::new();
        let console = g.table.global();
        let log = value::get_property(&console, &HostValue::str("console")).unwrap();
        let log_fn = value::get_property(&log, &HostValue::str("log")).unwrap();
        let log_handle = g.table().add(log_fn);
        let argv = new_array(&mut g);
        let arg = make_str(&mut g, 0, 0).unwrap();
        push(&mut g, argv, arg);
        let result = func_call(&mut g, log_handle, argv);
        assert!(matches!(g.table().get(result), HostValue::Undefined));
    }

    #[test]
    fn thrown_plain_string_gets_normalized_into_an_error_object() {
        let mut g = FakeGuest::new();
        let thrower = HostValue::native_fn("thrower", |_this, _args| Err(HostValue::str("boom")));
        let func = g.table().add(thrower);
        let argv = new_array(&mut g);
        let result = func_call(&mut g, func, argv);
        let resolved = g.table().get(result);
        let HostValue::Object(o) = resolved else { panic!("expected a normalized error object") };
        assert!(matches!(o.borrow().props.get("message"), Some(HostValue::Str(s)) if s.as_ref() == "boom"));
        let error_ctor_handle = {
            let global = g.table.global();
            let error_ctor = value::get_property(&global, &HostValue::str("Error")).unwrap();
            g.table().add(error_ctor)
        };
        assert!(instanceof(&mut g, result, error_ctor_handle));
    }

    #[test]
    fn make_callback_dispatches_through_the_indirect_table() {
        let mut g = FakeGuest::new();
        let idx = g.register(|g, args, _data| {
            // Echo back argv[0] doubled.
            let arr = g.table().get(args);
            let HostValue::Array(a) = arr else { return g.table().add(HostValue::Undefined) };
            let first = a.borrow().first().cloned().unwrap_or(HostValue::Undefined);
            g.table().add(HostValue::Number(first.to_f64() * 2.0))
        });
        let data = g.table().add(HostValue::Undefined);
        let cb = make_callback(&mut g, idx, data);
        let argv = new_array(&mut g);
        let arg = make_int(&mut g, 21);
        push(&mut g, argv, arg);
        let result = func_call(&mut g, cb, argv);
        assert_eq!(get_value_double(&mut g, result), 42.0);
    }

    #[test]
    fn construct_new_sets_instanceof() {
        let mut g = FakeGuest::new();
        let global = g.table.global();
        let error_ctor = value::get_property(&global, &HostValue::str("Error")).unwrap();
        let ctor_handle = g.table().add(error_ctor.clone());
        let argv = new_array(&mut g);
        let obj = construct_new(&mut g, ctor_handle, argv);
        assert!(instanceof(&mut g, obj, ctor_handle));
    }

    #[test]
    fn push_stores_the_raw_handle_not_the_resolved_value() {
        let mut g = FakeGuest::new();
        let arr = new_array(&mut g);
        let inner = make_int(&mut g, 7);
        push(&mut g, arr, inner);
        let index = make_uint(&mut g, 0);
        let raw = get(&mut g, arr, index).unwrap();
        assert_eq!(get_value_int(&mut g, raw), inner as i32);
    }

    #[test]
    fn reset_object_map_frees_everything_above_reserved() {
        let mut g = FakeGuest::new();
        let h = make_int(&mut g, 1);
        reset_object_map(&mut g);
        assert!(matches!(g.table().get(h), HostValue::Undefined));
    }
}
