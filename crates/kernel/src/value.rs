//! The host-side value representation and its coercion rules.
//!
//! `HostValue` stands in for "whatever the embedding host's native value
//! type is" -- a JS value. The coercions below follow the abstract-operation
//! shapes ECMA-262 uses for `ToInt32`/`ToNumber`/loose equality, simplified
//! to what the ABI actually exercises: there is no boxed `Number`/`String`,
//! no prototype chain, and no user-defined `valueOf`/`toString`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use vbridge_abi::{Handle, TableIndex};

/// A host object: a property bag plus the constructor it was built with, if
/// any (used by `instanceof`).
#[derive(Debug, Default)]
pub struct Object {
    pub props: HashMap<String, HostValue>,
    pub ctor: Option<HostValue>,
}

/// A native function the kernel implements directly (`console.log`, the
/// `Error` constructor, ...).
pub struct NativeFn {
    pub name: &'static str,
    pub call: Box<dyn Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostValue>>,
}

impl std::fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFn").field("name", &self.name).finish()
    }
}

/// A function value: either one the kernel implements itself, or a guest
/// closure registered through `make_callback`.
#[derive(Debug)]
pub enum FunctionValue {
    Native(NativeFn),
    Callback { table_index: TableIndex, data: Handle },
}

/// An opaque, identity-only value. Two symbols are equal only to themselves.
#[derive(Debug, Clone)]
pub struct Symbol(pub Rc<()>);

impl Symbol {
    pub fn new() -> Self {
        Symbol(Rc::new(()))
    }
}

/// The host-side value a handle can resolve to.
///
/// Reference types (`Object`, `Array`, `Function`) carry `Rc` so cloning a
/// `HostValue` is cheap and preserves identity for `Rc::ptr_eq` comparisons;
/// primitives are compared and interned by value.
#[derive(Debug, Clone)]
pub enum HostValue {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    /// Arbitrary-precision-enough integer storage; the ABI only ever moves
    /// 64-bit signed/unsigned quantities through it.
    BigInt(i128),
    Str(Rc<str>),
    Symbol(Symbol),
    Object(Rc<RefCell<Object>>),
    Array(Rc<RefCell<Vec<HostValue>>>),
    Function(Rc<FunctionValue>),
}

impl HostValue {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        HostValue::Str(s.into())
    }

    pub fn object(o: Object) -> Self {
        HostValue::Object(Rc::new(RefCell::new(o)))
    }

    pub fn array(elems: Vec<HostValue>) -> Self {
        HostValue::Array(Rc::new(RefCell::new(elems)))
    }

    pub fn native_fn(name: &'static str, call: impl Fn(&HostValue, &[HostValue]) -> Result<HostValue, HostValue> + 'static) -> Self {
        HostValue::Function(Rc::new(FunctionValue::Native(NativeFn { name, call: Box::new(call) })))
    }

    /// `typeof` as the bridge's ABI reports it: `null` reads back as
    /// `"object"`, matching the host language's own quirk.
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null | HostValue::Object(_) | HostValue::Array(_) => "object",
            HostValue::Undefined => "undefined",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::BigInt(_) => "bigint",
            HostValue::Str(_) => "string",
            HostValue::Symbol(_) => "symbol",
            HostValue::Function(_) => "function",
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, HostValue::Str(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, HostValue::Number(_))
    }

    /// Truthiness, following the host language's falsy set.
    pub fn to_bool(&self) -> bool {
        match self {
            HostValue::Null | HostValue::Undefined => false,
            HostValue::Bool(b) => *b,
            HostValue::Number(n) => *n != 0.0 && !n.is_nan(),
            HostValue::BigInt(n) => *n != 0,
            HostValue::Str(s) => !s.is_empty(),
            HostValue::Symbol(_) | HostValue::Object(_) | HostValue::Array(_) | HostValue::Function(_) => true,
        }
    }

    /// `ToNumber`. Reference types and symbols have no sensible numeric
    /// coercion in this model and read back as `NaN`.
    pub fn to_f64(&self) -> f64 {
        match self {
            HostValue::Null => 0.0,
            HostValue::Undefined => f64::NAN,
            HostValue::Bool(b) => if *b { 1.0 } else { 0.0 },
            HostValue::Number(n) => *n,
            HostValue::BigInt(n) => *n as f64,
            HostValue::Str(s) => {
                let t = s.trim();
                if t.is_empty() { 0.0 } else { t.parse::<f64>().unwrap_or(f64::NAN) }
            }
            HostValue::Symbol(_) | HostValue::Object(_) | HostValue::Array(_) | HostValue::Function(_) => f64::NAN,
        }
    }

    /// String form used for property keys, thrown-value messages, and
    /// `console.log` arguments.
    pub fn display(&self) -> String {
        match self {
            HostValue::Null => "null".to_string(),
            HostValue::Undefined => "undefined".to_string(),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Number(n) => format_number(*n),
            HostValue::BigInt(n) => format!("{n}n"),
            HostValue::Str(s) => s.to_string(),
            HostValue::Symbol(_) => "Symbol()".to_string(),
            HostValue::Object(o) => {
                if let Some(HostValue::Str(msg)) = o.borrow().props.get("message") {
                    format!("Error: {msg}")
                } else {
                    "[object Object]".to_string()
                }
            }
            HostValue::Array(a) => a.borrow().iter().map(HostValue::display).collect::<Vec<_>>().join(","),
            HostValue::Function(f) => match f.as_ref() {
                FunctionValue::Native(n) => format!("function {}() {{ [native code] }}", n.name),
                FunctionValue::Callback { .. } => "function () { [guest callback] }".to_string(),
            },
        }
    }

    fn identity_ptr(&self) -> Option<usize> {
        match self {
            HostValue::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
            HostValue::Array(a) => Some(Rc::as_ptr(a) as *const () as usize),
            HostValue::Function(f) => Some(Rc::as_ptr(f) as *const () as usize),
            HostValue::Symbol(s) => Some(Rc::as_ptr(&s.0) as *const () as usize),
            _ => None,
        }
    }

    /// Same object identity (`Rc::ptr_eq`) for reference types; never true
    /// across different variants, including two equal-valued primitives.
    pub fn same_identity(&self, other: &HostValue) -> bool {
        match (self.identity_ptr(), other.identity_ptr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Abstract equality (`==`): primitives coerce across numeric-ish types,
/// reference types compare by identity.
pub fn loose_eq(a: &HostValue, b: &HostValue) -> bool {
    use HostValue::*;
    match (a, b) {
        (Null | Undefined, Null | Undefined) => true,
        (Bool(x), Bool(y)) => x == y,
        (Number(x), Number(y)) => x == y,
        (BigInt(x), BigInt(y)) => x == y,
        (Str(x), Str(y)) => x == y,
        (Number(x), BigInt(y)) | (BigInt(y), Number(x)) => *x == *y as f64,
        (Str(s), Number(n)) | (Number(n), Str(s)) => s.trim().parse::<f64>().map(|v| v == *n).unwrap_or(false),
        (Str(s), BigInt(n)) | (BigInt(n), Str(s)) => s.trim().parse::<i128>().map(|v| v == *n).unwrap_or(false),
        (Bool(_), other) => loose_eq(&Number(a.to_f64()), other),
        (other, Bool(_)) => loose_eq(other, &Number(b.to_f64())),
        (Object(_) | Array(_) | Function(_) | Symbol(_), Object(_) | Array(_) | Function(_) | Symbol(_)) => a.same_identity(b),
        _ => false,
    }
}

/// Strict equality (`===`): same variant, same value; no coercion, no
/// identity for primitives.
pub fn strict_eq(a: &HostValue, b: &HostValue) -> bool {
    use HostValue::*;
    match (a, b) {
        (Null, Null) | (Undefined, Undefined) => true,
        (Bool(x), Bool(y)) => x == y,
        (Number(x), Number(y)) => x == y,
        (BigInt(x), BigInt(y)) => x == y,
        (Str(x), Str(y)) => x == y,
        (Object(_), Object(_)) | (Array(_), Array(_)) | (Function(_), Function(_)) | (Symbol(_), Symbol(_)) => a.same_identity(b),
        _ => false,
    }
}

/// Relational comparison: lexical when both sides are strings, numeric
/// otherwise. `None` means "not comparable" (NaN involved), which every
/// relational operator reads as `false`.
pub fn compare(a: &HostValue, b: &HostValue) -> Option<Ordering> {
    if let (HostValue::Str(x), HostValue::Str(y)) = (a, b) {
        return Some(x.as_ref().cmp(y.as_ref()));
    }
    a.to_f64().partial_cmp(&b.to_f64())
}

pub fn instanceof(a: &HostValue, b: &HostValue) -> bool {
    match a {
        HostValue::Object(o) => o.borrow().ctor.as_ref().is_some_and(|c| c.same_identity(b)),
        HostValue::Array(_) | HostValue::Function(_) => false,
        _ => false,
    }
}

/// Key used to look up the reverse (value → handle) map during interning.
/// Primitives intern by value; reference types intern by identity, so two
/// `add()` calls with distinct `Rc` clones around the same allocation still
/// collapse to one handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InternKey {
    Null,
    Undefined,
    Bool(bool),
    Number(u64),
    BigInt(i128),
    Str(Rc<str>),
    Identity(usize),
}

impl InternKey {
    pub fn from_value(value: &HostValue) -> Option<InternKey> {
        match value {
            HostValue::Null => Some(InternKey::Null),
            HostValue::Undefined => Some(InternKey::Undefined),
            HostValue::Bool(b) => Some(InternKey::Bool(*b)),
            HostValue::Number(n) => Some(InternKey::Number(n.to_bits())),
            HostValue::BigInt(n) => Some(InternKey::BigInt(*n)),
            HostValue::Str(s) => Some(InternKey::Str(s.clone())),
            HostValue::Object(_) | HostValue::Array(_) | HostValue::Function(_) | HostValue::Symbol(_) => {
                value.identity_ptr().map(InternKey::Identity)
            }
        }
    }
}

/// `ToInt32` (ECMA-262 §7.1.6), saturating non-finite inputs to zero instead
/// of the spec's wrap-through-modulo (there is no bit pattern for `NaN` or
/// `Infinity` to wrap).
pub fn to_i32(v: &HostValue) -> i32 {
    match v {
        HostValue::BigInt(n) => *n as i32,
        _ => js_to_int32(v.to_f64()),
    }
}

/// `ToUint32` (ECMA-262 §7.1.7).
pub fn to_u32(v: &HostValue) -> u32 {
    match v {
        HostValue::BigInt(n) => *n as u32,
        _ => js_to_uint32(v.to_f64()),
    }
}

fn js_to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4294967296.0);
    if m >= 2147483648.0 { (m - 4294967296.0) as i32 } else { m as i32 }
}

fn js_to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4294967296.0) as u32
}

/// Signed 64-bit coercion backing `val_get_value_bigint`.
pub fn to_i64(v: &HostValue) -> i64 {
    match v {
        HostValue::BigInt(n) => *n as i64,
        _ => v.to_f64().trunc() as i64,
    }
}

/// Unsigned 64-bit coercion backing `val_get_value_biguint`, clamping
/// negative sources to zero rather than wrapping.
pub fn to_u64_clamped(v: &HostValue) -> u64 {
    match v {
        HostValue::BigInt(n) => {
            if *n < 0 { 0 } else { (*n).min(u64::MAX as i128) as u64 }
        }
        _ => {
            let f = v.to_f64().trunc();
            if f <= 0.0 { 0 } else if f >= u64::MAX as f64 { u64::MAX } else { f as u64 }
        }
    }
}

/// Widens a raw little-endian-signed 64-bit wasm argument into the unsigned
/// range: `val_make_biguint` receives a bit pattern that may have been
/// sign-extended on the way in, since wasm has no native unsigned i64.
pub fn widen_to_biguint(raw: i64) -> i128 {
    if raw < 0 { raw as i128 + (1i128 << 64) } else { raw as i128 }
}

/// Coerces a value used as an array index or object property name.
pub fn property_key(v: &HostValue) -> String {
    match v {
        HostValue::Str(s) => s.to_string(),
        other => other.display(),
    }
}

fn array_index(key: &HostValue) -> Option<usize> {
    match key {
        HostValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        HostValue::Str(s) => s.parse::<usize>().ok(),
        _ => None,
    }
}

fn is_length_key(key: &HostValue) -> bool {
    matches!(key, HostValue::Str(s) if s.as_ref() == "length")
}

/// `Reflect.get`-ish read used by `val_get` and `val_obj_call`'s method
/// lookup. Indexing `null`/`undefined` is the one property access that
/// actually throws in the host language; everything else just answers
/// `undefined` for an unknown key.
pub fn get_property(obj: &HostValue, key: &HostValue) -> Result<HostValue, HostValue> {
    match obj {
        HostValue::Null | HostValue::Undefined => {
            Err(HostValue::str(format!("Cannot read properties of {} (reading '{}')", obj.display(), property_key(key))))
        }
        HostValue::Array(a) => {
            let b = a.borrow();
            if let Some(idx) = array_index(key) {
                Ok(b.get(idx).cloned().unwrap_or(HostValue::Undefined))
            } else if is_length_key(key) {
                Ok(HostValue::Number(b.len() as f64))
            } else {
                Ok(HostValue::Undefined)
            }
        }
        HostValue::Object(o) => Ok(o.borrow().props.get(&property_key(key)).cloned().unwrap_or(HostValue::Undefined)),
        _ => Ok(HostValue::Undefined),
    }
}

/// `Reflect.set`-ish write used by `val_set`. Mirrors [`get_property`]'s
/// null/undefined TypeError; writes to non-container targets are dropped
/// rather than erroring, since the host language would silently ignore a
/// write to (say) a string's numeric index too.
pub fn set_property(obj: &HostValue, key: &HostValue, value: HostValue) -> Result<(), HostValue> {
    match obj {
        HostValue::Null | HostValue::Undefined => {
            Err(HostValue::str(format!("Cannot set properties of {} (setting '{}')", obj.display(), property_key(key))))
        }
        HostValue::Array(a) => {
            let mut b = a.borrow_mut();
            if let Some(idx) = array_index(key) {
                if idx >= b.len() {
                    b.resize(idx + 1, HostValue::Undefined);
                }
                b[idx] = value;
            } else if is_length_key(key) {
                let len = to_u32(&value) as usize;
                b.resize(len, HostValue::Undefined);
            }
            Ok(())
        }
        HostValue::Object(o) => {
            o.borrow_mut().props.insert(property_key(key), value);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// `Object.hasOwnProperty`-ish check used by `val_has` and
/// `val_obj_has_own_prop`. Never throws: an absent property and an
/// un-indexable target both read as `false`.
pub fn has_property(obj: &HostValue, key: &HostValue) -> bool {
    match obj {
        HostValue::Array(a) => {
            let b = a.borrow();
            array_index(key).is_some_and(|i| i < b.len()) || is_length_key(key)
        }
        HostValue::Object(o) => o.borrow().props.contains_key(&property_key(key)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typeof_null_is_object() {
        assert_eq!(HostValue::Null.type_name(), "object");
    }

    #[test]
    fn to_int32_wraps_like_ecma() {
        assert_eq!(to_i32(&HostValue::Number(4294967296.0)), 0);
        assert_eq!(to_i32(&HostValue::Number(2147483648.0)), i32::MIN);
        assert_eq!(to_i32(&HostValue::Number(f64::NAN)), 0);
    }

    #[test]
    fn widen_to_biguint_round_trips_extremes() {
        assert_eq!(widen_to_biguint(0), 0);
        assert_eq!(widen_to_biguint(-1), u64::MAX as i128);
        assert_eq!(widen_to_biguint(i64::MIN), 1i128 << 63);
    }

    #[test]
    fn loose_eq_treats_null_and_undefined_as_equal() {
        assert!(loose_eq(&HostValue::Null, &HostValue::Undefined));
        assert!(!strict_eq(&HostValue::Null, &HostValue::Undefined));
    }

    #[test]
    fn loose_eq_coerces_string_and_number() {
        assert!(loose_eq(&HostValue::str("5"), &HostValue::Number(5.0)));
    }

    #[test]
    fn reference_equality_requires_shared_allocation() {
        let a = HostValue::array(vec![]);
        let b = HostValue::array(vec![]);
        assert!(!a.same_identity(&b));
        assert!(a.same_identity(&a.clone()));
    }

    #[test]
    fn get_property_throws_on_null_receiver() {
        let key = HostValue::str("x");
        assert!(get_property(&HostValue::Null, &key).is_err());
        assert!(get_property(&HostValue::Undefined, &key).is_err());
    }

    #[test]
    fn array_length_tracks_sparse_writes() {
        let arr = HostValue::array(vec![HostValue::Number(1.0)]);
        set_property(&arr, &HostValue::str("5"), HostValue::Number(9.0)).unwrap();
        assert_eq!(get_property(&arr, &HostValue::str("length")).unwrap().to_f64(), 6.0);
    }
}
