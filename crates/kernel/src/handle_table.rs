//! The bidirectional, reference-counted handle table.
//!
//! Handles are dense `Vec` indices rather than a `HashMap`, so allocation is
//! "push and return the new length", which gives monotonic, never-reused
//! handles for free -- including across [`HandleTable::reset`], which only
//! punches holes above the reserved prefix rather than shrinking the vector.

use std::collections::HashMap;

use vbridge_abi::{reserved, Handle, ReservedVariant};

use crate::value::{FunctionValue, HostValue, InternKey, NativeFn, Object};

struct Entry {
    value: HostValue,
    refs: u64,
}

/// Owns every live host value reachable from the guest, keyed by handle.
pub struct HandleTable {
    variant: ReservedVariant,
    max_reserved: Handle,
    slots: Vec<Option<Entry>>,
    reverse: HashMap<InternKey, Handle>,
    /// The `Error` constructor, tracked independently of its handle so
    /// `normalize_thrown` keeps working after [`HandleTable::reset`] drops
    /// the handle it was first registered under.
    error_ctor: HostValue,
}

impl Default for HandleTable {
    fn default() -> Self {
        HandleTable::new(ReservedVariant::default())
    }
}

impl HandleTable {
    pub fn new(variant: ReservedVariant) -> Self {
        let mut table = HandleTable {
            variant,
            max_reserved: variant.max_reserved(),
            slots: Vec::new(),
            reverse: HashMap::new(),
            error_ctor: HostValue::Undefined,
        };

        let global = HostValue::object(Object::default());
        table.seed(HostValue::Null);
        table.seed(HostValue::Undefined);
        table.seed(HostValue::Bool(false));
        table.seed(HostValue::Bool(true));
        table.seed(global.clone());
        if variant == ReservedVariant::Extended {
            let console = HostValue::object(Object::default());
            if let HostValue::Object(c) = &console {
                c.borrow_mut().props.insert(
                    "log".to_string(),
                    HostValue::native_fn("log", |_this, args| {
                        let line = args.iter().map(HostValue::display).collect::<Vec<_>>().join(" ");
                        tracing::info!(target: "guest.console", "{line}");
                        Ok(HostValue::Undefined)
                    }),
                );
            }
            table.seed(console.clone());
            table.seed(HostValue::Symbol(crate::value::Symbol::new()));
            if let HostValue::Object(g) = &global {
                g.borrow_mut().props.insert("console".to_string(), console);
            }
        }

        let error_ctor = HostValue::Function(std::rc::Rc::new(FunctionValue::Native(NativeFn {
            name: "Error",
            call: Box::new(|_this, args| {
                let message = args.first().map(HostValue::display).unwrap_or_default();
                let mut props = HashMap::new();
                props.insert("message".to_string(), HostValue::str(message));
                Ok(HostValue::object(Object { props, ctor: None }))
            }),
        })));
        if let HostValue::Object(g) = &global {
            g.borrow_mut().props.insert("Error".to_string(), error_ctor.clone());
        }
        table.add(error_ctor.clone());
        table.error_ctor = error_ctor;

        table
    }

    fn seed(&mut self, value: HostValue) -> Handle {
        let handle = self.slots.len() as Handle;
        let key = InternKey::from_value(&value);
        self.slots.push(Some(Entry { value, refs: 1 }));
        if let Some(key) = key {
            self.reverse.insert(key, handle);
        }
        handle
    }

    pub fn variant(&self) -> ReservedVariant {
        self.variant
    }

    pub fn max_reserved(&self) -> Handle {
        self.max_reserved
    }

    pub fn error_ctor(&self) -> HostValue {
        self.error_ctor.clone()
    }

    pub fn global(&self) -> HostValue {
        self.get(reserved::GLOBAL)
    }

    /// Interns `value` and returns its handle, bumping the refcount of an
    /// existing entry rather than duplicating it when identity/value
    /// interning finds a hit.
    pub fn add(&mut self, value: HostValue) -> Handle {
        let key = InternKey::from_value(&value);
        if let Some(key) = &key {
            if let Some(&handle) = self.reverse.get(key) {
                if let Some(entry) = self.slots[handle as usize].as_mut() {
                    entry.refs += 1;
                    return handle;
                }
            }
        }
        let handle = self.slots.len() as Handle;
        self.slots.push(Some(Entry { value, refs: 1 }));
        if let Some(key) = key {
            self.reverse.insert(key, handle);
        }
        handle
    }

    /// Resolves a handle to its value. An unknown or freed handle resolves
    /// to `undefined` rather than panicking, so a guest holding onto a stale
    /// or garbage handle degrades gracefully instead of crashing the host.
    pub fn get(&self, handle: Handle) -> HostValue {
        self.slots.get(handle as usize).and_then(|s| s.as_ref()).map(|e| e.value.clone()).unwrap_or(HostValue::Undefined)
    }

    pub fn inc_ref(&mut self, handle: Handle) {
        if let Some(Some(entry)) = self.slots.get_mut(handle as usize) {
            entry.refs += 1;
        }
    }

    /// Drops one reference, freeing the slot once the count reaches zero.
    /// Reserved handles are immortal and never decrement.
    pub fn dec_ref(&mut self, handle: Handle) {
        if handle <= self.max_reserved {
            return;
        }
        let Some(slot) = self.slots.get_mut(handle as usize) else { return };
        let Some(entry) = slot else { return };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            let key = InternKey::from_value(&entry.value);
            *slot = None;
            if let Some(key) = key {
                self.reverse.remove(&key);
            }
        }
    }

    /// Frees every handle above the reserved prefix without reusing their
    /// slots, so handles allocated after a reset never collide with ones a
    /// guest (incorrectly) held onto from before it.
    pub fn reset(&mut self) {
        for handle in (self.max_reserved + 1)..self.slots.len() as Handle {
            if let Some(entry) = self.slots[handle as usize].take() {
                if let Some(key) = InternKey::from_value(&entry.value) {
                    self.reverse.remove(&key);
                }
            }
        }
    }

    /// Diagnostic dump backing `print_object_map`: handle, live refcount,
    /// and the value's `typeof`/rendering, in handle order.
    pub fn debug_entries(&self) -> Vec<(Handle, u64, &'static str, String)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(h, slot)| slot.as_ref().map(|e| (h as Handle, e.refs, e.value.type_name(), e.value.display())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_prefix_matches_extended_variant() {
        let table = HandleTable::new(ReservedVariant::Extended);
        assert_eq!(table.get(reserved::NULL).type_name(), "object");
        assert!(matches!(table.get(reserved::UNDEFINED), HostValue::Undefined));
        assert_eq!(table.get(reserved::FALSE).to_bool(), false);
        assert_eq!(table.get(reserved::TRUE).to_bool(), true);
        assert!(matches!(table.get(reserved::GLOBAL), HostValue::Object(_)));
        assert!(matches!(table.get(reserved::CONSOLE), HostValue::Object(_)));
        assert!(matches!(table.get(reserved::RESERVED_SENTINEL), HostValue::Symbol(_)));
    }

    #[test]
    fn identical_strings_intern_to_one_handle() {
        let mut table = HandleTable::new(ReservedVariant::Extended);
        let a = table.add(HostValue::str("hello"));
        let b = table.add(HostValue::str("hello"));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_objects_never_collapse() {
        let mut table = HandleTable::new(ReservedVariant::Extended);
        let a = table.add(HostValue::object(Object::default()));
        let b = table.add(HostValue::object(Object::default()));
        assert_ne!(a, b);
    }

    #[test]
    fn dec_ref_to_zero_frees_and_unblocks_reallocation_of_the_value() {
        let mut table = HandleTable::new(ReservedVariant::Extended);
        let h = table.add(HostValue::str("transient"));
        table.dec_ref(h);
        assert!(matches!(table.get(h), HostValue::Undefined));
        let h2 = table.add(HostValue::str("transient"));
        assert_ne!(h, h2, "a freed slot is never reused by a later allocation");
    }

    #[test]
    fn reset_clears_only_above_reserved_prefix() {
        let mut table = HandleTable::new(ReservedVariant::Extended);
        let h = table.add(HostValue::str("scratch"));
        table.reset();
        assert!(matches!(table.get(h), HostValue::Undefined));
        assert!(matches!(table.get(reserved::GLOBAL), HostValue::Object(_)));
    }

    #[test]
    fn handles_never_reuse_even_across_reset() {
        let mut table = HandleTable::new(ReservedVariant::Extended);
        let before = table.add(HostValue::str("a"));
        table.reset();
        let after = table.add(HostValue::str("b"));
        assert!(after > before);
    }

    #[test]
    fn reserved_handles_survive_dec_ref() {
        let mut table = HandleTable::new(ReservedVariant::Extended);
        table.dec_ref(reserved::GLOBAL);
        assert!(matches!(table.get(reserved::GLOBAL), HostValue::Object(_)));
    }
}
