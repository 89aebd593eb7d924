//! Wires every ABI name in [`vbridge_abi::names`] onto a Wasmtime `Linker`,
//! each as a thin adaptor over `vbridge_kernel::ops`.

use vbridge_abi::names;
use vbridge_kernel::ops::{self, BridgeContext};
use vbridge_kernel::{BridgeError, HandleTable, KernelResult};
use wasmtime::{Caller, Linker};

use crate::guest_memory::{read_guest_utf8, write_guest_string};
use crate::BridgeState;

struct WasmtimeContext<'a, 'b> {
    caller: &'a mut Caller<'b, BridgeState>,
}

impl BridgeContext for WasmtimeContext<'_, '_> {
    fn table(&mut self) -> &mut HandleTable {
        &mut self.caller.data_mut().table
    }

    fn read_guest_utf8(&mut self, ptr: u32, len: u32) -> KernelResult<String> {
        read_guest_utf8(self.caller, ptr, len)
    }

    fn write_guest_string(&mut self, s: &str) -> KernelResult<u32> {
        write_guest_string(self.caller, s)
    }

    fn call_indirect(&mut self, table_index: u32, args: u32, data: u32) -> KernelResult<u32> {
        let table = self
            .caller
            .get_export("__indirect_function_table")
            .and_then(|export| export.into_table())
            .ok_or_else(|| BridgeError::IndirectCall("guest exports no indirect function table".into()))?;
        let slot = table
            .get(&mut *self.caller, table_index as u64)
            .ok_or_else(|| BridgeError::IndirectCall("table index out of bounds".into()))?;
        let wasmtime::Ref::Func(Some(func)) = slot else {
            return Err(BridgeError::IndirectCall("table slot is empty".into()));
        };
        let typed = func
            .typed::<(u32, u32), u32>(&*self.caller)
            .map_err(|e| BridgeError::IndirectCall(e.to_string()))?;
        typed.call(&mut *self.caller, (args, data)).map_err(|e| BridgeError::IndirectCall(e.to_string()))
    }
}

fn trap(err: impl std::fmt::Display) -> wasmtime::Error {
    wasmtime::Error::msg(err.to_string())
}

/// Registers every `env`-module ABI import the guest links against.
pub fn link_bridge(linker: &mut Linker<BridgeState>) -> anyhow::Result<()> {
    linker.func_wrap(names::MODULE, names::VAL_NEW_ARRAY, |mut caller: Caller<'_, BridgeState>| {
        ops::new_array(&mut WasmtimeContext { caller: &mut caller })
    })?;

    linker.func_wrap(names::MODULE, names::VAL_NEW_OBJECT, |mut caller: Caller<'_, BridgeState>| {
        ops::new_object(&mut WasmtimeContext { caller: &mut caller })
    })?;

    linker.func_wrap(names::MODULE, names::VAL_TYPEOF, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::typeof_(&mut WasmtimeContext { caller: &mut caller }, h).map_err(trap)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_CONSTRUCT_NEW, |mut caller: Caller<'_, BridgeState>, cls: u32, argv: u32| {
        ops::construct_new(&mut WasmtimeContext { caller: &mut caller }, cls, argv)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_FUNC_CALL, |mut caller: Caller<'_, BridgeState>, func: u32, argv: u32| {
        ops::func_call(&mut WasmtimeContext { caller: &mut caller }, func, argv)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_PUSH, |mut caller: Caller<'_, BridgeState>, arr: u32, v: u32| {
        ops::push(&mut WasmtimeContext { caller: &mut caller }, arr, v);
    })?;

    linker.func_wrap(names::MODULE, names::VAL_MAKE_INT, |mut caller: Caller<'_, BridgeState>, v: i32| {
        ops::make_int(&mut WasmtimeContext { caller: &mut caller }, v)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_MAKE_UINT, |mut caller: Caller<'_, BridgeState>, v: u32| {
        ops::make_uint(&mut WasmtimeContext { caller: &mut caller }, v)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_MAKE_BIGINT, |mut caller: Caller<'_, BridgeState>, v: i64| {
        ops::make_bigint(&mut WasmtimeContext { caller: &mut caller }, v)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_MAKE_BIGUINT, |mut caller: Caller<'_, BridgeState>, raw: i64| {
        ops::make_biguint(&mut WasmtimeContext { caller: &mut caller }, raw)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_MAKE_DOUBLE, |mut caller: Caller<'_, BridgeState>, v: f64| {
        ops::make_double(&mut WasmtimeContext { caller: &mut caller }, v)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_MAKE_STR, |mut caller: Caller<'_, BridgeState>, ptr: u32, len: u32| {
        ops::make_str(&mut WasmtimeContext { caller: &mut caller }, ptr, len).map_err(trap)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GET_VALUE_INT, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::get_value_int(&mut WasmtimeContext { caller: &mut caller }, h)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GET_VALUE_UINT, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::get_value_uint(&mut WasmtimeContext { caller: &mut caller }, h)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GET_VALUE_BIGINT, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::get_value_bigint(&mut WasmtimeContext { caller: &mut caller }, h)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GET_VALUE_BIGUINT, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::get_value_biguint(&mut WasmtimeContext { caller: &mut caller }, h)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GET_VALUE_DOUBLE, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::get_value_double(&mut WasmtimeContext { caller: &mut caller }, h)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GET_VALUE_STRING, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::get_value_string(&mut WasmtimeContext { caller: &mut caller }, h).map_err(trap)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GET, |mut caller: Caller<'_, BridgeState>, obj: u32, key: u32| {
        ops::get(&mut WasmtimeContext { caller: &mut caller }, obj, key).map_err(trap)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_SET, |mut caller: Caller<'_, BridgeState>, obj: u32, key: u32, val: u32| {
        ops::set(&mut WasmtimeContext { caller: &mut caller }, obj, key, val).map_err(trap)
    })?;

    linker.func_wrap(names::MODULE, names::VAL_HAS, |mut caller: Caller<'_, BridgeState>, obj: u32, key: u32| {
        ops::has(&mut WasmtimeContext { caller: &mut caller }, obj, key) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_IS_STRING, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::is_string(&mut WasmtimeContext { caller: &mut caller }, h) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_IS_NUMBER, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::is_number(&mut WasmtimeContext { caller: &mut caller }, h) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_NOT, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::not(&mut WasmtimeContext { caller: &mut caller }, h) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GT, |mut caller: Caller<'_, BridgeState>, a: u32, b: u32| {
        ops::gt(&mut WasmtimeContext { caller: &mut caller }, a, b) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_GTE, |mut caller: Caller<'_, BridgeState>, a: u32, b: u32| {
        ops::gte(&mut WasmtimeContext { caller: &mut caller }, a, b) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_LT, |mut caller: Caller<'_, BridgeState>, a: u32, b: u32| {
        ops::lt(&mut WasmtimeContext { caller: &mut caller }, a, b) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_LTE, |mut caller: Caller<'_, BridgeState>, a: u32, b: u32| {
        ops::lte(&mut WasmtimeContext { caller: &mut caller }, a, b) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_EQUALS, |mut caller: Caller<'_, BridgeState>, a: u32, b: u32| {
        ops::equals(&mut WasmtimeContext { caller: &mut caller }, a, b) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_STRICTLY_EQUALS, |mut caller: Caller<'_, BridgeState>, a: u32, b: u32| {
        ops::strictly_equals(&mut WasmtimeContext { caller: &mut caller }, a, b) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_INSTANCEOF, |mut caller: Caller<'_, BridgeState>, a: u32, b: u32| {
        ops::instanceof(&mut WasmtimeContext { caller: &mut caller }, a, b) as u32
    })?;

    linker.func_wrap(names::MODULE, names::VAL_THROW, |mut caller: Caller<'_, BridgeState>, h: u32| -> Result<(), wasmtime::Error> {
        Err(trap(ops::throw(&mut WasmtimeContext { caller: &mut caller }, h)))
    })?;

    linker.func_wrap(
        names::MODULE,
        names::VAL_OBJ_CALL,
        |mut caller: Caller<'_, BridgeState>, obj: u32, name_ptr: u32, name_len: u32, argv: u32| {
            ops::obj_call(&mut WasmtimeContext { caller: &mut caller }, obj, name_ptr, name_len, argv).map_err(trap)
        },
    )?;

    linker.func_wrap(
        names::MODULE,
        names::VAL_OBJ_HAS_OWN_PROP,
        |mut caller: Caller<'_, BridgeState>, obj: u32, name_ptr: u32, name_len: u32| {
            ops::obj_has_own_prop(&mut WasmtimeContext { caller: &mut caller }, obj, name_ptr, name_len).map(|b| b as u32).map_err(trap)
        },
    )?;

    linker.func_wrap(
        names::MODULE,
        names::VAL_MAKE_CALLBACK,
        |mut caller: Caller<'_, BridgeState>, table_index: u32, data: u32| {
            ops::make_callback(&mut WasmtimeContext { caller: &mut caller }, table_index, data)
        },
    )?;

    linker.func_wrap(names::MODULE, names::PRINT_OBJECT_MAP, |mut caller: Caller<'_, BridgeState>| {
        ops::print_object_map(&mut WasmtimeContext { caller: &mut caller });
    })?;

    linker.func_wrap(names::MODULE, names::RESET_OBJECT_MAP, |mut caller: Caller<'_, BridgeState>| {
        ops::reset_object_map(&mut WasmtimeContext { caller: &mut caller });
    })?;

    linker.func_wrap(names::MODULE, names::VAL_INC_REF, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::inc_ref(&mut WasmtimeContext { caller: &mut caller }, h);
    })?;

    linker.func_wrap(names::MODULE, names::VAL_DEC_REF, |mut caller: Caller<'_, BridgeState>, h: u32| {
        ops::dec_ref(&mut WasmtimeContext { caller: &mut caller }, h);
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbridge_abi::ReservedVariant;
    use wasmtime::{Engine, Store};

    #[test]
    fn every_catalogue_entry_links_without_error() {
        let engine = Engine::default();
        let mut linker = Linker::<BridgeState>::new(&engine);
        link_bridge(&mut linker).expect("every ABI entry links");
        let mut store = Store::new(&engine, BridgeState::new(ReservedVariant::Extended));
        for name in names::ALL {
            assert!(linker.get(&mut store, names::MODULE, name).is_some(), "missing linked import {name}");
        }
    }
}
