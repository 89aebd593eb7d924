//! Raw ABI surface: one function per `vbridge_abi::names` entry.
//!
//! On `wasm32` these are genuine `env`-module imports the host's `Linker`
//! resolves. Off `wasm32` -- this crate's own `cargo test` run -- the
//! identical signatures are served by [`fallback`], an in-process
//! `vbridge-kernel` instance, so the safe wrapper in [`crate::val`] never
//! needs a `#[cfg]` of its own.

#[cfg(target_arch = "wasm32")]
mod imports {
    #[link(wasm_import_module = "env")]
    unsafe extern "C" {
        #[link_name = "val_new_array"]
        pub fn val_new_array() -> u32;
        #[link_name = "val_new_object"]
        pub fn val_new_object() -> u32;
        #[link_name = "val_typeof"]
        pub fn val_typeof(h: u32) -> u32;
        #[link_name = "val_construct_new"]
        pub fn val_construct_new(cls: u32, argv: u32) -> u32;
        #[link_name = "val_func_call"]
        pub fn val_func_call(func: u32, argv: u32) -> u32;
        #[link_name = "val_push"]
        pub fn val_push(arr: u32, v: u32);
        #[link_name = "val_make_int"]
        pub fn val_make_int(v: i32) -> u32;
        #[link_name = "val_make_uint"]
        pub fn val_make_uint(v: u32) -> u32;
        #[link_name = "val_make_bigint"]
        pub fn val_make_bigint(v: i64) -> u32;
        #[link_name = "val_make_biguint"]
        pub fn val_make_biguint(raw: i64) -> u32;
        #[link_name = "val_make_double"]
        pub fn val_make_double(v: f64) -> u32;
        #[link_name = "val_make_str"]
        pub fn val_make_str(ptr: u32, len: u32) -> u32;
        #[link_name = "val_get_value_int"]
        pub fn val_get_value_int(h: u32) -> i32;
        #[link_name = "val_get_value_uint"]
        pub fn val_get_value_uint(h: u32) -> u32;
        #[link_name = "val_get_value_bigint"]
        pub fn val_get_value_bigint(h: u32) -> i64;
        #[link_name = "val_get_value_biguint"]
        pub fn val_get_value_biguint(h: u32) -> i64;
        #[link_name = "val_get_value_double"]
        pub fn val_get_value_double(h: u32) -> f64;
        #[link_name = "val_get_value_string"]
        pub fn val_get_value_string(h: u32) -> u32;
        #[link_name = "val_get"]
        pub fn val_get(obj: u32, key: u32) -> u32;
        #[link_name = "val_set"]
        pub fn val_set(obj: u32, key: u32, val: u32);
        #[link_name = "val_has"]
        pub fn val_has(obj: u32, key: u32) -> u32;
        #[link_name = "val_is_string"]
        pub fn val_is_string(h: u32) -> u32;
        #[link_name = "val_is_number"]
        pub fn val_is_number(h: u32) -> u32;
        #[link_name = "val_not"]
        pub fn val_not(h: u32) -> u32;
        #[link_name = "val_gt"]
        pub fn val_gt(a: u32, b: u32) -> u32;
        #[link_name = "val_gte"]
        pub fn val_gte(a: u32, b: u32) -> u32;
        #[link_name = "val_lt"]
        pub fn val_lt(a: u32, b: u32) -> u32;
        #[link_name = "val_lte"]
        pub fn val_lte(a: u32, b: u32) -> u32;
        #[link_name = "val_equals"]
        pub fn val_equals(a: u32, b: u32) -> u32;
        #[link_name = "val_strictly_equals"]
        pub fn val_strictly_equals(a: u32, b: u32) -> u32;
        #[link_name = "val_instanceof"]
        pub fn val_instanceof(a: u32, b: u32) -> u32;
        #[link_name = "val_throw"]
        pub fn val_throw(h: u32);
        #[link_name = "val_obj_call"]
        pub fn val_obj_call(obj: u32, name_ptr: u32, name_len: u32, argv: u32) -> u32;
        #[link_name = "val_obj_has_own_prop"]
        pub fn val_obj_has_own_prop(obj: u32, name_ptr: u32, name_len: u32) -> u32;
        #[link_name = "val_make_callback"]
        pub fn val_make_callback(table_index: u32, data: u32) -> u32;
        #[link_name = "print_object_map"]
        pub fn print_object_map();
        #[link_name = "reset_object_map"]
        pub fn reset_object_map();
        #[link_name = "val_inc_ref"]
        pub fn val_inc_ref(h: u32);
        #[link_name = "val_dec_ref"]
        pub fn val_dec_ref(h: u32);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imports {
    pub use crate::fallback::*;
}

pub use imports::*;
