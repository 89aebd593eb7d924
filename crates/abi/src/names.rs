//! Canonical catalogue of ABI symbol names.
//!
//! This is the single source of truth for the `#[link(wasm_import_module =
//! "env")]` names the guest imports and the host `Linker` registers. Keeping
//! them in one macro invocation means the host and guest crates can never
//! drift on spelling.

/// Wasm import module every ABI entry lives under.
pub const MODULE: &str = "env";

macro_rules! declare_abi {
    ( $( $ident:ident => $name:literal, )+ ) => {
        $(
            #[doc = concat!("ABI symbol name for `", stringify!($ident), "`.")]
            pub const $ident: &str = $name;
        )+

        /// Every ABI symbol name, in declaration order.
        pub const ALL: &[&str] = &[ $($name,)+ ];
    };
}

declare_abi! {
    VAL_NEW_ARRAY => "val_new_array",
    VAL_NEW_OBJECT => "val_new_object",
    VAL_TYPEOF => "val_typeof",
    VAL_CONSTRUCT_NEW => "val_construct_new",
    VAL_FUNC_CALL => "val_func_call",
    VAL_PUSH => "val_push",
    VAL_MAKE_INT => "val_make_int",
    VAL_MAKE_UINT => "val_make_uint",
    VAL_MAKE_BIGINT => "val_make_bigint",
    VAL_MAKE_BIGUINT => "val_make_biguint",
    VAL_MAKE_DOUBLE => "val_make_double",
    VAL_MAKE_STR => "val_make_str",
    VAL_GET_VALUE_INT => "val_get_value_int",
    VAL_GET_VALUE_UINT => "val_get_value_uint",
    VAL_GET_VALUE_BIGINT => "val_get_value_bigint",
    VAL_GET_VALUE_BIGUINT => "val_get_value_biguint",
    VAL_GET_VALUE_DOUBLE => "val_get_value_double",
    VAL_GET_VALUE_STRING => "val_get_value_string",
    VAL_GET => "val_get",
    VAL_SET => "val_set",
    VAL_HAS => "val_has",
    VAL_IS_STRING => "val_is_string",
    VAL_IS_NUMBER => "val_is_number",
    VAL_NOT => "val_not",
    VAL_GT => "val_gt",
    VAL_GTE => "val_gte",
    VAL_LT => "val_lt",
    VAL_LTE => "val_lte",
    VAL_EQUALS => "val_equals",
    VAL_STRICTLY_EQUALS => "val_strictly_equals",
    VAL_INSTANCEOF => "val_instanceof",
    VAL_THROW => "val_throw",
    VAL_OBJ_CALL => "val_obj_call",
    VAL_OBJ_HAS_OWN_PROP => "val_obj_has_own_prop",
    VAL_MAKE_CALLBACK => "val_make_callback",
    PRINT_OBJECT_MAP => "print_object_map",
    RESET_OBJECT_MAP => "reset_object_map",
    VAL_INC_REF => "val_inc_ref",
    VAL_DEC_REF => "val_dec_ref",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_entries_are_unique() {
        let mut names = ALL.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn catalogue_has_the_expected_surface_size() {
        assert_eq!(ALL.len(), 39);
    }
}
