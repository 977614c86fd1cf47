//! Layout reflection of runtime structs.
//!
//! Generated code reads and writes `quarry_rt` structs in place. Each proxy
//! exposes one [`FieldInfo`] per mirrored field, computed with `offset_of!`
//! from the runtime struct itself, so offsets follow the struct if it ever
//! changes shape. The `runtime_proxy!` macro also asserts at compile time
//! that every mirrored field is as wide as its IR type and that the struct
//! has the expected size.

use cranelift_codegen::ir::Type;

use quarry_rt::cc_hash_table::{CcHashEntry, CcHashTable};
use quarry_rt::oa_hash_table::{KeyValueList, OaHashEntry, OaHashTable};
use quarry_rt::{BloomFilter, Buffer, ColumnLayoutInfo, Sorter, ThreadStates};

pub mod runtime_decl;

pub use runtime_decl::{runtime_symbols, RuntimeFunction, RUNTIME_FUNCTIONS};

/// One field of a runtime struct: byte offset and IR type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub offset: i32,
    pub ty: Type,
}

/// Size of the field a projection function points at.
#[doc(hidden)]
pub const fn field_size<T, F>(_projection: fn(&T) -> &F) -> usize {
    std::mem::size_of::<F>()
}

macro_rules! ir_width {
    (I8) => {
        1
    };
    (I32) => {
        4
    };
    (I64) => {
        8
    };
}

macro_rules! runtime_proxy {
    (
        $(#[$meta:meta])*
        $proxy:ident for $runtime:ty, size $size:literal {
            $($field:ident: $ty:ident),* $(,)?
        }
    ) => {
        $(#[$meta])*
        pub struct $proxy;

        impl $proxy {
            /// Size of the runtime struct in bytes.
            pub const SIZE: u32 = $size;

            $(
                #[inline]
                pub const fn $field() -> FieldInfo {
                    FieldInfo {
                        offset: std::mem::offset_of!($runtime, $field) as i32,
                        ty: cranelift_codegen::ir::types::$ty,
                    }
                }
            )*
        }

        const _: () = {
            assert!(
                std::mem::size_of::<$runtime>() == $size,
                concat!("size of ", stringify!($runtime), " changed")
            );
            $(
                assert!(
                    field_size(|s: &$runtime| &s.$field) == ir_width!($ty),
                    concat!(stringify!($runtime), "::", stringify!($field), " does not match its IR type")
                );
            )*
        };
    };
}

runtime_proxy! {
    /// `CcHashTable`: bucket directory plus lazy-entry list.
    CcHashTableProxy for CcHashTable, size 56 {
        directory: I64,
        directory_size: I64,
        directory_mask: I64,
        num_elements: I64,
        lazy_head: I64,
        num_lazy: I64,
    }
}

runtime_proxy! {
    /// Header of a chained-table entry; key and value bytes follow.
    CcHashEntryProxy for CcHashEntry, size 16 {
        hash: I64,
        next: I64,
    }
}

runtime_proxy! {
    OaHashTableProxy for OaHashTable, size 80 {
        buckets: I64,
        num_buckets: I64,
        bucket_mask: I64,
        num_occupied_buckets: I64,
        num_entries: I64,
        resize_threshold: I64,
        entry_size: I64,
        key_size: I64,
        value_size: I64,
        kv_list_capacity: I64,
    }
}

runtime_proxy! {
    /// Header of an open-addressing bucket; key and inline value follow.
    OaHashEntryProxy for OaHashEntry, size 16 {
        kv_list: I64,
        hash: I64,
    }
}

runtime_proxy! {
    KeyValueListProxy for KeyValueList, size 8 {
        capacity: I32,
        size: I32,
    }
}

runtime_proxy! {
    BloomFilterProxy for BloomFilter, size 40 {
        num_hash_funcs: I64,
        bytes: I64,
        num_bits: I64,
        num_misses: I64,
        num_probes: I64,
    }
}

runtime_proxy! {
    SorterProxy for Sorter, size 56 {
        buffer_start: I64,
        buffer_pos: I64,
        buffer_end: I64,
        tuple_size: I64,
        comparison_fn: I64,
        tuples_start: I64,
        tuples_end: I64,
    }
}

runtime_proxy! {
    BufferProxy for Buffer, size 24 {
        buffer_start: I64,
        buffer_pos: I64,
        buffer_end: I64,
    }
}

runtime_proxy! {
    ColumnLayoutInfoProxy for ColumnLayoutInfo, size 16 {
        column: I64,
        stride: I32,
        is_columnar: I8,
    }
}

runtime_proxy! {
    ThreadStatesProxy for ThreadStates, size 16 {
        states: I64,
        num_threads: I32,
        state_size: I32,
    }
}
