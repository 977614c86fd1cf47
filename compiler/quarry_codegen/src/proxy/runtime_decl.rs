//! Runtime function declarations.
//!
//! Every `quarry_rt` entry point generated code may call, with its IR
//! signature. [`CodeContext`](crate::CodeContext) declares each one as an
//! import and maps the symbol to its address with [`runtime_symbols`].

use cranelift_codegen::ir::types::{F64, I32, I64, I8};
use cranelift_codegen::ir::Type;

use quarry_rt::{bloom_filter, buffer, cc_hash_table, hash, oa_hash_table, sorter, storage, thread_states};

/// Signature of one runtime entry point.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeFunction {
    pub name: &'static str,
    pub params: &'static [Type],
    pub returns: &'static [Type],
}

const fn decl(name: &'static str, params: &'static [Type], returns: &'static [Type]) -> RuntimeFunction {
    RuntimeFunction {
        name,
        params,
        returns,
    }
}

/// Pointers are passed as `I64`.
pub static RUNTIME_FUNCTIONS: &[RuntimeFunction] = &[
    // -- Hashing --
    decl("quarry_crc32_u64", &[I64, I64], &[I64]),
    decl("quarry_hash_crc64", &[I64, I32, I64], &[I64]),
    decl("quarry_prefetch", &[I64], &[]),
    // -- Varlen --
    decl("quarry_varlen_eq", &[I64, I32, I64, I32], &[I8]),
    decl("quarry_varlen_cmp", &[I64, I32, I64, I32], &[I32]),
    // -- Chained hash table --
    decl("quarry_cc_hash_table_init", &[I64], &[]),
    decl("quarry_cc_hash_table_store_tuple", &[I64, I64, I64], &[I64]),
    decl("quarry_cc_hash_table_insert_lazy", &[I64, I64, I64], &[I64]),
    decl("quarry_cc_hash_table_build_lazy", &[I64], &[]),
    decl("quarry_cc_hash_table_reserve_lazy", &[I64, I64, I32], &[]),
    decl("quarry_cc_hash_table_merge_lazy_unfinished", &[I64, I64], &[]),
    decl("quarry_cc_hash_table_destroy", &[I64], &[]),
    // -- Open-addressing hash table --
    decl("quarry_oa_hash_table_init", &[I64, I64, I64, I64, I64], &[]),
    decl("quarry_oa_hash_table_store_tuple", &[I64, I64, I64], &[I64]),
    decl("quarry_oa_hash_table_destroy", &[I64], &[]),
    // -- Bloom filter --
    decl("quarry_bloom_filter_init", &[I64, I64, F64, I64], &[]),
    decl("quarry_bloom_filter_destroy", &[I64], &[]),
    // -- Sorter --
    decl("quarry_sorter_init", &[I64, I64, I64], &[]),
    decl("quarry_sorter_append", &[I64], &[I64]),
    decl("quarry_sorter_sort", &[I64], &[]),
    decl("quarry_sorter_sort_parallel", &[I64, I64, I32], &[]),
    decl("quarry_sorter_destroy", &[I64], &[]),
    // -- Buffer --
    decl("quarry_buffer_init", &[I64, I64], &[]),
    decl("quarry_buffer_append", &[I64, I64], &[I64]),
    decl("quarry_buffer_reset", &[I64], &[]),
    decl("quarry_buffer_destroy", &[I64], &[]),
    // -- Thread states --
    decl("quarry_thread_states_init", &[I64, I32], &[]),
    decl("quarry_thread_states_reset", &[I64, I32], &[]),
    decl("quarry_thread_states_access", &[I64, I32], &[I64]),
    decl("quarry_thread_states_destroy", &[I64], &[]),
    // -- Storage --
    decl("quarry_table_tile_group_count", &[I64], &[I32]),
    decl("quarry_table_tile_group", &[I64, I32], &[I64]),
    decl("quarry_tile_group_id", &[I64], &[I32]),
    decl("quarry_tile_group_num_tuples", &[I64], &[I32]),
    decl("quarry_tile_group_column_layouts", &[I64, I64, I32], &[]),
];

/// Native address of every runtime entry point, for the JIT symbol table.
pub fn runtime_symbols() -> Vec<(&'static str, *const u8)> {
    vec![
        ("quarry_crc32_u64", hash::quarry_crc32_u64 as *const u8),
        ("quarry_hash_crc64", hash::quarry_hash_crc64 as *const u8),
        ("quarry_prefetch", hash::quarry_prefetch as *const u8),
        ("quarry_varlen_eq", hash::quarry_varlen_eq as *const u8),
        ("quarry_varlen_cmp", hash::quarry_varlen_cmp as *const u8),
        ("quarry_cc_hash_table_init", cc_hash_table::quarry_cc_hash_table_init as *const u8),
        ("quarry_cc_hash_table_store_tuple", cc_hash_table::quarry_cc_hash_table_store_tuple as *const u8),
        ("quarry_cc_hash_table_insert_lazy", cc_hash_table::quarry_cc_hash_table_insert_lazy as *const u8),
        ("quarry_cc_hash_table_build_lazy", cc_hash_table::quarry_cc_hash_table_build_lazy as *const u8),
        ("quarry_cc_hash_table_reserve_lazy", cc_hash_table::quarry_cc_hash_table_reserve_lazy as *const u8),
        (
            "quarry_cc_hash_table_merge_lazy_unfinished",
            cc_hash_table::quarry_cc_hash_table_merge_lazy_unfinished as *const u8,
        ),
        ("quarry_cc_hash_table_destroy", cc_hash_table::quarry_cc_hash_table_destroy as *const u8),
        ("quarry_oa_hash_table_init", oa_hash_table::quarry_oa_hash_table_init as *const u8),
        ("quarry_oa_hash_table_store_tuple", oa_hash_table::quarry_oa_hash_table_store_tuple as *const u8),
        ("quarry_oa_hash_table_destroy", oa_hash_table::quarry_oa_hash_table_destroy as *const u8),
        ("quarry_bloom_filter_init", bloom_filter::quarry_bloom_filter_init as *const u8),
        ("quarry_bloom_filter_destroy", bloom_filter::quarry_bloom_filter_destroy as *const u8),
        ("quarry_sorter_init", sorter::quarry_sorter_init as *const u8),
        ("quarry_sorter_append", sorter::quarry_sorter_append as *const u8),
        ("quarry_sorter_sort", sorter::quarry_sorter_sort as *const u8),
        ("quarry_sorter_sort_parallel", sorter::quarry_sorter_sort_parallel as *const u8),
        ("quarry_sorter_destroy", sorter::quarry_sorter_destroy as *const u8),
        ("quarry_buffer_init", buffer::quarry_buffer_init as *const u8),
        ("quarry_buffer_append", buffer::quarry_buffer_append as *const u8),
        ("quarry_buffer_reset", buffer::quarry_buffer_reset as *const u8),
        ("quarry_buffer_destroy", buffer::quarry_buffer_destroy as *const u8),
        ("quarry_thread_states_init", thread_states::quarry_thread_states_init as *const u8),
        ("quarry_thread_states_reset", thread_states::quarry_thread_states_reset as *const u8),
        ("quarry_thread_states_access", thread_states::quarry_thread_states_access as *const u8),
        ("quarry_thread_states_destroy", thread_states::quarry_thread_states_destroy as *const u8),
        ("quarry_table_tile_group_count", storage::quarry_table_tile_group_count as *const u8),
        ("quarry_table_tile_group", storage::quarry_table_tile_group as *const u8),
        ("quarry_tile_group_id", storage::quarry_tile_group_id as *const u8),
        ("quarry_tile_group_num_tuples", storage::quarry_tile_group_num_tuples as *const u8),
        ("quarry_tile_group_column_layouts", storage::quarry_tile_group_column_layouts as *const u8),
    ]
}

/// Look up a declaration by symbol name.
pub fn find(name: &str) -> Option<&'static RuntimeFunction> {
    RUNTIME_FUNCTIONS.iter().find(|f| f.name == name)
}
