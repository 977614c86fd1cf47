//! Quarry Runtime Library (`libquarry_rt`)
//!
//! This crate provides the native half of compiled queries: the data
//! structures generated code manipulates and the C-ABI functions it calls.
//!
//! # Build Modes
//!
//! - **rlib**: For Rust consumers (JIT execution via `quarry_codegen`)
//! - **staticlib**: For AOT linking (`libquarry_rt.a`)
//!
//! # Function Categories
//!
//! - **Hashing**: `quarry_crc32_u64`, `quarry_hash_crc64`, `quarry_prefetch`
//! - **Varlen**: `quarry_varlen_eq`, `quarry_varlen_cmp`
//! - **Chained hash table**: `quarry_cc_hash_table_*`
//! - **Open-addressing hash table**: `quarry_oa_hash_table_*`
//! - **Bloom filter**: `quarry_bloom_filter_*`
//! - **Sorter / Buffer**: `quarry_sorter_*`, `quarry_buffer_*`
//! - **Thread states**: `quarry_thread_states_*`
//! - **Storage**: `quarry_table_*`, `quarry_tile_group_*`
//!
//! # Layout
//!
//! Every struct the generated code reads or writes is `#[repr(C)]`. The
//! codegen crate reflects their field offsets with `offset_of!`, so a field
//! reorder here changes the generated code with it.
//!
//! # Safety
//!
//! All functions use `#[no_mangle]` and `extern "C"` for FFI compatibility.
//! Functions that take raw pointers are called from generated code which
//! guarantees valid pointers. They're not marked `unsafe` because they're
//! extern "C" FFI entry points, not Rust API functions.

#![warn(clippy::allow_attributes_without_reason)]
#![allow(
    unsafe_code,
    reason = "C-ABI runtime functions require unsafe for raw pointer operations"
)]
#![allow(
    clippy::not_unsafe_ptr_arg_deref,
    reason = "FFI entry points receive pointers from generated code which guarantees validity"
)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_ptr_alignment,
    clippy::cast_precision_loss,
    reason = "FFI code uses u64 for ABI compatibility, casts are intentional"
)]

pub mod bloom_filter;
pub mod buffer;
pub mod cc_hash_table;
pub mod hash;
pub mod oa_hash_table;
pub mod sorter;
pub mod storage;
pub mod thread_states;

mod memory;

pub use bloom_filter::BloomFilter;
pub use buffer::Buffer;
pub use cc_hash_table::{CcHashEntry, CcHashTable};
pub use oa_hash_table::{KeyValueList, OaHashEntry, OaHashTable};
pub use sorter::{ComparisonFn, Sorter};
pub use storage::{ColumnLayoutInfo, Table, TileGroup};
pub use thread_states::ThreadStates;

// The generated code addresses every pointer-sized field as a 64-bit integer.
const _: () = assert!(std::mem::size_of::<usize>() == 8);

#[cfg(test)]
mod tests;
