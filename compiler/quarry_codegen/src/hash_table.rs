//! Hash table codegen.
//!
//! Two designs share the callback interface in [`callbacks`]:
//!
//! - [`CcHashTable`]: bucket directory plus chains, with a lazy two-phase
//!   build for parallel build pipelines.
//! - [`OaHashTable`]: open addressing with linear probing; duplicate keys
//!   spill their values into a per-key list.
//!
//! Keys are stored with [`CompactStorage`](crate::compact_storage::CompactStorage)
//! directly after the entry header; the fixed-size value follows the key.

pub mod callbacks;
mod cc_hash_table;
mod oa_hash_table;

pub use callbacks::{InsertCallback, IterateCallback, NoOp, ProbeCallback, VectorizedIterateCallback};
pub use cc_hash_table::CcHashTable;
pub use oa_hash_table::{OaHashTable, OaHashTableAccess, ProbeResult};

#[cfg(test)]
mod tests;
