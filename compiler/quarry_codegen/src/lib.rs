//! Query Compilation Core for Quarry
//!
//! This crate emits native code for query pipelines through Cranelift: the
//! control-flow builders, value hashing, and the generated-code side of every
//! runtime data structure in `quarry_rt` (chained and open-addressing hash
//! tables, bloom filter, sorter, buffer) plus tile-group scans.
//!
//! # Debug Environment Variables
//!
//! - `QUARRY_DEBUG_IR`: Print each function's Cranelift IR to stderr before
//!   it is defined. Any non-empty value enables this.
//!   Example: `QUARRY_DEBUG_IR=1 cargo test -p quarry_codegen`
//!
//! - `RUST_LOG=quarry_codegen=debug`: Data-structure construction and
//!   function definition events.
//!
//! - `RUST_LOG=quarry_rt=debug`: Runtime lifecycle events (resizes, sorts,
//!   bloom filter miss ratios).
//!
//! # Clippy Configuration
//!
//! - Cast warnings: runtime structs use fixed-width integers and Cranelift
//!   offsets are `i32`
//! - Missing panic docs: builder misuse panics instead of returning an error

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    reason = "field offsets are i32 in Cranelift while runtime sizes are u32/u64"
)]
#![allow(
    clippy::too_many_arguments,
    reason = "generators thread through the builder, the runtime object and callbacks"
)]
#![allow(
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    reason = "builder misuse panics; every fallible generator returns CodegenResult"
)]
//!
//! # Architecture
//!
//! - **Context** (`code_context.rs`): owns the JIT module, defines functions
//! - **Builder** (`codegen.rs`): per-function IR facade, phi bookkeeping
//! - **Proxy** (`proxy.rs`): runtime struct layouts and runtime declarations
//! - **Lang** (`lang/`): `Loop`, `VectorizedLoop`, `If`, selection vectors
//! - **Types** (`types/`): SQL types and typed generated-code values
//! - **Storage** (`compact_storage.rs`): packed key/row layout with null bitmap
//! - **Hashing** (`hash.rs`): CRC and Murmur3 value hashing
//! - **Data structures**: `hash_table/`, `bloom_filter.rs`, `sorter.rs`, `buffer.rs`
//! - **Scans** (`scan/`): table and tile-group iteration
//!
//! # Example
//!
//! ```ignore
//! use quarry_codegen::{CodeContext, CodegenConfig};
//! use cranelift_codegen::ir::types::I64;
//!
//! let mut ctx = CodeContext::new(CodegenConfig::default())?;
//! let id = ctx.define_function("add_one", &[I64], &[I64], |cg, args| {
//!     let one = cg.const_i64(1);
//!     let sum = cg.add(args[0], one);
//!     cg.ret(&[sum]);
//!     Ok(())
//! })?;
//! ctx.finalize()?;
//! let add_one: extern "C" fn(i64) -> i64 = unsafe { std::mem::transmute(ctx.function_ptr(id)) };
//! ```

pub mod bloom_filter;
pub mod buffer;
pub mod code_context;
pub mod codegen;
pub mod compact_storage;
pub mod config;
pub mod error;
pub mod hash;
pub mod hash_table;
pub mod lang;
pub mod proxy;
pub mod scan;
pub mod sorter;
pub mod types;

#[cfg(test)]
mod test_helpers;

pub use bloom_filter::BloomFilter;
pub use buffer::Buffer;
pub use code_context::CodeContext;
pub use codegen::{CodeGen, PTR};
pub use compact_storage::{CompactStorage, RowCallback};
pub use config::{BloomHashPolicy, CodegenConfig};
pub use error::{CodegenError, CodegenResult};
pub use hash::{hash_values, HashMethod};
pub use hash_table::{CcHashTable, OaHashTable, ProbeResult};
pub use lang::{If, Loop, Range, Vector, VectorizedLoop};
pub use scan::{ScanCallback, Table, TileGroup};
pub use sorter::{SortKey, Sorter};
pub use types::{SqlType, Type, Value};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=quarry_codegen=debug`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
