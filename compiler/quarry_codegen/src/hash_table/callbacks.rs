//! Injection points for caller code inside generated hash-table loops.
//!
//! Each trait has one method, called while the builder sits at the point
//! where the caller's code belongs. Closures with the matching signature
//! implement them directly:
//!
//! ```ignore
//! table.probe_or_insert(cg, ht, None, &keys,
//!     &mut |cg: &mut CodeGen<'_>, value: ir::Value| { /* update */ Ok(()) },
//!     &mut |cg: &mut CodeGen<'_>, space: ir::Value| { /* initialize */ Ok(()) })?;
//! ```

use cranelift_codegen::ir;

use super::OaHashTableAccess;
use crate::codegen::CodeGen;
use crate::error::CodegenResult;
use crate::lang::Vector;
use crate::types::Value;

/// Called with the value of a key that is already present.
pub trait ProbeCallback {
    fn process_entry(&mut self, cg: &mut CodeGen<'_>, value_ptr: ir::Value) -> CodegenResult<()>;
}

/// Called with freshly reserved value space to initialize.
pub trait InsertCallback {
    fn store_value(&mut self, cg: &mut CodeGen<'_>, space: ir::Value) -> CodegenResult<()>;
}

/// Called once per stored value, with the entry's keys.
pub trait IterateCallback {
    fn process_entry(&mut self, cg: &mut CodeGen<'_>, keys: &[Value], value_ptr: ir::Value) -> CodegenResult<()>;
}

/// Called once per batch of buckets with the occupied positions selected.
pub trait VectorizedIterateCallback {
    fn process_entries(
        &mut self,
        cg: &mut CodeGen<'_>,
        start: ir::Value,
        end: ir::Value,
        selection: &Vector,
        access: &OaHashTableAccess<'_>,
    ) -> CodegenResult<()>;
}

impl<F> ProbeCallback for F
where
    F: FnMut(&mut CodeGen<'_>, ir::Value) -> CodegenResult<()>,
{
    fn process_entry(&mut self, cg: &mut CodeGen<'_>, value_ptr: ir::Value) -> CodegenResult<()> {
        self(cg, value_ptr)
    }
}

impl<F> InsertCallback for F
where
    F: FnMut(&mut CodeGen<'_>, ir::Value) -> CodegenResult<()>,
{
    fn store_value(&mut self, cg: &mut CodeGen<'_>, space: ir::Value) -> CodegenResult<()> {
        self(cg, space)
    }
}

impl<F> IterateCallback for F
where
    F: FnMut(&mut CodeGen<'_>, &[Value], ir::Value) -> CodegenResult<()>,
{
    fn process_entry(&mut self, cg: &mut CodeGen<'_>, keys: &[Value], value_ptr: ir::Value) -> CodegenResult<()> {
        self(cg, keys, value_ptr)
    }
}

impl<F> VectorizedIterateCallback for F
where
    F: FnMut(&mut CodeGen<'_>, ir::Value, ir::Value, &Vector, &OaHashTableAccess<'_>) -> CodegenResult<()>,
{
    fn process_entries(
        &mut self,
        cg: &mut CodeGen<'_>,
        start: ir::Value,
        end: ir::Value,
        selection: &Vector,
        access: &OaHashTableAccess<'_>,
    ) -> CodegenResult<()> {
        self(cg, start, end, selection, access)
    }
}

/// A probe callback that emits nothing.
pub struct NoOp;

impl ProbeCallback for NoOp {
    fn process_entry(&mut self, _cg: &mut CodeGen<'_>, _value_ptr: ir::Value) -> CodegenResult<()> {
        Ok(())
    }
}

impl InsertCallback for NoOp {
    fn store_value(&mut self, _cg: &mut CodeGen<'_>, _space: ir::Value) -> CodegenResult<()> {
        Ok(())
    }
}
