//! Append-only row buffer codegen.
//!
//! Rows are packed with [`CompactStorage`] back to back and read back in
//! insertion order.

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::I64;

use crate::codegen::CodeGen;
use crate::compact_storage::{CompactStorage, RowCallback};
use crate::error::CodegenResult;
use crate::lang::Loop;
use crate::proxy::BufferProxy;
use crate::types::{Type, Value};

#[derive(Clone, Debug)]
pub struct Buffer {
    storage: CompactStorage,
}

impl Buffer {
    /// # Panics
    ///
    /// Panics if `row_types` is empty.
    pub fn new(row_types: &[Type]) -> Self {
        assert!(!row_types.is_empty(), "a buffer row needs at least one column");
        let storage = CompactStorage::setup(row_types);
        tracing::debug!(tuple_size = storage.max_storage_size(), "buffer layout");
        Buffer { storage }
    }

    pub fn storage(&self) -> &CompactStorage {
        &self.storage
    }

    pub fn tuple_size(&self) -> u32 {
        self.storage.max_storage_size()
    }

    /// Allocate the buffer. Without a capacity the runtime default is used.
    pub fn init(&self, cg: &mut CodeGen<'_>, buf: ir::Value, initial_capacity: Option<ir::Value>) -> CodegenResult<()> {
        let capacity = match initial_capacity {
            Some(capacity) => cg.zext(capacity, I64),
            None => cg.const_i64(0),
        };
        cg.call_runtime("quarry_buffer_init", &[buf, capacity])?;
        Ok(())
    }

    pub fn append(&self, cg: &mut CodeGen<'_>, buf: ir::Value, values: &[Value]) -> CodegenResult<()> {
        let size = cg.const_i64(i64::from(self.tuple_size()));
        let space = cg.call_runtime_value("quarry_buffer_append", &[buf, size])?;
        self.storage.store_values(cg, space, values);
        Ok(())
    }

    /// Run `callback` on every row in insertion order.
    pub fn iterate<C>(&self, cg: &mut CodeGen<'_>, buf: ir::Value, callback: &mut C) -> CodegenResult<()>
    where
        C: RowCallback + ?Sized,
    {
        let start = cg.load_field(buf, BufferProxy::buffer_start());
        let end = cg.load_field(buf, BufferProxy::buffer_pos());
        let nonempty = cg.icmp_ult(start, end);
        let mut rows = Loop::new(cg, nonempty, &[start]);
        let row = rows.loop_var(0);
        let (values, next) = self.storage.load_values(cg, row);
        callback.process_row(cg, &values)?;
        let more = cg.icmp_ult(next, end);
        rows.loop_end(cg, more, &[next]);
        Ok(())
    }

    pub fn num_tuples(&self, cg: &mut CodeGen<'_>, buf: ir::Value) -> ir::Value {
        let start = cg.load_field(buf, BufferProxy::buffer_start());
        let pos = cg.load_field(buf, BufferProxy::buffer_pos());
        let used = cg.sub(pos, start);
        let tuple_size = cg.const_i64(i64::from(self.tuple_size()));
        cg.udiv(used, tuple_size)
    }

    /// Forget every row and keep the memory.
    pub fn reset(&self, cg: &mut CodeGen<'_>, buf: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_buffer_reset", &[buf])?;
        Ok(())
    }

    pub fn destroy(&self, cg: &mut CodeGen<'_>, buf: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_buffer_destroy", &[buf])?;
        Ok(())
    }
}
