use cranelift_codegen::ir;
use cranelift_codegen::ir::types::I32;

use super::tile_group::{ScanCallback, TileGroup};
use crate::codegen::CodeGen;
use crate::error::CodegenResult;
use crate::lang::Loop;
use crate::types::Type;

/// Scan codegen for one table schema.
#[derive(Clone, Debug)]
pub struct Table {
    schema: Vec<Type>,
}

impl Table {
    pub fn new(schema: &[Type]) -> Self {
        Table {
            schema: schema.to_vec(),
        }
    }

    pub fn schema(&self) -> &[Type] {
        &self.schema
    }

    /// Scan tile groups `[tile_group_begin, tile_group_end)`.
    ///
    /// The end is clamped to the table's tile-group count, so passing
    /// `u32::MAX` scans to the end.
    pub fn generate_scan<C>(
        &self,
        cg: &mut CodeGen<'_>,
        table_ptr: ir::Value,
        tile_group_begin: ir::Value,
        tile_group_end: ir::Value,
        batch_size: u32,
        consumer: &mut C,
    ) -> CodegenResult<()>
    where
        C: ScanCallback + ?Sized,
    {
        tracing::debug!(columns = self.schema.len(), batch_size, "table scan");
        let count = cg.call_runtime_value("quarry_table_tile_group_count", &[table_ptr])?;
        let begin = cg.resize_unsigned(tile_group_begin, I32);
        let end = cg.resize_unsigned(tile_group_end, I32);
        let end = cg.umin(end, count);
        let any = cg.icmp_ult(begin, end);

        let tile_group = TileGroup::new(&self.schema);
        let mut groups = Loop::new(cg, any, &[begin]);
        let index = groups.loop_var(0);
        let tile_group_ptr = cg.call_runtime_value("quarry_table_tile_group", &[table_ptr, index])?;
        tile_group.generate_tuple_scan(cg, tile_group_ptr, batch_size, consumer)?;
        let next = cg.add_const(index, 1);
        let more = cg.icmp_ult(next, end);
        groups.loop_end(cg, more, &[next]);
        Ok(())
    }
}
