use cranelift_codegen::ir;
use cranelift_codegen::ir::types::{I32, I64};
use quarry_rt::storage::VARLEN_SLOT_SIZE;

use crate::codegen::{CodeGen, PTR};
use crate::error::CodegenResult;
use crate::lang::VectorizedLoop;
use crate::proxy::ColumnLayoutInfoProxy;
use crate::types::{Type, Value};

/// The length follows the 8-byte pointer in a variable-length slot.
const VARLEN_LENGTH_OFFSET: i32 = VARLEN_SLOT_SIZE as i32 - 4;

/// Consumer of a tile-group scan.
pub trait ScanCallback {
    fn tile_group_start(&mut self, _cg: &mut CodeGen<'_>, _tile_group_id: ir::Value) -> CodegenResult<()> {
        Ok(())
    }

    /// Rows `[start, end)` of the current tile group, as `i32` ids.
    fn process_tuples(
        &mut self,
        cg: &mut CodeGen<'_>,
        start: ir::Value,
        end: ir::Value,
        access: &TileGroupAccess<'_>,
    ) -> CodegenResult<()>;

    fn tile_group_finish(&mut self, _cg: &mut CodeGen<'_>) -> CodegenResult<()> {
        Ok(())
    }
}

/// Where one column's values live inside a tile group.
#[derive(Clone, Copy, Debug)]
struct ColumnLayout {
    column: ir::Value,
    /// `i64` byte distance between consecutive rows.
    stride: ir::Value,
}

pub struct TileGroup<'s> {
    schema: &'s [Type],
}

impl<'s> TileGroup<'s> {
    pub fn new(schema: &'s [Type]) -> Self {
        TileGroup { schema }
    }

    fn column_layouts(&self, cg: &mut CodeGen<'_>, tile_group_ptr: ir::Value) -> CodegenResult<Vec<ColumnLayout>> {
        if self.schema.is_empty() {
            return Ok(Vec::new());
        }
        let num_cols = self.schema.len() as u32;
        let infos = cg.stack_buffer(num_cols * ColumnLayoutInfoProxy::SIZE, 8);
        let num_cols_arg = cg.const_i32(num_cols as i32);
        cg.call_runtime("quarry_tile_group_column_layouts", &[tile_group_ptr, infos, num_cols_arg])?;
        Ok((0..num_cols)
            .map(|i| {
                let info = cg.ptr_add_const(infos, i64::from(i * ColumnLayoutInfoProxy::SIZE));
                let column = cg.load_field(info, ColumnLayoutInfoProxy::column());
                let stride = cg.load_field(info, ColumnLayoutInfoProxy::stride());
                let stride = cg.zext(stride, I64);
                ColumnLayout { column, stride }
            })
            .collect())
    }

    /// Scan every row of the tile group at `tile_group_ptr` in batches.
    pub fn generate_tuple_scan<C>(
        &self,
        cg: &mut CodeGen<'_>,
        tile_group_ptr: ir::Value,
        batch_size: u32,
        consumer: &mut C,
    ) -> CodegenResult<()>
    where
        C: ScanCallback + ?Sized,
    {
        let num_tuples = cg.call_runtime_value("quarry_tile_group_num_tuples", &[tile_group_ptr])?;
        let layouts = self.column_layouts(cg, tile_group_ptr)?;
        let id = cg.call_runtime_value("quarry_tile_group_id", &[tile_group_ptr])?;
        consumer.tile_group_start(cg, id)?;

        let mut batches = VectorizedLoop::new(cg, num_tuples, batch_size, &[]);
        let range = batches.current_range();
        let access = TileGroupAccess {
            schema: self.schema,
            layouts,
        };
        consumer.process_tuples(cg, range.start, range.end, &access)?;
        batches.loop_end(cg, &[]);

        consumer.tile_group_finish(cg)
    }
}

/// Column access for the rows of one tile group.
pub struct TileGroupAccess<'s> {
    schema: &'s [Type],
    layouts: Vec<ColumnLayout>,
}

impl TileGroupAccess<'_> {
    pub fn row(&self, tid: ir::Value) -> TileGroupRow<'_> {
        TileGroupRow { access: self, tid }
    }
}

#[derive(Clone, Copy)]
pub struct TileGroupRow<'a> {
    access: &'a TileGroupAccess<'a>,
    tid: ir::Value,
}

impl TileGroupRow<'_> {
    pub fn tid(&self) -> ir::Value {
        self.tid
    }

    /// Load column `col` as a typed value.
    ///
    /// Nullable fixed-width columns are NULL when they hold their type's
    /// sentinel; variable-length columns are NULL when their pointer is null.
    pub fn load_column(&self, cg: &mut CodeGen<'_>, col: usize) -> Value {
        let ty = self.access.schema[col];
        let layout = self.access.layouts[col];
        let tid = cg.resize_unsigned(self.tid, I64);
        let offset = cg.mul(tid, layout.stride);
        let addr = cg.ptr_add(layout.column, offset);
        if ty.sql_type.is_varlen() {
            let ptr = cg.load(PTR, addr, 0);
            let length = cg.load(I32, addr, VARLEN_LENGTH_OFFSET);
            Value::from_storage(cg, ty, ptr, Some(length))
        } else {
            let raw = cg.load(ty.sql_type.ir_type(), addr, 0);
            Value::from_storage(cg, ty, raw, None)
        }
    }
}
