//! Sorter codegen.
//!
//! Rows are packed with [`CompactStorage`] into the runtime sorter's
//! contiguous buffer. Sorting calls back into a comparison function emitted
//! by [`Sorter::compare_function`]; afterwards the buffer holds the rows in
//! order, so iteration is the same before and after sorting.

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::{I32, I64};
use cranelift_module::FuncId;
use rustc_hash::FxHashMap;

use crate::code_context::CodeContext;
use crate::codegen::{CodeGen, PTR};
use crate::compact_storage::{CompactStorage, RowCallback};
use crate::error::CodegenResult;
use crate::lang::{Loop, VectorizedLoop};
use crate::proxy::SorterProxy;
use crate::types::{Type, Value};

/// One column of a sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: usize,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: usize) -> Self {
        SortKey {
            column,
            descending: false,
        }
    }

    pub fn desc(column: usize) -> Self {
        SortKey {
            column,
            descending: true,
        }
    }
}

/// Called once per batch of sorted rows `[start, end)`.
pub trait SorterBatchCallback {
    fn process_entries(
        &mut self,
        cg: &mut CodeGen<'_>,
        start: ir::Value,
        end: ir::Value,
        access: &mut SorterAccess<'_>,
    ) -> CodegenResult<()>;
}

impl<F> SorterBatchCallback for F
where
    F: FnMut(&mut CodeGen<'_>, ir::Value, ir::Value, &mut SorterAccess<'_>) -> CodegenResult<()>,
{
    fn process_entries(
        &mut self,
        cg: &mut CodeGen<'_>,
        start: ir::Value,
        end: ir::Value,
        access: &mut SorterAccess<'_>,
    ) -> CodegenResult<()> {
        self(cg, start, end, access)
    }
}

#[derive(Clone, Debug)]
pub struct Sorter {
    storage: CompactStorage,
}

impl Sorter {
    /// # Panics
    ///
    /// Panics if `row_types` is empty.
    pub fn new(row_types: &[Type]) -> Self {
        assert!(!row_types.is_empty(), "a sorter row needs at least one column");
        let storage = CompactStorage::setup(row_types);
        tracing::debug!(tuple_size = storage.max_storage_size(), "sorter layout");
        Sorter { storage }
    }

    pub fn storage(&self) -> &CompactStorage {
        &self.storage
    }

    pub fn tuple_size(&self) -> u32 {
        self.storage.max_storage_size()
    }

    /// `comparison_fn` is the address of a function built by
    /// [`compare_function`](Self::compare_function).
    pub fn init(&self, cg: &mut CodeGen<'_>, sorter: ir::Value, comparison_fn: ir::Value) -> CodegenResult<()> {
        let tuple_size = cg.const_i64(i64::from(self.tuple_size()));
        cg.call_runtime("quarry_sorter_init", &[sorter, comparison_fn, tuple_size])?;
        Ok(())
    }

    pub fn append(&self, cg: &mut CodeGen<'_>, sorter: ir::Value, values: &[Value]) -> CodegenResult<()> {
        let space = self.append_raw(cg, sorter)?;
        self.storage.store_values(cg, space, values);
        Ok(())
    }

    /// Reserve one row and return its address for the caller to fill.
    pub fn append_raw(&self, cg: &mut CodeGen<'_>, sorter: ir::Value) -> CodegenResult<ir::Value> {
        cg.call_runtime_value("quarry_sorter_append", &[sorter])
    }

    pub fn sort(&self, cg: &mut CodeGen<'_>, sorter: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_sorter_sort", &[sorter])?;
        Ok(())
    }

    /// Merge the per-thread sorters at `offset` in every thread state into
    /// `sorter` and sort the result.
    pub fn sort_parallel(
        &self,
        cg: &mut CodeGen<'_>,
        sorter: ir::Value,
        thread_states: ir::Value,
        offset: u32,
    ) -> CodegenResult<()> {
        let offset = cg.const_i32(offset as i32);
        cg.call_runtime("quarry_sorter_sort_parallel", &[sorter, thread_states, offset])?;
        Ok(())
    }

    /// `(buffer_pos - buffer_start) / tuple_size` as an `i64`.
    pub fn num_tuples(&self, cg: &mut CodeGen<'_>, sorter: ir::Value) -> ir::Value {
        let start = cg.load_field(sorter, SorterProxy::buffer_start());
        let pos = cg.load_field(sorter, SorterProxy::buffer_pos());
        let used = cg.sub(pos, start);
        let tuple_size = cg.const_i64(i64::from(self.tuple_size()));
        cg.udiv(used, tuple_size)
    }

    /// Hand the rows to `callback` in batches of `batch_size`.
    pub fn vectorized_iterate<C>(
        &self,
        cg: &mut CodeGen<'_>,
        sorter: ir::Value,
        batch_size: u32,
        callback: &mut C,
    ) -> CodegenResult<()>
    where
        C: SorterBatchCallback + ?Sized,
    {
        let start = cg.load_field(sorter, SorterProxy::buffer_start());
        let num_tuples = self.num_tuples(cg, sorter);
        let mut batches = VectorizedLoop::new(cg, num_tuples, batch_size, &[]);
        let range = batches.current_range();
        let mut access = SorterAccess::new(self, start);
        callback.process_entries(cg, range.start, range.end, &mut access)?;
        batches.loop_end(cg, &[]);
        Ok(())
    }

    /// Run `callback` on every row, in buffer order.
    pub fn iterate<C>(&self, cg: &mut CodeGen<'_>, sorter: ir::Value, callback: &mut C) -> CodegenResult<()>
    where
        C: RowCallback + ?Sized,
    {
        let batch_size = cg.config().vector_size;
        self.vectorized_iterate(
            cg,
            sorter,
            batch_size,
            &mut |cg: &mut CodeGen<'_>,
                  start: ir::Value,
                  end: ir::Value,
                  access: &mut SorterAccess<'_>|
             -> CodegenResult<()> {
                let nonempty = cg.icmp_ult(start, end);
                let mut rows = Loop::new(cg, nonempty, &[start]);
                let index = rows.loop_var(0);
                let values = access.row(cg, index).load_columns(cg);
                callback.process_row(cg, &values)?;
                let next = cg.add_const(index, 1);
                let more = cg.icmp_ult(next, end);
                rows.loop_end(cg, more, &[next]);
                Ok(())
            },
        )
    }

    pub fn destroy(&self, cg: &mut CodeGen<'_>, sorter: ir::Value) -> CodegenResult<()> {
        cg.call_runtime("quarry_sorter_destroy", &[sorter])?;
        Ok(())
    }

    /// Emit `name(left, right) -> i32` ordering two rows of this sorter by
    /// `sort_keys`, most significant first.
    ///
    /// NULL sorts before every value in ascending order and after every
    /// value in descending order.
    pub fn compare_function(&self, ctx: &mut CodeContext, name: &str, sort_keys: &[SortKey]) -> CodegenResult<FuncId> {
        tracing::debug!(name, keys = sort_keys.len(), "sorter comparison function");
        ctx.define_function(name, &[PTR, PTR], &[I32], |cg, args| {
            let (left, right) = (args[0], args[1]);
            // Folded from the least significant key so the first nonzero
            // comparison wins without branches.
            let mut result: Option<ir::Value> = None;
            for key in sort_keys.iter().rev() {
                let lhs = self.storage.load_value(cg, left, key.column);
                let rhs = self.storage.load_value(cg, right, key.column);
                let mut cmp = lhs.compare_for_sort(cg, &rhs)?;
                if key.descending {
                    let zero = cg.const_i32(0);
                    cmp = cg.sub(zero, cmp);
                }
                result = Some(match result {
                    None => cmp,
                    Some(less_significant) => {
                        let decided = cg.icmp_ne_const(cmp, 0);
                        cg.select(decided, cmp, less_significant)
                    }
                });
            }
            let result = match result {
                Some(result) => result,
                None => cg.const_i32(0),
            };
            cg.ret(&[result]);
            Ok(())
        })
    }
}

/// Row access inside a sorter batch.
///
/// Row addresses are cached by index value, so repeated `row(i)` calls emit
/// the address computation once. Only reuse an index within the code
/// region where it was first used.
pub struct SorterAccess<'s> {
    sorter: &'s Sorter,
    buffer_start: ir::Value,
    rows: FxHashMap<ir::Value, ir::Value>,
}

impl<'s> SorterAccess<'s> {
    fn new(sorter: &'s Sorter, buffer_start: ir::Value) -> Self {
        SorterAccess {
            sorter,
            buffer_start,
            rows: FxHashMap::default(),
        }
    }

    pub fn row(&mut self, cg: &mut CodeGen<'_>, index: ir::Value) -> SorterRow<'s> {
        let ptr = match self.rows.get(&index) {
            Some(&ptr) => ptr,
            None => {
                let index64 = cg.resize_unsigned(index, I64);
                let offset = cg.mul_const(index64, i64::from(self.sorter.tuple_size()));
                let ptr = cg.ptr_add(self.buffer_start, offset);
                self.rows.insert(index, ptr);
                ptr
            }
        };
        SorterRow {
            storage: &self.sorter.storage,
            ptr,
        }
    }
}

/// One row of a sorter.
#[derive(Clone, Copy)]
pub struct SorterRow<'s> {
    storage: &'s CompactStorage,
    ptr: ir::Value,
}

impl SorterRow<'_> {
    pub fn ptr(&self) -> ir::Value {
        self.ptr
    }

    pub fn load_column(&self, cg: &mut CodeGen<'_>, column: usize) -> Value {
        self.storage.load_value(cg, self.ptr, column)
    }

    pub fn load_columns(&self, cg: &mut CodeGen<'_>) -> Vec<Value> {
        self.storage.load_values(cg, self.ptr).0
    }
}
