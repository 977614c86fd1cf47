//! Packed storage of a typed row.
//!
//! Hash-table keys, sorter rows and buffer rows all use the same layout:
//!
//! ```text
//! +-------------+----------+----------+-----+
//! | null bitmap | column 0 | column 1 | ... |
//! +-------------+----------+----------+-----+
//! ```
//!
//! The bitmap has one bit per nullable column, in column order, rounded up
//! to whole bytes. Columns follow at their storage width with no padding;
//! a variable-length column is an 8-byte pointer followed by a 4-byte
//! length. A NULL column sets its bit and still writes the type's sentinel
//! into its slot, so the stored bytes of equal keys are equal.

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::{I32, I8};

use crate::codegen::CodeGen;
use crate::error::CodegenResult;
use crate::types::{Type, Value};

/// Offset of the length inside a variable-length slot.
const VARLEN_LENGTH_OFFSET: u32 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactStorage {
    types: Vec<Type>,
    /// Byte offset of every column from the start of the storage.
    offsets: Vec<u32>,
    /// Bitmap bit of every nullable column.
    null_bits: Vec<Option<u32>>,
    bitmap_bytes: u32,
    storage_size: u32,
}

impl CompactStorage {
    /// Compute the layout of a row of `types`.
    pub fn setup(types: &[Type]) -> Self {
        let mut null_bits = Vec::with_capacity(types.len());
        let mut num_nullable: u32 = 0;
        for ty in types {
            if ty.nullable {
                null_bits.push(Some(num_nullable));
                num_nullable += 1;
            } else {
                null_bits.push(None);
            }
        }
        let bitmap_bytes = num_nullable.div_ceil(8);

        let mut offsets = Vec::with_capacity(types.len());
        let mut offset = bitmap_bytes;
        for ty in types {
            offsets.push(offset);
            offset += ty.sql_type.storage_width();
        }

        CompactStorage {
            types: types.to_vec(),
            offsets,
            null_bits,
            bitmap_bytes,
            storage_size: offset,
        }
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn num_columns(&self) -> usize {
        self.types.len()
    }

    /// Bytes one stored row occupies.
    pub fn max_storage_size(&self) -> u32 {
        self.storage_size
    }

    pub fn column_offset(&self, index: usize) -> u32 {
        self.offsets[index]
    }

    pub fn has_varlen(&self) -> bool {
        self.types.iter().any(|t| t.sql_type.is_varlen())
    }

    /// Write `values` at `ptr`. Returns the address just past the row.
    pub fn store_values(&self, cg: &mut CodeGen<'_>, ptr: ir::Value, values: &[Value]) -> ir::Value {
        assert_eq!(values.len(), self.types.len(), "row arity does not match storage");

        for byte in 0..self.bitmap_bytes {
            let mut bits = cg.const_i8(0);
            for (i, value) in values.iter().enumerate() {
                let Some(bit) = self.null_bits[i] else { continue };
                if bit / 8 != byte {
                    continue;
                }
                let null = value.is_null(cg);
                let shifted = cg.shl(null, i64::from(bit % 8));
                bits = cg.or(bits, shifted);
            }
            cg.store(bits, ptr, byte as i32);
        }

        for (i, value) in values.iter().enumerate() {
            self.store_column(cg, ptr, i, value);
        }
        cg.ptr_add_const(ptr, i64::from(self.storage_size))
    }

    fn store_column(&self, cg: &mut CodeGen<'_>, ptr: ir::Value, index: usize, value: &Value) {
        debug_assert_eq!(value.sql_type(), self.types[index].sql_type, "column {index} type mismatch");
        let offset = self.offsets[index] as i32;
        let stored = value.storage_repr(cg);
        cg.store(stored, ptr, offset);
        if value.sql_type().is_varlen() {
            let length = value.storage_length(cg);
            cg.store(length, ptr, offset + VARLEN_LENGTH_OFFSET as i32);
        }
    }

    /// Overwrite one column, updating its null bit.
    pub fn store_value(&self, cg: &mut CodeGen<'_>, ptr: ir::Value, index: usize, value: &Value) {
        if let Some(bit) = self.null_bits[index] {
            let byte_offset = (bit / 8) as i32;
            let shift = i64::from(bit % 8);
            let byte = cg.load(I8, ptr, byte_offset);
            let cleared = cg.and_const(byte, !(1i64 << shift));
            let null = value.is_null(cg);
            let shifted = cg.shl(null, shift);
            let updated = cg.or(cleared, shifted);
            cg.store(updated, ptr, byte_offset);
        }
        self.store_column(cg, ptr, index, value);
    }

    /// Read column `index` of the row at `ptr`.
    pub fn load_value(&self, cg: &mut CodeGen<'_>, ptr: ir::Value, index: usize) -> Value {
        let ty = self.types[index];
        let offset = self.offsets[index] as i32;
        let raw = cg.load(ty.sql_type.ir_type(), ptr, offset);

        let null = self.null_bits[index].map(|bit| {
            let byte = cg.load(I8, ptr, (bit / 8) as i32);
            let shifted = cg.ushr(byte, i64::from(bit % 8));
            cg.and_const(shifted, 1)
        });

        if ty.sql_type.is_varlen() {
            let length = cg.load(I32, ptr, offset + VARLEN_LENGTH_OFFSET as i32);
            Value::varlen(ty, raw, length, null)
        } else {
            match null {
                Some(null) => Value::with_null(ty, raw, null),
                None => Value::new(ty, raw),
            }
        }
    }

    /// Read every column. Returns the values and the address past the row.
    pub fn load_values(&self, cg: &mut CodeGen<'_>, ptr: ir::Value) -> (Vec<Value>, ir::Value) {
        let values = (0..self.types.len())
            .map(|i| self.load_value(cg, ptr, i))
            .collect();
        let end = cg.ptr_add_const(ptr, i64::from(self.storage_size));
        (values, end)
    }
}

/// Called with the values of one stored row.
pub trait RowCallback {
    fn process_row(&mut self, cg: &mut CodeGen<'_>, values: &[Value]) -> CodegenResult<()>;
}

impl<F> RowCallback for F
where
    F: FnMut(&mut CodeGen<'_>, &[Value]) -> CodegenResult<()>,
{
    fn process_row(&mut self, cg: &mut CodeGen<'_>, values: &[Value]) -> CodegenResult<()> {
        self(cg, values)
    }
}

#[cfg(test)]
mod tests;
