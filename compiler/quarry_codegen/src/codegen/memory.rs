//! Memory instructions for `CodeGen`.
//!
//! Plain `load`/`store` make no alignment promise, since packed key and row
//! storage places fields at arbitrary byte offsets. Field accessors go
//! through `MemFlags::trusted()`: runtime structs are `#[repr(C)]` and
//! always aligned.

use cranelift_codegen::ir::{self, InstBuilder, MemFlags, StackSlotData, StackSlotKind, Type};

use super::{CodeGen, PTR};
use crate::proxy::FieldInfo;

impl CodeGen<'_> {
    /// Load a `ty` at `ptr + offset`, no alignment assumed.
    pub fn load(&mut self, ty: Type, ptr: ir::Value, offset: i32) -> ir::Value {
        self.builder.ins().load(ty, MemFlags::new(), ptr, offset)
    }

    /// Store `value` at `ptr + offset`, no alignment assumed.
    pub fn store(&mut self, value: ir::Value, ptr: ir::Value, offset: i32) {
        self.builder.ins().store(MemFlags::new(), value, ptr, offset);
    }

    /// Load one field of a runtime struct.
    pub fn load_field(&mut self, base: ir::Value, field: FieldInfo) -> ir::Value {
        self.builder
            .ins()
            .load(field.ty, MemFlags::trusted(), base, field.offset)
    }

    /// Store one field of a runtime struct.
    pub fn store_field(&mut self, base: ir::Value, field: FieldInfo, value: ir::Value) {
        debug_assert_eq!(self.value_type(value), field.ty, "field store type mismatch");
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, base, field.offset);
    }

    /// Address of a runtime struct field.
    pub fn field_addr(&mut self, base: ir::Value, field: FieldInfo) -> ir::Value {
        self.ptr_add_const(base, i64::from(field.offset))
    }

    /// `ptr + offset` where `offset` is an integer of any width (zero-extended).
    pub fn ptr_add(&mut self, ptr: ir::Value, offset: ir::Value) -> ir::Value {
        let offset = self.zext(offset, PTR);
        self.builder.ins().iadd(ptr, offset)
    }

    pub fn ptr_add_const(&mut self, ptr: ir::Value, offset: i64) -> ir::Value {
        if offset == 0 {
            return ptr;
        }
        self.builder.ins().iadd_imm(ptr, offset)
    }

    /// Reserve `size` bytes in the function's stack frame and return their
    /// address. The memory is not initialized.
    pub fn stack_buffer(&mut self, size: u32, align: u32) -> ir::Value {
        debug_assert!(align.is_power_of_two(), "stack alignment must be a power of two");
        let align_shift = align.trailing_zeros() as u8;
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size,
            align_shift,
        ));
        self.builder.ins().stack_addr(PTR, slot, 0)
    }
}
