//! Typed constants for `CodeGen`.

use cranelift_codegen::ir::{self, types, InstBuilder, Type};

use super::{CodeGen, PTR};

impl CodeGen<'_> {
    pub fn const_i8(&mut self, value: i8) -> ir::Value {
        self.const_int(types::I8, i64::from(value))
    }

    pub fn const_i16(&mut self, value: i16) -> ir::Value {
        self.const_int(types::I16, i64::from(value))
    }

    pub fn const_i32(&mut self, value: i32) -> ir::Value {
        self.const_int(types::I32, i64::from(value))
    }

    pub fn const_i64(&mut self, value: i64) -> ir::Value {
        self.builder.ins().iconst(types::I64, value)
    }

    /// Integer constant of an arbitrary integer type.
    ///
    /// Cranelift wants narrow immediates zero-extended, so the value is
    /// masked to the width of `ty`.
    pub fn const_int(&mut self, ty: Type, value: i64) -> ir::Value {
        let bits = ty.bits();
        let masked = if bits >= 64 {
            value
        } else {
            value & ((1i64 << bits) - 1)
        };
        self.builder.ins().iconst(ty, masked)
    }

    /// Boolean as an `i8` holding 0 or 1, the same shape `icmp` produces.
    pub fn const_bool(&mut self, value: bool) -> ir::Value {
        self.builder.ins().iconst(types::I8, i64::from(value))
    }

    pub fn const_f64(&mut self, value: f64) -> ir::Value {
        self.builder.ins().f64const(value)
    }

    /// Pointer-sized integer constant.
    pub fn const_ptr_sized(&mut self, value: u64) -> ir::Value {
        self.builder.ins().iconst(PTR, value as i64)
    }

    pub fn null_ptr(&mut self) -> ir::Value {
        self.builder.ins().iconst(PTR, 0)
    }
}
