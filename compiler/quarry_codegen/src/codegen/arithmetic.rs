//! Arithmetic, comparison and conversion instructions for `CodeGen`.

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{self, types, InstBuilder, MemFlags, Type};

use super::CodeGen;

impl CodeGen<'_> {
    // -- Integer arithmetic --

    pub fn add(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().iadd(lhs, rhs)
    }

    pub fn add_const(&mut self, lhs: ir::Value, rhs: i64) -> ir::Value {
        let rhs = self.const_like(lhs, rhs);
        self.builder.ins().iadd(lhs, rhs)
    }

    pub fn sub(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().isub(lhs, rhs)
    }

    pub fn mul(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().imul(lhs, rhs)
    }

    pub fn mul_const(&mut self, lhs: ir::Value, rhs: i64) -> ir::Value {
        let rhs = self.const_like(lhs, rhs);
        self.builder.ins().imul(lhs, rhs)
    }

    /// Constant of the same integer type as `value`, masked to its width.
    fn const_like(&mut self, value: ir::Value, imm: i64) -> ir::Value {
        let ty = self.value_type(value);
        self.const_int(ty, imm)
    }

    pub fn udiv(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().udiv(lhs, rhs)
    }

    pub fn urem(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().urem(lhs, rhs)
    }

    pub fn and(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().band(lhs, rhs)
    }

    pub fn and_const(&mut self, lhs: ir::Value, rhs: i64) -> ir::Value {
        let rhs = self.const_like(lhs, rhs);
        self.builder.ins().band(lhs, rhs)
    }

    pub fn or(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().bor(lhs, rhs)
    }

    pub fn xor(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().bxor(lhs, rhs)
    }

    /// Logical negation of a 0/1 boolean.
    pub fn not(&mut self, value: ir::Value) -> ir::Value {
        self.builder.ins().bxor_imm(value, 1)
    }

    pub fn shl(&mut self, lhs: ir::Value, amount: i64) -> ir::Value {
        self.builder.ins().ishl_imm(lhs, amount)
    }

    pub fn ushr(&mut self, lhs: ir::Value, amount: i64) -> ir::Value {
        self.builder.ins().ushr_imm(lhs, amount)
    }

    pub fn ushr_value(&mut self, lhs: ir::Value, amount: ir::Value) -> ir::Value {
        self.builder.ins().ushr(lhs, amount)
    }

    pub fn shl_value(&mut self, lhs: ir::Value, amount: ir::Value) -> ir::Value {
        self.builder.ins().ishl(lhs, amount)
    }

    pub fn umin(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().umin(lhs, rhs)
    }

    // -- Comparisons (results are i8 booleans) --

    pub fn icmp(&mut self, cc: IntCC, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().icmp(cc, lhs, rhs)
    }

    pub fn icmp_eq(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.icmp(IntCC::Equal, lhs, rhs)
    }

    pub fn icmp_ne(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.icmp(IntCC::NotEqual, lhs, rhs)
    }

    pub fn icmp_slt(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.icmp(IntCC::SignedLessThan, lhs, rhs)
    }

    pub fn icmp_sgt(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.icmp(IntCC::SignedGreaterThan, lhs, rhs)
    }

    pub fn icmp_ult(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.icmp(IntCC::UnsignedLessThan, lhs, rhs)
    }

    pub fn icmp_ugt(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.icmp(IntCC::UnsignedGreaterThan, lhs, rhs)
    }

    pub fn icmp_eq_const(&mut self, lhs: ir::Value, rhs: i64) -> ir::Value {
        let rhs = self.const_like(lhs, rhs);
        self.icmp(IntCC::Equal, lhs, rhs)
    }

    pub fn icmp_ne_const(&mut self, lhs: ir::Value, rhs: i64) -> ir::Value {
        let rhs = self.const_like(lhs, rhs);
        self.icmp(IntCC::NotEqual, lhs, rhs)
    }

    pub fn icmp_ugt_const(&mut self, lhs: ir::Value, rhs: i64) -> ir::Value {
        let rhs = self.const_like(lhs, rhs);
        self.icmp(IntCC::UnsignedGreaterThan, lhs, rhs)
    }

    pub fn fcmp(&mut self, cc: FloatCC, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.builder.ins().fcmp(cc, lhs, rhs)
    }

    pub fn fcmp_eq(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.fcmp(FloatCC::Equal, lhs, rhs)
    }

    pub fn fcmp_lt(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.fcmp(FloatCC::LessThan, lhs, rhs)
    }

    pub fn fcmp_gt(&mut self, lhs: ir::Value, rhs: ir::Value) -> ir::Value {
        self.fcmp(FloatCC::GreaterThan, lhs, rhs)
    }

    // -- Conversions --

    /// Zero-extend to `ty`. A no-op when the value already has that type.
    pub fn zext(&mut self, value: ir::Value, ty: Type) -> ir::Value {
        if self.value_type(value) == ty {
            return value;
        }
        self.builder.ins().uextend(ty, value)
    }

    /// Sign-extend to `ty`. A no-op when the value already has that type.
    pub fn sext(&mut self, value: ir::Value, ty: Type) -> ir::Value {
        if self.value_type(value) == ty {
            return value;
        }
        self.builder.ins().sextend(ty, value)
    }

    /// Truncate to `ty`. A no-op when the value already has that type.
    pub fn trunc(&mut self, value: ir::Value, ty: Type) -> ir::Value {
        if self.value_type(value) == ty {
            return value;
        }
        self.builder.ins().ireduce(ty, value)
    }

    /// Widen or narrow an integer to `ty`, treating it as unsigned.
    pub fn resize_unsigned(&mut self, value: ir::Value, ty: Type) -> ir::Value {
        let from = self.value_type(value);
        if from.bits() < ty.bits() {
            self.zext(value, ty)
        } else {
            self.trunc(value, ty)
        }
    }

    /// A 0/1 boolean widened to `ty`.
    pub fn bool_to_int(&mut self, value: ir::Value, ty: Type) -> ir::Value {
        self.zext(value, ty)
    }

    /// Reinterpret the bits of an `f64` as an `i64`. Integers pass through.
    pub fn bitcast_to_int(&mut self, value: ir::Value) -> ir::Value {
        if self.value_type(value) == types::F64 {
            self.builder.ins().bitcast(types::I64, MemFlags::new(), value)
        } else {
            value
        }
    }
}
