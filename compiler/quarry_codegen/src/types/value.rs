use std::fmt;

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::I32;

use super::SqlType;
use crate::codegen::CodeGen;
use crate::error::CodegenResult;

/// A SQL type plus nullability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl Type {
    pub const fn new(sql_type: SqlType, nullable: bool) -> Self {
        Type { sql_type, nullable }
    }

    pub const fn not_null(sql_type: SqlType) -> Self {
        Type::new(sql_type, false)
    }

    pub const fn nullable(sql_type: SqlType) -> Self {
        Type::new(sql_type, true)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}", self.sql_type)
        } else {
            write!(f, "{} not null", self.sql_type)
        }
    }
}

/// A typed value in generated code.
///
/// `value` is the primary representation (the pointer for variable-length
/// types), `length` the `i32` byte length of a variable-length value, and
/// `null` an `i8` 0/1 indicator. A value without an indicator is known not
/// to be NULL.
#[derive(Clone, Copy, Debug)]
pub struct Value {
    ty: Type,
    value: ir::Value,
    length: Option<ir::Value>,
    null: Option<ir::Value>,
}

impl Value {
    /// A fixed-width value that is not NULL.
    pub fn new(ty: Type, value: ir::Value) -> Self {
        debug_assert!(!ty.sql_type.is_varlen(), "variable-length values need a length");
        Value {
            ty,
            value,
            length: None,
            null: None,
        }
    }

    /// A fixed-width value with a null indicator.
    pub fn with_null(ty: Type, value: ir::Value, null: ir::Value) -> Self {
        debug_assert!(ty.nullable, "null indicator on a non-nullable type");
        Value {
            ty,
            value,
            length: None,
            null: Some(null),
        }
    }

    /// A variable-length value: data pointer, byte length and optional indicator.
    pub fn varlen(ty: Type, ptr: ir::Value, length: ir::Value, null: Option<ir::Value>) -> Self {
        debug_assert!(ty.sql_type.is_varlen());
        Value {
            ty,
            value: ptr,
            length: Some(length),
            null,
        }
    }

    /// Wrap a value read back from storage, deriving its null indicator
    /// from the sentinel when the type is nullable.
    pub fn from_storage(cg: &mut CodeGen<'_>, ty: Type, value: ir::Value, length: Option<ir::Value>) -> Self {
        let null = ty
            .nullable
            .then(|| Value::materialize_null(cg, ty.sql_type, value));
        Value {
            ty,
            value,
            length,
            null,
        }
    }

    /// `1` when `raw` is the NULL sentinel of `sql_type`.
    pub fn materialize_null(cg: &mut CodeGen<'_>, sql_type: SqlType, raw: ir::Value) -> ir::Value {
        let sentinel = sql_type.null_sentinel(cg);
        if sql_type == SqlType::Decimal {
            cg.fcmp_eq(raw, sentinel)
        } else {
            cg.icmp_eq(raw, sentinel)
        }
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn sql_type(&self) -> SqlType {
        self.ty.sql_type
    }

    pub fn value(&self) -> ir::Value {
        self.value
    }

    pub fn length(&self) -> Option<ir::Value> {
        self.length
    }

    pub fn null(&self) -> Option<ir::Value> {
        self.null
    }

    /// The null indicator, or a constant false.
    pub fn is_null(&self, cg: &mut CodeGen<'_>) -> ir::Value {
        match self.null {
            Some(null) => null,
            None => cg.const_bool(false),
        }
    }

    /// Primary value as stored: the sentinel in place of NULL.
    pub fn storage_repr(&self, cg: &mut CodeGen<'_>) -> ir::Value {
        match self.null {
            Some(null) => {
                let sentinel = self.ty.sql_type.null_sentinel(cg);
                cg.select(null, sentinel, self.value)
            }
            None => self.value,
        }
    }

    /// Length as stored: zero for NULL.
    pub fn storage_length(&self, cg: &mut CodeGen<'_>) -> ir::Value {
        let length = match self.length {
            Some(length) => length,
            None => panic!("{} value has no length", self.ty.sql_type),
        };
        match self.null {
            Some(null) => {
                let zero = cg.const_i32(0);
                cg.select(null, zero, length)
            }
            None => length,
        }
    }

    /// Column-wise equality where NULL equals NULL.
    pub fn equals(&self, cg: &mut CodeGen<'_>, other: &Value) -> CodegenResult<ir::Value> {
        debug_assert_eq!(self.ty.sql_type, other.ty.sql_type, "comparing different types");
        if self.ty.sql_type.is_varlen() {
            let (lhs, lhs_len) = (self.storage_repr(cg), self.storage_length(cg));
            let (rhs, rhs_len) = (other.storage_repr(cg), other.storage_length(cg));
            return cg.call_runtime_value("quarry_varlen_eq", &[lhs, lhs_len, rhs, rhs_len]);
        }

        let raw_eq = if self.ty.sql_type == SqlType::Decimal {
            cg.fcmp_eq(self.value, other.value)
        } else {
            cg.icmp_eq(self.value, other.value)
        };
        if self.null.is_none() && other.null.is_none() {
            return Ok(raw_eq);
        }
        let lhs_null = self.is_null(cg);
        let rhs_null = other.is_null(cg);
        let either = cg.or(lhs_null, rhs_null);
        let both = cg.and(lhs_null, rhs_null);
        Ok(cg.select(either, both, raw_eq))
    }

    /// AND of column-wise equality over two equally typed value lists.
    pub fn test_equality(cg: &mut CodeGen<'_>, lhs: &[Value], rhs: &[Value]) -> CodegenResult<Value> {
        assert_eq!(lhs.len(), rhs.len(), "equality over lists of different length");
        let mut result = cg.const_bool(true);
        for (l, r) in lhs.iter().zip(rhs) {
            let eq = l.equals(cg, r)?;
            result = cg.and(result, eq);
        }
        Ok(Value::new(Type::not_null(SqlType::Boolean), result))
    }

    /// Three-way comparison as an `i32` of -1, 0 or 1. NULL sorts first.
    pub fn compare_for_sort(&self, cg: &mut CodeGen<'_>, other: &Value) -> CodegenResult<ir::Value> {
        debug_assert_eq!(self.ty.sql_type, other.ty.sql_type, "comparing different types");
        if self.ty.sql_type.is_varlen() {
            let (lhs, lhs_len) = (self.storage_repr(cg), self.storage_length(cg));
            let (rhs, rhs_len) = (other.storage_repr(cg), other.storage_length(cg));
            return cg.call_runtime_value("quarry_varlen_cmp", &[lhs, lhs_len, rhs, rhs_len]);
        }

        let (lt, gt) = if self.ty.sql_type == SqlType::Decimal {
            (cg.fcmp_lt(self.value, other.value), cg.fcmp_gt(self.value, other.value))
        } else {
            (cg.icmp_slt(self.value, other.value), cg.icmp_sgt(self.value, other.value))
        };
        let less = cg.const_int(I32, -1);
        let equal = cg.const_int(I32, 0);
        let greater = cg.const_int(I32, 1);
        let not_less = cg.select(gt, greater, equal);
        let raw = cg.select(lt, less, not_less);
        if self.null.is_none() && other.null.is_none() {
            return Ok(raw);
        }

        let lhs_null = self.is_null(cg);
        let rhs_null = other.is_null(cg);
        let lhs_only = cg.select(rhs_null, equal, less);
        let rhs_side = cg.select(rhs_null, greater, raw);
        Ok(cg.select(lhs_null, lhs_only, rhs_side))
    }
}
