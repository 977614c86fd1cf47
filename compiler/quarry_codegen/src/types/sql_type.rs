use std::fmt;

use cranelift_codegen::ir;
use cranelift_codegen::ir::types::{F64, I16, I32, I64, I8};

use crate::codegen::{CodeGen, PTR};

/// Bytes a variable-length value takes in packed storage: pointer, then length.
pub const VARLEN_STORAGE_SIZE: u32 = quarry_rt::storage::VARLEN_SLOT_SIZE;

/// Column types understood by the code generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    /// Stored as an `f64`.
    Decimal,
    /// Days since the epoch.
    Date,
    /// Microseconds since the epoch.
    Timestamp,
    Varchar,
    Varbinary,
}

impl SqlType {
    pub fn is_varlen(self) -> bool {
        matches!(self, SqlType::Varchar | SqlType::Varbinary)
    }

    /// IR type of the primary value. Variable-length values are a pointer.
    pub fn ir_type(self) -> ir::Type {
        match self {
            SqlType::Boolean | SqlType::TinyInt => I8,
            SqlType::SmallInt => I16,
            SqlType::Integer | SqlType::Date => I32,
            SqlType::BigInt | SqlType::Timestamp => I64,
            SqlType::Decimal => F64,
            SqlType::Varchar | SqlType::Varbinary => PTR,
        }
    }

    /// Native width of the primary value in bytes.
    pub fn native_width(self) -> u32 {
        self.ir_type().bytes()
    }

    /// Bytes the value occupies in packed key or row storage.
    pub fn storage_width(self) -> u32 {
        if self.is_varlen() {
            VARLEN_STORAGE_SIZE
        } else {
            self.native_width()
        }
    }

    /// Emit the value that stands for NULL in storage.
    pub fn null_sentinel(self, cg: &mut CodeGen<'_>) -> ir::Value {
        match self {
            SqlType::Boolean | SqlType::TinyInt => cg.const_i8(i8::MIN),
            SqlType::SmallInt => cg.const_i16(i16::MIN),
            SqlType::Integer | SqlType::Date => cg.const_i32(i32::MIN),
            SqlType::BigInt | SqlType::Timestamp => cg.const_i64(i64::MIN),
            SqlType::Decimal => cg.const_f64(f64::MIN),
            SqlType::Varchar | SqlType::Varbinary => cg.null_ptr(),
        }
    }

    /// Little-endian bytes of the NULL sentinel, for building storage from Rust.
    ///
    /// Variable-length types have no fixed sentinel bytes and return `None`.
    pub fn null_sentinel_bytes(self) -> Option<Vec<u8>> {
        let bytes = match self {
            SqlType::Boolean | SqlType::TinyInt => i8::MIN.to_le_bytes().to_vec(),
            SqlType::SmallInt => i16::MIN.to_le_bytes().to_vec(),
            SqlType::Integer | SqlType::Date => i32::MIN.to_le_bytes().to_vec(),
            SqlType::BigInt | SqlType::Timestamp => i64::MIN.to_le_bytes().to_vec(),
            SqlType::Decimal => f64::MIN.to_le_bytes().to_vec(),
            SqlType::Varchar | SqlType::Varbinary => return None,
        };
        Some(bytes)
    }

    pub fn name(self) -> &'static str {
        match self {
            SqlType::Boolean => "boolean",
            SqlType::TinyInt => "tinyint",
            SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Decimal => "decimal",
            SqlType::Date => "date",
            SqlType::Timestamp => "timestamp",
            SqlType::Varchar => "varchar",
            SqlType::Varbinary => "varbinary",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
