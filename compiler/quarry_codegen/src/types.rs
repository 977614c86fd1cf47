//! SQL types and typed generated-code values.
//!
//! A [`Value`] is what operators hand to hashing, comparison and storage
//! codegen: the IR value of the column, its length for variable-length
//! types, and an optional null indicator.

mod sql_type;
mod value;

pub use sql_type::SqlType;
pub use value::{Type, Value};
