//! Logical type system.

mod logical_type;
mod value;

pub use logical_type::LogicalType;
pub use value::Value;
