//! Logical column types.
//!
//! The fixed set of types a [`Schema`](crate::Schema) may use. Engines map
//! these to their native column types through a
//! [`TypeMapping`](crate::TypeMapping); native types never appear here.

use std::fmt;
use std::str::FromStr;

use common_error::{StrataError, StrataResult};
use serde::{Deserialize, Serialize};

use crate::schema::Field;

/// Data type of a schema column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Binary,
    /// Date (days since Unix epoch).
    Date,
    /// Timestamp (microseconds since Unix epoch, no time zone).
    Timestamp,
    /// List of elements of one type.
    List(Box<LogicalType>),
    /// Nested record with named fields.
    Struct(Vec<Field>),
}

impl LogicalType {
    /// Check if this type is an integer type.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float32 | Self::Float64)
    }

    /// Check if this type is a temporal type.
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Timestamp | Self::Date)
    }

    /// Check if this type nests other types.
    pub const fn is_nested(&self) -> bool {
        matches!(self, Self::List(_) | Self::Struct(_))
    }

    /// Short name used in schema expressions (`id:long,val:str`).
    pub fn expr_name(&self) -> String {
        match self {
            Self::Bool => "bool".to_string(),
            Self::Int8 => "byte".to_string(),
            Self::Int16 => "short".to_string(),
            Self::Int32 => "int".to_string(),
            Self::Int64 => "long".to_string(),
            Self::UInt8 => "ubyte".to_string(),
            Self::UInt16 => "ushort".to_string(),
            Self::UInt32 => "uint".to_string(),
            Self::UInt64 => "ulong".to_string(),
            Self::Float32 => "float".to_string(),
            Self::Float64 => "double".to_string(),
            Self::String => "str".to_string(),
            Self::Binary => "bytes".to_string(),
            Self::Date => "date".to_string(),
            Self::Timestamp => "datetime".to_string(),
            Self::List(inner) => format!("[{}]", inner.expr_name()),
            Self::Struct(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{}:{}", f.name, f.data_type.expr_name()))
                    .collect();
                format!("{{{}}}", inner.join(","))
            }
        }
    }

    fn from_simple_name(name: &str) -> Option<Self> {
        let ty = match name {
            "bool" | "boolean" => Self::Bool,
            "byte" | "int8" => Self::Int8,
            "short" | "int16" => Self::Int16,
            "int" | "int32" => Self::Int32,
            "long" | "int64" => Self::Int64,
            "ubyte" | "uint8" => Self::UInt8,
            "ushort" | "uint16" => Self::UInt16,
            "uint" | "uint32" => Self::UInt32,
            "ulong" | "uint64" => Self::UInt64,
            "float" | "float32" => Self::Float32,
            "double" | "float64" => Self::Float64,
            "str" | "string" => Self::String,
            "bytes" | "binary" => Self::Binary,
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::Timestamp,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr_name())
    }
}

impl FromStr for LogicalType {
    type Err = StrataError;

    fn from_str(s: &str) -> StrataResult<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            return Ok(Self::List(Box::new(inner.parse()?)));
        }
        if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let schema: crate::Schema = inner.parse()?;
            return Ok(Self::Struct(schema.into_fields()));
        }
        Self::from_simple_name(&s.to_ascii_lowercase())
            .ok_or_else(|| StrataError::schema_error(format!("unknown type '{s}'")))
    }
}
