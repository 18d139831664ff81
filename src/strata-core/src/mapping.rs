//! Logical-to-native type mapping.
//!
//! Each engine stores columns in its own Arrow layout. A [`TypeMapping`] is
//! the engine's bidirectional table between [`LogicalType`]s and those
//! native Arrow types. Engines differ only in how they map leaf types; lists
//! and structs are mapped recursively by the provided methods.

use std::fmt;
use std::sync::Arc;

use arrow_schema::{
    DataType as ArrowType, Field as ArrowField, Fields, Schema as ArrowSchema, SchemaRef, TimeUnit,
};
use common_error::{StrataError, StrataResult};

use crate::schema::{Field, Schema};
use crate::types::LogicalType;

/// Name of the element field in list types.
pub const LIST_ITEM_NAME: &str = "item";

/// Bidirectional mapping between logical and engine-native column types.
pub trait TypeMapping: Send + Sync + fmt::Debug {
    /// Name of the mapping, for diagnostics.
    fn name(&self) -> &str;

    /// Native type for a non-nested logical type.
    fn leaf_to_native(&self, ty: &LogicalType) -> ArrowType;

    /// Logical type for a non-nested native type, or `None` if unsupported.
    fn leaf_from_native(&self, ty: &ArrowType) -> Option<LogicalType>;

    /// Native type for any logical type.
    fn to_native(&self, ty: &LogicalType) -> ArrowType {
        match ty {
            LogicalType::List(inner) => ArrowType::List(Arc::new(ArrowField::new(
                LIST_ITEM_NAME,
                self.to_native(inner),
                true,
            ))),
            LogicalType::Struct(fields) => ArrowType::Struct(
                fields
                    .iter()
                    .map(|f| self.native_field(f))
                    .collect::<Vec<_>>()
                    .into(),
            ),
            leaf => self.leaf_to_native(leaf),
        }
    }

    /// Logical type for any native type. Fails with `ConversionError` when the
    /// native type has no logical counterpart.
    fn from_native(&self, ty: &ArrowType) -> StrataResult<LogicalType> {
        match ty {
            ArrowType::List(item) => Ok(LogicalType::List(Box::new(
                self.from_native(item.data_type())?,
            ))),
            ArrowType::Struct(fields) => Ok(LogicalType::Struct(self.logical_fields(fields)?)),
            leaf => self.leaf_from_native(leaf).ok_or_else(|| {
                StrataError::conversion(format!(
                    "native type {leaf} is not supported by the {} type mapping",
                    self.name()
                ))
            }),
        }
    }

    /// Native field for a logical field. All columns are nullable.
    fn native_field(&self, field: &Field) -> ArrowField {
        ArrowField::new(&field.name, self.to_native(&field.data_type), true)
    }

    /// Native schema for a logical schema.
    fn native_schema(&self, schema: &Schema) -> SchemaRef {
        let fields: Vec<ArrowField> = schema.fields().iter().map(|f| self.native_field(f)).collect();
        Arc::new(ArrowSchema::new(fields))
    }

    /// Logical schema for a native schema.
    fn logical_schema(&self, native: &ArrowSchema) -> StrataResult<Schema> {
        Schema::new(self.logical_fields(native.fields())?)
    }

    /// Logical fields for native fields.
    fn logical_fields(&self, fields: &Fields) -> StrataResult<Vec<Field>> {
        fields
            .iter()
            .map(|f| Ok(Field::new(f.name(), self.from_native(f.data_type())?)))
            .collect()
    }
}

/// The canonical Arrow layout handed to user code and used for ingestion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalTypeMapping;

impl TypeMapping for CanonicalTypeMapping {
    fn name(&self) -> &str {
        "canonical"
    }

    fn leaf_to_native(&self, ty: &LogicalType) -> ArrowType {
        match ty {
            LogicalType::Bool => ArrowType::Boolean,
            LogicalType::Int8 => ArrowType::Int8,
            LogicalType::Int16 => ArrowType::Int16,
            LogicalType::Int32 => ArrowType::Int32,
            LogicalType::Int64 => ArrowType::Int64,
            LogicalType::UInt8 => ArrowType::UInt8,
            LogicalType::UInt16 => ArrowType::UInt16,
            LogicalType::UInt32 => ArrowType::UInt32,
            LogicalType::UInt64 => ArrowType::UInt64,
            LogicalType::Float32 => ArrowType::Float32,
            LogicalType::Float64 => ArrowType::Float64,
            LogicalType::String => ArrowType::Utf8,
            LogicalType::Binary => ArrowType::Binary,
            LogicalType::Date => ArrowType::Date32,
            LogicalType::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
            // Nested types never reach the leaf table.
            LogicalType::List(_) | LogicalType::Struct(_) => self.to_native(ty),
        }
    }

    fn leaf_from_native(&self, ty: &ArrowType) -> Option<LogicalType> {
        let logical = match ty {
            ArrowType::Boolean => LogicalType::Bool,
            ArrowType::Int8 => LogicalType::Int8,
            ArrowType::Int16 => LogicalType::Int16,
            ArrowType::Int32 => LogicalType::Int32,
            ArrowType::Int64 => LogicalType::Int64,
            ArrowType::UInt8 => LogicalType::UInt8,
            ArrowType::UInt16 => LogicalType::UInt16,
            ArrowType::UInt32 => LogicalType::UInt32,
            ArrowType::UInt64 => LogicalType::UInt64,
            ArrowType::Float32 => LogicalType::Float32,
            ArrowType::Float64 => LogicalType::Float64,
            ArrowType::Utf8 => LogicalType::String,
            ArrowType::Binary => LogicalType::Binary,
            ArrowType::Date32 => LogicalType::Date,
            ArrowType::Timestamp(TimeUnit::Microsecond, None) => LogicalType::Timestamp,
            _ => return None,
        };
        Some(logical)
    }
}
