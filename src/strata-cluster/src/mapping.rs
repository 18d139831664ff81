//! Native column types of the cluster engine.

use arrow_schema::{DataType as ArrowType, TimeUnit};
use strata_core::{CanonicalTypeMapping, LogicalType, TypeMapping};

/// Time zone tagged on every native timestamp column.
pub const NATIVE_TIME_ZONE: &str = "UTC";

/// The cluster's storage layout: 64-bit offsets for variable-width columns
/// and UTC-tagged timestamps. Everything else matches the canonical layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterTypeMapping;

impl TypeMapping for ClusterTypeMapping {
    fn name(&self) -> &str {
        "cluster"
    }

    fn leaf_to_native(&self, ty: &LogicalType) -> ArrowType {
        match ty {
            LogicalType::String => ArrowType::LargeUtf8,
            LogicalType::Binary => ArrowType::LargeBinary,
            LogicalType::Timestamp => {
                ArrowType::Timestamp(TimeUnit::Microsecond, Some(NATIVE_TIME_ZONE.into()))
            }
            other => CanonicalTypeMapping.leaf_to_native(other),
        }
    }

    fn leaf_from_native(&self, ty: &ArrowType) -> Option<LogicalType> {
        match ty {
            ArrowType::LargeUtf8 => Some(LogicalType::String),
            ArrowType::LargeBinary => Some(LogicalType::Binary),
            ArrowType::Timestamp(TimeUnit::Microsecond, Some(tz)) if tz.as_ref() == NATIVE_TIME_ZONE => {
                Some(LogicalType::Timestamp)
            }
            ArrowType::Utf8 | ArrowType::Binary | ArrowType::Timestamp(..) => None,
            other => CanonicalTypeMapping.leaf_from_native(other),
        }
    }
}
