//! Runtime value representation.
//!
//! `Value` is the row-level view of a cell. It is used for row-oriented
//! ingestion, for reading partition key values, and for the ordering and
//! hashing the partitioner relies on, so both must be identical on every
//! engine.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    TimestampMicrosecondType, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use arrow_array::Array;
use arrow_schema::{DataType as ArrowType, TimeUnit};
use common_error::{StrataError, StrataResult};
use serde::{Deserialize, Serialize};

/// Runtime value in Strata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer of any width.
    Int(i64),
    /// Unsigned integer of any width.
    UInt(u64),
    /// Floating point of any width.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Binary(Vec<u8>),
    /// Date (days since Unix epoch).
    Date(i32),
    /// Timestamp (microseconds since Unix epoch).
    Timestamp(i64),
    /// List of values.
    List(Vec<Value>),
    /// Struct as ordered (name, value) pairs.
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64. Unsigned values that fit are converted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Try to get as u64. Non-negative signed values are converted.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(u) => Some(*u),
            Self::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::UInt(_) => "UInt",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Binary(_) => "Binary",
            Self::Date(_) => "Date",
            Self::Timestamp(_) => "Timestamp",
            Self::List(_) => "List",
            Self::Struct(_) => "Struct",
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::UInt(_) => 3,
            Self::Float(_) => 4,
            Self::String(_) => 5,
            Self::Binary(_) => 6,
            Self::Date(_) => 7,
            Self::Timestamp(_) => 8,
            Self::List(_) => 9,
            Self::Struct(_) => 10,
        }
    }

    /// Read the cell at `row` of an Arrow array.
    ///
    /// Accepts both the canonical Arrow layouts and the large-offset variants
    /// used by some engines natively.
    pub fn from_array(array: &dyn Array, row: usize) -> StrataResult<Self> {
        if array.is_null(row) {
            return Ok(Self::Null);
        }
        let value = match array.data_type() {
            ArrowType::Null => Self::Null,
            ArrowType::Boolean => Self::Bool(array.as_boolean().value(row)),
            ArrowType::Int8 => Self::Int(i64::from(array.as_primitive::<Int8Type>().value(row))),
            ArrowType::Int16 => Self::Int(i64::from(array.as_primitive::<Int16Type>().value(row))),
            ArrowType::Int32 => Self::Int(i64::from(array.as_primitive::<Int32Type>().value(row))),
            ArrowType::Int64 => Self::Int(array.as_primitive::<Int64Type>().value(row)),
            ArrowType::UInt8 => {
                Self::UInt(u64::from(array.as_primitive::<UInt8Type>().value(row)))
            }
            ArrowType::UInt16 => {
                Self::UInt(u64::from(array.as_primitive::<UInt16Type>().value(row)))
            }
            ArrowType::UInt32 => {
                Self::UInt(u64::from(array.as_primitive::<UInt32Type>().value(row)))
            }
            ArrowType::UInt64 => Self::UInt(array.as_primitive::<UInt64Type>().value(row)),
            ArrowType::Float32 => {
                Self::Float(f64::from(array.as_primitive::<Float32Type>().value(row)))
            }
            ArrowType::Float64 => Self::Float(array.as_primitive::<Float64Type>().value(row)),
            ArrowType::Utf8 => Self::String(array.as_string::<i32>().value(row).to_string()),
            ArrowType::LargeUtf8 => Self::String(array.as_string::<i64>().value(row).to_string()),
            ArrowType::Binary => Self::Binary(array.as_binary::<i32>().value(row).to_vec()),
            ArrowType::LargeBinary => Self::Binary(array.as_binary::<i64>().value(row).to_vec()),
            ArrowType::Date32 => Self::Date(array.as_primitive::<Date32Type>().value(row)),
            ArrowType::Timestamp(TimeUnit::Microsecond, _) => {
                Self::Timestamp(array.as_primitive::<TimestampMicrosecondType>().value(row))
            }
            ArrowType::List(_) => {
                let items = array.as_list::<i32>().value(row);
                Self::List(Self::collect_array(items.as_ref())?)
            }
            ArrowType::LargeList(_) => {
                let items = array.as_list::<i64>().value(row);
                Self::List(Self::collect_array(items.as_ref())?)
            }
            ArrowType::Struct(fields) => {
                let columns = array.as_struct().columns();
                let mut entries = Vec::with_capacity(fields.len());
                for (field, column) in fields.iter().zip(columns) {
                    entries.push((field.name().clone(), Self::from_array(column.as_ref(), row)?));
                }
                Self::Struct(entries)
            }
            other => {
                return Err(StrataError::conversion(format!(
                    "unsupported native column type {other}"
                )));
            }
        };
        Ok(value)
    }

    fn collect_array(array: &dyn Array) -> StrataResult<Vec<Self>> {
        (0..array.len()).map(|i| Self::from_array(array, i)).collect()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order: values of different variants order by variant, nulls first;
/// floats use IEEE total ordering.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::UInt(a), Self::UInt(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => a.cmp(b),
            (Self::Struct(a), Self::Struct(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(i) => i.hash(state),
            Self::UInt(u) => u.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::String(s) => s.hash(state),
            Self::Binary(b) => b.hash(state),
            Self::Date(d) => d.hash(state),
            Self::Timestamp(t) => t.hash(state),
            Self::List(items) => items.hash(state),
            Self::Struct(entries) => entries.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "date({d})"),
            Self::Timestamp(t) => write!(f, "ts({t})"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Self::Struct(entries) => {
                let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::sync::Arc;

    use arrow_array::{ArrayRef, Int32Array, LargeStringArray, ListArray, StringArray};

    use super::*;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_total_order() {
        let mut values = vec![
            Value::from("b"),
            Value::Null,
            Value::from(3i64),
            Value::from("a"),
            Value::from(-1i64),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::from(-1i64),
                Value::from(3i64),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_float_nan_is_equal_to_itself() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(nan, nan.clone());
        assert_eq!(hash_of(&nan), hash_of(&Value::Float(f64::NAN)));
    }

    #[test]
    fn test_hash_distinguishes_variants() {
        assert_ne!(hash_of(&Value::Int(1)), hash_of(&Value::UInt(1)));
        assert_eq!(hash_of(&Value::from("x")), hash_of(&Value::from("x")));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::UInt(7).as_i64(), Some(7));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::Int(2).as_f64(), Some(2.0));
        assert_eq!(Value::from(Some("s")).as_str(), Some("s"));
        assert!(Value::from(None::<i64>).is_null());
    }

    #[test]
    fn test_from_array() {
        let ints = Int32Array::from(vec![Some(5), None]);
        assert_eq!(Value::from_array(&ints, 0).unwrap(), Value::Int(5));
        assert_eq!(Value::from_array(&ints, 1).unwrap(), Value::Null);

        let strings = StringArray::from(vec!["x"]);
        let large = LargeStringArray::from(vec!["x"]);
        assert_eq!(
            Value::from_array(&strings, 0).unwrap(),
            Value::from_array(&large, 0).unwrap()
        );
    }

    #[test]
    fn test_from_list_array() {
        let list = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![Some(vec![
            Some(1),
            None,
        ])]);
        let array: ArrayRef = Arc::new(list);
        assert_eq!(
            Value::from_array(array.as_ref(), 0).unwrap(),
            Value::List(vec![Value::Int(1), Value::Null])
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from("a").to_string(), "\"a\"");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Null]).to_string(),
            "[1, null]"
        );
    }
}
