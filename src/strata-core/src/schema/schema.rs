//! Schema definition for Strata frames.

use std::fmt;
use std::str::FromStr;

use arrow_schema::{Schema as ArrowSchema, SchemaRef};
use common_error::{StrataError, StrataResult, schema_err};
use serde::{Deserialize, Serialize};

use crate::mapping::{CanonicalTypeMapping, TypeMapping};
use crate::types::LogicalType;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub data_type: LogicalType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.data_type)
    }
}

/// Ordered sequence of uniquely named, typed columns.
///
/// A schema is an immutable value: equality is structural over names, order
/// and types. Operations that change the column set return a new schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Create a schema from an ordered list of fields.
    ///
    /// Fails with `SchemaError` on an empty or duplicate column name.
    pub fn new(fields: Vec<Field>) -> StrataResult<Self> {
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                schema_err!("column {i} has an empty name");
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                schema_err!("duplicate column name '{}'", field.name);
            }
            Self::check_nested(&field.data_type)?;
        }
        Ok(Self { fields })
    }

    fn check_nested(ty: &LogicalType) -> StrataResult<()> {
        match ty {
            LogicalType::List(inner) => Self::check_nested(inner),
            LogicalType::Struct(fields) => Self::new(fields.clone()).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Create a schema from `(name, type)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> StrataResult<Self>
    where
        I: IntoIterator<Item = (S, LogicalType)>,
        S: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, ty)| Field::new(name, ty))
                .collect(),
        )
    }

    /// The schema with no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Columns in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Consume into the column list.
    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up a column by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether a column exists.
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Position of a column, or `SchemaError` if absent.
    pub fn index_of(&self, name: &str) -> StrataResult<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| StrataError::schema_error(format!("column '{name}' not found in {self}")))
    }

    /// Exact compatibility: same names, same order, same types.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self == other
    }

    /// Check that every column of `self` exists in `other` with the same type.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.fields
            .iter()
            .all(|f| other.field(&f.name).is_some_and(|o| o.data_type == f.data_type))
    }

    /// Reduce to the named columns, in the order given.
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> StrataResult<Self> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let idx = self.index_of(name.as_ref())?;
            fields.push(self.fields[idx].clone());
        }
        Self::new(fields)
    }

    /// Return a new schema with `field` appended.
    pub fn append(&self, field: Field) -> StrataResult<Self> {
        let mut fields = self.fields.clone();
        fields.push(field);
        Self::new(fields)
    }

    /// Canonical Arrow schema.
    pub fn to_arrow(&self) -> SchemaRef {
        CanonicalTypeMapping.native_schema(self)
    }

    /// Build from a canonical Arrow schema.
    pub fn from_arrow(schema: &ArrowSchema) -> StrataResult<Self> {
        CanonicalTypeMapping.logical_schema(schema)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            fields: Vec<Field>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.fields).map_err(serde::de::Error::custom)
    }
}

/// Split on top-level commas, ignoring commas nested in `[]` or `{}`.
fn split_top_level(s: &str) -> StrataResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    schema_err!("unbalanced brackets in '{s}'");
                }
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        schema_err!("unbalanced brackets in '{s}'");
    }
    parts.push(&s[start..]);
    Ok(parts)
}

/// Parses the compact expression form `id:long,val:str,tags:[str]`.
impl FromStr for Schema {
    type Err = StrataError;

    fn from_str(s: &str) -> StrataResult<Self> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        let mut fields = Vec::new();
        for part in split_top_level(s)? {
            let (name, ty) = part
                .split_once(':')
                .ok_or_else(|| StrataError::schema_error(format!("expected name:type, got '{part}'")))?;
            fields.push(Field::new(name.trim(), ty.parse()?));
        }
        Self::new(fields)
    }
}
