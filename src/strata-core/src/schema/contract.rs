//! Schema contracts between producer and consumer tasks.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Schema;

/// What a consumer requires of a producer's output schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaContract {
    /// Names, order and types must match exactly.
    Exact(Schema),
    /// The listed columns must exist with the same types; extra columns are allowed.
    Subset(Schema),
}

impl SchemaContract {
    /// The schema the contract is expressed against.
    pub fn schema(&self) -> &Schema {
        match self {
            Self::Exact(s) | Self::Subset(s) => s,
        }
    }

    /// Check whether `produced` satisfies the contract.
    pub fn accepts(&self, produced: &Schema) -> bool {
        match self {
            Self::Exact(expected) => expected.is_compatible_with(produced),
            Self::Subset(required) => required.is_subset_of(produced),
        }
    }

    /// Describe why `produced` violates the contract, or `None` when it does not.
    pub fn violation(&self, produced: &Schema) -> Option<String> {
        if self.accepts(produced) {
            return None;
        }
        let mut problems = Vec::new();
        for field in self.schema().fields() {
            match produced.field(&field.name) {
                None => problems.push(format!("missing column '{}'", field.name)),
                Some(found) if found.data_type != field.data_type => problems.push(format!(
                    "column '{}' is {} but {} is required",
                    field.name, found.data_type, field.data_type
                )),
                Some(_) => {}
            }
        }
        if let Self::Exact(expected) = self {
            for field in produced.fields() {
                if !expected.contains(&field.name) {
                    problems.push(format!("unexpected column '{}'", field.name));
                }
            }
            if problems.is_empty() {
                problems.push("column order differs".to_string());
            }
        }
        Some(format!("expected {self}, got [{produced}]: {}", problems.join("; ")))
    }
}

impl fmt::Display for SchemaContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, "exactly [{s}]"),
            Self::Subset(s) => write!(f, "at least [{s}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(expr: &str) -> Schema {
        expr.parse().unwrap()
    }

    #[test]
    fn test_exact_contract() {
        let contract = SchemaContract::Exact(schema("id:int,val:str"));
        assert!(contract.accepts(&schema("id:int,val:str")));
        assert!(!contract.accepts(&schema("id:int,val:str,upper:str")));

        let msg = contract.violation(&schema("val:str,id:int")).unwrap();
        assert!(msg.contains("column order differs"), "{msg}");
    }

    #[test]
    fn test_subset_contract() {
        let contract = SchemaContract::Subset(schema("val:str"));
        assert!(contract.accepts(&schema("id:int,val:str")));
        assert_eq!(contract.violation(&schema("id:int,val:str")), None);

        let msg = contract.violation(&schema("id:int,val:long")).unwrap();
        assert!(msg.contains("column 'val' is long but str is required"), "{msg}");
    }

    #[test]
    fn test_violation_lists_missing_columns() {
        let contract = SchemaContract::Exact(schema("id:int,val:str,upper:str"));
        let msg = contract.violation(&schema("id:int,val:str")).unwrap();
        assert!(msg.contains("missing column 'upper'"), "{msg}");
    }
}
