//! Schemas and schema contracts.

mod contract;
mod schema;

pub use contract::SchemaContract;
pub use schema::{Field, Schema};
