//! Property-based tests for schemas and partitioning.
