//! Ordered, optionally named collections of frames.

use common_error::{StrataError, StrataResult};

use super::DataFrame;

/// The inputs of a multi-input task, in declaration order.
///
/// Frames may carry a name so that task bodies can look inputs up by role
/// rather than position.
#[derive(Debug, Clone, Default)]
pub struct DataFrames {
    frames: Vec<(Option<String>, DataFrame)>,
}

impl DataFrames {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an unnamed frame.
    pub fn push(&mut self, df: DataFrame) {
        self.frames.push((None, df));
    }

    /// Append a named frame.
    pub fn push_named(&mut self, name: impl Into<String>, df: DataFrame) {
        self.frames.push((Some(name.into()), df));
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check whether there are no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at `index`.
    pub fn get(&self, index: usize) -> StrataResult<&DataFrame> {
        self.frames.get(index).map(|(_, df)| df).ok_or_else(|| {
            StrataError::invalid_parameter(format!(
                "input {index} requested but only {} inputs exist",
                self.frames.len()
            ))
        })
    }

    /// Frame named `name`.
    pub fn get_named(&self, name: &str) -> StrataResult<&DataFrame> {
        self.frames
            .iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .map(|(_, df)| df)
            .ok_or_else(|| StrataError::invalid_parameter(format!("no input named '{name}'")))
    }

    /// The single frame of a one-input collection.
    pub fn single(&self) -> StrataResult<&DataFrame> {
        if self.frames.len() != 1 {
            return Err(StrataError::invalid_parameter(format!(
                "expected exactly one input, got {}",
                self.frames.len()
            )));
        }
        self.get(0)
    }

    /// Iterate over `(name, frame)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &DataFrame)> {
        self.frames.iter().map(|(n, df)| (n.as_deref(), df))
    }

    /// Iterate over frames.
    pub fn frames(&self) -> impl Iterator<Item = &DataFrame> {
        self.frames.iter().map(|(_, df)| df)
    }
}

impl FromIterator<DataFrame> for DataFrames {
    fn from_iter<I: IntoIterator<Item = DataFrame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().map(|df| (None, df)).collect(),
        }
    }
}
