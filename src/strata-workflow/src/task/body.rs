//! Task body traits and built-in bodies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common_error::{StrataError, StrataResult};
use log::debug;
use strata_core::{Schema, Value, batch_to_rows};
use strata_engine::{DataFrame, DataFrames, ExecutionEngine, Sink, TabularSource};

/// Zero-input body that brings data into the engine.
#[async_trait]
pub trait Creator: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str {
        "create"
    }

    /// Schema of the created frame, known before anything runs.
    fn output_schema(&self) -> StrataResult<Schema>;

    /// Produce the frame on `engine`.
    async fn create(&self, engine: &dyn ExecutionEngine) -> StrataResult<DataFrame>;
}

/// Whole-frame body computing one frame from its inputs.
///
/// Processors receive the engine explicitly and may call any of its
/// operations. Inputs arrive already partitioned as the task requested.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str {
        "process"
    }

    /// Output schema for the given input schemas, or `None` when it cannot
    /// be known without running. A task whose processor returns `None` must
    /// declare its output schema.
    fn output_schema(&self, _inputs: &[Schema]) -> StrataResult<Option<Schema>> {
        Ok(None)
    }

    /// Compute the output frame.
    async fn process(
        &self,
        engine: &dyn ExecutionEngine,
        inputs: &DataFrames,
    ) -> StrataResult<DataFrame>;
}

/// Terminal body with side effects.
#[async_trait]
pub trait Outputter: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &str {
        "output"
    }

    /// Consume the inputs.
    async fn output(&self, engine: &dyn ExecutionEngine, inputs: &DataFrames) -> StrataResult<()>;
}

// =============================================================================
// Built-ins
// =============================================================================

/// Creates a frame from in-memory tabular data.
#[derive(Debug, Clone)]
pub struct CreateData {
    source: TabularSource,
}

impl CreateData {
    /// Create from `source`. The source is cloned on every run.
    pub fn new(source: TabularSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Creator for CreateData {
    fn name(&self) -> &str {
        "create_data"
    }

    fn output_schema(&self) -> StrataResult<Schema> {
        Ok(self.source.schema().clone())
    }

    async fn create(&self, engine: &dyn ExecutionEngine) -> StrataResult<DataFrame> {
        engine.to_dataframe(self.source.clone()).await
    }
}

/// Writes every input frame to a sink.
pub struct SinkOutput {
    sink: Arc<dyn Sink>,
}

impl SinkOutput {
    /// Write to `sink`.
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }
}

impl fmt::Debug for SinkOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkOutput").finish_non_exhaustive()
    }
}

#[async_trait]
impl Outputter for SinkOutput {
    fn name(&self) -> &str {
        "sink_output"
    }

    async fn output(&self, engine: &dyn ExecutionEngine, inputs: &DataFrames) -> StrataResult<()> {
        for df in inputs.frames() {
            engine.output(df, self.sink.as_ref()).await?;
        }
        Ok(())
    }
}

/// Concatenates inputs that share one schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnionAll;

#[async_trait]
impl Processor for UnionAll {
    fn name(&self) -> &str {
        "union_all"
    }

    fn output_schema(&self, inputs: &[Schema]) -> StrataResult<Option<Schema>> {
        let first = inputs
            .first()
            .ok_or_else(|| StrataError::invalid_parameter("union_all needs at least one input"))?;
        if let Some(other) = inputs.iter().find(|s| !s.is_compatible_with(first)) {
            return Err(StrataError::contract(format!(
                "union_all inputs disagree: [{first}] vs [{other}]"
            )));
        }
        Ok(Some(first.clone()))
    }

    async fn process(
        &self,
        engine: &dyn ExecutionEngine,
        inputs: &DataFrames,
    ) -> StrataResult<DataFrame> {
        let schemas: Vec<Schema> = inputs.frames().map(|df| df.schema().clone()).collect();
        let schema = self
            .output_schema(&schemas)?
            .ok_or_else(|| StrataError::internal("union_all has no output schema"))?;
        let mut batches = Vec::new();
        for df in inputs.frames() {
            batches.extend(engine.collect(df).await?);
        }
        engine
            .to_dataframe(TabularSource::batches(schema, batches))
            .await
    }
}

/// Rows kept by a [`Join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    /// Only rows with a match on both sides.
    #[default]
    Inner,
    /// Every left row; right columns are null where nothing matched.
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "inner"),
            Self::Left => write!(f, "left"),
        }
    }
}

/// Equi-join of two inputs on shared key columns.
///
/// The output is the left schema followed by the right input's non-key
/// columns. Keys must exist on both sides with the same type, and no other
/// column name may appear on both sides. With no explicit keys the join is
/// on every column name the inputs share. Null keys never match.
#[derive(Debug, Clone, Default)]
pub struct Join {
    how: JoinType,
    on: Vec<String>,
}

impl Join {
    /// Join on `on`.
    pub fn new<I, S>(how: JoinType, on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            how,
            on: on.into_iter().map(Into::into).collect(),
        }
    }

    /// Inner join on `on`.
    pub fn inner<I, S>(on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(JoinType::Inner, on)
    }

    /// Left outer join on `on`.
    pub fn left<I, S>(on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(JoinType::Left, on)
    }

    pub fn how(&self) -> JoinType {
        self.how
    }

    fn keys(&self, left: &Schema, right: &Schema) -> StrataResult<Vec<String>> {
        let keys: Vec<String> = if self.on.is_empty() {
            left.names()
                .into_iter()
                .filter(|name| right.contains(name))
                .map(str::to_string)
                .collect()
        } else {
            self.on.clone()
        };
        if keys.is_empty() {
            return Err(StrataError::contract(format!(
                "join inputs share no columns: [{left}] vs [{right}]"
            )));
        }
        for key in &keys {
            match (left.field(key), right.field(key)) {
                (Some(l), Some(r)) if l.data_type == r.data_type => {}
                (Some(l), Some(r)) => {
                    return Err(StrataError::contract(format!(
                        "join key '{key}' is {} on the left but {} on the right",
                        l.data_type, r.data_type
                    )));
                }
                _ => {
                    return Err(StrataError::contract(format!(
                        "join key '{key}' missing from [{left}] or [{right}]"
                    )));
                }
            }
        }
        Ok(keys)
    }

    fn schemas(&self, left: &Schema, right: &Schema) -> StrataResult<(Vec<String>, Schema)> {
        let keys = self.keys(left, right)?;
        let mut fields = left.fields().to_vec();
        for field in right.fields().iter().filter(|f| !keys.contains(&f.name)) {
            if left.contains(&field.name) {
                return Err(StrataError::contract(format!(
                    "join inputs both have non-key column '{}'",
                    field.name
                )));
            }
            fields.push(field.clone());
        }
        Ok((keys, Schema::new(fields)?))
    }

    async fn rows(engine: &dyn ExecutionEngine, df: &DataFrame) -> StrataResult<Vec<Vec<Value>>> {
        let mut rows = Vec::with_capacity(df.count());
        for batch in engine.collect(df).await? {
            rows.extend(batch_to_rows(&batch)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl Processor for Join {
    fn name(&self) -> &str {
        "join"
    }

    fn output_schema(&self, inputs: &[Schema]) -> StrataResult<Option<Schema>> {
        let [left, right] = inputs else {
            return Err(StrataError::invalid_parameter(format!(
                "join needs exactly two inputs, got {}",
                inputs.len()
            )));
        };
        Ok(Some(self.schemas(left, right)?.1))
    }

    async fn process(
        &self,
        engine: &dyn ExecutionEngine,
        inputs: &DataFrames,
    ) -> StrataResult<DataFrame> {
        if inputs.len() != 2 {
            return Err(StrataError::invalid_parameter(format!(
                "join needs exactly two inputs, got {}",
                inputs.len()
            )));
        }
        let (left, right) = (inputs.get(0)?, inputs.get(1)?);
        let (keys, schema) = self.schemas(left.schema(), right.schema())?;
        let left_keys = keys
            .iter()
            .map(|k| left.schema().index_of(k))
            .collect::<StrataResult<Vec<_>>>()?;
        let right_keys = keys
            .iter()
            .map(|k| right.schema().index_of(k))
            .collect::<StrataResult<Vec<_>>>()?;
        let right_rest: Vec<usize> = (0..right.schema().len())
            .filter(|i| !right_keys.contains(i))
            .collect();

        let mut table: HashMap<Vec<Value>, Vec<Vec<Value>>> = HashMap::new();
        for row in Self::rows(engine, right).await? {
            let key: Vec<Value> = right_keys.iter().map(|&i| row[i].clone()).collect();
            if key.iter().any(Value::is_null) {
                continue;
            }
            let rest = right_rest.iter().map(|&i| row[i].clone()).collect();
            table.entry(key).or_default().push(rest);
        }

        let mut out = Vec::new();
        for row in Self::rows(engine, left).await? {
            let key: Vec<Value> = left_keys.iter().map(|&i| row[i].clone()).collect();
            match table.get(&key).filter(|_| !key.iter().any(Value::is_null)) {
                Some(matches) => {
                    for rest in matches {
                        let mut joined = row.clone();
                        joined.extend(rest.iter().cloned());
                        out.push(joined);
                    }
                }
                None if self.how == JoinType::Left => {
                    let mut joined = row;
                    joined.extend(std::iter::repeat_n(Value::Null, right_rest.len()));
                    out.push(joined);
                }
                None => {}
            }
        }
        debug!(
            "{} join on {keys:?}: {} x {} rows -> {}",
            self.how,
            left.count(),
            right.count(),
            out.len()
        );
        engine.to_dataframe(TabularSource::rows(schema, out)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(s: &str) -> Schema {
        s.parse().unwrap()
    }

    #[test]
    fn test_join_output_schema() {
        let join = Join::inner(["id"]);
        let out = join
            .output_schema(&[schema("id:int,a:str"), schema("b:double,id:int")])
            .unwrap();
        assert_eq!(out, Some(schema("id:int,a:str,b:double")));

        let inferred = Join::default()
            .output_schema(&[schema("id:int,a:str"), schema("id:int,b:str")])
            .unwrap();
        assert_eq!(inferred, Some(schema("id:int,a:str,b:str")));
    }

    #[test]
    fn test_join_schema_errors() {
        let join = Join::left(["id"]);
        for (left, right) in [
            ("id:int,a:str", "id:long,b:str"),
            ("id:int,a:str", "key:int,b:str"),
            ("id:int,a:str", "id:int,a:str"),
        ] {
            let err = join.output_schema(&[schema(left), schema(right)]).unwrap_err();
            assert!(matches!(err, StrataError::SchemaContractError(_)), "{left} / {right}");
        }

        let err = Join::default()
            .output_schema(&[schema("a:int"), schema("b:int")])
            .unwrap_err();
        assert!(matches!(err, StrataError::SchemaContractError(_)));

        let err = join.output_schema(&[schema("id:int")]).unwrap_err();
        assert!(matches!(err, StrataError::InvalidParameter(_)));
    }
}
