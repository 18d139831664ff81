//! Declarative partition specifications.

use std::fmt;
use std::str::FromStr;

use common_error::{StrataError, StrataResult, partition_err};
use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// How rows are assigned to partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionAlgo {
    /// Hash of the key values modulo the partition count.
    Hash,
    /// Contiguous, evenly sized blocks. With keys, whole key groups are
    /// spread evenly in key order.
    Even,
    /// Row `i` goes to partition `i % n`. Only valid without keys.
    RoundRobin,
}

impl fmt::Display for PartitionAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hash => "hash",
            Self::Even => "even",
            Self::RoundRobin => "roundrobin",
        })
    }
}

impl FromStr for PartitionAlgo {
    type Err = StrataError;

    fn from_str(s: &str) -> StrataResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "even" => Ok(Self::Even),
            "roundrobin" | "round_robin" => Ok(Self::RoundRobin),
            other => partition_err!("unknown partition algorithm '{other}'"),
        }
    }
}

/// A per-partition sort column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    /// Column name.
    pub column: String,
    /// Ascending when true.
    pub ascending: bool,
}

impl SortKey {
    /// Ascending sort on `column`.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    /// Descending sort on `column`.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.ascending { "asc" } else { "desc" };
        write!(f, "{}:{dir}", self.column)
    }
}

/// The three shapes a partition spec can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionKind {
    /// Keep the engine's current or default distribution.
    Unspecified,
    /// Group rows by key columns.
    ByKeys,
    /// Target a number of partitions without key semantics.
    ByCount,
}

/// Declarative description of how rows are grouped, distributed and
/// ordered before a task runs.
///
/// The spec is unvalidated until [`resolve`](Self::resolve)d against the
/// schema of the frame it applies to. Counts are signed so that a
/// non-positive request is representable and rejected at resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionSpec {
    /// Partition key columns.
    pub keys: Vec<String>,
    /// Requested number of partitions.
    pub num_partitions: Option<i64>,
    /// Per-partition sort columns applied after the keys.
    pub presort: Vec<SortKey>,
    /// Distribution algorithm; defaults depend on the kind.
    pub algo: Option<PartitionAlgo>,
}

impl PartitionSpec {
    /// The engine-default distribution.
    pub fn unspecified() -> Self {
        Self::default()
    }

    /// Partition by the given key columns.
    pub fn by_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Partition into `n` partitions without keys.
    pub fn by_count(n: i64) -> Self {
        Self {
            num_partitions: Some(n),
            ..Self::default()
        }
    }

    /// Set the partition count.
    pub fn with_num_partitions(mut self, n: i64) -> Self {
        self.num_partitions = Some(n);
        self
    }

    /// Append a per-partition sort column.
    pub fn with_presort(mut self, key: SortKey) -> Self {
        self.presort.push(key);
        self
    }

    /// Set the distribution algorithm.
    pub fn with_algo(mut self, algo: PartitionAlgo) -> Self {
        self.algo = Some(algo);
        self
    }

    /// The shape of this spec.
    pub fn kind(&self) -> PartitionKind {
        if !self.keys.is_empty() {
            PartitionKind::ByKeys
        } else if self.num_partitions.is_some() || !self.presort.is_empty() || self.algo.is_some() {
            PartitionKind::ByCount
        } else {
            PartitionKind::Unspecified
        }
    }

    /// Check whether this is the engine-default spec.
    pub fn is_unspecified(&self) -> bool {
        self.kind() == PartitionKind::Unspecified
    }

    /// Validate against `schema` and normalize.
    ///
    /// Fails with `PartitionError` when a key or presort column is absent, a
    /// column is listed twice, a presort column is also a key, the count is
    /// not positive, or the algorithm does not fit the kind.
    pub fn resolve(&self, schema: &Schema) -> StrataResult<ResolvedPartitionSpec> {
        let kind = self.kind();
        let num_partitions = match self.num_partitions {
            Some(n) if n <= 0 => partition_err!("partition count must be at least 1, got {n}"),
            Some(n) => Some(usize::try_from(n).map_err(|_| {
                StrataError::partition(format!("partition count {n} is out of range"))
            })?),
            None => None,
        };

        for (i, key) in self.keys.iter().enumerate() {
            if !schema.contains(key) {
                partition_err!("partition key '{key}' not found in schema [{schema}]");
            }
            if self.keys[..i].contains(key) {
                partition_err!("partition key '{key}' listed twice");
            }
        }
        for (i, sort) in self.presort.iter().enumerate() {
            if !schema.contains(&sort.column) {
                partition_err!("presort column '{}' not found in schema [{schema}]", sort.column);
            }
            if self.keys.contains(&sort.column) {
                partition_err!("presort column '{}' is also a partition key", sort.column);
            }
            if self.presort[..i].iter().any(|s| s.column == sort.column) {
                partition_err!("presort column '{}' listed twice", sort.column);
            }
        }

        let algo = match (kind, self.algo) {
            (PartitionKind::ByKeys, Some(PartitionAlgo::RoundRobin)) => {
                partition_err!("round robin partitioning cannot be combined with keys")
            }
            (PartitionKind::ByCount, Some(PartitionAlgo::Hash)) => {
                partition_err!("hash partitioning requires partition keys")
            }
            (_, Some(algo)) => algo,
            (PartitionKind::ByKeys, None) => PartitionAlgo::Hash,
            (_, None) => PartitionAlgo::Even,
        };

        Ok(ResolvedPartitionSpec {
            kind,
            keys: self.keys.clone(),
            num_partitions,
            presort: self.presort.clone(),
            algo,
        })
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.keys.is_empty() {
            parts.push(format!("by={}", self.keys.join(",")));
        }
        if let Some(n) = self.num_partitions {
            parts.push(format!("num={n}"));
        }
        if !self.presort.is_empty() {
            let sorts: Vec<String> = self.presort.iter().map(ToString::to_string).collect();
            parts.push(format!("presort={}", sorts.join(",")));
        }
        if let Some(algo) = self.algo {
            parts.push(format!("algo={algo}"));
        }
        if parts.is_empty() {
            f.write_str("unspecified")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// Parses `by=id,name num=4 presort=val:desc algo=hash`. The empty string
/// and `unspecified` parse to the engine-default spec.
impl FromStr for PartitionSpec {
    type Err = StrataError;

    fn from_str(s: &str) -> StrataResult<Self> {
        let mut spec = Self::default();
        for token in s.split_whitespace() {
            if token == "unspecified" {
                continue;
            }
            let (key, value) = token.split_once('=').ok_or_else(|| {
                StrataError::partition(format!("expected key=value, got '{token}'"))
            })?;
            match key {
                "by" => spec.keys = value.split(',').map(|k| k.trim().to_string()).collect(),
                "num" => {
                    let n = value.parse::<i64>().map_err(|_| {
                        StrataError::partition(format!("partition count '{value}' is not a number"))
                    })?;
                    spec.num_partitions = Some(n);
                }
                "presort" => {
                    for item in value.split(',') {
                        let sort = match item.split_once(':') {
                            None => SortKey::asc(item),
                            Some((col, "asc")) => SortKey::asc(col),
                            Some((col, "desc")) => SortKey::desc(col),
                            Some((_, dir)) => partition_err!("unknown sort direction '{dir}'"),
                        };
                        spec.presort.push(sort);
                    }
                }
                "algo" => spec.algo = Some(value.parse()?),
                other => partition_err!("unknown partition option '{other}'"),
            }
        }
        if spec.keys.iter().any(String::is_empty) {
            partition_err!("empty partition key in '{s}'");
        }
        Ok(spec)
    }
}

/// A partition spec validated against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPartitionSpec {
    /// Shape of the spec.
    pub kind: PartitionKind,
    /// Partition key columns (empty unless `ByKeys`).
    pub keys: Vec<String>,
    /// Partition count; `None` defers to the engine's parallelism.
    pub num_partitions: Option<usize>,
    /// Per-partition sort columns.
    pub presort: Vec<SortKey>,
    /// Distribution algorithm.
    pub algo: PartitionAlgo,
}

impl ResolvedPartitionSpec {
    /// Check whether the engine default applies.
    pub fn is_unspecified(&self) -> bool {
        self.kind == PartitionKind::Unspecified
    }

    /// Partition count, falling back to `default` (at least 1).
    pub fn num_partitions_or(&self, default: usize) -> usize {
        self.num_partitions.unwrap_or(default).max(1)
    }

    /// Fill in the partition count with the engine default.
    pub fn with_default_parallelism(mut self, default: usize) -> Self {
        self.num_partitions = Some(self.num_partitions_or(default));
        self
    }

    /// Whether rows within a partition must be sorted.
    pub fn requires_sort(&self) -> bool {
        !self.keys.is_empty() || !self.presort.is_empty()
    }

    /// Check whether data already distributed as `existing` satisfies this
    /// spec, so that repartitioning can be skipped.
    pub fn satisfied_by(&self, existing: Option<&Self>, default: usize) -> bool {
        if self.is_unspecified() {
            return true;
        }
        existing.is_some_and(|e| {
            e.clone().with_default_parallelism(default)
                == self.clone().with_default_parallelism(default)
        })
    }
}
