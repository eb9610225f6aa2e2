//! Memory queries shared by the persistent store and working memory
//!
//! Order of evaluation: filter (kind, metadata) → stable sort → window.

use crate::error::{Error, Result};
use crate::types::{Memory, MemoryKind};
use serde_json::Value;
use std::cmp::Ordering;

/// A metadata constraint: equality, or membership in a set.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Eq(Value),
    OneOf(Vec<Value>),
}

impl FilterValue {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            FilterValue::Eq(expected) => expected == actual,
            FilterValue::OneOf(options) => options.iter().any(|o| o == actual),
        }
    }
}

/// Conjunction of per-key metadata constraints. Absent keys compare as `null`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataFilter {
    constraints: Vec<(String, FilterValue)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.push((key.into(), FilterValue::Eq(value.into())));
        self
    }

    pub fn one_of(mut self, key: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        self.constraints
            .push((key.into(), FilterValue::OneOf(values.into_iter().collect())));
        self
    }

    /// `recalled` is false or unset.
    pub fn native(self) -> Self {
        self.one_of("recalled", [Value::Bool(false), Value::Null])
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn matches(&self, memory: &Memory) -> bool {
        self.constraints
            .iter()
            .all(|(key, value)| value.matches(&memory.metadata.field(key)))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Timestamp,
    Id,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub first: Option<usize>,
    pub last: Option<usize>,
    pub kind: Option<MemoryKind>,
    pub metadata: MetadataFilter,
    pub sort: SortKey,
    pub reverse: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    pub fn last(mut self, n: usize) -> Self {
        self.last = Some(n);
        self
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn metadata(mut self, filter: MetadataFilter) -> Self {
        self.metadata = filter;
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort = key;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Rejects contradictory windows before any work is done.
    pub fn validate(&self) -> Result<()> {
        if self.first.is_some() && self.last.is_some() {
            return Err(Error::InvalidQuery(
                "cannot specify both 'first' and 'last'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn matches(&self, memory: &Memory) -> bool {
        self.kind.map_or(true, |k| memory.kind == k) && self.metadata.matches(memory)
    }

    /// Run the query over any iterator of memories.
    pub fn apply<'a, I>(&self, memories: I) -> Result<Vec<Memory>>
    where
        I: IntoIterator<Item = &'a Memory>,
    {
        self.validate()?;

        let mut selected: Vec<Memory> = memories
            .into_iter()
            .filter(|m| self.matches(m))
            .cloned()
            .collect();

        // sort_by is stable: ties keep insertion order
        selected.sort_by(|a, b| {
            let ord = match self.sort {
                SortKey::Timestamp => a
                    .timestamp
                    .partial_cmp(&b.timestamp)
                    .unwrap_or(Ordering::Equal),
                SortKey::Id => a.id.cmp(&b.id),
            };
            if self.reverse {
                ord.reverse()
            } else {
                ord
            }
        });

        if let Some(n) = self.first {
            selected.truncate(n);
        } else if let Some(n) = self.last {
            let skip = selected.len().saturating_sub(n);
            selected.drain(..skip);
        }

        Ok(selected)
    }
}
