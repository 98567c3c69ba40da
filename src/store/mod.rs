//! Record store seam: every engine operation reads through [`RecordStore`].

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::model::{Index, Label, LabelSet, Query};

mod sqlite;
#[cfg(test)]
mod tests;

pub use sqlite::{SqliteRecordStore, StoreCounts};

/// Selects Query records. Empty fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryFilter {
    #[serde(default)]
    pub index_id: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Only queries with at least one attached label from this set.
    #[serde(default)]
    pub label_set: Option<String>,
}

impl QueryFilter {
    pub fn for_index(index_id: impl Into<String>) -> Self {
        Self {
            index_id: Some(index_id.into()),
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let filter: QueryFilter = serde_json::from_str(raw)
            .map_err(|err| EvalError::InvalidArgument(format!("malformed query filter: {err}")))?;
        filter.validate()?;
        Ok(filter)
    }

    pub fn validate(&self) -> Result<()> {
        if self
            .index_id
            .as_deref()
            .is_some_and(|value| value.trim().is_empty())
        {
            return Err(EvalError::InvalidArgument(
                "query filter index_id must not be blank".to_string(),
            ));
        }
        if self.keys.iter().any(|key| key.trim().is_empty()) {
            return Err(EvalError::InvalidArgument(
                "query filter keys must not be blank".to_string(),
            ));
        }
        if self
            .label_set
            .as_deref()
            .is_some_and(|value| value.trim().is_empty())
        {
            return Err(EvalError::InvalidArgument(
                "query filter label_set must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Selects Label records. Empty fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    pub index_id: Option<String>,
    pub key: Option<String>,
    pub label_set: Option<String>,
}

impl LabelFilter {
    pub fn for_query(key: &str, index_id: &str) -> Self {
        Self {
            index_id: Some(index_id.to_string()),
            key: Some(key.to_string()),
            label_set: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemovalCounts {
    pub index_removed: bool,
    pub queries: usize,
    pub labels: usize,
}

pub trait RecordStore {
    fn get_index(&self, index_id: &str) -> Result<Index>;

    /// Inserts the index unless one with the same `index_id` exists; returns the stored record.
    fn get_or_create_index(&self, index: &Index) -> Result<Index>;

    fn get_or_create_label_set(&self, name: &str) -> Result<LabelSet>;

    fn insert_label(&self, label: &Label) -> Result<Label>;

    fn find_labels(&self, filter: &LabelFilter) -> Result<Vec<Label>>;

    fn insert_query(&self, query: &Query) -> Result<Query>;

    /// Queries in insertion order with their attached labels.
    fn find_queries(&self, filter: &QueryFilter) -> Result<Vec<Query>>;

    fn save_query(&self, query: &Query) -> Result<()>;

    fn remove_index_records(&self, index_id: &str) -> Result<RemovalCounts>;
}
