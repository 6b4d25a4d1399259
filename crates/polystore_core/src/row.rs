use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::scalar::ScalarValue;

/// A row of values, interpreted against exactly one schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub key: Option<i64>,
    pub values: Vec<Option<ScalarValue>>,
}

impl Row {
    pub fn new(values: Vec<Option<ScalarValue>>) -> Self {
        Row { key: None, values }
    }

    pub fn with_key(key: i64, values: Vec<Option<ScalarValue>>) -> Self {
        Row {
            key: Some(key),
            values,
        }
    }

    /// Row of `len` nulls.
    pub fn nulls(key: Option<i64>, len: usize) -> Self {
        Row {
            key,
            values: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx).and_then(|v| v.as_ref())
    }

    /// New row with the values at `indices`, keeping the key.
    pub fn project(&self, indices: &[usize]) -> Row {
        Row {
            key: self.key,
            values: indices.iter().map(|&idx| self.values[idx].clone()).collect(),
        }
    }
}

/// Read access to a row-shaped value.
///
/// Lets predicates run against rows that only exist as a view over other
/// rows, e.g. a candidate pair in a join.
pub trait RowAccess {
    fn key(&self) -> Option<i64>;
    fn value(&self, idx: usize) -> Option<Cow<'_, ScalarValue>>;
}

impl RowAccess for Row {
    fn key(&self) -> Option<i64> {
        self.key
    }

    fn value(&self, idx: usize) -> Option<Cow<'_, ScalarValue>> {
        Row::value(self, idx).map(Cow::Borrowed)
    }
}
