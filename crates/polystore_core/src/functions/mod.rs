//! Boundary to the functions invoked by transform, group-by and downsample
//! operators.
//!
//! The executor never computes aggregates itself. It looks functions up by
//! identifier and shapes their inputs and outputs.

pub mod builtin;

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use polystore_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::pattern::compile_patterns;
use crate::row::Row;
use crate::scalar::ScalarValue;
use crate::schema::Schema;
use crate::table::Table;

/// Arguments passed to a function on each invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionParams {
    /// Column paths (possibly wildcards) the function applies to.
    pub paths: Vec<String>,
    #[serde(default)]
    pub distinct: bool,
    /// Function specific arguments.
    #[serde(default)]
    pub args: BTreeMap<String, ScalarValue>,
}

impl FunctionParams {
    pub fn new<S: Into<String>>(paths: impl IntoIterator<Item = S>) -> Self {
        FunctionParams {
            paths: paths.into_iter().map(Into::into).collect(),
            distinct: false,
            args: BTreeMap::new(),
        }
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Indices of the columns in `schema` matched by any of the paths, in
    /// schema order.
    pub fn matched_columns(&self, schema: &Schema) -> Result<Vec<usize>> {
        let patterns = compile_patterns(&self.paths)?;
        Ok((0..schema.len())
            .filter(|&idx| {
                let name = &schema.fields[idx].name;
                patterns.iter().any(|p| p.matches(name))
            })
            .collect())
    }
}

/// A function call as it appears in an operator's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub identifier: String,
    pub params: FunctionParams,
}

impl FunctionCall {
    pub fn new(identifier: impl Into<String>, params: FunctionParams) -> Self {
        FunctionCall {
            identifier: identifier.into(),
            params,
        }
    }

    /// Whether the call is a `first` or `last` selection.
    pub fn is_first_or_last(&self) -> bool {
        let ident = self.identifier.to_ascii_lowercase();
        ident == builtin::FIRST || ident == builtin::LAST
    }
}

/// Output of a row or set mapping function.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow {
    pub schema: Schema,
    pub row: Row,
}

/// Maps one row to at most one row.
pub trait RowMappingFunction: Debug + Send + Sync {
    fn identifier(&self) -> &str;

    fn transform(
        &self,
        schema: &Schema,
        row: &Row,
        params: &FunctionParams,
    ) -> Result<Option<MappedRow>>;
}

/// Reduces a set of rows to at most one row.
pub trait SetMappingFunction: Debug + Send + Sync {
    fn identifier(&self) -> &str;

    /// Whether `DISTINCT` may be requested for this function.
    fn can_use_distinct(&self) -> bool {
        true
    }

    /// Whether removing duplicate inputs can't change the result, letting the
    /// caller skip deduplication.
    fn is_distinct_invariant(&self) -> bool {
        false
    }

    fn transform(&self, table: &Table, params: &FunctionParams) -> Result<Option<MappedRow>>;
}

/// Maps a set of rows to a new table.
pub trait MappingFunction: Debug + Send + Sync {
    fn identifier(&self) -> &str;

    fn transform(&self, table: &Table, params: &FunctionParams) -> Result<Option<Table>>;
}

/// Functions available to an executor, looked up by case-insensitive
/// identifier.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    row_mappings: HashMap<String, Arc<dyn RowMappingFunction>>,
    set_mappings: HashMap<String, Arc<dyn SetMappingFunction>>,
    mappings: HashMap<String, Arc<dyn MappingFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing the builtin functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    pub fn register_row_mapping(&mut self, function: Arc<dyn RowMappingFunction>) {
        self.row_mappings
            .insert(function.identifier().to_ascii_lowercase(), function);
    }

    pub fn register_set_mapping(&mut self, function: Arc<dyn SetMappingFunction>) {
        self.set_mappings
            .insert(function.identifier().to_ascii_lowercase(), function);
    }

    pub fn register_mapping(&mut self, function: Arc<dyn MappingFunction>) {
        self.mappings
            .insert(function.identifier().to_ascii_lowercase(), function);
    }

    pub fn row_mapping(&self, identifier: &str) -> Result<&Arc<dyn RowMappingFunction>> {
        self.row_mappings
            .get(&identifier.to_ascii_lowercase())
            .ok_or_else(|| missing_function("row mapping", identifier))
    }

    pub fn set_mapping(&self, identifier: &str) -> Result<&Arc<dyn SetMappingFunction>> {
        self.set_mappings
            .get(&identifier.to_ascii_lowercase())
            .ok_or_else(|| missing_function("set mapping", identifier))
    }

    pub fn mapping(&self, identifier: &str) -> Result<&Arc<dyn MappingFunction>> {
        self.mappings
            .get(&identifier.to_ascii_lowercase())
            .ok_or_else(|| missing_function("mapping", identifier))
    }
}

fn missing_function(kind: &str, identifier: &str) -> DbError {
    DbError::invalid_parameter(format!("Missing {kind} function '{identifier}'"))
        .with_field("function", identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::schema::Field;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!("max", registry.set_mapping("MAX").unwrap().identifier());
        assert_eq!("first", registry.mapping("First").unwrap().identifier());

        let err = registry.set_mapping("median").unwrap_err();
        assert_eq!(Some("median"), err.field("function"));
    }

    #[test]
    fn matched_columns_in_schema_order() {
        let schema = Schema::with_key([
            Field::new("a.x", DataType::Int64),
            Field::new("b.x", DataType::Int64),
            Field::new("a.y", DataType::Int64),
        ]);
        let params = FunctionParams::new(["a.y", "a.*"]);
        assert_eq!(vec![0, 2], params.matched_columns(&schema).unwrap());
    }

    #[test]
    fn first_or_last() {
        let call = FunctionCall::new("LAST", FunctionParams::new(["a"]));
        assert!(call.is_first_or_last());
        let call = FunctionCall::new("max", FunctionParams::new(["a"]));
        assert!(!call.is_first_or_last());
    }
}
