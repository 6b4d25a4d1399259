//! Operator trees handed to the executor.
//!
//! Plans are built and type checked elsewhere. Every variant carries its own
//! parameter record, which the executor treats as read-only.

use serde::{Deserialize, Serialize};

use crate::expr::Filter;
use crate::functions::FunctionCall;
use crate::table::{RowSource, Table};

#[derive(Debug, Serialize, Deserialize)]
pub enum PlanNode {
    /// Already materialized input.
    Table(Table),
    /// Input pulled from a row source. Drained and closed on execution.
    #[serde(skip)]
    Source(Box<dyn RowSource>),
    Unary {
        op: UnaryOperator,
        input: Box<PlanNode>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },
}

impl PlanNode {
    pub fn unary(op: UnaryOperator, input: PlanNode) -> Self {
        PlanNode::Unary {
            op,
            input: Box::new(input),
        }
    }

    pub fn binary(op: BinaryOperator, left: PlanNode, right: PlanNode) -> Self {
        PlanNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl From<Table> for PlanNode {
    fn from(value: Table) -> Self {
        PlanNode::Table(value)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum UnaryOperator {
    Project(ProjectParams),
    Select { filter: Filter },
    Sort(SortParams),
    Limit { offset: usize, limit: usize },
    Rename(RenameParams),
    Reorder(ReorderParams),
    AddSchemaPrefix { prefix: Option<String> },
    Distinct { patterns: Vec<String> },
    GroupBy(GroupByParams),
    Downsample(DownsampleParams),
    RowTransform { functions: Vec<FunctionCall> },
    SetTransform { functions: Vec<FunctionCall> },
    MappingTransform { functions: Vec<FunctionCall> },
    AddSequence { columns: Vec<SequenceColumn> },
    RemoveNullColumn,
    ValueToSelectedPath { prefix: Option<String> },
    /// Executes a sub-plan through a remote session. The input of this node
    /// is ignored.
    RemoteFetch { sub_plan: Box<PlanNode> },
}

impl UnaryOperator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Project(_) => "project",
            Self::Select { .. } => "select",
            Self::Sort(_) => "sort",
            Self::Limit { .. } => "limit",
            Self::Rename(_) => "rename",
            Self::Reorder(_) => "reorder",
            Self::AddSchemaPrefix { .. } => "add_schema_prefix",
            Self::Distinct { .. } => "distinct",
            Self::GroupBy(_) => "group_by",
            Self::Downsample(_) => "downsample",
            Self::RowTransform { .. } => "row_transform",
            Self::SetTransform { .. } => "set_transform",
            Self::MappingTransform { .. } => "mapping_transform",
            Self::AddSequence { .. } => "add_sequence",
            Self::RemoveNullColumn => "remove_null_column",
            Self::ValueToSelectedPath { .. } => "value_to_selected_path",
            Self::RemoteFetch { .. } => "remote_fetch",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub enum BinaryOperator {
    Join(LegacyJoinParams),
    CrossJoin(CrossJoinParams),
    InnerJoin(JoinParams),
    OuterJoin {
        outer_type: OuterJoinType,
        params: JoinParams,
    },
    SingleJoin(SubqueryJoinParams),
    MarkJoin {
        mark_column: String,
        #[serde(default)]
        anti: bool,
        params: SubqueryJoinParams,
    },
    Union(SetOpParams),
    Except(SetOpParams),
    Intersect(SetOpParams),
    PathUnion,
}

impl BinaryOperator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::CrossJoin(_) => "cross_join",
            Self::InnerJoin(_) => "inner_join",
            Self::OuterJoin { .. } => "outer_join",
            Self::SingleJoin(_) => "single_join",
            Self::MarkJoin { .. } => "mark_join",
            Self::Union(_) => "union",
            Self::Except(_) => "except",
            Self::Intersect(_) => "intersect",
            Self::PathUnion => "path_union",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectParams {
    pub patterns: Vec<String>,
    /// Keep fields whose name ends in `.key` regardless of the patterns.
    pub remain_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortParams {
    /// Columns to sort by. `key` refers to the row key.
    pub sort_by: Vec<String>,
    #[serde(default = "default_true")]
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenameParams {
    /// `(old, new)` pairs, applied in order.
    pub renames: Vec<(String, String)>,
    /// Fields matching any of these are never renamed.
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReorderParams {
    pub patterns: Vec<String>,
    /// Per pattern flag keeping the matched fields in schema order instead of
    /// sorting them by name. Missing entries are false.
    pub udf_output: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByParams {
    pub group_by: Vec<String>,
    pub functions: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: i64,
    /// Exclusive.
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownsampleParams {
    /// Window width.
    pub precision: i64,
    /// Distance between the starts of two consecutive windows.
    pub slide_distance: i64,
    pub functions: Vec<FunctionCall>,
    #[serde(default)]
    pub time_range: Option<KeyRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceColumn {
    pub name: String,
    pub start: i64,
    pub increment: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinAlgorithm {
    #[default]
    NestedLoop,
    Hash,
    SortedMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OuterJoinType {
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyJoinParams {
    /// Either `key` or `ordinal`.
    pub join_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossJoinParams {
    pub prefix_a: Option<String>,
    pub prefix_b: Option<String>,
}

/// Parameters shared by inner and outer joins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinParams {
    /// Prefix of the left side's columns. Join columns are resolved as
    /// `prefix_a.column`.
    pub prefix_a: Option<String>,
    pub prefix_b: Option<String>,
    pub algorithm: JoinAlgorithm,
    /// The `on` condition.
    pub filter: Option<Filter>,
    /// The `using` columns, without prefixes.
    pub join_columns: Vec<String>,
    pub natural: bool,
    /// Join by row key instead of any condition.
    pub join_by_key: bool,
    /// Columns present on both sides under one of these prefixes are
    /// additionally required to be equal.
    pub extra_join_prefixes: Vec<String>,
}

/// Parameters for single and mark joins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubqueryJoinParams {
    pub algorithm: JoinAlgorithm,
    pub filter: Option<Filter>,
    pub extra_join_prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOpParams {
    /// Patterns putting the left side's fields into a canonical order.
    pub left_order: Vec<String>,
    pub right_order: Vec<String>,
    pub distinct: bool,
}

fn default_true() -> bool {
    true
}
