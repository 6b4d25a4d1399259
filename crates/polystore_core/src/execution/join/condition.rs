use polystore_error::{DbError, Result};

use super::layout::{JoinLayout, prefixed};
use crate::expr::{Filter, PhysicalFilter};
use crate::row::Row;
use crate::schema::Schema;
use crate::util::hash::HashMode;

/// A pair of columns, one per side, that must hold equal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquiPair {
    pub left: usize,
    pub right: usize,
    pub mode: HashMode,
}

impl EquiPair {
    fn new(left_schema: &Schema, left: usize, right_schema: &Schema, right: usize) -> Self {
        EquiPair {
            left,
            right,
            mode: HashMode::for_types(
                left_schema.fields[left].datatype,
                right_schema.fields[right].datatype,
            ),
        }
    }
}

/// Equality pairs of a join, split by where they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquiPairs {
    /// Columns shared under an extra join prefix.
    pub extra: Vec<EquiPair>,
    /// `using` or natural join columns.
    pub using: Vec<EquiPair>,
}

impl EquiPairs {
    pub fn is_empty(&self) -> bool {
        self.extra.is_empty() && self.using.is_empty()
    }

    /// All pairs, extra paths first.
    pub fn iter(&self) -> impl Iterator<Item = &EquiPair> {
        self.extra.iter().chain(self.using.iter())
    }
}

/// Columns named by `using`, by `natural`, or shared under an extra join
/// prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinColumns {
    /// Column names without their side prefix.
    pub join_columns: Vec<String>,
    /// Full column names present on both sides.
    pub extra_paths: Vec<String>,
}

impl JoinColumns {
    /// Resolve the join columns of an inner or outer join, validating them
    /// against both inputs.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        operator: &str,
        left: &Schema,
        right: &Schema,
        prefix_a: Option<&str>,
        prefix_b: Option<&str>,
        filter: Option<&Filter>,
        using: &[String],
        natural: bool,
        extra_join_prefixes: &[String],
    ) -> Result<Self> {
        let join_columns = if natural {
            if !using.is_empty() {
                return Err(DbError::invalid_parameter(format!(
                    "natural {operator} operator should not have using operator"
                )));
            }
            let columns = natural_columns(left, right, prefix_a, prefix_b);
            if columns.is_empty() {
                return Err(DbError::invalid_parameter(
                    "natural join has no matching columns",
                ));
            }
            columns
        } else {
            using.to_vec()
        };

        let extra_paths = extra_paths(left, right, extra_join_prefixes);

        if filter.is_some() && !join_columns.is_empty() {
            return Err(DbError::invalid_parameter(
                "using(or natural) and on operator cannot be used at the same time",
            ));
        }
        if filter.is_none() && join_columns.is_empty() && extra_paths.is_empty() {
            return Err(DbError::invalid_parameter(format!(
                "{operator} operator requires an on condition or using columns"
            )));
        }

        for column in &join_columns {
            let path_a = prefixed(prefix_a, column);
            left.require_index(&path_a, || {
                DbError::invalid_parameter(format!("TableA has no path: {path_a}"))
            })?;
            let path_b = prefixed(prefix_b, column);
            right.require_index(&path_b, || {
                DbError::invalid_parameter(format!("TableB has no path: {path_b}"))
            })?;
        }

        Ok(JoinColumns {
            join_columns,
            extra_paths,
        })
    }

    /// Only the extra paths, for single and mark joins.
    pub fn extra_only(left: &Schema, right: &Schema, extra_join_prefixes: &[String]) -> Self {
        JoinColumns {
            join_columns: Vec::new(),
            extra_paths: extra_paths(left, right, extra_join_prefixes),
        }
    }

    /// Equality pairs implied by the columns.
    pub fn equi_pairs(
        &self,
        left: &Schema,
        right: &Schema,
        prefix_a: Option<&str>,
        prefix_b: Option<&str>,
    ) -> EquiPairs {
        let extra = self
            .extra_paths
            .iter()
            .filter_map(|path| Some((left.index_of(path)?, right.index_of(path)?)))
            .map(|(l, r)| EquiPair::new(left, l, right, r))
            .collect();
        let using = self
            .join_columns
            .iter()
            .filter_map(|column| {
                Some((
                    left.index_of(&prefixed(prefix_a, column))?,
                    right.index_of(&prefixed(prefix_b, column))?,
                ))
            })
            .map(|(l, r)| EquiPair::new(left, l, right, r))
            .collect();

        EquiPairs { extra, using }
    }
}

/// Predicate deciding whether a left and right row join.
#[derive(Debug, Clone)]
pub struct JoinCondition {
    pub equi: EquiPairs,
    filter: Option<PhysicalFilter>,
    /// Layout the filter's paths were resolved against.
    filter_layout: JoinLayout,
}

impl JoinCondition {
    pub fn new(
        equi: EquiPairs,
        filter: Option<&Filter>,
        filter_layout: JoinLayout,
    ) -> Result<Self> {
        let filter = filter
            .map(|f| PhysicalFilter::plan(f, &filter_layout.schema))
            .transpose()?;
        Ok(JoinCondition {
            equi,
            filter,
            filter_layout,
        })
    }

    /// Condition that accepts every pair.
    pub fn always() -> Self {
        JoinCondition {
            equi: EquiPairs::default(),
            filter: None,
            filter_layout: JoinLayout::concat(&Schema::empty(), &Schema::empty(), &[]),
        }
    }

    /// Check if a pair of rows satisfies the condition.
    ///
    /// A null on either side of an equality never matches.
    pub fn matches(&self, left: &Row, right: &Row) -> Result<bool> {
        for pair in self.equi.iter() {
            match (left.value(pair.left), right.value(pair.right)) {
                (Some(a), Some(b)) if a.eq_value(b) => (),
                _ => return Ok(false),
            }
        }

        match &self.filter {
            Some(filter) => filter.evaluate(&self.filter_layout.view(left, right)),
            None => Ok(true),
        }
    }
}

/// Resolve `path_a = path_b` equalities of a filter to column pairs. Paths
/// may name either side first.
pub fn filter_equi_pairs(filter: &Filter, left: &Schema, right: &Schema) -> Vec<EquiPair> {
    filter
        .equality_path_pairs()
        .into_iter()
        .filter_map(|(a, b)| {
            if let (Some(l), Some(r)) = (left.index_of(a), right.index_of(b)) {
                return Some((l, r));
            }
            match (left.index_of(b), right.index_of(a)) {
                (Some(l), Some(r)) => Some((l, r)),
                _ => None,
            }
        })
        .map(|(l, r)| EquiPair::new(left, l, right, r))
        .collect()
}

/// Columns sharing a name on both sides once the side prefixes are removed.
fn natural_columns(
    left: &Schema,
    right: &Schema,
    prefix_a: Option<&str>,
    prefix_b: Option<&str>,
) -> Vec<String> {
    let strip = |prefix: Option<&str>, name: &str| -> Option<String> {
        match prefix {
            Some(prefix) => name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(str::to_string),
            None => Some(name.to_string()),
        }
    };

    let mut columns: Vec<String> = Vec::new();
    for field in &left.fields {
        let Some(column) = strip(prefix_a, &field.name) else {
            continue;
        };
        if columns.contains(&column) {
            continue;
        }
        if right.contains(&prefixed(prefix_b, &column)) {
            columns.push(column);
        }
    }
    columns
}

/// Left field names that also exist on the right and start with one of the
/// extra join prefixes.
fn extra_paths(left: &Schema, right: &Schema, extra_join_prefixes: &[String]) -> Vec<String> {
    if extra_join_prefixes.is_empty() {
        return Vec::new();
    }
    let prefixes: Vec<&str> = extra_join_prefixes
        .iter()
        .map(|p| p.strip_suffix(".*").unwrap_or(p))
        .collect();

    let mut paths: Vec<String> = Vec::new();
    for field in &left.fields {
        if !prefixes.iter().any(|p| field.name.starts_with(p)) {
            continue;
        }
        if right.contains(&field.name) && !paths.contains(&field.name) {
            paths.push(field.name.clone());
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::schema::Field;

    fn schema(names: &[&str]) -> Schema {
        Schema::new(names.iter().map(|n| Field::new(*n, DataType::Int64)))
    }

    #[test]
    fn natural_join_columns() {
        let left = schema(&["a.id", "a.x", "a.y"]);
        let right = schema(&["b.id", "b.y", "b.z"]);
        let cols = JoinColumns::resolve(
            "inner join",
            &left,
            &right,
            Some("a"),
            Some("b"),
            None,
            &[],
            true,
            &[],
        )
        .unwrap();
        assert_eq!(vec!["id", "y"], cols.join_columns);
    }

    #[test]
    fn natural_with_using_errors() {
        let left = schema(&["a.id"]);
        let right = schema(&["b.id"]);
        let err = JoinColumns::resolve(
            "inner join",
            &left,
            &right,
            Some("a"),
            Some("b"),
            None,
            &["id".to_string()],
            true,
            &[],
        )
        .unwrap_err();
        assert_eq!(
            "natural inner join operator should not have using operator",
            err.message()
        );
    }

    #[test]
    fn using_and_on_conflict() {
        let left = schema(&["a.id"]);
        let right = schema(&["b.id"]);
        let filter = Filter::path_eq("a.id", "b.id");
        let err = JoinColumns::resolve(
            "inner join",
            &left,
            &right,
            Some("a"),
            Some("b"),
            Some(&filter),
            &["id".to_string()],
            false,
            &[],
        )
        .unwrap_err();
        assert_eq!(
            "using(or natural) and on operator cannot be used at the same time",
            err.message()
        );
    }

    #[test]
    fn missing_using_column() {
        let left = schema(&["a.id"]);
        let right = schema(&["b.other"]);
        let err = JoinColumns::resolve(
            "inner join",
            &left,
            &right,
            Some("a"),
            Some("b"),
            None,
            &["id".to_string()],
            false,
            &[],
        )
        .unwrap_err();
        assert_eq!("TableB has no path: b.id", err.message());
        assert_eq!(None, err.field("did_you_mean"));

        let right = schema(&["b.idx"]);
        let err = JoinColumns::resolve(
            "inner join",
            &left,
            &right,
            Some("a"),
            Some("b"),
            None,
            &["id".to_string()],
            false,
            &[],
        )
        .unwrap_err();
        assert_eq!(Some("b.idx"), err.field("did_you_mean"));
    }

    #[test]
    fn extra_paths_with_wildcard_prefix() {
        let left = schema(&["t.a", "t.b", "u.c"]);
        let right = schema(&["t.a", "u.c", "v.d"]);
        let cols = JoinColumns::extra_only(&left, &right, &["t.*".to_string()]);
        assert_eq!(vec!["t.a"], cols.extra_paths);
    }

    #[test]
    fn filter_pairs_either_order() {
        let left = schema(&["a.id"]);
        let right = schema(&["b.id"]);
        let filter = Filter::And(vec![
            Filter::path_eq("b.id", "a.id"),
            Filter::path_eq("a.missing", "b.id"),
        ]);
        let pairs = filter_equi_pairs(&filter, &left, &right);
        assert_eq!(1, pairs.len());
        assert_eq!((0, 0), (pairs[0].left, pairs[0].right));
    }

    #[test]
    fn nulls_never_match() {
        let left = schema(&["a.id"]);
        let right = schema(&["b.id"]);
        let pairs = EquiPairs {
            extra: Vec::new(),
            using: vec![EquiPair::new(&left, 0, &right, 0)],
        };
        let layout = JoinLayout::concat(&left, &right, &[]);
        let cond = JoinCondition::new(pairs, None, layout).unwrap();

        let a = Row::new(vec![None]);
        let b = Row::new(vec![None]);
        assert!(!cond.matches(&a, &b).unwrap());

        let a = Row::new(vec![Some(1_i64.into())]);
        let b = Row::new(vec![Some(1_i32.into())]);
        assert!(cond.matches(&a, &b).unwrap());
    }
}
