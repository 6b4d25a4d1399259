use polystore_error::{Result, ResultExt};
use regex::Regex;

use super::expression::Expression;
use super::filter::{CompareOp, Filter, Quantifier};
use super::physical_expr::PhysicalExpr;
use crate::pattern::{PathPattern, is_pattern};
use crate::row::RowAccess;
use crate::scalar::ScalarValue;
use crate::schema::Schema;

/// A filter with paths resolved against a schema.
#[derive(Debug, Clone)]
pub enum PhysicalFilter {
    And(Vec<PhysicalFilter>),
    Or(Vec<PhysicalFilter>),
    Not(Box<PhysicalFilter>),
    Bool(bool),
    Key {
        op: CompareOp,
        value: i64,
    },
    Value(PhysicalValueFilter),
    Path {
        left: Option<usize>,
        op: CompareOp,
        right: Option<usize>,
    },
    Expr {
        left: PhysicalExpr,
        op: CompareOp,
        right: PhysicalExpr,
    },
}

#[derive(Debug, Clone)]
pub struct PhysicalValueFilter {
    /// Columns the path resolved to. More than one only for wildcard paths.
    pub columns: Vec<usize>,
    pub wildcard: bool,
    pub op: CompareOp,
    pub value: ScalarValue,
    pub quantifier: Quantifier,
    /// Compiled pattern for LIKE comparisons against binary values.
    like: Option<Regex>,
}

impl PhysicalFilter {
    pub fn plan(filter: &Filter, schema: &Schema) -> Result<Self> {
        Ok(match filter {
            Filter::And(children) => PhysicalFilter::And(Self::plan_all(children, schema)?),
            Filter::Or(children) => PhysicalFilter::Or(Self::plan_all(children, schema)?),
            Filter::Not(child) => PhysicalFilter::Not(Box::new(Self::plan(child, schema)?)),
            Filter::Bool(v) => PhysicalFilter::Bool(*v),
            Filter::Key { op, value } => PhysicalFilter::Key {
                op: *op,
                value: *value,
            },
            Filter::Value {
                path,
                op,
                value,
                quantifier,
            } => {
                let wildcard = is_pattern(path);
                let columns = if wildcard {
                    schema.indices_matching(&PathPattern::new(path)?)
                } else {
                    schema.index_of(path).into_iter().collect()
                };
                let like = match (op.is_like(), value) {
                    (true, ScalarValue::Binary(_)) => Some(compile_like(&value.to_str_lossy())?),
                    _ => None,
                };
                PhysicalFilter::Value(PhysicalValueFilter {
                    columns,
                    wildcard,
                    op: *op,
                    value: value.clone(),
                    quantifier: *quantifier,
                    like,
                })
            }
            Filter::Path { path_a, op, path_b } => PhysicalFilter::Path {
                left: schema.index_of(path_a),
                op: *op,
                right: schema.index_of(path_b),
            },
            Filter::Expr { left, op, right } => PhysicalFilter::Expr {
                left: plan_expr(left, schema),
                op: *op,
                right: plan_expr(right, schema),
            },
        })
    }

    fn plan_all(filters: &[Filter], schema: &Schema) -> Result<Vec<Self>> {
        filters.iter().map(|f| Self::plan(f, schema)).collect()
    }

    /// Evaluate the filter against a row.
    ///
    /// Comparisons involving nulls or values that can't be compared evaluate
    /// to false.
    pub fn evaluate<R>(&self, row: &R) -> Result<bool>
    where
        R: RowAccess + ?Sized,
    {
        match self {
            Self::And(children) => {
                for child in children {
                    if !child.evaluate(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(children) => {
                for child in children {
                    if child.evaluate(row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(child) => Ok(!child.evaluate(row)?),
            Self::Bool(v) => Ok(*v),
            Self::Key { op, value } => Ok(match row.key() {
                Some(key) => op.accepts(key.cmp(value)),
                None => false,
            }),
            Self::Value(filter) => Ok(filter.evaluate(row)),
            Self::Path { left, op, right } => {
                let (Some(left), Some(right)) = (left, right) else {
                    return Ok(false);
                };
                match (row.value(*left), row.value(*right)) {
                    (Some(l), Some(r)) => compare_values(&l, *op, &r),
                    _ => Ok(false),
                }
            }
            Self::Expr { left, op, right } => {
                match (left.evaluate(row)?, right.evaluate(row)?) {
                    (Some(l), Some(r)) => compare_values(&l, *op, &r),
                    _ => Ok(false),
                }
            }
        }
    }
}

impl PhysicalValueFilter {
    fn evaluate<R>(&self, row: &R) -> bool
    where
        R: RowAccess + ?Sized,
    {
        if !self.wildcard {
            return match self.columns.first().and_then(|&idx| row.value(idx)) {
                Some(v) => self.accepts(&v),
                None => false,
            };
        }

        match self.quantifier {
            Quantifier::Any => self
                .columns
                .iter()
                .filter_map(|&idx| row.value(idx))
                .any(|v| self.accepts(&v)),
            Quantifier::All => self.columns.iter().all(|&idx| match row.value(idx) {
                Some(v) => self.accepts(&v),
                None => false,
            }),
        }
    }

    fn accepts(&self, value: &ScalarValue) -> bool {
        if self.op.is_like() {
            let (Some(regex), ScalarValue::Binary(_)) = (&self.like, value) else {
                return false;
            };
            let matched = regex.is_match(&value.to_str_lossy());
            return match self.op {
                CompareOp::Like => matched,
                _ => !matched,
            };
        }
        match value.compare(&self.value) {
            Some(ord) => self.op.accepts(ord),
            None => false,
        }
    }
}

fn plan_expr(expr: &Expression, schema: &Schema) -> PhysicalExpr {
    PhysicalExpr::plan(expr, schema)
}

fn compile_like(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$"))
        .context_fn(|| format!("Invalid LIKE pattern '{pattern}'"))
}

/// Compare two non-null values with an operator.
///
/// LIKE treats the right value as the pattern and only applies to binary
/// values.
pub fn compare_values(left: &ScalarValue, op: CompareOp, right: &ScalarValue) -> Result<bool> {
    if op.is_like() {
        let (ScalarValue::Binary(_), ScalarValue::Binary(_)) = (left, right) else {
            return Ok(false);
        };
        let regex = compile_like(&right.to_str_lossy())?;
        let matched = regex.is_match(&left.to_str_lossy());
        return Ok(match op {
            CompareOp::Like => matched,
            _ => !matched,
        });
    }
    Ok(match left.compare(right) {
        Some(ord) => op.accepts(ord),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::expr::ArithOp;
    use crate::row::Row;
    use crate::schema::Field;

    fn schema() -> Schema {
        Schema::with_key([
            Field::new("a.x", DataType::Int32),
            Field::new("a.y", DataType::Int64),
            Field::new("b.name", DataType::Binary),
        ])
    }

    fn eval(filter: &Filter, row: &Row) -> bool {
        PhysicalFilter::plan(filter, &schema())
            .unwrap()
            .evaluate(row)
            .unwrap()
    }

    #[test]
    fn value_filter_cross_numeric() {
        let row = Row::with_key(1, vec![Some(3_i32.into()), Some(4_i64.into()), None]);
        assert!(eval(&Filter::value("a.x", CompareOp::Eq, 3_i64), &row));
        assert!(eval(&Filter::value("a.x", CompareOp::Lt, 3.5_f64), &row));
        assert!(!eval(&Filter::value("a.x", CompareOp::Eq, "3"), &row));
        assert!(!eval(&Filter::value("b.name", CompareOp::NotEq, "x"), &row));
        assert!(!eval(&Filter::value("missing", CompareOp::NotEq, 1_i64), &row));
    }

    #[test]
    fn wildcard_quantifiers() {
        let row = Row::with_key(1, vec![Some(3_i32.into()), None, None]);
        let any = Filter::value("a.*", CompareOp::Gt, 2_i64);
        assert!(eval(&any, &row));

        let all = Filter::Value {
            path: "a.*".to_string(),
            op: CompareOp::Gt,
            value: 2_i64.into(),
            quantifier: Quantifier::All,
        };
        assert!(!eval(&all, &row));

        let row = Row::with_key(1, vec![Some(3_i32.into()), Some(5_i64.into()), None]);
        assert!(eval(&all, &row));

        let none_matched = Filter::Value {
            path: "z.*".to_string(),
            op: CompareOp::Gt,
            value: 2_i64.into(),
            quantifier: Quantifier::All,
        };
        assert!(eval(&none_matched, &row));
    }

    #[test]
    fn like_is_full_match() {
        let row = Row::with_key(1, vec![None, None, Some("abc".into())]);
        assert!(eval(&Filter::value("b.name", CompareOp::Like, "a.c"), &row));
        assert!(!eval(&Filter::value("b.name", CompareOp::Like, "b"), &row));
        assert!(eval(&Filter::value("b.name", CompareOp::NotLike, "b"), &row));
    }

    #[test]
    fn key_and_path_filters() {
        let row = Row::with_key(7, vec![Some(4_i32.into()), Some(4_i64.into()), None]);
        assert!(eval(
            &Filter::Key {
                op: CompareOp::GtEq,
                value: 7
            },
            &row
        ));
        assert!(eval(&Filter::path_eq("a.x", "a.y"), &row));
        assert!(!eval(&Filter::path_eq("a.x", "b.name"), &row));

        let keyless = Row::new(vec![None, None, None]);
        assert!(!eval(
            &Filter::Key {
                op: CompareOp::NotEq,
                value: 7
            },
            &keyless
        ));
    }

    #[test]
    fn expr_filter() {
        let row = Row::with_key(10, vec![Some(4_i32.into()), Some(6_i64.into()), None]);
        let filter = Filter::Expr {
            left: Expression::binary(
                Expression::column("a.x"),
                ArithOp::Add,
                Expression::column("a.y"),
            ),
            op: CompareOp::Eq,
            right: Expression::Key,
        };
        assert!(eval(&filter, &row));
    }

    #[test]
    fn invalid_like_pattern_errors() {
        let filter = Filter::value("b.name", CompareOp::Like, "(");
        PhysicalFilter::plan(&filter, &schema()).unwrap_err();
    }
}
