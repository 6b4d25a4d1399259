use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::expression::Expression;
use crate::scalar::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    /// Full regular expression match of the left side against the pattern
    /// on the right side.
    Like,
    NotLike,
}

impl CompareOp {
    pub const fn is_like(&self) -> bool {
        matches!(self, CompareOp::Like | CompareOp::NotLike)
    }

    /// Whether an ordering satisfies this operator.
    ///
    /// Always false for the LIKE operators.
    pub const fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ord, Ordering::Equal),
            Self::NotEq => !matches!(ord, Ordering::Equal),
            Self::Gt => matches!(ord, Ordering::Greater),
            Self::GtEq => !matches!(ord, Ordering::Less),
            Self::Lt => matches!(ord, Ordering::Less),
            Self::LtEq => !matches!(ord, Ordering::Greater),
            Self::Like | Self::NotLike => false,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Gt => write!(f, ">"),
            Self::GtEq => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::LtEq => write!(f, "<="),
            Self::Like => write!(f, "like"),
            Self::NotLike => write!(f, "not like"),
        }
    }
}

/// How a value filter over a wildcard path combines the matched columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantifier {
    /// True if any matched column satisfies the comparison.
    #[default]
    Any,
    /// True if every matched column satisfies the comparison.
    All,
}

/// Boolean predicate over a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Bool(bool),
    Key {
        op: CompareOp,
        value: i64,
    },
    Value {
        path: String,
        op: CompareOp,
        value: ScalarValue,
        #[serde(default)]
        quantifier: Quantifier,
    },
    Path {
        path_a: String,
        op: CompareOp,
        path_b: String,
    },
    Expr {
        left: Expression,
        op: CompareOp,
        right: Expression,
    },
}

impl Filter {
    pub fn value(path: impl Into<String>, op: CompareOp, value: impl Into<ScalarValue>) -> Self {
        Filter::Value {
            path: path.into(),
            op,
            value: value.into(),
            quantifier: Quantifier::Any,
        }
    }

    pub fn path(path_a: impl Into<String>, op: CompareOp, path_b: impl Into<String>) -> Self {
        Filter::Path {
            path_a: path_a.into(),
            op,
            path_b: path_b.into(),
        }
    }

    pub fn path_eq(path_a: impl Into<String>, path_b: impl Into<String>) -> Self {
        Self::path(path_a, CompareOp::Eq, path_b)
    }

    /// Collect `(path_a, path_b)` for every equality path filter reachable
    /// through AND nodes only.
    pub fn equality_path_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        self.collect_equality_path_pairs(&mut pairs);
        pairs
    }

    fn collect_equality_path_pairs<'a>(&'a self, pairs: &mut Vec<(&'a str, &'a str)>) {
        match self {
            Filter::And(children) => {
                for child in children {
                    child.collect_equality_path_pairs(pairs);
                }
            }
            Filter::Path {
                path_a,
                op: CompareOp::Eq,
                path_b,
            } => pairs.push((path_a.as_str(), path_b.as_str())),
            _ => (),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_children(
            f: &mut fmt::Formatter<'_>,
            children: &[Filter],
            sep: &str,
        ) -> fmt::Result {
            write!(f, "(")?;
            for (idx, child) in children.iter().enumerate() {
                if idx > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")
        }

        match self {
            Self::And(children) => write_children(f, children, "&&"),
            Self::Or(children) => write_children(f, children, "||"),
            Self::Not(child) => write!(f, "!{child}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Key { op, value } => write!(f, "key {op} {value}"),
            Self::Value {
                path,
                op,
                value,
                quantifier,
            } => match quantifier {
                Quantifier::Any => write!(f, "{path} {op} {value}"),
                Quantifier::All => write!(f, "all({path}) {op} {value}"),
            },
            Self::Path { path_a, op, path_b } => write!(f, "{path_a} {op} {path_b}"),
            Self::Expr { left, op, right } => write!(f, "{left} {op} {right}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_pairs_only_through_and() {
        let filter = Filter::And(vec![
            Filter::path_eq("a.id", "b.id"),
            Filter::path("a.x", CompareOp::Lt, "b.x"),
            Filter::Or(vec![Filter::path_eq("a.y", "b.y")]),
            Filter::And(vec![Filter::path_eq("b.z", "a.z")]),
        ]);
        assert_eq!(
            vec![("a.id", "b.id"), ("b.z", "a.z")],
            filter.equality_path_pairs()
        );
    }

    #[test]
    fn display() {
        let filter = Filter::And(vec![
            Filter::value("a.x", CompareOp::GtEq, 3_i64),
            Filter::Not(Box::new(Filter::Key {
                op: CompareOp::Eq,
                value: 4,
            })),
        ]);
        assert_eq!("(a.x >= 3 && !key == 4)", filter.to_string());
    }
}
