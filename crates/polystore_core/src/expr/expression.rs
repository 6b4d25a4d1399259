use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scalar::ScalarValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
            Self::Mul => write!(f, "*"),
            Self::Div => write!(f, "/"),
            Self::Mod => write!(f, "%"),
        }
    }
}

/// Scalar expression over a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Column(String),
    Key,
    Constant(ScalarValue),
    Negate(Box<Expression>),
    Binary {
        left: Box<Expression>,
        op: ArithOp,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(path: impl Into<String>) -> Self {
        Expression::Column(path.into())
    }

    pub fn constant(value: impl Into<ScalarValue>) -> Self {
        Expression::Constant(value.into())
    }

    pub fn binary(left: Expression, op: ArithOp, right: Expression) -> Self {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(path) => write!(f, "{path}"),
            Self::Key => write!(f, "key"),
            Self::Constant(v) => write!(f, "{v}"),
            Self::Negate(expr) => write!(f, "-{expr}"),
            Self::Binary { left, op, right } => write!(f, "({left} {op} {right})"),
        }
    }
}
