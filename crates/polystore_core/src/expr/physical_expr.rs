use std::borrow::Cow;

use polystore_error::{DbError, Result};

use super::expression::{ArithOp, Expression};
use crate::row::RowAccess;
use crate::scalar::ScalarValue;
use crate::schema::Schema;

/// An expression with column paths resolved against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalExpr {
    /// Column index, or None if the schema doesn't have the column.
    Column(Option<usize>),
    Key,
    Constant(ScalarValue),
    Negate(Box<PhysicalExpr>),
    Binary {
        left: Box<PhysicalExpr>,
        op: ArithOp,
        right: Box<PhysicalExpr>,
    },
}

impl PhysicalExpr {
    pub fn plan(expr: &Expression, schema: &Schema) -> Self {
        match expr {
            Expression::Column(path) => PhysicalExpr::Column(schema.index_of(path)),
            Expression::Key => PhysicalExpr::Key,
            Expression::Constant(v) => PhysicalExpr::Constant(v.clone()),
            Expression::Negate(child) => {
                PhysicalExpr::Negate(Box::new(Self::plan(child, schema)))
            }
            Expression::Binary { left, op, right } => PhysicalExpr::Binary {
                left: Box::new(Self::plan(left, schema)),
                op: *op,
                right: Box::new(Self::plan(right, schema)),
            },
        }
    }

    /// Evaluate the expression, returning None for null.
    pub fn evaluate<'a, R>(&'a self, row: &'a R) -> Result<Option<Cow<'a, ScalarValue>>>
    where
        R: RowAccess + ?Sized,
    {
        Ok(match self {
            Self::Column(Some(idx)) => row.value(*idx),
            Self::Column(None) => None,
            Self::Key => row.key().map(|k| Cow::Owned(ScalarValue::Int64(k))),
            Self::Constant(v) => Some(Cow::Borrowed(v)),
            Self::Negate(child) => match child.evaluate(row)? {
                Some(v) => Some(Cow::Owned(negate(&v)?)),
                None => None,
            },
            Self::Binary { left, op, right } => {
                let left = left.evaluate(row)?;
                let right = right.evaluate(row)?;
                match (left, right) {
                    (Some(l), Some(r)) => Some(Cow::Owned(apply_arith(*op, &l, &r)?)),
                    _ => None,
                }
            }
        })
    }
}

fn negate(value: &ScalarValue) -> Result<ScalarValue> {
    let overflow = || DbError::new(format!("Overflow when negating {value}"));
    Ok(match value {
        ScalarValue::Int32(v) => ScalarValue::Int32(v.checked_neg().ok_or_else(overflow)?),
        ScalarValue::Int64(v) => ScalarValue::Int64(v.checked_neg().ok_or_else(overflow)?),
        ScalarValue::Float32(v) => ScalarValue::Float32(-v),
        ScalarValue::Float64(v) => ScalarValue::Float64(-v),
        other => {
            return Err(DbError::new(format!(
                "Cannot negate value of type {}",
                other.datatype()
            )));
        }
    })
}

/// Apply an arithmetic operator.
///
/// Two `Int32` values produce an `Int32`, mixed integer widths produce an
/// `Int64`, and anything involving a float produces a `Float64`.
pub fn apply_arith(op: ArithOp, left: &ScalarValue, right: &ScalarValue) -> Result<ScalarValue> {
    match (left, right) {
        (ScalarValue::Int32(l), ScalarValue::Int32(r)) => {
            checked_int(op, *l as i64, *r as i64).and_then(|v| {
                i32::try_from(v)
                    .map(ScalarValue::Int32)
                    .map_err(|_| DbError::new(format!("Overflow computing {l} {op} {r}")))
            })
        }
        (l, r) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => checked_int(op, l, r).map(ScalarValue::Int64),
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => Ok(ScalarValue::Float64(float_op(op, l, r))),
                _ => Err(DbError::new(format!(
                    "Cannot apply {op} to {} and {}",
                    l.datatype(),
                    r.datatype()
                ))),
            },
        },
    }
}

fn checked_int(op: ArithOp, l: i64, r: i64) -> Result<i64> {
    if matches!(op, ArithOp::Div | ArithOp::Mod) && r == 0 {
        return Err(DbError::new("Division by zero"));
    }
    let v = match op {
        ArithOp::Add => l.checked_add(r),
        ArithOp::Sub => l.checked_sub(r),
        ArithOp::Mul => l.checked_mul(r),
        ArithOp::Div => l.checked_div(r),
        ArithOp::Mod => l.checked_rem(r),
    };
    v.ok_or_else(|| DbError::new(format!("Overflow computing {l} {op} {r}")))
}

fn float_op(op: ArithOp, l: f64, r: f64) -> f64 {
    match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        ArithOp::Mul => l * r,
        ArithOp::Div => l / r,
        ArithOp::Mod => l % r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::row::Row;
    use crate::schema::Field;

    #[test]
    fn integer_width_rules() {
        let v = apply_arith(ArithOp::Add, &ScalarValue::Int32(1), &ScalarValue::Int32(2)).unwrap();
        assert_eq!(ScalarValue::Int32(3), v);

        let v = apply_arith(ArithOp::Mul, &ScalarValue::Int32(4), &ScalarValue::Int64(2)).unwrap();
        assert_eq!(ScalarValue::Int64(8), v);

        let v =
            apply_arith(ArithOp::Div, &ScalarValue::Int64(1), &ScalarValue::Float32(2.0)).unwrap();
        assert_eq!(ScalarValue::Float64(0.5), v);
    }

    #[test]
    fn integer_errors() {
        apply_arith(ArithOp::Div, &ScalarValue::Int64(1), &ScalarValue::Int64(0)).unwrap_err();
        apply_arith(
            ArithOp::Add,
            &ScalarValue::Int32(i32::MAX),
            &ScalarValue::Int32(1),
        )
        .unwrap_err();
        apply_arith(ArithOp::Add, &ScalarValue::from("a"), &ScalarValue::Int32(1)).unwrap_err();
    }

    #[test]
    fn evaluate_with_nulls() {
        let schema = Schema::with_key([
            Field::new("a", DataType::Int64),
            Field::new("b", DataType::Int64),
        ]);
        let row = Row::with_key(10, vec![Some(5_i64.into()), None]);

        let expr = Expression::binary(Expression::Key, ArithOp::Sub, Expression::column("a"));
        let planned = PhysicalExpr::plan(&expr, &schema);
        let v = planned.evaluate(&row).unwrap().unwrap();
        assert_eq!(ScalarValue::Int64(5), *v);

        let expr = Expression::binary(Expression::column("a"), ArithOp::Add, Expression::column("b"));
        let planned = PhysicalExpr::plan(&expr, &schema);
        assert!(planned.evaluate(&row).unwrap().is_none());
    }
}
