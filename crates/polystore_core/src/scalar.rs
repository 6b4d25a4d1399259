use std::cmp::Ordering;
use std::fmt;

use polystore_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::datatype::DataType;

/// A single non-null value.
///
/// Nulls are represented by the absence of a value (`Option<ScalarValue>`)
/// at the row level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Binary(Vec<u8>),
}

impl ScalarValue {
    pub fn datatype(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Binary(_) => DataType::Binary,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.datatype().is_numeric()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::Float32(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(v) => Ok(*v),
            other => Err(DbError::new(format!("Not a bool: {other}"))),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        self.as_i64()
            .ok_or_else(|| DbError::new(format!("Not an integer: {self}")))
    }

    pub fn try_as_usize(&self) -> Result<usize> {
        let v = self.try_as_i64()?;
        usize::try_from(v).map_err(|_| DbError::new(format!("Value out of range: {v}")))
    }

    /// Interpret the value as a string. Binary values are read as UTF-8,
    /// everything else uses its display form.
    pub fn to_str_lossy(&self) -> String {
        match self {
            Self::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            other => other.to_string(),
        }
    }

    /// Compare two values.
    ///
    /// Values of the same type compare naturally. Integers of different widths
    /// compare exactly, and any other numeric mix compares as `f64`. Returns
    /// `None` if the values can't be compared.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::Binary(a), Self::Binary(b)) => Some(a.cmp(b)),
            (Self::Int32(a), Self::Int32(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::Float32(a), Self::Float32(b)) => Some(cmp_float(*a as f64, *b as f64)),
            (Self::Float64(a), Self::Float64(b)) => Some(cmp_float(*a, *b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => Some(cmp_float(a, b)),
                    _ => None,
                },
            },
        }
    }

    /// Like `compare`, but errors on incomparable values.
    pub fn try_compare(&self, other: &ScalarValue) -> Result<Ordering> {
        self.compare(other).ok_or_else(|| {
            DbError::new(format!(
                "{} and {} can't be compared",
                self.datatype(),
                other.datatype()
            ))
        })
    }

    /// Value equality across numeric types.
    pub fn eq_value(&self, other: &ScalarValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

fn cmp_float(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// Compare two nullable values, nulls first.
///
/// Used for sorting. Incomparable values are treated as equal so that a sort
/// stays stable instead of failing halfway through.
pub fn compare_nullable(a: Option<&ScalarValue>, b: Option<&ScalarValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// Equality of nullable values where two nulls are considered equal.
///
/// This is the equality used for deduplication, not for join predicates.
pub fn nullable_eq(a: Option<&ScalarValue>, b: Option<&ScalarValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.eq_value(b),
        _ => false,
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Binary(v) => write!(f, "{}", String::from_utf8_lossy(v)),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<usize> for ScalarValue {
    fn from(value: usize) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<f32> for ScalarValue {
    fn from(value: f32) -> Self {
        ScalarValue::Float32(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Binary(value.as_bytes().to_vec())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Binary(value.into_bytes())
    }
}
