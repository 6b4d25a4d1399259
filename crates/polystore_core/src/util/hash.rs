use ahash::RandomState;

use crate::datatype::DataType;
use crate::row::Row;
use crate::scalar::ScalarValue;

/// State used for all hashing operations during execution.
pub const HASH_RANDOM_STATE: RandomState = RandomState::with_seeds(0, 0, 0, 0);

/// How numeric values get hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Hash values using their own type.
    Native,
    /// Hash every numeric value as an `f64`.
    ///
    /// Required when the two sides being compared have different numeric
    /// types, so that `3_i32` and `3_i64` land in the same bucket.
    CastToFloat,
}

impl HashMode {
    /// Pick the hash mode for comparing a column of type `a` with a column of
    /// type `b`.
    pub fn for_types(a: DataType, b: DataType) -> Self {
        if a != b && a.is_numeric() && b.is_numeric() {
            HashMode::CastToFloat
        } else {
            HashMode::Native
        }
    }
}

/// Hash a single value.
pub fn hash_scalar(value: &ScalarValue, mode: HashMode) -> u64 {
    if mode == HashMode::CastToFloat {
        if let Some(v) = value.as_f64() {
            return v.hash_one();
        }
    }

    match value {
        ScalarValue::Boolean(v) => v.hash_one(),
        ScalarValue::Int32(v) => v.hash_one(),
        ScalarValue::Int64(v) => v.hash_one(),
        ScalarValue::Float32(v) => v.hash_one(),
        ScalarValue::Float64(v) => v.hash_one(),
        ScalarValue::Binary(v) => v.as_slice().hash_one(),
    }
}

/// Hash a nullable value.
pub fn hash_nullable(value: Option<&ScalarValue>, mode: HashMode) -> u64 {
    match value {
        Some(v) => hash_scalar(v, mode),
        None => null_hash_value(),
    }
}

pub fn hash_key(key: i64) -> u64 {
    key.hash_one()
}

/// Hash the values at `columns` for a row.
pub fn hash_row_columns(row: &Row, columns: &[usize], mode: HashMode) -> u64 {
    let mut result = 0;
    for (idx, &col) in columns.iter().enumerate() {
        let hash = hash_nullable(row.value(col), mode);
        if idx > 0 {
            result = combine_hashes(hash, result);
        } else {
            result = hash;
        }
    }
    result
}

/// Helper trait for hashing values.
///
/// This is mostly for floats since they don't automatically implement `Hash`.
trait HashValue {
    fn hash_one(&self) -> u64;
}

macro_rules! impl_hash_value {
    ($typ:ty) => {
        impl HashValue for $typ {
            fn hash_one(&self) -> u64 {
                HASH_RANDOM_STATE.hash_one(self)
            }
        }
    };
}

impl_hash_value!(bool);
impl_hash_value!(i32);
impl_hash_value!(i64);
impl_hash_value!([u8]);

impl HashValue for f32 {
    fn hash_one(&self) -> u64 {
        (*self as f64).hash_one()
    }
}

impl HashValue for f64 {
    fn hash_one(&self) -> u64 {
        // Positive and negative zero compare equal.
        let v = if *self == 0.0 { 0.0 } else { *self };
        HASH_RANDOM_STATE.hash_one(v.to_ne_bytes())
    }
}

/// Combines two hashes into one hash
///
/// This implementation came from datafusion.
pub const fn combine_hashes(l: u64, r: u64) -> u64 {
    let hash = (17 * 37u64).wrapping_add(l);
    hash.wrapping_mul(37).wrapping_add(r)
}

/// All nulls should hash to the same value.
///
/// _What_ that value is is arbitrary, but it needs to be consistent.
pub fn null_hash_value() -> u64 {
    HASH_RANDOM_STATE.hash_one(1)
}
