//! Error type shared by all polystore crates.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Coarse classification of an error.
///
/// Every failure in the executor falls into one of these buckets. Callers
/// generally only need to distinguish them for reporting; none of them are
/// retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operator parameters are invalid for the given inputs.
    InvalidParameter,
    /// A single-join saw more than one matching row.
    CardinalityViolation,
    /// A function from the registry failed.
    FunctionExecution,
    /// The same field shows up with two different types.
    TypeConflict,
    /// Functionality that isn't available in this build.
    NotImplemented,
    /// Everything else.
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "Invalid parameter"),
            Self::CardinalityViolation => write!(f, "Cardinality violation"),
            Self::FunctionExecution => write!(f, "Function execution"),
            Self::TypeConflict => write!(f, "Type conflict"),
            Self::NotImplemented => write!(f, "Not implemented"),
            Self::Execution => write!(f, "Execution"),
        }
    }
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Debug)]
struct DbErrorInner {
    kind: ErrorKind,
    msg: String,
    source: Option<Box<dyn Error + Send + Sync>>,
    fields: Vec<ErrorField>,
    backtrace: Backtrace,
}

#[derive(Debug)]
struct ErrorField {
    key: &'static str,
    value: String,
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::new_with_kind(ErrorKind::Execution, msg)
    }

    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::new_with_kind(ErrorKind::InvalidParameter, msg)
    }

    pub fn cardinality_violation(msg: impl Into<String>) -> Self {
        Self::new_with_kind(ErrorKind::CardinalityViolation, msg)
    }

    pub fn type_conflict(msg: impl Into<String>) -> Self {
        Self::new_with_kind(ErrorKind::TypeConflict, msg)
    }

    /// Wraps an error produced while invoking a registry function.
    pub fn function_execution(function: &str, source: DbError) -> Self {
        Self::new_with_kind(
            ErrorKind::FunctionExecution,
            format!("encounter error when execute function {function}"),
        )
        .with_field("function", function)
        .with_boxed_source(Box::new(source))
    }

    pub fn new_with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                kind,
                msg: msg.into(),
                source: None,
                fields: Vec::new(),
                backtrace: Backtrace::capture(),
            }),
        }
    }

    /// Attach a structured field to the error.
    pub fn with_field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.inner.fields.push(ErrorField {
            key,
            value: value.to_string(),
        });
        self
    }

    fn with_boxed_source(mut self, source: Box<dyn Error + Send + Sync>) -> Self {
        self.inner.source = Some(source);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.msg
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;

        if !self.inner.fields.is_empty() {
            write!(f, " (")?;
            for (idx, field) in self.inner.fields.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", field.key, field.value)?;
            }
            write!(f, ")")?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace: {}", self.inner.backtrace)?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

/// Helper for adding context to foreign errors.
pub trait ResultExt<T, E> {
    fn context(self, msg: &'static str) -> Result<T, DbError>;
    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T, DbError>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T, DbError> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(msg, Box::new(e))),
        }
    }

    fn context_fn<F: Fn() -> String>(self, f: F) -> Result<T, DbError> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(DbError::with_source(f(), Box::new(e))),
        }
    }
}

pub trait OptionExt<T> {
    /// Return an error if the option is None.
    fn required(self, msg: &'static str) -> Result<T, DbError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T, DbError> {
        match self {
            Some(v) => Ok(v),
            None => Err(DbError::new(msg)),
        }
    }
}

/// Return early with a "not implemented" error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        return Err($crate::DbError::new_with_kind(
            $crate::ErrorKind::NotImplemented,
            format!("Not yet implemented: {}", format!($($arg)*)),
        ))
    };
}
