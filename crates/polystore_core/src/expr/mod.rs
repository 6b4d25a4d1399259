//! Predicates and scalar expressions.
//!
//! Logical filters and expressions refer to columns by path. Before they are
//! evaluated they get planned against a schema, which resolves paths to column
//! indices and compiles any regular expressions.

pub mod expression;
pub mod filter;
pub mod physical_expr;
pub mod physical_filter;

pub use expression::{ArithOp, Expression};
pub use filter::{CompareOp, Filter, Quantifier};
pub use physical_expr::PhysicalExpr;
pub use physical_filter::PhysicalFilter;
