//! Evaluation of operator trees over materialized tables.

pub mod context;
pub mod dedup;
pub mod executor;
pub mod join;
pub mod plan;
pub mod setop;
pub mod unary;

pub use context::ExecutionContext;
pub use executor::{OperatorExecutor, QueryResult, RemoteSession};
