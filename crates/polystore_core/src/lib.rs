//! In-memory physical operator executor.
//!
//! Takes a planned tree of relational operators, materializes its inputs and
//! evaluates every operator eagerly into a new [`table::Table`].

pub mod config;
pub mod datatype;
pub mod execution;
pub mod expr;
pub mod functions;
pub mod pattern;
pub mod row;
pub mod runtime;
pub mod scalar;
pub mod schema;
pub mod table;
pub mod util;

#[cfg(test)]
pub mod testutil;
