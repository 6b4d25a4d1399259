//! Operators over a single input table.

pub mod distinct;
pub mod downsample;
pub mod group_by;
pub mod project;
pub mod rename;
pub mod reorder;
pub mod select;
pub mod sequence;
pub mod sort;
pub mod transform;
