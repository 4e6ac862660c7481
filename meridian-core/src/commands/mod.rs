//! Command implementations.

pub mod plan;
