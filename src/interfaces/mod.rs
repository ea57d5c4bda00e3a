//! Outer surfaces driving the application layer.

pub mod batch;
pub mod csv;
