//! Report rendering for batch results.

pub mod generator;

pub use generator::*;
