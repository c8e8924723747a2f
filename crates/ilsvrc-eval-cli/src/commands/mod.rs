pub mod dataset;
pub mod eval;
