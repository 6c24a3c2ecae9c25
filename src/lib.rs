//! Serves user-supplied model files to an inference library that only knows
//! how to fetch them by name.

pub mod bridge;
pub mod core;
pub mod intercept;
pub mod models;
pub mod output;
