//! SQL statement handling.

pub mod classifier;

pub use classifier::{Classification, SqlClassifier, StatementKind};
