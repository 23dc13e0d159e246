//! Compilation and execution of SQL statements for GraphQL fields.

pub mod compile;
pub mod db;
pub mod execute;
pub mod predicate;

pub use compile::*;
