//! Git integration: repository reading, blame, diff, and commit history.

pub mod repository;
pub mod types;
