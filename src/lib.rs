//! CKB: a repository-local federated code-intelligence backend. Surfaces
//! (CLI, HTTP, MCP) are thin translators over the Query Engine; everything
//! that decides WHAT the answer is lives in `engine` and below.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fact_layer;
pub mod git;
pub mod jobs;
pub mod observability;
pub mod parsing;
pub mod registry;
pub mod repo_state;
pub mod storage;
pub mod surfaces;
pub mod types;
pub mod validation;

pub use engine::Engine;
pub use error::CkbError;
