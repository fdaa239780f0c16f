//! Precondition validation helpers: a `ValidationContext` that accumulates
//! structured `ValidationError`s instead of failing on the first one.

use crate::error::CkbError;
use std::collections::HashMap;

/// Validation context carried through a chain of precondition checks so
/// failures report which operation and attributes were involved.
#[derive(Clone)]
pub struct ValidationContext {
    operation: String,
    attributes: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Fail with `InvalidArgument` if `condition` does not hold.
    pub fn require(self, condition: bool, message: &str) -> Result<(), CkbError> {
        if condition {
            return Ok(());
        }
        Err(CkbError::InvalidArgument(format!(
            "{}: {} (operation={}, attributes={:?})",
            self.operation, message, self.operation, self.attributes
        )))
    }
}

/// Validate a non-empty query string under a reasonable length cap.
pub fn validate_query(op: &str, query: &str) -> Result<(), CkbError> {
    ValidationContext::new(op)
        .with_attribute("query", query)
        .require(!query.trim().is_empty(), "query must not be empty")?;
    ValidationContext::new(op)
        .with_attribute("query_len", query.len().to_string())
        .require(query.len() <= 1024, "query too long")
}

/// Validate a `limit` argument, returning the clamped value.
pub fn validate_limit(op: &str, limit: usize, max: usize) -> Result<usize, CkbError> {
    ValidationContext::new(op)
        .with_attribute("limit", limit.to_string())
        .require(limit > 0, "limit must be positive")?;
    Ok(limit.min(max))
}

/// Validate a stable id argument is non-empty.
pub fn validate_stable_id(op: &str, stable_id: &str) -> Result<(), CkbError> {
    ValidationContext::new(op)
        .with_attribute("stable_id", stable_id)
        .require(!stable_id.is_empty(), "stable_id must not be empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_query() {
        assert!(validate_query("search_symbols", "").is_err());
    }

    #[test]
    fn clamps_limit_to_max() {
        assert_eq!(validate_limit("search_symbols", 500, 100).unwrap(), 100);
    }

    #[test]
    fn rejects_zero_limit() {
        assert!(validate_limit("search_symbols", 0, 100).is_err());
    }
}
