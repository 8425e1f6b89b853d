//! Error types for the validation engine.

use spatialcheck_core::{ConfigError, DataAccessError, GeometryError};
use thiserror::Error;

/// Errors a relation rule can end with.
///
/// The relation stage turns `UnsupportedCaseType`, `MissingLayer` and
/// `InvalidRule` into skipped rules, `Cancelled` into a cancelled stage and
/// everything else into a failed rule.
#[derive(Debug, Error)]
pub enum RelationCheckError {
    /// No strategy is registered for the case type
    #[error("Unsupported case type '{0}'")]
    UnsupportedCaseType(String),

    /// A layer named by the rule is absent from the data source
    #[error("Layer '{layer}' required by rule '{rule_id}' was not found")]
    MissingLayer { rule_id: String, layer: String },

    /// The rule definition is not usable
    #[error("Invalid rule: {0}")]
    InvalidRule(#[from] ConfigError),

    /// Reading the data source failed
    #[error("Data access failed: {0}")]
    DataAccess(#[from] DataAccessError),

    /// The geometry engine failed
    #[error("Geometry operation failed: {0}")]
    Geometry(#[from] GeometryError),

    /// The run was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Any other failure inside a strategy
    #[error("Rule execution failed: {0}")]
    Execution(String),
}

impl RelationCheckError {
    /// Creates a new missing layer error.
    pub fn missing_layer(rule_id: impl Into<String>, layer: impl Into<String>) -> Self {
        Self::MissingLayer {
            rule_id: rule_id.into(),
            layer: layer.into(),
        }
    }

    /// Creates a new execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Returns true if the rule should be reported as skipped rather than failed.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCaseType(_) | Self::MissingLayer { .. } | Self::InvalidRule(_)
        )
    }
}

/// Errors raised by the strategy registry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    /// A strategy is already registered for the case type
    #[error("A strategy for case type '{0}' is already registered")]
    DuplicateCaseType(String),

    /// No strategy is registered for the case type
    #[error("Unsupported case type '{0}'")]
    UnsupportedCaseType(String),
}

impl From<RegistryError> for RelationCheckError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnsupportedCaseType(case_type) => Self::UnsupportedCaseType(case_type),
            other => Self::Execution(other.to_string()),
        }
    }
}

/// Errors that interrupt a stage.
#[derive(Debug, Error)]
pub(crate) enum StageError {
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    #[error("Cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_classification() {
        assert!(RelationCheckError::UnsupportedCaseType("X".into()).is_skip());
        assert!(RelationCheckError::missing_layer("R1", "TN_BULD").is_skip());
        assert!(RelationCheckError::from(ConfigError::EmptyRuleId).is_skip());
        assert!(!RelationCheckError::Cancelled.is_skip());
        assert!(!RelationCheckError::from(GeometryError::Empty).is_skip());
    }

    #[test]
    fn test_error_display() {
        let err = RelationCheckError::missing_layer("R1", "TN_BULD");
        assert_eq!(
            err.to_string(),
            "Layer 'TN_BULD' required by rule 'R1' was not found"
        );
        let err: RelationCheckError = RegistryError::UnsupportedCaseType("Foo".into()).into();
        assert!(matches!(err, RelationCheckError::UnsupportedCaseType(ref c) if c == "Foo"));
    }
}
