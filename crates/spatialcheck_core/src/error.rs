//! Error types for SpatialCheck.
//!
//! This module defines the failures that can surface while opening targets,
//! reading layers, evaluating geometry primitives, validating rule
//! definitions, and persisting run history.

use thiserror::Error;

/// Errors raised by a data-source driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataAccessError {
    /// The target does not exist or is not known to the opener
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// The target exists but could not be opened
    #[error("Failed to open target '{target}': {message}")]
    OpenFailed {
        /// Target identifier or path
        target: String,
        /// Driver message
        message: String,
    },

    /// A referenced layer is absent from the data source
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// The layer rejected an attribute filter expression
    #[error("Invalid attribute filter '{filter}': {message}")]
    InvalidFilter {
        /// The filter expression as given
        filter: String,
        /// Why it was rejected
        message: String,
    },

    /// Reading features failed
    #[error("Failed to read from layer '{layer}': {message}")]
    ReadFailed {
        /// Layer name
        layer: String,
        /// Driver message
        message: String,
    },
}

impl DataAccessError {
    /// Creates a new open failure.
    pub fn open_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid filter error.
    pub fn invalid_filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            filter: filter.into(),
            message: message.into(),
        }
    }

    /// Creates a new read failure.
    pub fn read_failed(layer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            layer: layer.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by a geometry engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// The geometry has no coordinates
    #[error("Geometry is empty")]
    Empty,

    /// The operation is not defined for this geometry kind
    #[error("Operation '{operation}' not supported for {kind}")]
    Unsupported {
        /// Operation name
        operation: &'static str,
        /// Geometry kind name
        kind: String,
    },

    /// The engine failed internally
    #[error("Geometry engine error: {0}")]
    Engine(String),
}

impl GeometryError {
    /// Creates a new unsupported-operation error.
    pub fn unsupported(operation: &'static str, kind: impl Into<String>) -> Self {
        Self::Unsupported {
            operation,
            kind: kind.into(),
        }
    }
}

/// Errors in a rule or stage configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Rule identifier is blank
    #[error("Rule identifier is empty")]
    EmptyRuleId,

    /// Case type is blank
    #[error("Rule '{0}' has no case type")]
    EmptyCaseType(String),

    /// Rule names no participating layers
    #[error("Rule '{0}' names no layers")]
    NoLayers(String),

    /// Rule names fewer layers than its case type needs
    #[error("Rule '{rule_id}' needs {expected} layers, found {actual}")]
    MissingLayers {
        /// Rule identifier
        rule_id: String,
        /// Layers required
        expected: usize,
        /// Layers given
        actual: usize,
    },

    /// Tolerance is negative or not a finite number
    #[error("Rule '{rule_id}' has invalid tolerance {tolerance}")]
    InvalidTolerance {
        /// Rule identifier
        rule_id: String,
        /// The rejected value
        tolerance: f64,
    },
}

/// Errors raised by a run-history store.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Underlying storage failed
    #[error("History storage error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded
    #[error("History serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
