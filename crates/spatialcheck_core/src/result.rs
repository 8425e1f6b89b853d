//! Validation results.
//!
//! A [`ValidationResult`] accumulates everything found in one target: the
//! error and warning records, per-stage summaries and the run status.

use crate::{StageId, StageStatus, point_wkt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

/// One located finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Machine-readable code, e.g. `REL_POINT_OUTSIDE_POLYGON`
    pub error_code: String,
    /// Human-readable message
    pub message: String,
    /// Severity
    pub severity: Severity,
    /// Table identifier from the configuration, if known
    pub table_id: Option<String>,
    /// Table (layer) name
    pub table_name: String,
    /// Feature object identifier
    pub feature_id: Option<i64>,
    /// Representative X
    pub x: f64,
    /// Representative Y
    pub y: f64,
    /// WKT of the representative point
    pub geometry_wkt: String,
}

impl ValidationError {
    /// Creates a finding located at the origin.
    pub fn new(
        error_code: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            severity,
            table_id: None,
            table_name: String::new(),
            feature_id: None,
            x: 0.0,
            y: 0.0,
            geometry_wkt: point_wkt(0.0, 0.0),
        }
    }

    /// Sets the table the finding belongs to.
    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Sets the configured table identifier.
    pub fn with_table_id(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }

    /// Sets the feature identifier.
    pub fn with_feature(mut self, feature_id: i64) -> Self {
        self.feature_id = Some(feature_id);
        self
    }

    /// Sets the representative location (and its WKT).
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self.geometry_wkt = point_wkt(x, y);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.error_code, self.message)?;
        if !self.table_name.is_empty() {
            write!(f, " ({}", self.table_name)?;
            if let Some(fid) = self.feature_id {
                write!(f, " #{fid}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Outcome of one relation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleOutcome {
    Completed,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Per-rule summary inside a relation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleReport {
    pub rule_id: String,
    pub case_type: String,
    pub outcome: RuleOutcome,
    /// Findings this rule contributed, including those of a failed rule
    pub errors_added: usize,
    pub elapsed_ms: u64,
}

/// Summary of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageId,
    pub status: StageStatus,
    /// Errors added during this stage
    pub error_count: usize,
    /// Warnings added during this stage
    pub warning_count: usize,
    /// Units (tables, features or rules) processed
    pub processed_units: u64,
    pub elapsed_ms: u64,
    pub message: Option<String>,
    /// Relation rules (stage 5 only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleReport>,
}

impl StageResult {
    /// Creates an empty summary with the given status.
    pub fn new(stage: StageId, status: StageStatus) -> Self {
        Self {
            stage,
            status,
            error_count: 0,
            warning_count: 0,
            processed_units: 0,
            elapsed_ms: 0,
            message: None,
            rules: Vec::new(),
        }
    }

    /// Creates a skipped summary.
    pub fn skipped(stage: StageId, reason: impl Into<String>) -> Self {
        let mut r = Self::new(stage, StageStatus::Skipped);
        r.message = Some(reason.into());
        r
    }
}

/// The accumulated result of validating one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub target_id: String,
    pub target_path: PathBuf,
    /// False once any error has been recorded
    pub is_valid: bool,
    error_count: usize,
    warning_count: usize,
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationError>,
    /// Per-stage summaries, in execution order
    pub stages: Vec<StageResult>,
    pub started_at: DateTime<Utc>,
    pub processing_time: Duration,
    pub status: RunStatus,
    pub message: Option<String>,
}

impl ValidationResult {
    /// Creates an empty, valid result.
    pub fn new(target_id: impl Into<String>, target_path: impl Into<PathBuf>) -> Self {
        Self {
            target_id: target_id.into(),
            target_path: target_path.into(),
            is_valid: true,
            error_count: 0,
            warning_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            stages: Vec::new(),
            started_at: Utc::now(),
            processing_time: Duration::ZERO,
            status: RunStatus::Pending,
            message: None,
        }
    }

    /// Records a finding.
    ///
    /// `Error` findings invalidate the result; `Warning` and `Info` findings
    /// go to the warning list.
    pub fn push(&mut self, finding: ValidationError) {
        match finding.severity {
            Severity::Error => self.push_error(finding),
            Severity::Warning | Severity::Info => self.push_warning(finding),
        }
    }

    /// Records an error and marks the result invalid.
    pub fn push_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.error_count += 1;
        self.errors.push(error);
    }

    /// Records a warning.
    pub fn push_warning(&mut self, warning: ValidationError) {
        self.warning_count += 1;
        self.warnings.push(warning);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Error findings, in the order they were recorded.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ValidationError] {
        &self.warnings
    }

    /// The summary of a stage, if it has run.
    pub fn stage(&self, stage: StageId) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Findings with the given code, errors first.
    pub fn findings_with_code<'a>(
        &'a self,
        code: &'a str,
    ) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(move |e| e.error_code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_updates_counters() {
        let mut result = ValidationResult::new("a.gdb", "/tmp/a.gdb");
        assert!(result.is_valid);

        result.push(ValidationError::new("TBL_UNDEFINED", "extra", Severity::Warning));
        assert!(result.is_valid);
        assert_eq!(result.warning_count(), 1);

        result.push(ValidationError::new("TBL_MISSING", "gone", Severity::Error).at(1.0, 2.0));
        assert!(!result.is_valid);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors()[0].geometry_wkt, "POINT (1 2)");
    }

    #[test]
    fn test_findings_are_read_through_accessors() {
        let mut result = ValidationResult::new("a.gdb", "/tmp/a.gdb");
        result.push(ValidationError::new("ATTR_NOTE", "note", Severity::Info));
        result.push(ValidationError::new("GEOM_NULL", "empty", Severity::Error));

        assert_eq!(result.errors().len(), result.error_count());
        assert_eq!(result.warnings().len(), result.warning_count());
        assert_eq!(result.warnings()[0].error_code, "ATTR_NOTE");
        let messages: Vec<&str> = result
            .findings_with_code("GEOM_NULL")
            .map(|e| e.message.as_str())
            .collect();
        assert_eq!(messages, vec!["empty"]);
    }

    #[test]
    fn test_error_display() {
        let e = ValidationError::new("GEOM_NULL", "no geometry", Severity::Error)
            .with_table("TN_BULD")
            .with_feature(7);
        assert_eq!(e.to_string(), "[error] GEOM_NULL: no geometry (TN_BULD #7)");
    }
}
