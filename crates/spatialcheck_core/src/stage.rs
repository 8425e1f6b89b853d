//! Validation stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The six ordered stages of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageId {
    /// Stage 0: open the dataset and profile it
    PreCheck,
    /// Stage 1: table presence and geometry type
    Table,
    /// Stage 2: field definitions
    Schema,
    /// Stage 3: per-feature geometry checks
    Geometry,
    /// Stage 4: per-feature attribute checks
    Attribute,
    /// Stage 5: cross-layer relation checks
    Relation,
}

impl StageId {
    /// Number of stages.
    pub const COUNT: usize = 6;

    /// All stages in execution order.
    pub const ALL: [StageId; StageId::COUNT] = [
        StageId::PreCheck,
        StageId::Table,
        StageId::Schema,
        StageId::Geometry,
        StageId::Attribute,
        StageId::Relation,
    ];

    /// Stage number, 0 through 5.
    pub fn number(&self) -> usize {
        match self {
            StageId::PreCheck => 0,
            StageId::Table => 1,
            StageId::Schema => 2,
            StageId::Geometry => 3,
            StageId::Attribute => 4,
            StageId::Relation => 5,
        }
    }

    /// Human-readable stage name.
    pub fn name(&self) -> &'static str {
        match self {
            StageId::PreCheck => "Pre-check",
            StageId::Table => "Table check",
            StageId::Schema => "Schema check",
            StageId::Geometry => "Geometry check",
            StageId::Attribute => "Attribute check",
            StageId::Relation => "Relation check",
        }
    }

    pub fn from_number(number: usize) -> Option<StageId> {
        StageId::ALL.get(number).copied()
    }

    /// The following stage, `None` after the last one.
    pub fn next(&self) -> Option<StageId> {
        StageId::from_number(self.number() + 1)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.number())
    }
}

/// Lifecycle of a stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StageStatus {
    #[default]
    NotStarted,
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    /// Returns true once the stage can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

/// A stage's live state.
///
/// The stage identity is fixed at creation; only status and progress move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    id: StageId,
    /// Current status
    pub status: StageStatus,
    /// Progress within the stage, 0 to 100
    pub progress: f64,
}

impl Stage {
    /// Creates a stage that has not started.
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            status: StageStatus::NotStarted,
            progress: 0.0,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn number(&self) -> usize {
        self.id.number()
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(StageId::PreCheck.next(), Some(StageId::Table));
        assert_eq!(StageId::Relation.next(), None);
        assert_eq!(StageId::from_number(4), Some(StageId::Attribute));
        assert_eq!(StageId::from_number(6), None);
        for (i, s) in StageId::ALL.iter().enumerate() {
            assert_eq!(s.number(), i);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!StageStatus::Pending.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert_eq!(Stage::new(StageId::Schema).status, StageStatus::NotStarted);
    }
}
