//! Engine options.

use std::time::Duration;

/// Minimum time between two non-terminal progress events of one rule.
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(200);

/// Number of history records used to calibrate predictions.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Options for a validation run.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Throttle interval for per-rule progress events
    pub progress_interval: Duration,

    /// How many recent runs calibrate the time prediction
    pub history_window: usize,

    /// Report layers that are not declared in the table config
    pub report_undefined_tables: bool,

    /// Append statistics of completed runs to the history store
    pub record_history: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            history_window: DEFAULT_HISTORY_WINDOW,
            report_undefined_tables: false,
            record_history: true,
        }
    }
}

impl ValidationOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress throttle interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Sets the calibration window.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Reports undeclared layers as warnings.
    pub fn with_report_undefined_tables(mut self, report: bool) -> Self {
        self.report_undefined_tables = report;
        self
    }

    /// Enables or disables history recording.
    pub fn with_record_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }
}
