//! Stage duration prediction and live remaining-time estimation.
//!
//! The prediction is a per-stage linear model over six dataset counters,
//! scaled by how long recent runs actually took relative to the same model.
//! While a run is in progress the prediction is blended with observed
//! throughput, with a confidence that grows as more progress samples are seen
//! in the current stage.

use serde::{Deserialize, Serialize};
use spatialcheck_core::{RemainingEstimate, RunStatistics, StageId};
use std::collections::BTreeMap;

/// Confidence reported for a pure prediction with no observed progress.
pub const STATIC_CONFIDENCE: f64 = 0.1;

/// Samples at which observed confidence reaches half of its range.
const HALF_CONFIDENCE_SAMPLES: f64 = 4.0;

/// Calibration factors are clamped to this range.
const MIN_CALIBRATION: f64 = 0.1;
const MAX_CALIBRATION: f64 = 10.0;

/// Size counters of a dataset and its configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub table_count: u64,
    pub feature_count: u64,
    pub schema_field_count: u64,
    pub geometry_check_count: u64,
    pub relation_rule_count: u64,
    pub attribute_column_count: u64,
}

impl DatasetProfile {
    pub fn new(
        table_count: u64,
        feature_count: u64,
        schema_field_count: u64,
        geometry_check_count: u64,
        relation_rule_count: u64,
        attribute_column_count: u64,
    ) -> Self {
        Self {
            table_count,
            feature_count,
            schema_field_count,
            geometry_check_count,
            relation_rule_count,
            attribute_column_count,
        }
    }
}

impl From<&RunStatistics> for DatasetProfile {
    fn from(stats: &RunStatistics) -> Self {
        Self {
            table_count: stats.table_count,
            feature_count: stats.feature_count,
            schema_field_count: stats.schema_field_count,
            geometry_check_count: stats.geometry_check_count,
            relation_rule_count: stats.relation_rule_count,
            attribute_column_count: stats.attribute_column_count,
        }
    }
}

/// Predicted seconds per stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePrediction {
    pub per_stage: BTreeMap<StageId, f64>,
    /// Sum of `per_stage`
    pub total: f64,
}

impl StagePrediction {
    fn from_seconds(seconds: [f64; StageId::COUNT]) -> Self {
        let per_stage: BTreeMap<StageId, f64> =
            StageId::ALL.iter().map(|s| (*s, seconds[s.number()])).collect();
        let total = per_stage.values().sum();
        Self { per_stage, total }
    }

    /// Predicted seconds for a stage.
    pub fn stage(&self, stage: StageId) -> f64 {
        self.per_stage.get(&stage).copied().unwrap_or(0.0)
    }

    /// Predicted seconds for all stages from `stage` onwards.
    pub fn remaining_from(&self, stage: StageId) -> f64 {
        self.per_stage.range(stage..).map(|(_, s)| s).sum()
    }
}

/// Baseline seconds per stage, before calibration.
///
/// Every coefficient is non-negative, so the model never predicts less time
/// for a larger input.
pub fn baseline_seconds(p: &DatasetProfile) -> [f64; StageId::COUNT] {
    let tables = p.table_count as f64;
    let features = p.feature_count as f64;
    let fields = p.schema_field_count as f64;
    let geometry_checks = p.geometry_check_count as f64;
    let rules = p.relation_rule_count as f64;
    let columns = p.attribute_column_count as f64;

    [
        0.2 + 0.01 * tables,
        0.5 + 0.05 * tables + 0.000_01 * features,
        0.3 + 0.02 * fields + 0.05 * tables,
        1.0 + 0.000_05 * features * geometry_checks,
        0.5 + 0.000_01 * features * columns,
        1.0 + 0.000_1 * features * rules,
    ]
}

/// Predicts stage durations, calibrated by run history.
#[derive(Debug, Clone)]
pub struct TimePredictor {
    factors: [f64; StageId::COUNT],
    samples: usize,
}

impl Default for TimePredictor {
    fn default() -> Self {
        Self {
            factors: [1.0; StageId::COUNT],
            samples: 0,
        }
    }
}

impl TimePredictor {
    /// An uncalibrated predictor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calibrates against the most recent `window` records of `history`.
    ///
    /// Each stage factor is the mean of `actual / baseline` over the window,
    /// clamped to [0.1, 10].
    pub fn calibrated(history: &[RunStatistics], window: usize) -> Self {
        let recent = &history[history.len().saturating_sub(window)..];
        if recent.is_empty() {
            return Self::default();
        }

        let mut factors = [1.0; StageId::COUNT];
        for (i, factor) in factors.iter_mut().enumerate() {
            let ratios: Vec<f64> = recent
                .iter()
                .filter_map(|r| {
                    let base = baseline_seconds(&DatasetProfile::from(r))[i];
                    let actual = r.per_stage_seconds[i];
                    (base > 0.0 && actual.is_finite() && actual >= 0.0).then(|| actual / base)
                })
                .collect();
            if !ratios.is_empty() {
                let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
                *factor = mean.clamp(MIN_CALIBRATION, MAX_CALIBRATION);
            }
        }
        Self {
            factors,
            samples: recent.len(),
        }
    }

    /// Number of history records the calibration used.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Calibration factor of a stage.
    pub fn factor(&self, stage: StageId) -> f64 {
        self.factors[stage.number()]
    }

    /// Predicts seconds per stage for a dataset.
    pub fn predict_stage_times(&self, profile: &DatasetProfile) -> StagePrediction {
        let mut seconds = baseline_seconds(profile);
        for (s, f) in seconds.iter_mut().zip(self.factors.iter()) {
            *s *= f;
        }
        StagePrediction::from_seconds(seconds)
    }
}

/// Live remaining-time estimator for one run.
#[derive(Debug, Clone, Default)]
pub struct RemainingTimeEstimator {
    stage: Option<StageId>,
    samples: u32,
}

impl RemainingTimeEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a progress sample; samples reset when the stage changes.
    pub fn observe(&mut self, stage: StageId) {
        if self.stage != Some(stage) {
            self.stage = Some(stage);
            self.samples = 0;
        }
        self.samples = self.samples.saturating_add(1);
    }

    /// Samples seen in the current stage.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Estimates the time left.
    ///
    /// `overall_ratio` is overall progress in 0..=1, `elapsed` and
    /// `predicted_total` are seconds.
    pub fn estimate_remaining(
        &self,
        elapsed: f64,
        overall_ratio: f64,
        predicted_total: f64,
    ) -> RemainingEstimate {
        let elapsed = elapsed.max(0.0);
        let predicted_total = predicted_total.max(0.0);

        if !(overall_ratio > 0.0) {
            return RemainingEstimate {
                remaining_seconds: (predicted_total - elapsed).max(0.0),
                confidence: STATIC_CONFIDENCE,
                speed_ratio: 1.0,
            };
        }

        let expected_ratio = if predicted_total > 0.0 {
            (elapsed / predicted_total).min(1.0)
        } else {
            1.0
        };

        if overall_ratio >= 1.0 {
            return RemainingEstimate {
                remaining_seconds: 0.0,
                confidence: 1.0,
                speed_ratio: expected_ratio,
            };
        }

        let samples = f64::from(self.samples);
        let confidence =
            STATIC_CONFIDENCE + 0.85 * samples / (samples + HALF_CONFIDENCE_SAMPLES);
        let observed = elapsed * (1.0 - overall_ratio) / overall_ratio;
        let predicted = predicted_total * (1.0 - overall_ratio);

        RemainingEstimate {
            remaining_seconds: (confidence * observed + (1.0 - confidence) * predicted).max(0.0),
            confidence,
            speed_ratio: expected_ratio / overall_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stats(profile: DatasetProfile, per_stage: [f64; 6]) -> RunStatistics {
        RunStatistics {
            timestamp: Utc::now(),
            target_id: "t".to_string(),
            table_count: profile.table_count,
            feature_count: profile.feature_count,
            schema_field_count: profile.schema_field_count,
            geometry_check_count: profile.geometry_check_count,
            relation_rule_count: profile.relation_rule_count,
            attribute_column_count: profile.attribute_column_count,
            per_stage_seconds: per_stage,
            total_seconds: per_stage.iter().sum(),
        }
    }

    #[test]
    fn test_prediction_sums_to_total() {
        let prediction =
            TimePredictor::new().predict_stage_times(&DatasetProfile::new(10, 1000, 20, 5, 2, 10));
        assert_eq!(prediction.per_stage.len(), 6);
        assert!(prediction.per_stage.values().all(|s| *s >= 0.0));
        let sum: f64 = prediction.per_stage.values().sum();
        assert!((sum - prediction.total).abs() < 1e-9);
    }

    #[test]
    fn test_prediction_is_monotonic() {
        let predictor = TimePredictor::new();
        let base = DatasetProfile::new(10, 1000, 20, 5, 2, 10);
        let bigger = [
            DatasetProfile { table_count: 11, ..base },
            DatasetProfile { feature_count: 5000, ..base },
            DatasetProfile { schema_field_count: 40, ..base },
            DatasetProfile { geometry_check_count: 9, ..base },
            DatasetProfile { relation_rule_count: 3, ..base },
            DatasetProfile { attribute_column_count: 11, ..base },
        ];
        let before = predictor.predict_stage_times(&base);
        for profile in &bigger {
            let after = predictor.predict_stage_times(profile);
            for stage in StageId::ALL {
                assert!(after.stage(stage) >= before.stage(stage));
            }
            assert!(after.total > before.total);
        }
    }

    #[test]
    fn test_calibration_scales_and_clamps() {
        let profile = DatasetProfile::new(10, 1000, 20, 5, 2, 10);
        let base = baseline_seconds(&profile);
        let mut actual = base;
        actual[0] *= 2.0;
        actual[5] *= 100.0;
        let history = vec![stats(profile, actual)];

        let predictor = TimePredictor::calibrated(&history, 20);
        assert_eq!(predictor.sample_count(), 1);
        assert!((predictor.factor(StageId::PreCheck) - 2.0).abs() < 1e-9);
        assert!((predictor.factor(StageId::Table) - 1.0).abs() < 1e-9);
        assert_eq!(predictor.factor(StageId::Relation), 10.0);
    }

    #[test]
    fn test_calibration_window() {
        let profile = DatasetProfile::default();
        let base = baseline_seconds(&profile);
        let slow = base.map(|s| s * 3.0);
        let history = vec![stats(profile, slow), stats(profile, base)];
        let predictor = TimePredictor::calibrated(&history, 1);
        assert!((predictor.factor(StageId::Schema) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_progress_returns_static_prediction() {
        let estimator = RemainingTimeEstimator::new();
        let est = estimator.estimate_remaining(5.0, 0.0, 60.0);
        assert_eq!(est.remaining_seconds, 55.0);
        assert_eq!(est.confidence, STATIC_CONFIDENCE);
        assert_eq!(est.speed_ratio, 1.0);

        let est = estimator.estimate_remaining(90.0, 0.0, 60.0);
        assert_eq!(est.remaining_seconds, 0.0);
    }

    #[test]
    fn test_confidence_grows_with_samples() {
        let mut estimator = RemainingTimeEstimator::new();
        estimator.observe(StageId::Geometry);
        let low = estimator.estimate_remaining(10.0, 0.5, 40.0);
        for _ in 0..20 {
            estimator.observe(StageId::Geometry);
        }
        let high = estimator.estimate_remaining(10.0, 0.5, 40.0);
        assert!(high.confidence > low.confidence);
        assert!(high.confidence < 1.0);

        // running faster than predicted: 25% of the predicted time for 50% of the work
        assert!((high.speed_ratio - 0.5).abs() < 1e-9);
        assert!(high.remaining_seconds < low.remaining_seconds);

        estimator.observe(StageId::Attribute);
        assert_eq!(estimator.samples(), 1);
    }

    #[test]
    fn test_finished_run_has_nothing_left() {
        let est = RemainingTimeEstimator::new().estimate_remaining(30.0, 1.0, 20.0);
        assert_eq!(est.remaining_seconds, 0.0);
        assert_eq!(est.confidence, 1.0);
    }
}
