//! Sequential execution of relation rules.

use super::{RelationCheckStrategy, RuleRun};
use crate::progress::{RuleProgress, RuleProgressReporter};
use crate::stages::{StageContext, StageTick};
use crate::{RelationCheckError, StageError};
use spatialcheck_core::{
    Rule, RuleOutcome, RuleReport, Severity, StageResult, ValidationError, ValidationResult,
};
use std::time::Instant;
use tracing::{debug, error, warn};

pub const INVALID_RULE: &str = "REL_INVALID_RULE";
pub const UNSUPPORTED_CASE_TYPE: &str = "REL_UNSUPPORTED_CASE_TYPE";
pub const LAYER_NOT_FOUND: &str = "REL_LAYER_NOT_FOUND";
pub const STRATEGY_FAILED: &str = "REL_STRATEGY_FAILED";

/// Runs every relation rule in order.
///
/// A rule never fails the stage: skipped and failed rules are reported in
/// `summary.rules` and as findings. Only cancellation interrupts the loop.
pub(crate) fn run_relation_stage(
    ctx: &StageContext<'_>,
    result: &mut ValidationResult,
    summary: &mut StageResult,
) -> Result<(), StageError> {
    let rules = &ctx.configs.relation.rules;
    let count = rules.len();

    for (index, rule) in rules.iter().enumerate() {
        ctx.check_cancelled()?;

        let (report, cancelled) = run_rule(ctx, result, rule, index, count);
        summary.rules.push(report);
        if cancelled {
            return Err(StageError::Cancelled);
        }
        summary.processed_units += 1;
    }
    Ok(())
}

/// Runs one rule; the flag is true if it stopped on cancellation.
fn run_rule(
    ctx: &StageContext<'_>,
    result: &mut ValidationResult,
    rule: &Rule,
    index: usize,
    count: usize,
) -> (RuleReport, bool) {
    let started = Instant::now();
    let mut report = RuleReport {
        rule_id: rule.rule_id.clone(),
        case_type: rule.case_type.clone(),
        outcome: RuleOutcome::Completed,
        errors_added: 0,
        elapsed_ms: 0,
    };

    if !rule.enabled {
        debug!(rule_id = %rule.rule_id, "rule disabled");
        report.outcome = RuleOutcome::Skipped {
            reason: "disabled".to_string(),
        };
        return (report, false);
    }

    let forward = |p: RuleProgress| {
        let progress = (index as f64 * 100.0 + f64::from(p.percent)) / count as f64;
        (ctx.tick)(StageTick {
            progress,
            processed: p.processed,
            total: p.total,
            message: format!("{} ({}): {}%", p.rule_id, p.case_type, p.percent),
            current_rule: Some(p.rule_id),
            error_count: p.error_count,
            warning_count: p.warning_count,
            force: true,
        });
    };

    let mut progress = RuleProgressReporter::new(
        &rule.rule_id,
        &rule.case_type,
        ctx.options.progress_interval,
        &forward,
    );
    let strategy = match prepare(ctx, rule) {
        Ok(strategy) => strategy,
        Err(e) => {
            skip_rule(result, rule, &e, &mut report);
            progress.set_counts(result.error_count(), result.warning_count());
            progress.finish(false);
            report.elapsed_ms = elapsed_ms(started);
            return (report, false);
        }
    };

    debug!(rule_id = %rule.rule_id, case_type = %rule.case_type, "running rule");
    let mut run = RuleRun::new(
        ctx.data_source,
        &ctx.configs.table,
        ctx.engine,
        result,
        rule,
        progress,
        ctx.cancel,
    );
    let outcome = strategy.execute(&mut run);
    report.errors_added = run.errors_added();

    let mut cancelled = false;
    let successful = match outcome {
        Ok(()) => {
            debug!(rule_id = %rule.rule_id, errors = report.errors_added, "rule completed");
            true
        }
        Err(RelationCheckError::Cancelled) => {
            debug!(rule_id = %rule.rule_id, "rule cancelled");
            report.outcome = RuleOutcome::Skipped {
                reason: "cancelled".to_string(),
            };
            cancelled = true;
            false
        }
        Err(e) if e.is_skip() => {
            skip_rule(run.result_mut(), rule, &e, &mut report);
            false
        }
        Err(e) => {
            error!(rule_id = %rule.rule_id, case_type = %rule.case_type, error = %e, "rule failed");
            run.result_mut().push_error(ValidationError::new(
                STRATEGY_FAILED,
                format!("Rule '{}' ({}) failed: {e}", rule.rule_id, rule.case_type),
                Severity::Error,
            ));
            report.outcome = RuleOutcome::Failed {
                reason: e.to_string(),
            };
            false
        }
    };
    // every outcome, cancellation included, ends with a terminal event
    run.finish_progress(successful);

    report.elapsed_ms = elapsed_ms(started);
    (report, cancelled)
}

/// Validates the rule and resolves its strategy.
fn prepare(
    ctx: &StageContext<'_>,
    rule: &Rule,
) -> Result<Box<dyn RelationCheckStrategy>, RelationCheckError> {
    rule.validate()?;
    let strategy = ctx.registry.resolve(&rule.case_type)?;
    rule.require_layers(strategy.required_layers())?;
    Ok(strategy)
}

fn skip_rule(
    result: &mut ValidationResult,
    rule: &Rule,
    err: &RelationCheckError,
    report: &mut RuleReport,
) {
    warn!(rule_id = %rule.rule_id, case_type = %rule.case_type, reason = %err, "rule skipped");
    let code = match err {
        RelationCheckError::UnsupportedCaseType(_) => UNSUPPORTED_CASE_TYPE,
        RelationCheckError::MissingLayer { .. } => LAYER_NOT_FOUND,
        _ => INVALID_RULE,
    };
    result.push_warning(ValidationError::new(
        code,
        format!("Rule '{}' skipped: {err}", rule.rule_id),
        Severity::Warning,
    ));
    report.outcome = RuleOutcome::Skipped {
        reason: err.to_string(),
    };
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
