//! Progression logic for evolving targets between sessions.
//!
//! Each parameter may carry a formula and `{initial,max}` bounds. Progression
//! runs in two passes over one set's parameters:
//! - Pass 1: bounded parameters other than weight advance, cap at max, or wrap
//!   back to initial once they were already at max.
//! - Pass 2: weight and unbounded parameters advance only when something in
//!   pass 1 wrapped, reading the values pass 1 produced.
//!
//! A set is added when reps wrapped and weight wrapped too (or there is no
//! weight parameter).

use crate::duration::parse_duration;
use crate::error::EvaluationError;
use crate::formula::{evaluate, Variables};
use crate::types::{ExerciseParam, ParamKind, Workout};
use std::collections::HashSet;

/// What happened to one parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepKind {
    /// Took the evaluated value
    Advanced,
    /// Clamped to max on the way up
    Capped,
    /// Was already at max; reset to initial
    Wrapped,
}

/// A single parameter change.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamChange {
    pub key: String,
    pub from: String,
    pub to: String,
    pub kind: StepKind,
}

/// A formula that could not be evaluated; the parameter kept its value.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressionFailure {
    pub key: String,
    pub error: EvaluationError,
}

/// Result of progressing one set.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressionOutcome {
    pub params: Vec<ExerciseParam>,
    pub should_add_set: bool,
    pub changes: Vec<ParamChange>,
    pub failures: Vec<ProgressionFailure>,
}

struct Step {
    value: String,
    numeric: f64,
    kind: StepKind,
}

/// Apply every parameter's formula to one set.
///
/// Pure: identical input always yields identical output.
pub fn apply_progression(params: &[ExerciseParam]) -> ProgressionOutcome {
    let mut next = params.to_vec();
    let mut variables = variables_for(params);
    let mut wrapped = vec![false; params.len()];
    let mut changes = Vec::new();
    let mut failures = Vec::new();

    // Pass 1: unconditional bounded parameters
    for (i, param) in params.iter().enumerate() {
        if !is_unconditional(param) {
            continue;
        }
        match step(param, &variables) {
            Ok(step) => {
                if let Some(var) = param.variable() {
                    variables.insert(var, step.numeric);
                }
                wrapped[i] = step.kind == StepKind::Wrapped;
                record(&mut next[i], step, &mut changes);
            }
            Err(error) => fail(param, error, &mut failures),
        }
    }

    // Pass 2 reads the pass-1 snapshot and never writes back to it.
    let snapshot = variables;
    if wrapped.iter().any(|w| *w) {
        for (i, param) in params.iter().enumerate() {
            if !is_conditional(param) {
                continue;
            }
            match step(param, &snapshot) {
                Ok(step) => {
                    wrapped[i] = step.kind == StepKind::Wrapped;
                    record(&mut next[i], step, &mut changes);
                }
                Err(error) => fail(param, error, &mut failures),
            }
        }
    } else {
        tracing::debug!("No bounded parameter wrapped; conditional parameters unchanged");
    }

    let wrapped_kind = |kind: ParamKind| {
        params
            .iter()
            .position(|p| p.kind() == kind)
            .map(|i| wrapped[i])
    };
    let should_add_set = wrapped_kind(ParamKind::Reps).unwrap_or(false)
        && wrapped_kind(ParamKind::Weight).unwrap_or(true);

    ProgressionOutcome {
        params: next,
        should_add_set,
        changes,
        failures,
    }
}

/// Bounded, has a formula, and is not weight.
fn is_unconditional(param: &ExerciseParam) -> bool {
    param.kind() != ParamKind::Weight
        && param.progression_formula.is_some()
        && bound(&param.max_value).is_some()
}

/// Weight, or any formula-driven parameter without a max.
fn is_conditional(param: &ExerciseParam) -> bool {
    param.progression_formula.is_some() && !is_unconditional(param)
}

fn variables_for(params: &[ExerciseParam]) -> Variables {
    params
        .iter()
        .filter(|p| p.kind() != ParamKind::Duration)
        .filter_map(|p| Some((p.variable()?, p.numeric_value()?)))
        .collect()
}

fn bound(value: &Option<String>) -> Option<f64> {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn step(param: &ExerciseParam, variables: &Variables) -> Result<Step, EvaluationError> {
    let formula = param.progression_formula.as_deref().unwrap_or_default();
    let evaluated = round2(evaluate(formula, variables)?);

    match bound(&param.max_value) {
        Some(max) if evaluated > max => {
            let current = param.numeric_value();
            if current.is_some_and(|c| c >= max) {
                let value = param
                    .initial_value
                    .clone()
                    .unwrap_or_else(|| param.value.clone());
                let numeric = value.trim().parse::<f64>().ok().or(current).unwrap_or(max);
                Ok(Step {
                    value,
                    numeric,
                    kind: StepKind::Wrapped,
                })
            } else {
                Ok(Step {
                    value: format_number(max),
                    numeric: max,
                    kind: StepKind::Capped,
                })
            }
        }
        _ => Ok(Step {
            value: format_number(evaluated),
            numeric: evaluated,
            kind: StepKind::Advanced,
        }),
    }
}

fn record(param: &mut ExerciseParam, step: Step, changes: &mut Vec<ParamChange>) {
    tracing::debug!(
        "Progression {}: {} -> {} ({:?})",
        param.key,
        param.value,
        step.value,
        step.kind
    );
    changes.push(ParamChange {
        key: param.key.clone(),
        from: param.value.clone(),
        to: step.value.clone(),
        kind: step.kind,
    });
    param.value = step.value;
}

fn fail(param: &ExerciseParam, error: EvaluationError, failures: &mut Vec<ProgressionFailure>) {
    tracing::warn!(
        "Formula for '{}' failed ({}); keeping {}",
        param.key,
        error,
        param.value
    );
    failures.push(ProgressionFailure {
        key: param.key.clone(),
        error,
    });
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render a number without trailing zeros: `8`, `72.5`, `61.25`.
pub fn format_number(value: f64) -> String {
    let rounded = round2(value);
    if rounded.fract() == 0.0 {
        return format!("{}", rounded as i64);
    }
    let text = format!("{:.2}", rounded);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

// ============================================================================
// Whole-Workout Progression
// ============================================================================

/// Summary of progressing every set of a workout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkoutProgression {
    pub progressed_sets: usize,
    pub sets_added: Vec<String>,
    pub failures: Vec<(String, ProgressionFailure)>,
}

/// Progress every set whose exercise name is not in `skipped`.
///
/// Exercises that signal a new set get exactly one more set after their last
/// occurrence, and all their sets take the reps/weight of the signalling set.
pub fn progress_workout(workout: &mut Workout, skipped: &HashSet<String>) -> WorkoutProgression {
    let mut report = WorkoutProgression::default();
    let mut add_set_for: Vec<(String, Vec<ExerciseParam>)> = Vec::new();

    for exercise in &mut workout.exercises {
        if skipped.contains(&exercise.name) {
            continue;
        }
        let outcome = apply_progression(&exercise.params);
        exercise.params = outcome.params;
        exercise.target_duration = exercise
            .param(ParamKind::Duration)
            .filter(|p| p.editable)
            .map(|p| parse_duration(&p.value));
        report.progressed_sets += 1;
        report.failures.extend(
            outcome
                .failures
                .into_iter()
                .map(|f| (exercise.name.clone(), f)),
        );
        if outcome.should_add_set && !add_set_for.iter().any(|(n, _)| n == &exercise.name) {
            add_set_for.push((exercise.name.clone(), exercise.params.clone()));
        }
    }

    for (name, params) in add_set_for {
        for exercise in workout.exercises.iter_mut().filter(|e| e.name == name) {
            for kind in [ParamKind::Reps, ParamKind::Weight] {
                let Some(source) = params.iter().find(|p| p.kind() == kind) else {
                    continue;
                };
                if let Some(target) = exercise.params.iter_mut().find(|p| p.kind() == kind) {
                    target.value = source.value.clone();
                }
            }
        }

        if let Some(last) = workout.exercises.iter().rposition(|e| e.name == name) {
            workout.insert_set_after(last);
            tracing::info!("Progression added a set to '{}'", name);
        }
        report.sets_added.push(name);
    }

    report
}
