//! Core domain types for workout blocks.
//!
//! This module defines the structured form of one workout block:
//! - Workout metadata and lifecycle state
//! - Exercises (one line, one set) and their checkbox state
//! - Typed exercise parameters with optional progression rules

use crate::progression_value::{format_progression_value, ProgressionValue};
use serde::{Deserialize, Serialize};

// ============================================================================
// Workout Types
// ============================================================================

/// Lifecycle state of a whole workout
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutState {
    #[default]
    Planned,
    Started,
    Completed,
}

impl WorkoutState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutState::Planned => "planned",
            WorkoutState::Started => "started",
            WorkoutState::Completed => "completed",
        }
    }

    /// Parse a metadata value; unknown text reads as `planned`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "started" => WorkoutState::Started,
            "completed" => WorkoutState::Completed,
            _ => WorkoutState::Planned,
        }
    }
}

/// Header fields above the `---` separator
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkoutMetadata {
    pub title: String,
    pub state: WorkoutState,
    /// `YYYY-MM-DD HH:MM`, set on start
    pub start_date: Option<String>,
    /// Human duration, set on completion
    pub duration: Option<String>,
    /// Default rest between sets, seconds
    pub rest_duration: Option<u32>,
}

/// One parsed workout block
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub metadata: WorkoutMetadata,
    pub exercises: Vec<Exercise>,
}

// ============================================================================
// Exercise Types
// ============================================================================

/// Checkbox state of a single set
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl ExerciseState {
    pub fn from_marker(c: char) -> Option<Self> {
        match c {
            ' ' => Some(ExerciseState::Pending),
            '\\' => Some(ExerciseState::InProgress),
            'x' | 'X' => Some(ExerciseState::Completed),
            '-' => Some(ExerciseState::Skipped),
            _ => None,
        }
    }

    pub fn marker(&self) -> char {
        match self {
            ExerciseState::Pending => ' ',
            ExerciseState::InProgress => '\\',
            ExerciseState::Completed => 'x',
            ExerciseState::Skipped => '-',
        }
    }

    /// Completed or skipped
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExerciseState::Completed | ExerciseState::Skipped)
    }
}

/// One exercise line, i.e. one set
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub name: String,
    pub state: ExerciseState,
    pub params: Vec<ExerciseParam>,
    /// Countdown target from an editable `Duration` segment
    pub target_duration: Option<u32>,
    /// Finished measurement from a locked `Duration` segment
    pub recorded_duration: Option<String>,
    /// Per-set rest override, seconds
    pub rest_after: Option<u32>,
    /// Zero-based line inside the block body, when parsed from text
    #[serde(skip)]
    pub line: Option<usize>,
}

impl Exercise {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn param(&self, kind: ParamKind) -> Option<&ExerciseParam> {
        self.params.iter().find(|p| p.kind() == kind)
    }

    pub fn param_by_key(&self, key: &str) -> Option<&ExerciseParam> {
        self.params.iter().find(|p| p.key.eq_ignore_ascii_case(key))
    }

    pub fn param_by_key_mut(&mut self, key: &str) -> Option<&mut ExerciseParam> {
        self.params
            .iter_mut()
            .find(|p| p.key.eq_ignore_ascii_case(key))
    }
}

// ============================================================================
// Parameter Types
// ============================================================================

/// Keys that get special treatment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Weight,
    Reps,
    Duration,
    Other,
}

impl ParamKind {
    pub fn of(key: &str) -> Self {
        match key.trim().to_lowercase().as_str() {
            "weight" => ParamKind::Weight,
            "reps" => ParamKind::Reps,
            "duration" => ParamKind::Duration,
            _ => ParamKind::Other,
        }
    }
}

/// One `Key: value unit` segment of an exercise line
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ExerciseParam {
    pub key: String,
    pub value: String,
    /// `[value]` is editable, bare `value` is locked
    pub editable: bool,
    pub unit: Option<String>,
    pub progression_formula: Option<String>,
    pub initial_value: Option<String>,
    pub max_value: Option<String>,
}

impl ExerciseParam {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            editable: true,
            ..Self::default()
        }
    }

    pub fn kind(&self) -> ParamKind {
        ParamKind::of(&self.key)
    }

    /// Formula variable bound to this parameter: the lowercased first letter of its key.
    pub fn variable(&self) -> Option<char> {
        self.key
            .trim()
            .chars()
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_lowercase())
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    pub fn progression(&self) -> ProgressionValue {
        ProgressionValue {
            value: self.value.clone(),
            formula: self.progression_formula.clone(),
            initial: self.initial_value.clone(),
            max: self.max_value.clone(),
        }
    }

    pub fn set_progression(&mut self, progression: ProgressionValue) {
        self.value = progression.value;
        self.progression_formula = progression.formula;
        self.initial_value = progression.initial;
        self.max_value = progression.max;
    }

    /// The value in progression-codec syntax, without brackets or unit.
    pub fn raw_value(&self) -> String {
        format_progression_value(
            &self.value,
            self.progression_formula.as_deref(),
            self.initial_value.as_deref(),
            self.max_value.as_deref(),
        )
    }
}
