//! Text codec for workout blocks.
//!
//! A block is a handful of `key: value` metadata lines, a `---` separator and
//! one exercise per line:
//!
//! ```text
//! title: Push Day
//! state: planned
//! restDuration: [90s]
//! ---
//! - [ ] Bench Press | Weight: [(w+2.5){60,80}70] kg | Reps: [(r+1){8,12}10] | Rest: [120s]
//! ```
//!
//! Parsing is permissive: a malformed segment is dropped, a malformed line is
//! skipped, and missing data just leaves optional fields empty.

use crate::duration::{format_human, parse_duration};
use crate::progression_value::parse_progression_value;
use crate::types::*;

const SEPARATOR: &str = "---";

// ============================================================================
// Exercise Lines
// ============================================================================

/// Parse one `- [ ] Name | Key: value unit | ...` line.
///
/// Returns `None` when the line is not an exercise line.
pub fn parse_line(text: &str) -> Option<Exercise> {
    let rest = text.trim().strip_prefix("- [")?;
    let mut chars = rest.chars();
    let state = ExerciseState::from_marker(chars.next()?)?;
    let rest = chars.as_str().strip_prefix(']')?;

    let mut segments = rest.split('|');
    let name = segments.next().unwrap_or("").trim();
    if name.is_empty() {
        return None;
    }

    let mut exercise = Exercise::new(name);
    exercise.state = state;

    for segment in segments {
        let Some((key, value)) = segment.split_once(':') else {
            tracing::debug!("Skipping segment without key: {:?}", segment);
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        if key.eq_ignore_ascii_case("rest") {
            let (inner, _, _) = split_value(value);
            exercise.rest_after = Some(parse_duration(inner));
            continue;
        }

        let kind = ParamKind::of(key);
        let (inner, editable, unit) = split_value(value);
        let progression = parse_progression_value(inner);

        let (value, unit) = if editable || kind == ParamKind::Duration {
            (progression.value.clone(), unit)
        } else {
            // Locked values carry their unit after the first space.
            match progression.value.split_once(char::is_whitespace) {
                Some((v, u)) => (v.to_string(), non_empty(u)),
                None => (progression.value.clone(), None),
            }
        };

        if kind == ParamKind::Duration {
            if editable {
                exercise.target_duration = Some(parse_duration(&value));
            } else {
                exercise.recorded_duration = Some(value.clone());
            }
        }

        exercise.params.push(ExerciseParam {
            key: key.to_string(),
            value,
            editable,
            unit,
            progression_formula: progression.formula,
            initial_value: progression.initial,
            max_value: progression.max,
        });
    }

    Some(exercise)
}

/// Split a segment value into (inner, editable, unit).
///
/// Bracketed values keep whatever follows `]` as the unit. For bare values the
/// unit split happens after progression parsing, except for durations whose
/// value may itself contain a space.
fn split_value(value: &str) -> (&str, bool, Option<String>) {
    let value = value.trim();
    if let Some(inner) = value.strip_prefix('[') {
        if let Some(close) = inner.find(']') {
            return (&inner[..close], true, non_empty(&inner[close + 1..]));
        }
    }
    (value, false, None)
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Render an exercise back to its line form.
pub fn serialize_line(exercise: &Exercise) -> String {
    let mut line = format!("- [{}] {}", exercise.state.marker(), exercise.name);

    for param in &exercise.params {
        line.push_str(" | ");
        line.push_str(&param.key);
        line.push_str(": ");
        if param.editable {
            line.push('[');
            line.push_str(&param.raw_value());
            line.push(']');
        } else {
            line.push_str(&param.raw_value());
        }
        if let Some(unit) = &param.unit {
            line.push(' ');
            line.push_str(unit);
        }
    }

    if let Some(rest) = exercise.rest_after {
        line.push_str(&format!(" | Rest: [{}s]", rest));
    }

    line
}

// ============================================================================
// Whole Blocks
// ============================================================================

/// Parse a whole block. Never fails; unknown lines are ignored.
pub fn parse_workout(text: &str) -> Workout {
    let lines: Vec<&str> = text.lines().collect();
    let separator = lines.iter().position(|l| l.trim() == SEPARATOR);

    let mut workout = Workout::default();
    let body_start = match separator {
        Some(idx) => {
            for line in &lines[..idx] {
                parse_metadata_line(line, &mut workout.metadata);
            }
            idx + 1
        }
        None => 0,
    };

    for (offset, line) in lines[body_start..].iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(mut exercise) => {
                exercise.line = Some(body_start + offset);
                workout.exercises.push(exercise);
            }
            None => tracing::debug!("Skipping non-exercise line: {:?}", line),
        }
    }

    tracing::debug!(
        "Parsed workout '{}' with {} exercises",
        workout.metadata.title,
        workout.exercises.len()
    );
    workout
}

fn parse_metadata_line(line: &str, metadata: &mut WorkoutMetadata) {
    let Some((key, value)) = line.split_once(':') else {
        return;
    };
    let value = value.trim();
    let bracketed = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value)
        .trim();

    match key.trim().to_lowercase().as_str() {
        "title" => metadata.title = value.to_string(),
        "state" => metadata.state = WorkoutState::parse(value),
        "startdate" => metadata.start_date = non_empty(bracketed),
        "duration" => metadata.duration = non_empty(bracketed),
        "restduration" => {
            metadata.rest_duration = non_empty(bracketed).map(|d| parse_duration(&d))
        }
        other => tracing::debug!("Ignoring unknown metadata key '{}'", other),
    }
}

/// Render a whole block. Optional metadata lines appear only when set.
pub fn serialize_workout(workout: &Workout) -> String {
    let meta = &workout.metadata;
    let mut lines = vec![
        format!("title: {}", meta.title),
        format!("state: {}", meta.state.as_str()),
    ];
    if let Some(start) = &meta.start_date {
        lines.push(format!("startDate: [{}]", start));
    }
    if let Some(duration) = &meta.duration {
        lines.push(format!("duration: [{}]", duration));
    }
    if let Some(rest) = meta.rest_duration {
        lines.push(format!("restDuration: [{}]", format_human(rest)));
    }
    lines.push(SEPARATOR.to_string());
    lines.extend(workout.exercises.iter().map(serialize_line));
    lines.join("\n")
}
