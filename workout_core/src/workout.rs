//! Structural operations on a parsed workout.

use crate::duration::format_human;
use crate::progression::{progress_workout, WorkoutProgression};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable key for a workout across re-parses.
///
/// Built from the title and the distinct exercise names in order, so it
/// survives added sets and shifting line numbers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Workout {
    pub fn session_id(&self) -> SessionId {
        let mut seen = HashSet::new();
        let names: Vec<&str> = self
            .exercises
            .iter()
            .map(|e| e.name.as_str())
            .filter(|n| seen.insert(*n))
            .collect();
        SessionId(format!("{}::{}", self.metadata.title, names.join("|")))
    }

    /// Index of the exercise currently in progress.
    pub fn active_index(&self) -> Option<usize> {
        self.exercises
            .iter()
            .position(|e| e.state == ExerciseState::InProgress)
    }

    pub fn first_pending(&self) -> Option<usize> {
        self.exercises
            .iter()
            .position(|e| e.state == ExerciseState::Pending)
    }

    /// First pending exercise after `index`.
    pub fn next_pending_after(&self, index: usize) -> Option<usize> {
        self.exercises
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, e)| e.state == ExerciseState::Pending)
            .map(|(i, _)| i)
    }

    /// Where to go after `index` finishes: the next pending set, else any earlier one.
    pub fn advance_target(&self, index: usize) -> Option<usize> {
        self.next_pending_after(index).or_else(|| self.first_pending())
    }

    /// Rest that applies after the exercise at `index`.
    pub fn rest_after(&self, index: usize) -> Option<u32> {
        self.exercises
            .get(index)
            .and_then(|e| e.rest_after)
            .or(self.metadata.rest_duration)
            .filter(|r| *r > 0)
    }

    /// Names of exercises with any set skipped.
    pub fn skipped_names(&self) -> HashSet<String> {
        self.exercises
            .iter()
            .filter(|e| e.state == ExerciseState::Skipped)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Clone the set at `index` as a fresh pending set right after it.
    pub fn insert_set_after(&mut self, index: usize) -> usize {
        let mut set = self.exercises[index].clone();
        set.state = ExerciseState::Pending;
        set.clear_recorded_duration();
        set.line = None;
        self.exercises.insert(index + 1, set);
        index + 1
    }

    /// Copy with every parameter locked, as handed to the journal.
    pub fn locked_copy(&self) -> Workout {
        let mut copy = self.clone();
        for exercise in &mut copy.exercises {
            for param in &mut exercise.params {
                param.editable = false;
            }
        }
        copy
    }

    /// Return to `planned` and run progression over the finished session.
    ///
    /// Exercises with a skipped set keep their values.
    pub fn reset_with_progression(&mut self) -> WorkoutProgression {
        let skipped = self.skipped_names();

        self.metadata.state = WorkoutState::Planned;
        self.metadata.start_date = None;
        self.metadata.duration = None;
        for exercise in &mut self.exercises {
            exercise.state = ExerciseState::Pending;
            exercise.clear_recorded_duration();
        }

        progress_workout(self, &skipped)
    }
}

impl Exercise {
    /// Store a finished measurement.
    ///
    /// Count-up sets get a locked `Duration` segment; countdown sets keep their
    /// editable target segment and hold the measurement in memory only.
    pub fn record_duration(&mut self, seconds: u32) {
        let text = format_human(seconds);
        self.recorded_duration = Some(text.clone());

        if self.target_duration.is_some() {
            return;
        }
        match self
            .params
            .iter_mut()
            .find(|p| p.kind() == ParamKind::Duration)
        {
            Some(param) => {
                param.value = text;
                param.editable = false;
            }
            None => {
                let mut param = ExerciseParam::new("Duration", text);
                param.editable = false;
                self.params.push(param);
            }
        }
    }

    /// Drop any recorded measurement, keeping countdown targets.
    pub fn clear_recorded_duration(&mut self) {
        self.recorded_duration = None;
        self.params
            .retain(|p| !(p.kind() == ParamKind::Duration && !p.editable));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_workout, serialize_line};

    const BLOCK: &str = "title: Push\nstate: started\n---\n- [x] Bench | Reps: [(r+1){8,12}12]\n- [\\] Bench | Reps: [(r+1){8,12}12]\n- [ ] Dips | Reps: [10] | Rest: [60s]";

    #[test]
    fn test_session_id_ignores_added_sets() {
        let mut workout = parse_workout(BLOCK);
        let id = workout.session_id();
        workout.insert_set_after(1);
        assert_eq!(workout.session_id(), id);
        assert_eq!(id.to_string(), "Push::Bench|Dips");
    }

    #[test]
    fn test_navigation() {
        let workout = parse_workout(BLOCK);
        assert_eq!(workout.active_index(), Some(1));
        assert_eq!(workout.first_pending(), Some(2));
        assert_eq!(workout.next_pending_after(2), None);
        assert_eq!(workout.advance_target(1), Some(2));
    }

    #[test]
    fn test_rest_override_and_default() {
        let mut workout = parse_workout(BLOCK);
        assert_eq!(workout.rest_after(0), None);
        assert_eq!(workout.rest_after(2), Some(60));
        workout.metadata.rest_duration = Some(90);
        assert_eq!(workout.rest_after(0), Some(90));
        assert_eq!(workout.rest_after(2), Some(60));
    }

    #[test]
    fn test_record_duration_count_up_and_countdown() {
        let mut count_up = Exercise::new("Run");
        count_up.record_duration(95);
        assert_eq!(count_up.recorded_duration.as_deref(), Some("1m 35s"));
        assert_eq!(serialize_line(&count_up), "- [ ] Run | Duration: 1m 35s");

        count_up.clear_recorded_duration();
        assert!(count_up.params.is_empty());

        let mut countdown = crate::parser::parse_line("- [ ] Plank | Duration: [60s]").unwrap();
        countdown.record_duration(60);
        assert_eq!(countdown.recorded_duration.as_deref(), Some("1m"));
        assert_eq!(serialize_line(&countdown), "- [ ] Plank | Duration: [60s]");
    }

    #[test]
    fn test_locked_copy() {
        let workout = parse_workout(BLOCK);
        let locked = workout.locked_copy();
        assert!(locked
            .exercises
            .iter()
            .flat_map(|e| &e.params)
            .all(|p| !p.editable));
        assert!(workout.exercises[0].params[0].editable);
    }

    #[test]
    fn test_reset_progresses_and_adds_one_set() {
        let mut workout = parse_workout(BLOCK);
        workout.exercises[1].state = ExerciseState::Completed;
        workout.exercises[2].state = ExerciseState::Completed;
        workout.metadata.start_date = Some("2024-03-01 18:05".into());

        let report = workout.reset_with_progression();

        assert_eq!(workout.metadata.state, WorkoutState::Planned);
        assert_eq!(workout.metadata.start_date, None);
        assert_eq!(report.sets_added, vec!["Bench".to_string()]);
        let names: Vec<_> = workout.exercises.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Bench", "Bench", "Bench", "Dips"]);
        assert!(workout
            .exercises
            .iter()
            .all(|e| e.state == ExerciseState::Pending));
        for bench in &workout.exercises[..3] {
            assert_eq!(bench.params[0].value, "8");
        }
    }

    #[test]
    fn test_reset_skipped_exercise_does_not_progress() {
        let mut workout = parse_workout(
            "title: Pull\nstate: started\n---\n- [x] Row | Reps: [(r+1){8,12}10]\n- [-] Row | Reps: [(r+1){8,12}10]\n- [x] Curl | Reps: [(r+1){8,12}10]",
        );

        workout.reset_with_progression();

        assert_eq!(workout.exercises[0].params[0].value, "10");
        assert_eq!(workout.exercises[1].params[0].value, "10");
        assert_eq!(workout.exercises[2].params[0].value, "11");
    }
}
