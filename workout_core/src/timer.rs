//! Per-workout timers.
//!
//! A [`WorkoutTimer`] tracks three clocks: workout elapsed (runs from start
//! until the timer stops, regardless of pauses), exercise elapsed (paused and
//! resumed with the active set, reset on advance) and a rest countdown.
//! All methods take an explicit `now` so callers decide where time comes from.

use crate::workout::SessionId;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimerState {
    #[default]
    Idle,
    Running,
    Paused,
    Resting,
}

/// What a tick observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    None,
    /// The active set's countdown target has been reached
    CountdownElapsed,
    /// The rest countdown reached zero
    RestElapsed,
}

#[derive(Clone, Debug, PartialEq)]
struct Rest {
    started_at: DateTime<Utc>,
    seconds: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkoutTimer {
    state: TimerState,
    workout_started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    active_index: Option<usize>,
    exercise_accumulated_ms: i64,
    segment_started_at: Option<DateTime<Utc>>,
    countdown: Option<u32>,
    rest: Option<Rest>,
}

fn whole_seconds(delta: Duration) -> u32 {
    delta.num_seconds().clamp(0, u32::MAX as i64) as u32
}

impl WorkoutTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the workout clock at `started_at` and the first set at `now`.
    pub fn start(
        &mut self,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
        index: usize,
        countdown: Option<u32>,
    ) {
        self.workout_started_at = Some(started_at);
        self.stopped_at = None;
        self.begin_exercise(now, index, countdown);
        tracing::debug!("Timer started on exercise {}", index);
    }

    /// Make `index` the active set with a zeroed exercise clock.
    pub fn begin_exercise(&mut self, now: DateTime<Utc>, index: usize, countdown: Option<u32>) {
        self.active_index = Some(index);
        self.exercise_accumulated_ms = 0;
        self.segment_started_at = Some(now);
        self.countdown = countdown;
        self.rest = None;
        self.state = TimerState::Running;
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != TimerState::Running {
            return false;
        }
        self.close_segment(now);
        self.state = TimerState::Paused;
        true
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != TimerState::Paused {
            return false;
        }
        self.segment_started_at = Some(now);
        self.state = TimerState::Running;
        true
    }

    /// Freeze the exercise clock and count down `seconds` of rest.
    pub fn begin_rest(&mut self, now: DateTime<Utc>, seconds: u32) {
        self.close_segment(now);
        self.rest = Some(Rest {
            started_at: now,
            seconds,
        });
        self.state = TimerState::Resting;
    }

    pub fn end_rest(&mut self) {
        self.rest = None;
        if self.state == TimerState::Resting {
            self.state = TimerState::Paused;
        }
    }

    /// Point the timer at a different set, e.g. after an undo in the text.
    pub fn set_active_index(&mut self, now: DateTime<Utc>, index: usize, countdown: Option<u32>) {
        if self.active_index != Some(index) {
            self.begin_exercise(now, index, countdown);
        }
    }

    /// Stop every clock. Safe to call repeatedly.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if self.state == TimerState::Idle {
            return;
        }
        self.close_segment(now);
        self.rest = None;
        self.stopped_at = Some(now);
        self.state = TimerState::Idle;
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_index
    }

    /// Seconds since start, frozen once the timer stops.
    pub fn workout_elapsed(&self, now: DateTime<Utc>) -> u32 {
        let end = self.stopped_at.unwrap_or(now);
        self.workout_started_at
            .map(|start| whole_seconds(end - start))
            .unwrap_or(0)
    }

    pub fn exercise_elapsed(&self, now: DateTime<Utc>) -> u32 {
        let open = self
            .segment_started_at
            .map(|start| (now - start).num_milliseconds())
            .unwrap_or(0);
        ((self.exercise_accumulated_ms + open) / 1000).clamp(0, u32::MAX as i64) as u32
    }

    pub fn rest_remaining(&self, now: DateTime<Utc>) -> Option<u32> {
        self.rest.as_ref().map(|rest| {
            rest.seconds
                .saturating_sub(whole_seconds(now - rest.started_at))
        })
    }

    pub fn countdown_remaining(&self, now: DateTime<Utc>) -> Option<u32> {
        self.countdown
            .map(|target| target.saturating_sub(self.exercise_elapsed(now)))
    }

    pub fn tick(&self, now: DateTime<Utc>) -> TimerEvent {
        match self.state {
            TimerState::Resting if self.rest_remaining(now) == Some(0) => TimerEvent::RestElapsed,
            TimerState::Running if self.countdown_remaining(now) == Some(0) => {
                TimerEvent::CountdownElapsed
            }
            _ => TimerEvent::None,
        }
    }

    fn close_segment(&mut self, now: DateTime<Utc>) {
        if let Some(start) = self.segment_started_at.take() {
            self.exercise_accumulated_ms += (now - start).num_milliseconds();
        }
    }
}

/// Timers keyed by session identity.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: HashMap<SessionId, WorkoutTimer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &SessionId) -> Option<&WorkoutTimer> {
        self.timers.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut WorkoutTimer> {
        self.timers.get_mut(id)
    }

    pub fn get_or_create(&mut self, id: &SessionId) -> &mut WorkoutTimer {
        self.timers.entry(id.clone()).or_default()
    }

    /// Stop and forget a timer. Returns whether one existed.
    pub fn remove(&mut self, id: &SessionId, now: DateTime<Utc>) -> bool {
        match self.timers.remove(id) {
            Some(mut timer) => {
                timer.stop(now);
                tracing::debug!("Removed timer for {}", id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    #[test]
    fn test_pause_only_affects_exercise_clock() {
        let mut timer = WorkoutTimer::new();
        timer.start(at(0), at(0), 0, None);

        assert!(timer.pause(at(30)));
        assert!(!timer.pause(at(31)));
        assert_eq!(timer.exercise_elapsed(at(90)), 30);
        assert_eq!(timer.workout_elapsed(at(90)), 90);

        assert!(timer.resume(at(90)));
        assert_eq!(timer.exercise_elapsed(at(100)), 40);
        assert_eq!(timer.workout_elapsed(at(100)), 100);
    }

    #[test]
    fn test_advance_resets_exercise_clock_only() {
        let mut timer = WorkoutTimer::new();
        timer.start(at(0), at(0), 0, None);
        timer.begin_exercise(at(50), 1, None);

        assert_eq!(timer.active_index(), Some(1));
        assert_eq!(timer.exercise_elapsed(at(60)), 10);
        assert_eq!(timer.workout_elapsed(at(60)), 60);
    }

    #[test]
    fn test_rest_countdown() {
        let mut timer = WorkoutTimer::new();
        timer.start(at(0), at(0), 0, None);
        timer.begin_rest(at(20), 60);

        assert_eq!(timer.state(), TimerState::Resting);
        assert_eq!(timer.exercise_elapsed(at(50)), 20);
        assert_eq!(timer.rest_remaining(at(50)), Some(30));
        assert_eq!(timer.tick(at(50)), TimerEvent::None);
        assert_eq!(timer.tick(at(80)), TimerEvent::RestElapsed);
        assert_eq!(timer.rest_remaining(at(500)), Some(0));

        timer.end_rest();
        assert_eq!(timer.rest_remaining(at(80)), None);
    }

    #[test]
    fn test_countdown_tick() {
        let mut timer = WorkoutTimer::new();
        timer.start(at(0), at(0), 0, Some(45));

        assert_eq!(timer.countdown_remaining(at(40)), Some(5));
        assert_eq!(timer.tick(at(40)), TimerEvent::None);
        assert_eq!(timer.tick(at(45)), TimerEvent::CountdownElapsed);

        timer.pause(at(45));
        assert_eq!(timer.tick(at(100)), TimerEvent::None);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut timer = WorkoutTimer::new();
        timer.start(at(0), at(0), 0, None);
        timer.stop(at(10));
        timer.stop(at(20));
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.exercise_elapsed(at(30)), 10);
        assert_eq!(timer.workout_elapsed(at(30)), 10);
        assert_eq!(timer.workout_elapsed(at(3000)), 10);

        timer.start(at(100), at(100), 0, None);
        assert_eq!(timer.workout_elapsed(at(130)), 30);
    }

    #[test]
    fn test_registry_lifecycle() {
        let id = crate::parser::parse_workout("title: A\n---\n- [ ] Row").session_id();
        let mut registry = TimerRegistry::new();

        registry.get_or_create(&id).start(at(0), at(0), 0, None);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&id).is_some());

        assert!(registry.remove(&id, at(5)));
        assert!(!registry.remove(&id, at(6)));
        assert!(registry.is_empty());
    }
}
