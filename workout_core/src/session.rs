//! Session state machine.
//!
//! A [`Session`] owns one parsed workout while it is being performed. The
//! [`SessionManager`] applies transitions to it, keeps one timer per session
//! identity, and flushes the serialized block after every text-changing
//! transition:
//!
//! - start: `planned -> started`, first pending set becomes in progress
//! - finish: record elapsed time, then rest (if configured and another set
//!   follows) or complete and advance
//! - rest complete/skipped: complete the resting set and advance
//! - add set: complete the active set and insert a copy after it
//! - skip: mark skipped and advance without rest
//!
//! When nothing is left to advance to, the workout completes: it is logged
//! with every field locked, then reset to `planned` with progression applied.
//!
//! The text is the source of truth. [`SessionManager::reconcile`] realigns or
//! stops timers after the block was re-read, e.g. when the user undid an edit.

use crate::duration::{format_human, parse_duration};
use crate::error::PersistenceError;
use crate::journal::WorkoutLog;
use crate::parser::{parse_workout, serialize_workout};
use crate::progression::WorkoutProgression;
use crate::store::BlockStore;
use crate::timer::{TimerEvent, TimerRegistry, TimerState, WorkoutTimer};
use crate::types::{ExerciseState, ParamKind, Workout, WorkoutState};
use crate::workout::SessionId;
use crate::{Error, Result};
use chrono::{DateTime, Local, NaiveDateTime, Utc};

const START_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One workout being performed
#[derive(Clone, Debug)]
pub struct Session {
    workout: Workout,
    block_index: usize,
    pending_changes: bool,
}

impl Session {
    pub fn new(workout: Workout, block_index: usize) -> Self {
        Self {
            workout,
            block_index,
            pending_changes: false,
        }
    }

    pub fn workout(&self) -> &Workout {
        &self.workout
    }

    pub fn block_index(&self) -> usize {
        self.block_index
    }

    pub fn id(&self) -> SessionId {
        self.workout.session_id()
    }

    /// True when the last flush failed and the text is behind memory.
    pub fn has_pending_changes(&self) -> bool {
        self.pending_changes
    }
}

/// Summary handed back when a workout completes
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionReport {
    pub duration: String,
    pub progression: WorkoutProgression,
}

/// What a transition did
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    Started { index: usize },
    Resting { index: usize, seconds: u32 },
    Advanced { from: usize, to: usize },
    SetAdded { index: usize },
    Paused,
    Resumed,
    Edited,
    Completed(CompletionReport),
    Unchanged,
}

/// Outcome of reconciling timers with freshly parsed text
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciled {
    Unchanged,
    /// Text is no longer `started`; timer dropped
    Stopped,
    /// Text points at another active set; timer moved
    Realigned { from: Option<usize>, to: usize },
    /// Started workout without a timer; one was created
    Resumed { index: usize },
}

pub struct SessionManager<S: BlockStore, L: WorkoutLog> {
    store: S,
    log: L,
    timers: TimerRegistry,
    auto_finish_countdown: bool,
}

impl<S: BlockStore, L: WorkoutLog> SessionManager<S, L> {
    pub fn new(store: S, log: L) -> Self {
        Self {
            store,
            log,
            timers: TimerRegistry::new(),
            auto_finish_countdown: true,
        }
    }

    pub fn with_auto_finish(mut self, enabled: bool) -> Self {
        self.auto_finish_countdown = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn timer(&self, session: &Session) -> Option<&WorkoutTimer> {
        self.timers.get(&session.id())
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Parse a block from the store and attach any timer state to it.
    pub fn open(&mut self, block_index: usize, now: DateTime<Utc>) -> Result<Session> {
        let text = self
            .store
            .read_block(block_index)?
            .ok_or(PersistenceError::MissingContext)?;
        let session = Session::new(parse_workout(&text), block_index);
        self.reconcile(session.workout(), now);
        Ok(session)
    }

    /// Re-read the block, unless memory holds changes the text has not seen.
    pub fn reload(&mut self, session: &mut Session, now: DateTime<Utc>) -> Result<Reconciled> {
        if session.pending_changes {
            tracing::warn!("Not reloading '{}': unflushed changes", session.workout.metadata.title);
            return Ok(Reconciled::Unchanged);
        }
        let text = self
            .store
            .read_block(session.block_index)?
            .ok_or(PersistenceError::MissingContext)?;
        session.workout = parse_workout(&text);
        Ok(self.reconcile(session.workout(), now))
    }

    /// Bring the timer for `workout` in line with its text.
    pub fn reconcile(&mut self, workout: &Workout, now: DateTime<Utc>) -> Reconciled {
        let id = workout.session_id();
        let started = workout.metadata.state == WorkoutState::Started;
        let active = workout.active_index();
        let countdown = active.and_then(|i| workout.exercises[i].target_duration);

        if !started {
            if self.timers.remove(&id, now) {
                tracing::warn!(
                    "Workout '{}' is no longer started; timer stopped",
                    workout.metadata.title
                );
                return Reconciled::Stopped;
            }
            return Reconciled::Unchanged;
        }
        let Some(index) = active else {
            return Reconciled::Unchanged;
        };

        if let Some(timer) = self.timers.get_mut(&id) {
            let from = timer.active_index();
            if from == Some(index) {
                return Reconciled::Unchanged;
            }
            timer.set_active_index(now, index, countdown);
            tracing::warn!("Timer realigned from {:?} to exercise {}", from, index);
            return Reconciled::Realigned { from, to: index };
        }

        let started_at = workout
            .metadata
            .start_date
            .as_deref()
            .and_then(parse_start_date)
            .unwrap_or(now);
        self.timers
            .get_or_create(&id)
            .start(started_at, now, index, countdown);
        tracing::info!("Resumed timer for '{}'", workout.metadata.title);
        Reconciled::Resumed { index }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    pub fn start(&mut self, session: &mut Session, now: DateTime<Utc>) -> Result<Transition> {
        if session.workout.metadata.state == WorkoutState::Started {
            return Err(Error::State("workout already started".into()));
        }
        let index = session
            .workout
            .first_pending()
            .ok_or_else(|| Error::State("no pending exercise to start".into()))?;

        let workout = &mut session.workout;
        workout.metadata.state = WorkoutState::Started;
        workout.metadata.start_date = Some(format_start_date(now));
        workout.metadata.duration = None;
        workout.exercises[index].state = ExerciseState::InProgress;
        let countdown = workout.exercises[index].target_duration;

        self.timers
            .get_or_create(&session.id())
            .start(now, now, index, countdown);
        tracing::info!("Started workout '{}'", session.workout.metadata.title);

        self.flush(session)?;
        Ok(Transition::Started { index })
    }

    /// Finish the active set: rest if configured and another set follows,
    /// otherwise complete it and move on.
    pub fn finish_exercise(
        &mut self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let index = active_index(session)?;
        let timer = self.ensure_timer(session, now);
        if timer.state() == TimerState::Resting {
            return Err(Error::State("exercise already finished; resting".into()));
        }

        let elapsed = timer.exercise_elapsed(now);
        session.workout.exercises[index].record_duration(elapsed);

        let transition = match session.workout.rest_after(index) {
            Some(seconds) if session.workout.next_pending_after(index).is_some() => {
                timer.begin_rest(now, seconds);
                tracing::debug!("Resting {}s after exercise {}", seconds, index);
                Transition::Resting { index, seconds }
            }
            _ => {
                session.workout.exercises[index].state = ExerciseState::Completed;
                self.advance(session, index, now)
            }
        };

        self.flush(session)?;
        Ok(transition)
    }

    /// End rest early or on time; both complete the resting set.
    pub fn complete_rest(
        &mut self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let index = active_index(session)?;
        let timer = self.ensure_timer(session, now);
        if timer.state() != TimerState::Resting {
            return Err(Error::State("not resting".into()));
        }
        timer.end_rest();

        session.workout.exercises[index].state = ExerciseState::Completed;
        let transition = self.advance(session, index, now);
        self.flush(session)?;
        Ok(transition)
    }

    pub fn skip_rest(&mut self, session: &mut Session, now: DateTime<Utc>) -> Result<Transition> {
        tracing::debug!("Rest skipped");
        self.complete_rest(session, now)
    }

    /// Complete the active set and continue with a copy of it.
    pub fn add_set(&mut self, session: &mut Session, now: DateTime<Utc>) -> Result<Transition> {
        let index = active_index(session)?;
        let timer = self.ensure_timer(session, now);
        if timer.state() == TimerState::Resting {
            timer.end_rest();
        } else {
            let elapsed = timer.exercise_elapsed(now);
            session.workout.exercises[index].record_duration(elapsed);
        }

        session.workout.exercises[index].state = ExerciseState::Completed;
        let new_index = session.workout.insert_set_after(index);
        let set = &mut session.workout.exercises[new_index];
        set.state = ExerciseState::InProgress;
        let countdown = set.target_duration;

        self.ensure_timer(session, now)
            .begin_exercise(now, new_index, countdown);
        tracing::debug!("Added set {} after {}", new_index, index);

        self.flush(session)?;
        Ok(Transition::SetAdded { index: new_index })
    }

    pub fn skip_exercise(
        &mut self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let index = active_index(session)?;
        if self.ensure_timer(session, now).state() == TimerState::Resting {
            return Err(Error::State("exercise finished; complete or skip the rest".into()));
        }

        session.workout.exercises[index].state = ExerciseState::Skipped;
        let transition = self.advance(session, index, now);
        self.flush(session)?;
        Ok(transition)
    }

    pub fn pause(&mut self, session: &Session, now: DateTime<Utc>) -> Result<Transition> {
        let paused = self
            .timers
            .get_mut(&session.id())
            .is_some_and(|timer| timer.pause(now));
        if !paused {
            return Err(Error::State("no running exercise to pause".into()));
        }
        Ok(Transition::Paused)
    }

    pub fn resume(&mut self, session: &Session, now: DateTime<Utc>) -> Result<Transition> {
        let resumed = self
            .timers
            .get_mut(&session.id())
            .is_some_and(|timer| timer.resume(now));
        if !resumed {
            return Err(Error::State("no paused exercise to resume".into()));
        }
        Ok(Transition::Resumed)
    }

    /// Replace the current value of an editable parameter.
    pub fn edit_param(
        &mut self,
        session: &mut Session,
        index: usize,
        key: &str,
        value: &str,
    ) -> Result<Transition> {
        let exercise = session
            .workout
            .exercises
            .get_mut(index)
            .ok_or_else(|| Error::State(format!("no exercise at {}", index)))?;
        let param = exercise
            .param_by_key_mut(key)
            .ok_or_else(|| Error::State(format!("no parameter '{}'", key)))?;
        if !param.editable {
            return Err(Error::State(format!("parameter '{}' is locked", key)));
        }

        param.value = value.trim().to_string();
        if param.kind() == ParamKind::Duration {
            exercise.target_duration = Some(parse_duration(value));
        }

        self.flush(session)?;
        Ok(Transition::Edited)
    }

    /// Let time drive the session: finish elapsed countdowns, end elapsed rests.
    pub fn tick(&mut self, session: &mut Session, now: DateTime<Utc>) -> Result<Transition> {
        let event = match self.timers.get(&session.id()) {
            Some(timer) => timer.tick(now),
            None => TimerEvent::None,
        };
        match event {
            TimerEvent::RestElapsed => self.complete_rest(session, now),
            TimerEvent::CountdownElapsed if self.auto_finish_countdown => {
                self.finish_exercise(session, now)
            }
            _ => Ok(Transition::Unchanged),
        }
    }

    /// Stop the session's timer. Idempotent.
    pub fn stop(&mut self, session: &Session, now: DateTime<Utc>) {
        self.timers.remove(&session.id(), now);
    }

    /// Write the serialized block using freshly fetched position context.
    ///
    /// On failure the session keeps its in-memory state and stays marked as
    /// holding pending changes, so a later call can retry.
    pub fn flush(&mut self, session: &mut Session) -> Result<()> {
        let text = serialize_workout(&session.workout);
        let result = match self.store.context(session.block_index) {
            Ok(Some(ctx)) => {
                self.store
                    .commit(&ctx, &text, Some(&session.workout.metadata.title))
            }
            Ok(None) => Err(PersistenceError::MissingContext.into()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                session.pending_changes = false;
                Ok(())
            }
            Err(e) => {
                session.pending_changes = true;
                tracing::warn!("Flush failed, keeping changes in memory: {}", e);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn ensure_timer(&mut self, session: &Session, now: DateTime<Utc>) -> &mut WorkoutTimer {
        let id = session.id();
        if self.timers.get(&id).is_none() {
            self.reconcile(&session.workout, now);
        }
        self.timers.get_or_create(&id)
    }

    /// Activate the next pending set after `from`, or complete the workout.
    fn advance(&mut self, session: &mut Session, from: usize, now: DateTime<Utc>) -> Transition {
        match session.workout.advance_target(from) {
            Some(to) => {
                let set = &mut session.workout.exercises[to];
                set.state = ExerciseState::InProgress;
                let countdown = set.target_duration;
                self.ensure_timer(session, now)
                    .begin_exercise(now, to, countdown);
                tracing::debug!("Advanced from exercise {} to {}", from, to);
                Transition::Advanced { from, to }
            }
            None => Transition::Completed(self.complete_workout(session, now)),
        }
    }

    fn complete_workout(&mut self, session: &mut Session, now: DateTime<Utc>) -> CompletionReport {
        let id = session.id();
        let elapsed = self
            .timers
            .get(&id)
            .map(|t| t.workout_elapsed(now))
            .unwrap_or(0);
        let duration = format_human(elapsed);

        session.workout.metadata.state = WorkoutState::Completed;
        session.workout.metadata.duration = Some(duration.clone());

        if let Err(e) = self.log.record(&session.workout.locked_copy()) {
            tracing::warn!("Failed to log completed workout: {}", e);
        }
        self.timers.remove(&id, now);

        let progression = session.workout.reset_with_progression();
        tracing::info!(
            "Completed workout '{}' in {}; {} sets progressed, {} added",
            session.workout.metadata.title,
            duration,
            progression.progressed_sets,
            progression.sets_added.len()
        );

        CompletionReport {
            duration,
            progression,
        }
    }
}

fn active_index(session: &Session) -> Result<usize> {
    session
        .workout
        .active_index()
        .ok_or_else(|| Error::State("no exercise in progress".into()))
}

fn format_start_date(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format(START_DATE_FORMAT).to_string()
}

fn parse_start_date(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), START_DATE_FORMAT)
        .ok()?
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
