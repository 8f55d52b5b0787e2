//! Journal of completed workouts.
//!
//! Each completed workout is appended to a JSONL (JSON Lines) file with file
//! locking to ensure safe concurrent access.

use crate::types::{ExerciseParam, ExerciseState, Workout};
use crate::Result;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Logging collaborator: receives each completed workout exactly once.
pub trait WorkoutLog {
    fn record(&mut self, workout: &Workout) -> Result<()>;
}

/// One set as it was performed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub name: String,
    pub state: ExerciseState,
    pub params: Vec<ExerciseParam>,
    pub recorded_duration: Option<String>,
}

/// One journal line
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub title: String,
    pub start_date: Option<String>,
    pub duration: Option<String>,
    pub sets: Vec<LoggedSet>,
}

impl JournalEntry {
    pub fn from_workout(workout: &Workout, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at,
            title: workout.metadata.title.clone(),
            start_date: workout.metadata.start_date.clone(),
            duration: workout.metadata.duration.clone(),
            sets: workout
                .exercises
                .iter()
                .map(|e| LoggedSet {
                    name: e.name.clone(),
                    state: e.state,
                    params: e.params.clone(),
                    recorded_duration: e.recorded_duration.clone(),
                })
                .collect(),
        }
    }

    pub fn completed_sets(&self) -> usize {
        self.sets
            .iter()
            .filter(|s| s.state == ExerciseState::Completed)
            .count()
    }
}

/// JSONL-based journal with file locking
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    /// Create a new journal for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Appended workout {} to journal", entry.id);
        Ok(())
    }
}

impl WorkoutLog for JsonlJournal {
    fn record(&mut self, workout: &Workout) -> Result<()> {
        let entry = JournalEntry::from_workout(workout, Utc::now());
        self.append(&entry)?;
        tracing::info!("Logged workout '{}' ({} sets)", entry.title, entry.sets.len());
        Ok(())
    }
}

/// Collects workouts in memory
#[derive(Debug, Default)]
pub struct MemoryLog {
    pub workouts: Vec<Workout>,
}

impl WorkoutLog for MemoryLog {
    fn record(&mut self, workout: &Workout) -> Result<()> {
        self.workouts.push(workout.clone());
        Ok(())
    }
}

/// Read all entries from a journal file
pub fn read_entries(path: &Path) -> Result<Vec<JournalEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut entries = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<JournalEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::warn!("Failed to parse journal entry at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} journal entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_workout;

    fn completed_workout() -> Workout {
        parse_workout(
            "title: Push\nstate: completed\nstartDate: [2024-03-01 18:05]\nduration: [40m]\n---\n- [x] Bench | Weight: 70 kg | Reps: 8\n- [-] Dips | Reps: 10",
        )
    }

    #[test]
    fn test_record_and_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("journal").join("workouts.jsonl");

        let mut journal = JsonlJournal::new(&path);
        journal.record(&completed_workout()).unwrap();
        journal.record(&completed_workout()).unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Push");
        assert_eq!(entries[0].duration.as_deref(), Some("40m"));
        assert_eq!(entries[0].sets.len(), 2);
        assert_eq!(entries[0].completed_sets(), 1);
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("workouts.jsonl");

        let mut journal = JsonlJournal::new(&path);
        journal.record(&completed_workout()).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ not json").unwrap();
        journal.record(&completed_workout()).unwrap();

        assert_eq!(read_entries(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_missing_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let entries = read_entries(&temp_dir.path().join("none.jsonl")).unwrap();
        assert!(entries.is_empty());
    }
}
