#![forbid(unsafe_code)]

//! Core domain model and business logic for plain-text workouts.
//!
//! This crate provides:
//! - Codecs for durations, progression values and exercise/workout text
//! - Formula evaluation and the progression engine
//! - The session state machine with per-workout timers
//! - Persistence (block store, completed-workout journal, config)

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod duration;
pub mod progression_value;
pub mod formula;
pub mod progression;
pub mod parser;
pub mod workout;
pub mod timer;
pub mod store;
pub mod journal;
pub mod session;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use duration::{format_clock, format_human, parse_duration};
pub use progression_value::{format_progression_value, parse_progression_value, ProgressionValue};
pub use formula::evaluate;
pub use progression::{apply_progression, ProgressionOutcome};
pub use parser::{parse_line, parse_workout, serialize_line, serialize_workout};
pub use workout::SessionId;
pub use store::{BlockStore, FileStore, MemoryStore};
pub use journal::{JsonlJournal, WorkoutLog};
pub use session::{Session, SessionManager, Transition};
