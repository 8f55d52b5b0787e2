use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use workout_core::journal::read_entries;
use workout_core::progression::StepKind;
use workout_core::session::CompletionReport;
use workout_core::store::{block_text, find_blocks};
use workout_core::timer::{TimerState, WorkoutTimer};
use workout_core::*;

#[derive(Parser)]
#[command(name = "workout")]
#[command(about = "Plain-text workout tracker with progression", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a workout block and its timers
    Show {
        file: PathBuf,

        /// Block number within the file (0-based)
        #[arg(long, default_value_t = 0)]
        block: usize,
    },

    /// Perform a workout block interactively
    Run {
        file: PathBuf,

        /// Block number within the file (0-based)
        #[arg(long, default_value_t = 0)]
        block: usize,

        /// Auto-complete (for testing) - finish every set and skip every rest
        #[arg(long)]
        auto_complete: bool,
    },

    /// Show what progression would do, without writing anything
    Preview { file: PathBuf },

    /// Rewrite every block in normalized form
    Fmt { file: PathBuf },

    /// List completed workouts from the journal
    History,
}

fn main() -> Result<()> {
    // Initialize logging
    workout_core::logging::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }

    match cli.command {
        Commands::Show { file, block } => cmd_show(&file, block, &config),
        Commands::Run {
            file,
            block,
            auto_complete,
        } => cmd_run(&file, block, auto_complete, &config),
        Commands::Preview { file } => cmd_preview(&file),
        Commands::Fmt { file } => cmd_fmt(&file),
        Commands::History => cmd_history(&config),
    }
}

fn manager(file: &Path, config: &Config) -> SessionManager<FileStore, JsonlJournal> {
    SessionManager::new(FileStore::new(file), JsonlJournal::new(config.journal_path()))
        .with_auto_finish(config.timer.auto_finish_countdown)
}

fn cmd_show(file: &Path, block: usize, config: &Config) -> Result<()> {
    let mut mgr = manager(file, config);
    let now = Utc::now();
    let session = mgr.open(block, now)?;

    display_workout(session.workout());

    if let Some(timer) = mgr.timer(&session) {
        println!();
        println!("  Elapsed:  {}", format_clock(timer.workout_elapsed(now)));
        println!("  Exercise: {}", format_clock(timer.exercise_elapsed(now)));
    }
    Ok(())
}

fn cmd_run(file: &Path, block: usize, auto_complete: bool, config: &Config) -> Result<()> {
    let mut mgr = manager(file, config);
    let mut session = mgr.open(block, Utc::now())?;
    tracing::info!("Running block {} of {:?}", block, file);

    if session.workout().metadata.state != WorkoutState::Started {
        mgr.start(&mut session, Utc::now())?;
    }
    display_workout(session.workout());

    loop {
        let now = Utc::now();
        let resting = mgr
            .timer(&session)
            .is_some_and(|t| t.state() == TimerState::Resting);

        let result = if auto_complete {
            if resting {
                mgr.skip_rest(&mut session, now)
            } else {
                mgr.finish_exercise(&mut session, now)
            }
        } else {
            display_current(&session, mgr.timer(&session), now);
            match prompt_user_action(resting)? {
                UserAction::Finish if resting => mgr.complete_rest(&mut session, now),
                UserAction::Finish => mgr.finish_exercise(&mut session, now),
                UserAction::Skip if resting => mgr.skip_rest(&mut session, now),
                UserAction::Skip => mgr.skip_exercise(&mut session, now),
                UserAction::AddSet => mgr.add_set(&mut session, now),
                UserAction::TogglePause if resting => {
                    println!("\n  Resting; press Enter to end rest");
                    continue;
                }
                UserAction::TogglePause => {
                    let paused = mgr
                        .timer(&session)
                        .is_some_and(|t| t.state() == TimerState::Paused);
                    if paused {
                        mgr.resume(&session, now)
                    } else {
                        mgr.pause(&session, now)
                    }
                }
                UserAction::Quit => {
                    mgr.stop(&session, now);
                    println!("\nStopped. Progress is saved in {}", file.display());
                    return Ok(());
                }
            }
        };

        let transition = match result {
            Ok(transition) => transition,
            Err(Error::State(msg)) if !auto_complete => {
                println!("\n  ✗ {}", msg);
                continue;
            }
            Err(Error::Persistence(e))
                if !auto_complete && session.workout().metadata.state == WorkoutState::Started =>
            {
                // The next transition writes the whole block again.
                println!("\n  ✗ Not saved yet: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };

        match transition {
            Transition::Resting { seconds, .. } => {
                println!("\n  Rest {}", format_human(seconds));
            }
            Transition::Completed(report) => {
                display_completion(&report);
                return Ok(());
            }
            Transition::Paused => println!("\n  Paused"),
            Transition::Resumed => println!("\n  Resumed"),
            _ => {}
        }
    }
}

fn cmd_preview(file: &Path) -> Result<()> {
    let document = FileStore::new(file).read_document()?;

    for ctx in find_blocks(&document) {
        let workout = parse_workout(&block_text(&document, &ctx));
        println!("\n{}", workout.metadata.title);

        for exercise in &workout.exercises {
            let outcome = apply_progression(&exercise.params);
            let changes: Vec<String> = outcome
                .changes
                .iter()
                .map(|c| {
                    let note = match c.kind {
                        StepKind::Advanced => "",
                        StepKind::Capped => " (capped)",
                        StepKind::Wrapped => " (wrapped)",
                    };
                    format!("{} {} -> {}{}", c.key, c.from, c.to, note)
                })
                .collect();

            if changes.is_empty() {
                println!("  {}: unchanged", exercise.name);
            } else {
                println!("  {}: {}", exercise.name, changes.join(", "));
            }
            for failure in &outcome.failures {
                println!("    ! {}: {}", failure.key, failure.error);
            }
            if outcome.should_add_set {
                println!("    + one more set");
            }
        }
    }
    Ok(())
}

fn cmd_fmt(file: &Path) -> Result<()> {
    let mut store = FileStore::new(file);
    let count = store.block_count()?;

    for index in 0..count {
        let Some(text) = store.read_block(index)? else {
            continue;
        };
        let workout = parse_workout(&text);
        tracing::debug!("Formatting block {} ({})", index, workout.metadata.title);
        // Positions shift as earlier blocks are rewritten.
        if let Some(ctx) = store.context(index)? {
            store.commit(&ctx, &serialize_workout(&workout), Some(&workout.metadata.title))?;
        }
    }

    println!("✓ Formatted {} block(s) in {}", count, file.display());
    Ok(())
}

fn cmd_history(config: &Config) -> Result<()> {
    let entries = read_entries(&config.journal_path())?;

    if entries.is_empty() {
        println!("No completed workouts yet.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:<24} {:>8}  {}/{} sets",
            entry.start_date.as_deref().unwrap_or("-"),
            entry.title,
            entry.duration.as_deref().unwrap_or("-"),
            entry.completed_sets(),
            entry.sets.len()
        );
    }
    Ok(())
}

fn display_workout(workout: &Workout) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", workout.metadata.title);
    println!("╰─────────────────────────────────────────╯");
    println!("  State: {}", workout.metadata.state.as_str());
    if let Some(start) = &workout.metadata.start_date {
        println!("  Started: {}", start);
    }
    if let Some(rest) = workout.metadata.rest_duration {
        println!("  Rest: {}", format_human(rest));
    }
    println!();

    for exercise in &workout.exercises {
        println!("  {}", serialize_line(exercise));
    }
}

fn display_current(session: &Session, timer: Option<&WorkoutTimer>, now: DateTime<Utc>) {
    let workout = session.workout();
    let Some(index) = workout.active_index() else {
        return;
    };
    let exercise = &workout.exercises[index];

    println!("\n─────────────────────────────────────────");
    println!("  → {}", serialize_line(exercise));
    if let Some(timer) = timer {
        match timer.rest_remaining(now) {
            Some(left) => println!("  Resting, {} left", format_clock(left)),
            None => match timer.countdown_remaining(now) {
                Some(left) => println!("  {} left", format_clock(left)),
                None => println!("  {}", format_clock(timer.exercise_elapsed(now))),
            },
        }
        println!("  Workout {}", format_clock(timer.workout_elapsed(now)));
    }
}

fn display_completion(report: &CompletionReport) {
    println!("\n✓ Workout complete in {}", report.duration);
    println!("  {} set(s) progressed", report.progression.progressed_sets);
    for name in &report.progression.sets_added {
        println!("  + added a set of {}", name);
    }
    for (name, failure) in &report.progression.failures {
        println!("  ! {} {}: {}", name, failure.key, failure.error);
    }
}

enum UserAction {
    Finish,
    Skip,
    AddSet,
    TogglePause,
    Quit,
}

fn prompt_user_action(resting: bool) -> Result<UserAction> {
    if resting {
        println!("Press Enter to end rest ('s' + Enter to skip it)");
    } else {
        println!("Press Enter when done");
        println!("  's' + Enter to skip");
        println!("  'a' + Enter to add a set");
        println!("  'p' + Enter to pause/resume");
    }
    println!("  'q' + Enter to quit");
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(UserAction::Quit);
    }

    let action = match input.trim().to_lowercase().as_str() {
        "s" => UserAction::Skip,
        "a" => UserAction::AddSet,
        "p" => UserAction::TogglePause,
        "q" => UserAction::Quit,
        _ => UserAction::Finish,
    };

    Ok(action)
}
