use clap::{Parser, Subcommand};
use setrep_core::grouping::group_label;
use setrep_core::preload::preload_all;
use setrep_core::session::RestPhase;
use setrep_core::*;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "setrep")]
#[command(about = "Strength workout session tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// User whose sessions are recorded
    #[arg(long, global = true, default_value = "local")]
    user: String,

    /// Log session decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workout session
    Start {
        /// Plan to train
        #[arg(long, default_value = DEMO_PLAN_ID)]
        plan: String,

        /// Continue an unfinished session instead of starting a new one
        #[arg(long)]
        resume: Option<String>,

        /// Auto-complete (for testing) - perform every set at its working values
        #[arg(long)]
        auto_complete: bool,

        /// Note stored with the completed session
        #[arg(long)]
        note: Option<String>,
    },

    /// Show plateau analysis of earlier sessions
    Plateaus {
        #[arg(long, default_value = DEMO_PLAN_ID)]
        plan: String,
    },

    /// Export historic series to CSV
    History {
        #[arg(long, default_value = DEMO_PLAN_ID)]
        plan: String,

        /// CSV file to append to
        #[arg(long)]
        csv: PathBuf,
    },

    /// Plan utilities
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Check a plan for grouping and target problems
    Validate {
        #[arg(long, default_value = DEMO_PLAN_ID)]
        plan: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        setrep_core::logging::init_with_level("debug");
    } else {
        setrep_core::logging::init();
    }

    // Determine data directory
    let config = Config::load()?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Using data directory {:?}", data_dir);
    let repo = Arc::new(FileRepository::new(&data_dir));

    match cli.command {
        Commands::Start {
            plan,
            resume,
            auto_complete,
            note,
        } => {
            cmd_start(
                repo,
                config,
                &cli.user,
                &plan,
                resume.as_deref(),
                auto_complete,
                note.as_deref(),
            )
            .await
        }
        Commands::Plateaus { plan } => cmd_plateaus(&repo, &config, &cli.user, &plan).await,
        Commands::History { plan, csv } => cmd_history(&repo, &cli.user, &plan, csv).await,
        Commands::Plan {
            command: PlanCommands::Validate { plan },
        } => cmd_validate(&repo, &plan).await,
    }
}

async fn load_valid_plan(repo: &FileRepository, plan: &str) -> Result<Vec<Exercise>> {
    let exercises = repo.fetch_exercises(plan).await?;
    let errors = validate_plan(&exercises);
    if !errors.is_empty() {
        eprintln!("Plan validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::PlanValidation(format!("Invalid plan {}", plan)));
    }
    Ok(exercises)
}

async fn cmd_start(
    repo: Arc<FileRepository>,
    config: Config,
    user: &str,
    plan: &str,
    resume: Option<&str>,
    auto_complete: bool,
    note: Option<&str>,
) -> Result<()> {
    load_valid_plan(&repo, plan).await?;

    let mut session = WorkoutSession::new(repo, config, Arc::new(TracingCuePlayer));
    match resume {
        Some(session_id) => session.resume_workout(user, plan, session_id).await?,
        None => session.initialize_workout(user, plan).await?,
    }

    let snap = session.snapshot();
    println!(
        "\nSession {} started: {} groups",
        snap.session_id.as_deref().unwrap_or("?"),
        snap.groups.len()
    );
    print_plateau_notices(snap);

    if auto_complete {
        run_auto_complete(&mut session).await?;
        finish(&mut session, note).await
    } else {
        run_interactive(&mut session, note).await
    }
}

/// Perform every set at its working values, skipping rests
async fn run_auto_complete(session: &mut WorkoutSession<FileRepository>) -> Result<()> {
    loop {
        let snap = session.snapshot().clone();
        if snap.finishable || snap.groups.is_empty() {
            return Ok(());
        }
        if snap.rest != RestPhase::None {
            session.skip_rest();
            continue;
        }

        let Some(exercise) = snap.selected().cloned() else {
            return Err(Error::State("no exercise selected".into()));
        };
        let done = snap.completed_count(&exercise.id);
        if done >= exercise.target_sets {
            session.go_to_next_group()?;
            continue;
        }

        let values = snap
            .working_values(&exercise.id)
            .unwrap_or_else(|| WorkingValues::from_plan(&exercise));
        let outcome = session
            .add_completed_series(&exercise.id, values.weight, values.reps, done + 1)
            .await?;
        if outcome == SeriesOutcome::Duplicate {
            return Err(Error::State(format!(
                "set {} of {} was already recorded",
                done + 1,
                exercise.name
            )));
        }
        println!("  ✓ {} set {}: {}", exercise.name, done + 1, values);
    }
}

async fn finish(session: &mut WorkoutSession<FileRepository>, note: Option<&str>) -> Result<()> {
    let summary = session.complete_workout(note).await?;
    println!("\n✓ Workout complete!");
    println!("  Session: {}", summary.session_id);
    println!("  Series: {}", summary.series_count);
    println!("  Duration: {} min", summary.duration_minutes);
    Ok(())
}

enum Flow {
    Continue,
    Done,
}

async fn run_interactive(
    session: &mut WorkoutSession<FileRepository>,
    note: Option<&str>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    render(session);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    if let Some(id) = session.snapshot().session_id.as_deref() {
                        println!("\nInput closed; session left open. Resume with --resume {}", id);
                    }
                    return Ok(());
                };
                match handle_input(session, line.trim(), note).await {
                    Ok(Flow::Done) => return Ok(()),
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("  ! {}", e),
                }
                if session.snapshot().is_active() {
                    render(session);
                }
            }
            _ = session.rest_elapsed() => {
                println!("\n⏰ Rest over");
                render(session);
            }
        }
    }
}

async fn handle_input(
    session: &mut WorkoutSession<FileRepository>,
    input: &str,
    note: Option<&str>,
) -> Result<Flow> {
    let mut parts = input.split_whitespace();
    match parts.next().unwrap_or("") {
        "s" => {
            if !session.skip_rest() {
                println!("  No rest running");
            }
        }
        "n" => session.go_to_next_group()?,
        "p" => session.go_to_previous_group()?,
        "x" => {
            let id = parts
                .next()
                .ok_or_else(|| Error::Other("usage: x <exercise-id>".into()))?;
            session.select_exercise(id)?;
        }
        "a" => {
            let id = selected_id(session)?;
            let suggestion = session
                .snapshot()
                .plateaus
                .get(&id)
                .and_then(|p| p.suggestions.first().cloned())
                .ok_or_else(|| Error::Other(format!("no plateau on {}", id)))?;
            session.apply_progression_suggestion(&id, &suggestion)?;
            println!("  ✓ {}", suggestion.description);
        }
        "d" => {
            let id = selected_id(session)?;
            session.dismiss_plateau(&id);
        }
        "f" => {
            finish(session, note).await?;
            return Ok(Flow::Done);
        }
        "q" => {
            session.cancel_workout().await;
            println!("\nWorkout cancelled");
            return Ok(Flow::Done);
        }
        "" => record_set(session, None).await?,
        weight => {
            let weight: f64 = weight
                .parse()
                .map_err(|_| Error::Other(format!("unknown command: {}", input)))?;
            let reps: u32 = parts
                .next()
                .and_then(|r| r.parse().ok())
                .ok_or_else(|| Error::Other("usage: <weight> <reps>".into()))?;
            record_set(session, Some(WorkingValues::new(weight, reps))).await?;
        }
    }
    Ok(Flow::Continue)
}

fn selected_id(session: &WorkoutSession<FileRepository>) -> Result<String> {
    session
        .snapshot()
        .selected_exercise
        .clone()
        .ok_or_else(|| Error::State("no exercise selected".into()))
}

async fn record_set(
    session: &mut WorkoutSession<FileRepository>,
    values: Option<WorkingValues>,
) -> Result<()> {
    let snap = session.snapshot();
    let exercise = snap
        .selected()
        .cloned()
        .ok_or_else(|| Error::State("no exercise selected".into()))?;
    let done = snap.completed_count(&exercise.id);
    if done >= exercise.target_sets {
        println!("  {} is complete", exercise.name);
        return Ok(());
    }
    let values = values
        .or_else(|| snap.working_values(&exercise.id))
        .unwrap_or_else(|| WorkingValues::from_plan(&exercise));

    let outcome = session
        .add_completed_series(&exercise.id, values.weight, values.reps, done + 1)
        .await?;
    if let SeriesOutcome::Recorded { rest_started } = outcome {
        println!("  ✓ {} set {}: {}", exercise.name, done + 1, values);
        if rest_started {
            println!("  Resting {}s ('s' to skip)", exercise.recovery_seconds);
        }
    }
    Ok(())
}

fn render(session: &WorkoutSession<FileRepository>) {
    let snap = session.snapshot();
    let Some(group) = snap.group() else {
        return;
    };

    println!("\n╭─────────────────────────────────────────╮");
    println!(
        "│  Group {}/{} ({})  {:.0}% done",
        snap.current_group + 1,
        snap.groups.len(),
        group_label(group),
        snap.progress * 100.0
    );
    println!("╰─────────────────────────────────────────╯");

    for exercise in &group.exercises {
        let marker = if snap.selected_exercise.as_deref() == Some(exercise.id.as_str()) {
            "→"
        } else {
            " "
        };
        let values = snap
            .working_values(&exercise.id)
            .unwrap_or_else(|| WorkingValues::from_plan(exercise));
        println!(
            "  {} {} [{}/{}] next: {}",
            marker,
            exercise.name,
            snap.completed_count(&exercise.id),
            exercise.target_sets,
            values
        );
    }

    if let Some(selected) = snap.selected_exercise.as_deref() {
        if let Some(plateau) = snap.plateaus.get(selected) {
            println!(
                "  ⚠ {} plateau over {} sessions",
                plateau.severity, plateau.stagnant_sessions
            );
            if let Some(top) = plateau.suggestions.first() {
                println!("    'a' to apply: {}", top.description);
            }
        }
    }

    if let TimerState::Running { remaining, .. } = session.timer_state() {
        println!("  Resting: {}s left", remaining);
    }
    if snap.finishable {
        println!("  All sets done - 'f' to finish");
    }

    println!("─────────────────────────────────────────");
    println!("Enter: log set at working values   <weight> <reps>: log set");
    println!("s skip rest  n/p next/prev group  x <id> select  a apply  d dismiss  f finish  q quit");
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_plateau_notices(snap: &SessionSnapshot) {
    for plateau in snap.plateaus.values() {
        println!(
            "  ⚠ {}: {} plateau over {} sessions",
            plateau.exercise_name, plateau.severity, plateau.stagnant_sessions
        );
    }
}

async fn cmd_plateaus(repo: &FileRepository, config: &Config, user: &str, plan: &str) -> Result<()> {
    let exercises = repo.fetch_exercises(plan).await?;
    let historic = repo.fetch_historic_series(user, plan).await?;
    let working = preload_all(
        &exercises,
        &historic,
        &CompletedSeriesMap::new(),
        config.plateau.session_gap_hours,
    );
    let plateaus = detect_plateaus(
        &exercises,
        &historic,
        &working,
        &BTreeSet::new(),
        &config.plateau,
    );

    if plateaus.is_empty() {
        println!("No plateaus detected for plan {}", plan);
        return Ok(());
    }

    for info in plateaus.values() {
        println!(
            "\n{}: {} plateau over {} sessions at {}",
            info.exercise_name, info.severity, info.stagnant_sessions, info.current
        );
        for suggestion in &info.suggestions {
            println!(
                "  → {} ({:.0}% confidence)",
                suggestion.description,
                suggestion.confidence * 100.0
            );
        }
    }
    Ok(())
}

async fn cmd_history(repo: &FileRepository, user: &str, plan: &str, csv: PathBuf) -> Result<()> {
    let historic = repo.fetch_historic_series(user, plan).await?;
    let count = setrep_core::history::export_history_csv(&historic, &csv)?;

    println!("✓ Exported {} series to CSV", count);
    println!("  CSV: {}", csv.display());
    Ok(())
}

async fn cmd_validate(repo: &FileRepository, plan: &str) -> Result<()> {
    let exercises = load_valid_plan(repo, plan).await?;
    let groups = group_exercises(&exercises);
    println!(
        "✓ Plan {} is valid: {} exercises in {} groups",
        plan,
        exercises.len(),
        groups.len()
    );
    Ok(())
}
