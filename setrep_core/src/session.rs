//! Active workout session state machine.
//!
//! [`WorkoutSession`] is the single owner of session-scoped state: the
//! completed-series map, working values, plateau findings and the dismissed
//! set. Every mutation builds a new map and swaps it in, then publishes a
//! [`SessionSnapshot`] on a watch channel, so readers always see a consistent
//! view without taking locks.
//!
//! Lifecycle, series loading, series saving and completion are tracked as four
//! independent sub-states.

use crate::config::Config;
use crate::cues::{self, CueKind, SharedCuePlayer};
use crate::grouping::{
    completed_count, first_incomplete_member, group_exercises, group_index_of,
    is_group_complete, is_workout_complete, next_incomplete_group, next_incomplete_member,
    workout_progress,
};
use crate::plateau::detect_plateaus;
use crate::preload::preload_all;
use crate::repository::{fetch_completed_series_or_empty, RepositoryError, SessionRepository};
use crate::timer::{ElapsedCounter, RecoveryTimer, RestElapsed, TimerState};
use crate::{
    CompletedSeries, CompletedSeriesMap, Error, Exercise, ExerciseGroup, ExerciseId,
    HistoricSeries, PlateauInfo, ProgressionSuggestion, Result, SeriesRecord, WorkingValues,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

// ============================================================================
// Sub-states
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Loading,
    Active,
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SeriesLoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SeriesSaveState {
    #[default]
    Idle,
    Saving,
    Saved,
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CompletionState {
    #[default]
    Idle,
    Completing,
    Completed,
    Error(String),
}

/// Whether a rest period is running
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RestPhase {
    #[default]
    None,
    /// `final_rest` is set when no series are left in the workout
    Resting { final_rest: bool },
}

/// Everything a presentation layer needs to render the session
#[derive(Clone, Debug, Default)]
pub struct SessionSnapshot {
    pub session: SessionState,
    pub series_load: SeriesLoadState,
    pub series_save: SeriesSaveState,
    pub completion: CompletionState,
    pub session_id: Option<String>,
    pub groups: Arc<Vec<ExerciseGroup>>,
    pub current_group: usize,
    pub selected_exercise: Option<ExerciseId>,
    pub completed: Arc<CompletedSeriesMap>,
    pub working_values: Arc<BTreeMap<ExerciseId, WorkingValues>>,
    pub plateaus: Arc<BTreeMap<ExerciseId, PlateauInfo>>,
    pub dismissed: Arc<BTreeSet<ExerciseId>>,
    pub rest: RestPhase,
    /// Forward navigation to the next group is allowed
    pub can_advance: bool,
    /// Every series is done and no rest is pending
    pub finishable: bool,
    pub progress: f64,
}

impl SessionSnapshot {
    pub fn group(&self) -> Option<&ExerciseGroup> {
        self.groups.get(self.current_group)
    }

    pub fn selected(&self) -> Option<&Exercise> {
        let id = self.selected_exercise.as_deref()?;
        self.group()?.exercises.iter().find(|e| e.id == id)
    }

    pub fn completed_count(&self, exercise_id: &str) -> u32 {
        completed_count(&self.completed, exercise_id)
    }

    pub fn working_values(&self, exercise_id: &str) -> Option<WorkingValues> {
        self.working_values.get(exercise_id).copied()
    }

    pub fn is_active(&self) -> bool {
        self.session == SessionState::Active
    }
}

/// Result of [`WorkoutSession::add_completed_series`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeriesOutcome {
    Recorded { rest_started: bool },
    /// The series was already recorded; nothing changed
    Duplicate,
}

/// Returned by a successful [`WorkoutSession::complete_workout`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkoutSummary {
    pub session_id: String,
    pub duration_minutes: i64,
    pub series_count: usize,
}

// ============================================================================
// State machine
// ============================================================================

/// The active workout session
pub struct WorkoutSession<R: SessionRepository + ?Sized> {
    repo: Arc<R>,
    config: Config,
    cues: SharedCuePlayer,
    timer: RecoveryTimer,
    clock: ElapsedCounter,
    state: SessionSnapshot,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    exercises: Arc<Vec<Exercise>>,
    historic: Arc<HistoricSeries>,
    user_id: Option<String>,
    plan_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl<R: SessionRepository + ?Sized> WorkoutSession<R> {
    pub fn new(repo: Arc<R>, config: Config, cues: SharedCuePlayer) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let timer = RecoveryTimer::new(config.timer.clone(), Arc::clone(&cues));
        let clock = ElapsedCounter::new(&config.timer);
        Self {
            repo,
            config,
            cues,
            timer,
            clock,
            state: SessionSnapshot::default(),
            snapshot_tx,
            exercises: Arc::new(Vec::new()),
            historic: Arc::new(HistoricSeries::new()),
            user_id: None,
            plan_id: None,
            started_at: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.state
    }

    pub fn subscribe_timer(&self) -> watch::Receiver<TimerState> {
        self.timer.subscribe()
    }

    pub fn timer_state(&self) -> TimerState {
        self.timer.state()
    }

    /// Number of rest periods started in this process
    pub fn rests_started(&self) -> u64 {
        self.timer.generation()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.clock.subscribe()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.clock.seconds()
    }

    pub fn historic(&self) -> &HistoricSeries {
        &self.historic
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.clone());
    }

    fn require_active(&self) -> Result<()> {
        match &self.state.session {
            SessionState::Active => Ok(()),
            other => Err(Error::State(format!("no active session ({:?})", other))),
        }
    }

    fn exercise(&self, exercise_id: &str) -> Result<&Exercise> {
        self.exercises
            .iter()
            .find(|e| e.id == exercise_id)
            .ok_or_else(|| Error::UnknownExercise(exercise_id.to_string()))
    }

    fn active_session_id(&self) -> Result<String> {
        self.state
            .session_id
            .clone()
            .ok_or_else(|| Error::State("session has no remote id".into()))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start a new session for a plan and load everything it needs
    ///
    /// A no-op when a session is already active. After a failure the session
    /// is rebuilt from scratch.
    pub async fn initialize_workout(&mut self, user_id: &str, plan_id: &str) -> Result<()> {
        match &self.state.session {
            SessionState::Active => {
                tracing::debug!("Session already active, ignoring initialize");
                return Ok(());
            }
            // An interrupted load starts over like a failed one
            SessionState::Loading | SessionState::Error(_) => self.reset(),
            SessionState::Idle => {}
        }
        self.open(user_id, plan_id, None).await
    }

    /// Attach to a session that already exists remotely
    pub async fn resume_workout(
        &mut self,
        user_id: &str,
        plan_id: &str,
        session_id: &str,
    ) -> Result<()> {
        match &self.state.session {
            SessionState::Idle => {}
            SessionState::Error(_) => self.reset(),
            other => {
                return Err(Error::State(format!(
                    "cannot resume while session is {:?}",
                    other
                )))
            }
        }
        self.open(user_id, plan_id, Some(session_id.to_string()))
            .await
    }

    async fn open(&mut self, user_id: &str, plan_id: &str, existing: Option<String>) -> Result<()> {
        self.user_id = Some(user_id.to_string());
        self.plan_id = Some(plan_id.to_string());
        self.state.session = SessionState::Loading;
        self.state.completion = CompletionState::Idle;
        self.publish();

        let session_id = match existing {
            Some(id) => id,
            None => {
                let started = self.repo.start_session(user_id, plan_id).await;
                match started {
                    Ok(id) => id,
                    Err(e) => return Err(self.fail_session("start session", e)),
                }
            }
        };
        self.state.session_id = Some(session_id.clone());

        let fetched = self.repo.fetch_exercises(plan_id).await;
        let mut exercises = match fetched {
            Ok(exercises) => exercises,
            Err(e) => return Err(self.fail_session("fetch exercises", e)),
        };
        exercises.sort_by_key(|e| e.order_index);
        let groups = group_exercises(&exercises);

        let historic = match self.repo.fetch_historic_series(user_id, plan_id).await {
            Ok(historic) => historic,
            Err(e) => {
                tracing::warn!("Historic data unavailable, using plan defaults: {}", e);
                HistoricSeries::new()
            }
        };

        self.state.series_load = SeriesLoadState::Loading;
        self.publish();
        let loaded = fetch_completed_series_or_empty(self.repo.as_ref(), &session_id).await;
        let completed = match loaded {
            Ok(records) => {
                self.state.series_load = SeriesLoadState::Loaded;
                completed_map_from(records, &exercises)
            }
            Err(e) => {
                tracing::warn!("Failed to load series of session {}: {}", session_id, e);
                self.state.series_load = SeriesLoadState::Error(e.to_string());
                CompletedSeriesMap::new()
            }
        };

        let working = preload_all(
            &exercises,
            &historic,
            &completed,
            self.config.plateau.session_gap_hours,
        );

        let current_group = groups
            .iter()
            .position(|g| !is_group_complete(g, &completed))
            .unwrap_or(0);

        self.exercises = Arc::new(exercises);
        self.historic = Arc::new(historic);
        self.state.groups = Arc::new(groups);
        self.state.completed = Arc::new(completed);
        self.state.working_values = Arc::new(working);
        self.state.plateaus = Arc::new(BTreeMap::new());
        self.state.rest = RestPhase::None;
        self.state.series_save = SeriesSaveState::Idle;
        self.select_group(current_group);

        self.started_at = Some(Utc::now());
        self.clock.start();
        self.state.session = SessionState::Active;
        self.refresh_derived();
        self.publish();

        tracing::info!(
            "Session {} active: {} exercises in {} groups",
            session_id,
            self.exercises.len(),
            self.state.groups.len()
        );

        self.scan_plateaus().await;
        Ok(())
    }

    fn fail_session(&mut self, step: &str, e: RepositoryError) -> Error {
        tracing::error!("Failed to {}: {}", step, e);
        self.state.session = SessionState::Error(e.to_string());
        self.publish();
        Error::Repository(e)
    }

    /// Finish the workout remotely
    ///
    /// On success the session-scoped data is discarded and completion is
    /// reported as `Completed`; navigating away is left to the caller.
    pub async fn complete_workout(&mut self, note: Option<&str>) -> Result<WorkoutSummary> {
        self.require_active()?;
        if self.state.completion == CompletionState::Completing {
            return Err(Error::State("completion already in progress".into()));
        }
        let session_id = self.active_session_id()?;

        self.state.completion = CompletionState::Completing;
        self.publish();

        let duration_minutes = self
            .started_at
            .map(|start| (Utc::now() - start).num_minutes().max(0))
            .unwrap_or(0);

        let result = self
            .repo
            .complete_session(&session_id, duration_minutes, note)
            .await;
        if let Err(e) = result {
            tracing::warn!("Failed to complete session {}: {}", session_id, e);
            self.state.completion = CompletionState::Error(e.to_string());
            self.publish();
            return Err(e.into());
        }

        let summary = WorkoutSummary {
            session_id,
            duration_minutes,
            series_count: self.state.completed.values().map(Vec::len).sum(),
        };
        tracing::info!(
            "Session {} completed: {} series in {} min",
            summary.session_id,
            summary.series_count,
            summary.duration_minutes
        );

        self.discard();
        self.state.completion = CompletionState::Completed;
        self.publish();
        Ok(summary)
    }

    /// Abandon the workout
    ///
    /// Remote deletion is best effort; its failure never blocks the reset.
    pub async fn cancel_workout(&mut self) {
        if let Some(session_id) = self.state.session_id.clone() {
            match self.repo.delete_session(&session_id).await {
                Ok(()) => tracing::info!("Session {} cancelled", session_id),
                Err(e) => tracing::warn!("Ignoring failed delete of {}: {}", session_id, e),
            }
        }
        self.reset();
    }

    /// Drop all session state and stop every background loop
    pub fn reset(&mut self) {
        self.discard();
        self.state.completion = CompletionState::Idle;
        self.publish();
    }

    fn discard(&mut self) {
        self.timer.stop();
        self.clock.reset();
        self.state = SessionSnapshot::default();
        self.exercises = Arc::new(Vec::new());
        self.historic = Arc::new(HistoricSeries::new());
        self.user_id = None;
        self.plan_id = None;
        self.started_at = None;
    }

    // ------------------------------------------------------------------
    // Series
    // ------------------------------------------------------------------

    /// Record a confirmed set
    ///
    /// A set already recorded under the same series number is a no-op. The
    /// set is saved remotely first; local state only changes once the save
    /// succeeded.
    pub async fn add_completed_series(
        &mut self,
        exercise_id: &str,
        weight: f64,
        reps: u32,
        series_number: u32,
    ) -> Result<SeriesOutcome> {
        self.require_active()?;
        let exercise = self.exercise(exercise_id)?.clone();

        let done = self
            .state
            .completed
            .get(exercise_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if done.iter().any(|s| s.series_number == series_number) {
            tracing::debug!(
                "Series {} of {} already recorded",
                series_number,
                exercise_id
            );
            return Ok(SeriesOutcome::Duplicate);
        }

        let expected = done.len() as u32 + 1;
        if series_number != expected || series_number > exercise.target_sets {
            return Err(Error::InvalidSeries {
                exercise_id: exercise_id.to_string(),
                series_number,
                expected,
            });
        }

        let session_id = self.active_session_id()?;
        self.state.series_save = SeriesSaveState::Saving;
        self.publish();

        let series = CompletedSeries {
            id: Uuid::new_v4(),
            series_number,
            weight,
            reps,
            recovery_seconds: exercise.recovery_seconds,
            completed_at: Utc::now(),
            note: None,
        };
        let batch = [SeriesRecord {
            exercise_id: exercise_id.to_string(),
            series: series.clone(),
        }];
        // Stable across retries so a save whose response was lost is not stored twice
        let idempotency_key = format!("{}:{}:{}", session_id, exercise_id, series_number);

        let saved = self
            .repo
            .save_completed_series(&session_id, &batch, &idempotency_key)
            .await;
        if let Err(e) = saved {
            tracing::warn!(
                "Failed to save series {} of {}: {}",
                series_number,
                exercise_id,
                e
            );
            self.state.series_save = SeriesSaveState::Error(e.to_string());
            self.publish();
            return Err(e.into());
        }

        let mut completed = (*self.state.completed).clone();
        completed
            .entry(exercise_id.to_string())
            .or_default()
            .push(series);
        self.state.completed = Arc::new(completed);

        let mut working = (*self.state.working_values).clone();
        working.insert(exercise_id.to_string(), WorkingValues::new(weight, reps));
        self.state.working_values = Arc::new(working);

        self.state.series_save = SeriesSaveState::Saved;
        cues::fire(&self.cues, CueKind::SeriesComplete);
        tracing::info!(
            "Recorded {} series {}: {}kg x {}",
            exercise_id,
            series_number,
            weight,
            reps
        );

        let rest_started = self.navigate_after_series(&exercise);
        self.refresh_derived();
        self.publish();

        self.scan_plateaus().await;
        Ok(SeriesOutcome::Recorded { rest_started })
    }

    /// Move selection after a confirmed set and start rest when due
    ///
    /// Returns whether a rest period started.
    fn navigate_after_series(&mut self, exercise: &Exercise) -> bool {
        let groups = Arc::clone(&self.state.groups);
        let Some(group_idx) = group_index_of(&groups, &exercise.id) else {
            return false;
        };
        let group = &groups[group_idx];
        self.state.current_group = group_idx;
        self.state.selected_exercise = Some(exercise.id.clone());

        if group.is_multi() {
            if let Some(next) = next_incomplete_member(group, &exercise.id, &self.state.completed) {
                tracing::debug!("{} done, moving to {}", exercise.id, next.id);
                self.state.selected_exercise = Some(next.id.clone());
                return false;
            }
            if !is_group_complete(group, &self.state.completed) {
                // Only this member has series left
                return false;
            }
        }

        self.begin_rest(exercise.recovery_seconds);
        true
    }

    fn begin_rest(&mut self, seconds: u32) {
        let final_rest = is_workout_complete(&self.state.groups, &self.state.completed);
        self.timer.start(seconds);
        self.state.rest = RestPhase::Resting { final_rest };
        tracing::debug!("Rest of {}s started (final: {})", seconds, final_rest);
    }

    // ------------------------------------------------------------------
    // Rest
    // ------------------------------------------------------------------

    /// Wait for the running rest period to expire, then apply its effect
    ///
    /// Pends while no rest is running. Cancel safe, so it can sit in a
    /// `select!` next to user input.
    pub async fn rest_elapsed(&mut self) -> RestElapsed {
        let signal = self.timer.elapsed().await;
        self.finish_rest(true);
        signal
    }

    /// Stop the running rest period at the user's request
    ///
    /// Returns whether a rest period was running.
    pub fn skip_rest(&mut self) -> bool {
        if self.state.rest == RestPhase::None {
            return false;
        }
        self.timer.stop();
        self.finish_rest(false);
        true
    }

    fn finish_rest(&mut self, natural: bool) {
        let final_rest = matches!(self.state.rest, RestPhase::Resting { final_rest: true });
        self.state.rest = RestPhase::None;

        let completed = Arc::clone(&self.state.completed);
        let groups = Arc::clone(&self.state.groups);

        if final_rest || is_workout_complete(&groups, &completed) {
            tracing::info!("Final rest over, workout can be completed");
        } else if groups
            .get(self.state.current_group)
            .is_some_and(|g| is_group_complete(g, &completed))
        {
            let next = next_incomplete_group(&groups, self.state.current_group, &completed)
                .or_else(|| groups.iter().position(|g| !is_group_complete(g, &completed)));
            if let Some(next) = next {
                tracing::debug!("Rest over, moving to group {}", next);
                self.select_group(next);
                if natural {
                    cues::fire(&self.cues, CueKind::RestComplete);
                }
            }
        }

        self.refresh_derived();
        self.publish();
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn select_group(&mut self, index: usize) {
        self.state.current_group = index;
        self.state.selected_exercise = self.state.groups.get(index).and_then(|group| {
            first_incomplete_member(group, &self.state.completed)
                .or_else(|| group.exercises.first())
                .map(|e| e.id.clone())
        });
    }

    /// Show another member of the current superset or circuit
    pub fn select_exercise(&mut self, exercise_id: &str) -> Result<()> {
        self.require_active()?;
        let group = self
            .state
            .group()
            .ok_or_else(|| Error::State("no current group".into()))?;
        if !group.is_multi() {
            return Err(Error::State(
                "exercise selection needs a superset or circuit".into(),
            ));
        }
        if !group.contains(exercise_id) {
            return Err(Error::UnknownExercise(exercise_id.to_string()));
        }
        self.state.selected_exercise = Some(exercise_id.to_string());
        self.publish();
        Ok(())
    }

    /// Move on once the current group is complete and rested
    pub fn go_to_next_group(&mut self) -> Result<()> {
        self.require_active()?;
        if !self.state.can_advance {
            return Err(Error::State(
                "current group is not finished or rest is running".into(),
            ));
        }
        self.select_group(self.state.current_group + 1);
        self.refresh_derived();
        self.publish();
        Ok(())
    }

    /// Go back to review an earlier group
    pub fn go_to_previous_group(&mut self) -> Result<()> {
        self.require_active()?;
        if self.state.current_group == 0 {
            return Err(Error::State("already at the first group".into()));
        }
        self.select_group(self.state.current_group - 1);
        self.refresh_derived();
        self.publish();
        Ok(())
    }

    fn refresh_derived(&mut self) {
        let groups = &self.state.groups;
        let completed = &self.state.completed;
        let resting = self.state.rest != RestPhase::None;

        self.state.progress = workout_progress(groups, completed);
        self.state.can_advance = !resting
            && self.state.current_group + 1 < groups.len()
            && groups
                .get(self.state.current_group)
                .is_some_and(|g| is_group_complete(g, completed));
        self.state.finishable =
            !resting && !groups.is_empty() && is_workout_complete(groups, completed);
    }

    // ------------------------------------------------------------------
    // Working values and plateaus
    // ------------------------------------------------------------------

    /// Replace the proposed values for an exercise's next set
    pub async fn update_working_values(
        &mut self,
        exercise_id: &str,
        weight: f64,
        reps: u32,
    ) -> Result<()> {
        self.require_active()?;
        self.exercise(exercise_id)?;

        let mut working = (*self.state.working_values).clone();
        working.insert(exercise_id.to_string(), WorkingValues::new(weight, reps));
        self.state.working_values = Arc::new(working);
        self.publish();

        self.scan_plateaus().await;
        Ok(())
    }

    /// Hide an exercise's plateau until dismissals are reset
    pub fn dismiss_plateau(&mut self, exercise_id: &str) {
        let mut dismissed = (*self.state.dismissed).clone();
        dismissed.insert(exercise_id.to_string());
        self.state.dismissed = Arc::new(dismissed);

        if self.state.plateaus.contains_key(exercise_id) {
            let mut plateaus = (*self.state.plateaus).clone();
            plateaus.remove(exercise_id);
            self.state.plateaus = Arc::new(plateaus);
        }
        tracing::debug!("Plateau of {} dismissed", exercise_id);
        self.publish();
    }

    pub async fn reset_dismissed_plateaus(&mut self) {
        self.state.dismissed = Arc::new(BTreeSet::new());
        self.publish();
        self.scan_plateaus().await;
    }

    /// Adopt a suggestion as the next set's values
    ///
    /// Clears the exercise's current plateau entry; a later scan may report
    /// it again if the exercise is still stuck.
    pub fn apply_progression_suggestion(
        &mut self,
        exercise_id: &str,
        suggestion: &ProgressionSuggestion,
    ) -> Result<()> {
        self.require_active()?;
        self.exercise(exercise_id)?;

        let mut working = (*self.state.working_values).clone();
        working.insert(exercise_id.to_string(), suggestion.working_values());
        self.state.working_values = Arc::new(working);

        let mut plateaus = (*self.state.plateaus).clone();
        plateaus.remove(exercise_id);
        self.state.plateaus = Arc::new(plateaus);

        tracing::info!("Applied suggestion for {}: {}", exercise_id, suggestion.description);
        self.publish();
        Ok(())
    }

    /// Recompute the plateau map after the settle delay
    pub async fn scan_plateaus(&mut self) {
        let settle = self.config.session.scan_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        if !self.state.is_active() {
            return;
        }

        let plateaus = detect_plateaus(
            &self.exercises,
            &self.historic,
            &self.state.working_values,
            &self.state.dismissed,
            &self.config.plateau,
        );
        self.state.plateaus = Arc::new(plateaus);
        self.publish();
    }
}

/// Build the completed-series map from stored records
///
/// Per exercise only the gap-free run of series numbers starting at 1 and
/// within the target is kept. Records of unknown exercises and repeated
/// series numbers are dropped.
fn completed_map_from(records: Vec<SeriesRecord>, exercises: &[Exercise]) -> CompletedSeriesMap {
    let mut grouped: BTreeMap<ExerciseId, (u32, Vec<CompletedSeries>)> = BTreeMap::new();
    for record in records {
        let Some(exercise) = exercises.iter().find(|e| e.id == record.exercise_id) else {
            tracing::warn!("Ignoring series of unknown exercise {}", record.exercise_id);
            continue;
        };
        grouped
            .entry(record.exercise_id)
            .or_insert_with(|| (exercise.target_sets, Vec::new()))
            .1
            .push(record.series);
    }

    let mut map = CompletedSeriesMap::new();
    for (exercise_id, (target_sets, mut series)) in grouped {
        series.sort_by_key(|s| s.series_number);
        series.dedup_by_key(|s| s.series_number);
        let stored = series.len();

        let contiguous: Vec<CompletedSeries> = series
            .into_iter()
            .zip(1u32..)
            .take_while(|(s, expected)| s.series_number == *expected && *expected <= target_sets)
            .map(|(s, _)| s)
            .collect();
        if contiguous.len() < stored {
            tracing::warn!(
                "Ignoring {} out-of-sequence series of {}",
                stored - contiguous.len(),
                exercise_id
            );
        }
        if !contiguous.is_empty() {
            map.insert(exercise_id, contiguous);
        }
    }
    map
}
