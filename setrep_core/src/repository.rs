//! Session repository contract.
//!
//! The remote backend that starts, stores and completes workout sessions. The
//! session state machine talks to it only through [`SessionRepository`]; any
//! request timeout is the implementation's responsibility.

use crate::{Exercise, HistoricEntry, HistoricSeries, SeriesRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

/// Failure reported by a session repository
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// The requested resource does not exist (HTTP 404 or equivalent)
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or storage failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend refused the request
    #[error("rejected: {0}")]
    Rejected(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Backend operations used by the workout session
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Start a session remotely, returning its id
    async fn start_session(&self, user_id: &str, plan_id: &str) -> RepositoryResult<String>;

    async fn fetch_exercises(&self, plan_id: &str) -> RepositoryResult<Vec<Exercise>>;

    /// Series already saved for a session. May report `NotFound` for a
    /// session without any series; see [`fetch_completed_series_or_empty`].
    async fn fetch_completed_series(&self, session_id: &str) -> RepositoryResult<Vec<SeriesRecord>>;

    async fn save_completed_series(
        &self,
        session_id: &str,
        batch: &[SeriesRecord],
        idempotency_key: &str,
    ) -> RepositoryResult<()>;

    async fn complete_session(
        &self,
        session_id: &str,
        duration_minutes: i64,
        note: Option<&str>,
    ) -> RepositoryResult<()>;

    async fn delete_session(&self, session_id: &str) -> RepositoryResult<()>;

    /// Series of the user's earlier sessions of the plan, per exercise
    async fn fetch_historic_series(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> RepositoryResult<HistoricSeries>;
}

/// Fetch completed series, treating `NotFound` as a successful empty result
pub async fn fetch_completed_series_or_empty<R>(
    repo: &R,
    session_id: &str,
) -> RepositoryResult<Vec<SeriesRecord>>
where
    R: SessionRepository + ?Sized,
{
    match repo.fetch_completed_series(session_id).await {
        Err(e) if e.is_not_found() => {
            tracing::debug!("No series stored yet for session {}", session_id);
            Ok(Vec::new())
        }
        other => other,
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// A session held by [`MemoryRepository`]
#[derive(Clone, Debug)]
pub struct StoredSession {
    pub user_id: String,
    pub plan_id: String,
    pub started_at: DateTime<Utc>,
    pub series: Vec<SeriesRecord>,
    pub completed: Option<(i64, Option<String>)>,
}

/// Which calls [`MemoryRepository`] should fail
#[derive(Clone, Debug, Default)]
pub struct FailureInjection {
    pub start: Option<RepositoryError>,
    pub fetch_exercises: Option<RepositoryError>,
    pub fetch_series: Option<RepositoryError>,
    /// Number of upcoming saves to fail
    pub saves: usize,
    pub complete: Option<RepositoryError>,
    pub delete: Option<RepositoryError>,
    pub historic: Option<RepositoryError>,
}

#[derive(Default)]
struct MemoryState {
    plans: BTreeMap<String, Vec<Exercise>>,
    historic: BTreeMap<(String, String), HistoricSeries>,
    sessions: BTreeMap<String, StoredSession>,
    idempotency_keys: HashSet<String>,
    failures: FailureInjection,
    next_id: u64,
    save_calls: usize,
}

/// In-process repository for tests and embedding
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_plan(&self, plan_id: &str, exercises: Vec<Exercise>) {
        self.state
            .lock()
            .await
            .plans
            .insert(plan_id.to_string(), exercises);
    }

    pub async fn add_historic(
        &self,
        user_id: &str,
        plan_id: &str,
        exercise_id: &str,
        entries: Vec<HistoricEntry>,
    ) {
        self.state
            .lock()
            .await
            .historic
            .entry((user_id.to_string(), plan_id.to_string()))
            .or_default()
            .entry(exercise_id.to_string())
            .or_default()
            .extend(entries);
    }

    /// Replace the failure injection settings
    pub async fn inject(&self, failures: FailureInjection) {
        self.state.lock().await.failures = failures;
    }

    pub async fn session(&self, session_id: &str) -> Option<StoredSession> {
        self.state.lock().await.sessions.get(session_id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Number of save calls received, including failed ones
    pub async fn save_calls(&self) -> usize {
        self.state.lock().await.save_calls
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn start_session(&self, user_id: &str, plan_id: &str) -> RepositoryResult<String> {
        let mut state = self.state.lock().await;
        if let Some(e) = state.failures.start.clone() {
            return Err(e);
        }
        state.next_id += 1;
        let session_id = format!("session-{}", state.next_id);
        state.sessions.insert(
            session_id.clone(),
            StoredSession {
                user_id: user_id.to_string(),
                plan_id: plan_id.to_string(),
                started_at: Utc::now(),
                series: Vec::new(),
                completed: None,
            },
        );
        Ok(session_id)
    }

    async fn fetch_exercises(&self, plan_id: &str) -> RepositoryResult<Vec<Exercise>> {
        let state = self.state.lock().await;
        if let Some(e) = state.failures.fetch_exercises.clone() {
            return Err(e);
        }
        state
            .plans
            .get(plan_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("plan {}", plan_id)))
    }

    async fn fetch_completed_series(&self, session_id: &str) -> RepositoryResult<Vec<SeriesRecord>> {
        let state = self.state.lock().await;
        if let Some(e) = state.failures.fetch_series.clone() {
            return Err(e);
        }
        match state.sessions.get(session_id) {
            Some(session) if !session.series.is_empty() => Ok(session.series.clone()),
            _ => Err(RepositoryError::NotFound(format!(
                "series for session {}",
                session_id
            ))),
        }
    }

    async fn save_completed_series(
        &self,
        session_id: &str,
        batch: &[SeriesRecord],
        idempotency_key: &str,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        state.save_calls += 1;
        if state.failures.saves > 0 {
            state.failures.saves -= 1;
            return Err(RepositoryError::Transport("connection reset".into()));
        }
        if !state.idempotency_keys.insert(idempotency_key.to_string()) {
            return Ok(());
        }
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("session {}", session_id)))?;
        session.series.extend(batch.iter().cloned());
        Ok(())
    }

    async fn complete_session(
        &self,
        session_id: &str,
        duration_minutes: i64,
        note: Option<&str>,
    ) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(e) = state.failures.complete.clone() {
            return Err(e);
        }
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("session {}", session_id)))?;
        session.completed = Some((duration_minutes, note.map(str::to_string)));
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(e) = state.failures.delete.clone() {
            return Err(e);
        }
        state
            .sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("session {}", session_id)))
    }

    async fn fetch_historic_series(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> RepositoryResult<HistoricSeries> {
        let state = self.state.lock().await;
        if let Some(e) = state.failures.historic.clone() {
            return Err(e);
        }
        Ok(state
            .historic
            .get(&(user_id.to_string(), plan_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
