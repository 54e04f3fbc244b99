//! File-backed session repository.
//!
//! Session events are appended to a JSONL (JSON Lines) log with file locking
//! so that several processes can share one data directory. State is rebuilt
//! by replaying the log; malformed lines are skipped with a warning.
//!
//! Plans are read from `plans/<plan_id>.json`; the built-in demo plan is used
//! for [`DEMO_PLAN_ID`] when no file overrides it.

use crate::plans::{demo_plan, DEMO_PLAN_ID};
use crate::repository::{RepositoryError, RepositoryResult, SessionRepository};
use crate::{Exercise, HistoricEntry, HistoricSeries, SeriesRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One line of the session log
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: String,
        user_id: String,
        plan_id: String,
        at: DateTime<Utc>,
    },
    Series {
        session_id: String,
        idempotency_key: String,
        records: Vec<SeriesRecord>,
    },
    Completed {
        session_id: String,
        duration_minutes: i64,
        note: Option<String>,
        at: DateTime<Utc>,
    },
    Deleted {
        session_id: String,
        at: DateTime<Utc>,
    },
}

/// A session reconstructed from the log
#[derive(Clone, Debug)]
pub struct ReplayedSession {
    pub user_id: String,
    pub plan_id: String,
    pub started_at: DateTime<Utc>,
    pub series: Vec<SeriesRecord>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    idempotency_keys: HashSet<String>,
}

/// Replay events into sessions keyed by id
pub fn replay(events: &[SessionEvent]) -> BTreeMap<String, ReplayedSession> {
    let mut sessions: BTreeMap<String, ReplayedSession> = BTreeMap::new();

    for event in events {
        match event {
            SessionEvent::Started {
                session_id,
                user_id,
                plan_id,
                at,
            } => {
                sessions.insert(
                    session_id.clone(),
                    ReplayedSession {
                        user_id: user_id.clone(),
                        plan_id: plan_id.clone(),
                        started_at: *at,
                        series: Vec::new(),
                        completed_at: None,
                        deleted: false,
                        idempotency_keys: HashSet::new(),
                    },
                );
            }
            SessionEvent::Series {
                session_id,
                idempotency_key,
                records,
            } => {
                if let Some(session) = sessions.get_mut(session_id) {
                    if session.idempotency_keys.insert(idempotency_key.clone()) {
                        session.series.extend(records.iter().cloned());
                    }
                }
            }
            SessionEvent::Completed { session_id, at, .. } => {
                if let Some(session) = sessions.get_mut(session_id) {
                    session.completed_at = Some(*at);
                }
            }
            SessionEvent::Deleted { session_id, .. } => {
                if let Some(session) = sessions.get_mut(session_id) {
                    session.deleted = true;
                }
            }
        }
    }

    sessions
}

fn transport(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Transport(e.to_string())
}

fn parse_events(reader: impl BufRead) -> RepositoryResult<Vec<SessionEvent>> {
    let mut events = Vec::new();
    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(transport)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!("Failed to parse session event at line {}: {}", line_num + 1, e);
            }
        }
    }
    Ok(events)
}

/// Read every event of the log under a shared lock
pub fn read_events(path: &Path) -> RepositoryResult<Vec<SessionEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(transport)?;
    file.lock_shared().map_err(transport)?;
    let events = parse_events(BufReader::new(&file));
    file.unlock().map_err(transport)?;
    events
}

/// Read the log and optionally append one event, all under an exclusive lock
///
/// `decide` sees the replayed sessions and returns the event to append along
/// with the call's result.
fn update_log<T, F>(path: &Path, decide: F) -> RepositoryResult<T>
where
    F: FnOnce(&BTreeMap<String, ReplayedSession>) -> RepositoryResult<(Option<SessionEvent>, T)>,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(transport)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(transport)?;
    file.lock_exclusive().map_err(transport)?;

    let outcome = (|| {
        file.seek(SeekFrom::Start(0)).map_err(transport)?;
        let events = parse_events(BufReader::new(&file))?;
        let (event, value) = decide(&replay(&events))?;

        if let Some(event) = event {
            let torn = ends_mid_line(&file)?;
            let mut writer = std::io::BufWriter::new(&file);
            if torn {
                writer.write_all(b"\n").map_err(transport)?;
            }
            let line = serde_json::to_string(&event).map_err(transport)?;
            writer.write_all(line.as_bytes()).map_err(transport)?;
            writer.write_all(b"\n").map_err(transport)?;
            writer.flush().map_err(transport)?;
        }
        Ok(value)
    })();

    file.unlock().map_err(transport)?;
    outcome
}

/// Whether the log ends in a partially written line
fn ends_mid_line(mut file: &File) -> RepositoryResult<bool> {
    let len = file.metadata().map_err(transport)?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1)).map_err(transport)?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).map_err(transport)?;
    Ok(last[0] != b'\n')
}

fn require_open<'a>(
    sessions: &'a BTreeMap<String, ReplayedSession>,
    session_id: &str,
) -> RepositoryResult<&'a ReplayedSession> {
    match sessions.get(session_id) {
        Some(session) if !session.deleted => Ok(session),
        _ => Err(RepositoryError::NotFound(format!("session {}", session_id))),
    }
}

/// Repository storing sessions in a local data directory
#[derive(Clone, Debug)]
pub struct FileRepository {
    data_dir: PathBuf,
}

impl FileRepository {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("sessions.wal")
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.data_dir.join("plans")
    }

    /// Load a plan from disk, falling back to the built-in demo plan
    pub fn load_plan(&self, plan_id: &str) -> RepositoryResult<Vec<Exercise>> {
        let path = self.plans_dir().join(format!("{}.json", plan_id));
        if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(transport)?;
            let exercises: Vec<Exercise> = serde_json::from_str(&contents)
                .map_err(|e| RepositoryError::Rejected(format!("plan {:?}: {}", path, e)))?;
            tracing::debug!("Loaded plan {} from {:?}", plan_id, path);
            return Ok(exercises);
        }
        if plan_id == DEMO_PLAN_ID {
            return Ok(demo_plan().to_vec());
        }
        Err(RepositoryError::NotFound(format!("plan {}", plan_id)))
    }

    /// Historic series of the user's completed sessions of a plan
    pub fn load_historic(&self, user_id: &str, plan_id: &str) -> RepositoryResult<HistoricSeries> {
        let sessions = replay(&read_events(&self.log_path())?);
        let mut historic = HistoricSeries::new();

        for (session_id, session) in &sessions {
            let relevant = session.user_id == user_id
                && session.plan_id == plan_id
                && !session.deleted
                && session.completed_at.is_some();
            if !relevant {
                continue;
            }
            for record in &session.series {
                historic
                    .entry(record.exercise_id.clone())
                    .or_default()
                    .push(HistoricEntry {
                        session_id: Some(session_id.clone()),
                        series_number: record.series.series_number,
                        weight: record.series.weight,
                        reps: record.series.reps,
                        performed_at: record.series.completed_at,
                    });
            }
        }

        tracing::debug!(
            "Loaded historic series for {} exercises of plan {}",
            historic.len(),
            plan_id
        );
        Ok(historic)
    }

    async fn blocking<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(FileRepository) -> RepositoryResult<T> + Send + 'static,
    {
        let repo = self.clone();
        tokio::task::spawn_blocking(move || f(repo))
            .await
            .map_err(transport)?
    }
}

#[async_trait]
impl SessionRepository for FileRepository {
    async fn start_session(&self, user_id: &str, plan_id: &str) -> RepositoryResult<String> {
        let user_id = user_id.to_string();
        let plan_id = plan_id.to_string();
        self.blocking(move |repo| {
            let session_id = Uuid::new_v4().to_string();
            update_log(&repo.log_path(), |_| {
                let event = SessionEvent::Started {
                    session_id: session_id.clone(),
                    user_id,
                    plan_id,
                    at: Utc::now(),
                };
                Ok((Some(event), ()))
            })?;
            tracing::info!("Started session {}", session_id);
            Ok(session_id)
        })
        .await
    }

    async fn fetch_exercises(&self, plan_id: &str) -> RepositoryResult<Vec<Exercise>> {
        let plan_id = plan_id.to_string();
        self.blocking(move |repo| repo.load_plan(&plan_id)).await
    }

    async fn fetch_completed_series(&self, session_id: &str) -> RepositoryResult<Vec<SeriesRecord>> {
        let session_id = session_id.to_string();
        self.blocking(move |repo| {
            let sessions = replay(&read_events(&repo.log_path())?);
            require_open(&sessions, &session_id).map(|s| s.series.clone())
        })
        .await
    }

    async fn save_completed_series(
        &self,
        session_id: &str,
        batch: &[SeriesRecord],
        idempotency_key: &str,
    ) -> RepositoryResult<()> {
        let session_id = session_id.to_string();
        let records = batch.to_vec();
        let idempotency_key = idempotency_key.to_string();
        self.blocking(move |repo| {
            update_log(&repo.log_path(), |sessions| {
                let session = require_open(sessions, &session_id)?;
                if session.completed_at.is_some() {
                    return Err(RepositoryError::Rejected(format!(
                        "session {} is already completed",
                        session_id
                    )));
                }
                if session.idempotency_keys.contains(&idempotency_key) {
                    tracing::debug!("Save {} already applied", idempotency_key);
                    return Ok((None, ()));
                }
                let event = SessionEvent::Series {
                    session_id: session_id.clone(),
                    idempotency_key: idempotency_key.clone(),
                    records,
                };
                Ok((Some(event), ()))
            })
        })
        .await
    }

    async fn complete_session(
        &self,
        session_id: &str,
        duration_minutes: i64,
        note: Option<&str>,
    ) -> RepositoryResult<()> {
        let session_id = session_id.to_string();
        let note = note.map(str::to_string);
        self.blocking(move |repo| {
            update_log(&repo.log_path(), |sessions| {
                require_open(sessions, &session_id)?;
                let event = SessionEvent::Completed {
                    session_id: session_id.clone(),
                    duration_minutes,
                    note,
                    at: Utc::now(),
                };
                Ok((Some(event), ()))
            })
        })
        .await
    }

    async fn delete_session(&self, session_id: &str) -> RepositoryResult<()> {
        let session_id = session_id.to_string();
        self.blocking(move |repo| {
            update_log(&repo.log_path(), |sessions| {
                require_open(sessions, &session_id)?;
                let event = SessionEvent::Deleted {
                    session_id: session_id.clone(),
                    at: Utc::now(),
                };
                Ok((Some(event), ()))
            })
        })
        .await
    }

    async fn fetch_historic_series(
        &self,
        user_id: &str,
        plan_id: &str,
    ) -> RepositoryResult<HistoricSeries> {
        let user_id = user_id.to_string();
        let plan_id = plan_id.to_string();
        self.blocking(move |repo| repo.load_historic(&user_id, &plan_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompletedSeries;

    fn record(exercise_id: &str, series_number: u32, weight: f64, reps: u32) -> SeriesRecord {
        SeriesRecord {
            exercise_id: exercise_id.into(),
            series: CompletedSeries {
                id: Uuid::new_v4(),
                series_number,
                weight,
                reps,
                recovery_seconds: 90,
                completed_at: Utc::now(),
                note: None,
            },
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let session_id = repo.start_session("me", "demo").await.unwrap();
        repo.save_completed_series(&session_id, &[record("back_squat", 1, 80.0, 5)], "k1")
            .await
            .unwrap();
        repo.save_completed_series(&session_id, &[record("back_squat", 1, 80.0, 5)], "k1")
            .await
            .unwrap();

        let series = repo.fetch_completed_series(&session_id).await.unwrap();
        assert_eq!(series.len(), 1);

        // An open session is not history yet
        assert!(repo
            .fetch_historic_series("me", "demo")
            .await
            .unwrap()
            .is_empty());

        repo.complete_session(&session_id, 42, Some("felt strong"))
            .await
            .unwrap();
        let historic = repo.fetch_historic_series("me", "demo").await.unwrap();
        assert_eq!(historic["back_squat"].len(), 1);
        assert_eq!(
            historic["back_squat"][0].session_id.as_deref(),
            Some(session_id.as_str())
        );

        // Other users and plans see nothing
        assert!(repo
            .fetch_historic_series("you", "demo")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let err = repo.fetch_completed_series("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_deleted_session_excluded_from_history() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let session_id = repo.start_session("me", "demo").await.unwrap();
        repo.save_completed_series(&session_id, &[record("bench_press", 1, 60.0, 8)], "k")
            .await
            .unwrap();
        repo.delete_session(&session_id).await.unwrap();

        assert!(repo
            .fetch_historic_series("me", "demo")
            .await
            .unwrap()
            .is_empty());
        assert!(repo.delete_session(&session_id).await.is_err());
    }

    #[tokio::test]
    async fn test_completed_session_rejects_new_series() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let session_id = repo.start_session("me", "demo").await.unwrap();
        repo.complete_session(&session_id, 1, None).await.unwrap();

        let err = repo
            .save_completed_series(&session_id, &[record("bench_press", 1, 60.0, 8)], "late")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_corrupted_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let session_id = repo.start_session("me", "demo").await.unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(repo.log_path())
                .unwrap();
            writeln!(file, "{{ invalid json }}").unwrap();
        }
        repo.save_completed_series(&session_id, &[record("back_squat", 1, 80.0, 5)], "k")
            .await
            .unwrap();

        let series = repo.fetch_completed_series(&session_id).await.unwrap();
        assert_eq!(series.len(), 1);
    }

    #[tokio::test]
    async fn test_torn_last_line_does_not_swallow_next_event() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let session_id = repo.start_session("me", "demo").await.unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(repo.log_path())
                .unwrap();
            write!(file, "{{\"event\":\"series\",\"session_id\":").unwrap();
        }
        repo.save_completed_series(&session_id, &[record("back_squat", 1, 80.0, 5)], "k")
            .await
            .unwrap();

        let events = read_events(&repo.log_path()).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_plan_file_overrides_and_unknown_plan() {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        assert_eq!(repo.load_plan(DEMO_PLAN_ID).unwrap(), demo_plan().to_vec());
        assert!(repo.load_plan("nope").unwrap_err().is_not_found());

        std::fs::create_dir_all(repo.plans_dir()).unwrap();
        let custom = vec![demo_plan()[0].clone()];
        std::fs::write(
            repo.plans_dir().join("legs.json"),
            serde_json::to_string(&custom).unwrap(),
        )
        .unwrap();
        assert_eq!(repo.load_plan("legs").unwrap(), custom);
    }
}
