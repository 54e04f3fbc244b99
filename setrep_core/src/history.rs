//! Historic series handling: splitting into prior sessions and CSV export.

use crate::{HistoricEntry, HistoricSeries, Result};
use chrono::Duration;
use std::fs::OpenOptions;
use std::path::Path;

/// Split an exercise's historic series into prior sessions, oldest first
///
/// Entries carrying a session id are grouped by it. Entries without one are
/// grouped by temporal proximity: a gap longer than `gap_hours` between two
/// consecutive series starts a new session. Series inside each session are
/// ordered by series number.
pub fn split_into_sessions(entries: &[HistoricEntry], gap_hours: i64) -> Vec<Vec<&HistoricEntry>> {
    let mut sorted: Vec<&HistoricEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.performed_at.cmp(&b.performed_at));

    let gap = Duration::hours(gap_hours);
    let mut sessions: Vec<Vec<&HistoricEntry>> = Vec::new();

    for entry in sorted {
        let starts_new = match sessions.last().and_then(|s| s.last()) {
            None => true,
            Some(prev) => match (&prev.session_id, &entry.session_id) {
                (Some(a), Some(b)) => a != b,
                _ => entry.performed_at - prev.performed_at > gap,
            },
        };

        if starts_new {
            sessions.push(vec![entry]);
        } else if let Some(current) = sessions.last_mut() {
            current.push(entry);
        }
    }

    for session in &mut sessions {
        session.sort_by_key(|e| e.series_number);
    }
    sessions
}

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    exercise_id: &'a str,
    session_id: Option<&'a str>,
    series_number: u32,
    weight: f64,
    reps: u32,
    performed_at: String,
}

/// Export historic series to a CSV file, one row per series
///
/// Rows are appended; headers are written only when the file is new or empty.
/// Returns the number of rows written.
pub fn export_history_csv(historic: &HistoricSeries, csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    let mut count = 0;
    for (exercise_id, entries) in historic {
        let mut entries: Vec<&HistoricEntry> = entries.iter().collect();
        entries.sort_by(|a, b| {
            a.performed_at
                .cmp(&b.performed_at)
                .then(a.series_number.cmp(&b.series_number))
        });

        for entry in entries {
            writer.serialize(CsvRow {
                exercise_id,
                session_id: entry.session_id.as_deref(),
                series_number: entry.series_number,
                weight: entry.weight,
                reps: entry.reps,
                performed_at: entry.performed_at.to_rfc3339(),
            })?;
            count += 1;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} historic series to {:?}", count, csv_path);
    Ok(count)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    pub(crate) fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    pub(crate) fn entry(
        session: Option<&str>,
        series_number: u32,
        weight: f64,
        reps: u32,
        performed_at: DateTime<Utc>,
    ) -> HistoricEntry {
        HistoricEntry {
            session_id: session.map(str::to_string),
            series_number,
            weight,
            reps,
            performed_at,
        }
    }

    #[test]
    fn test_split_by_session_id() {
        let entries = vec![
            entry(Some("s2"), 1, 50.0, 8, at(3, 10)),
            entry(Some("s1"), 1, 50.0, 8, at(1, 10)),
            entry(Some("s1"), 2, 50.0, 7, at(1, 10)),
        ];

        let sessions = split_into_sessions(&entries, 4);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].len(), 2);
        assert_eq!(sessions[0][0].session_id.as_deref(), Some("s1"));
        assert_eq!(sessions[1][0].session_id.as_deref(), Some("s2"));
    }

    #[test]
    fn test_split_by_time_gap() {
        let entries = vec![
            entry(None, 1, 50.0, 8, at(1, 10)),
            entry(None, 2, 50.0, 8, at(1, 11)),
            entry(None, 1, 52.5, 6, at(1, 20)),
        ];

        let sessions = split_into_sessions(&entries, 4);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].len(), 2);
        assert_eq!(sessions[1][0].weight, 52.5);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_into_sessions(&[], 4).is_empty());
    }

    #[test]
    fn test_export_appends_without_duplicate_headers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("history.csv");

        let mut historic = HistoricSeries::new();
        historic.insert(
            "squat".into(),
            vec![
                entry(Some("s1"), 2, 100.0, 5, at(1, 10)),
                entry(Some("s1"), 1, 100.0, 5, at(1, 10)),
            ],
        );

        assert_eq!(export_history_csv(&historic, &csv_path).unwrap(), 2);
        assert_eq!(export_history_csv(&historic, &csv_path).unwrap(), 2);

        let content = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("exercise_id"));
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("exercise_id")).count(),
            1
        );
        assert!(lines[1].contains("squat,s1,1,"));
    }
}
