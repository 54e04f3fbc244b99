//! Working-value preload policy.
//!
//! Picks the weight/reps proposed for an exercise's next set, from the most
//! recent prior session when possible, then from the current session, then
//! from the plan.

use crate::history::split_into_sessions;
use crate::{
    CompletedSeries, CompletedSeriesMap, Exercise, ExerciseId, HistoricEntry, HistoricSeries,
    WorkingValues,
};
use std::collections::BTreeMap;

/// Working values for the series number `slot` of an exercise
///
/// Order of preference:
/// 1. the series with number `slot` in the latest prior session
/// 2. the last series of that session, when `slot` is beyond all of them
/// 3. the series with number `slot`, else the last one, already recorded in
///    the current session
/// 4. the plan defaults
pub fn working_values_for(
    exercise: &Exercise,
    slot: u32,
    historic: &[HistoricEntry],
    completed: &[CompletedSeries],
    session_gap_hours: i64,
) -> WorkingValues {
    let sessions = split_into_sessions(historic, session_gap_hours);

    if let Some(latest) = sessions.last() {
        if let Some(hit) = latest.iter().find(|e| e.series_number == slot) {
            return WorkingValues::new(hit.weight, hit.reps);
        }

        let max_number = latest.iter().map(|e| e.series_number).max().unwrap_or(0);
        if slot > max_number {
            if let Some(last) = latest.last() {
                return WorkingValues::new(last.weight, last.reps);
            }
        }
    }

    let from_session = completed
        .iter()
        .find(|s| s.series_number == slot)
        .or_else(|| completed.iter().max_by_key(|s| s.series_number));
    if let Some(series) = from_session {
        return WorkingValues::new(series.weight, series.reps);
    }

    WorkingValues::from_plan(exercise)
}

/// Working values for every exercise, each at its next series slot
pub fn preload_all(
    exercises: &[Exercise],
    historic: &HistoricSeries,
    completed: &CompletedSeriesMap,
    session_gap_hours: i64,
) -> BTreeMap<ExerciseId, WorkingValues> {
    exercises
        .iter()
        .map(|exercise| {
            let done = completed.get(&exercise.id).map(Vec::as_slice).unwrap_or(&[]);
            let slot = (done.len() as u32 + 1).min(exercise.target_sets.max(1));
            let history = historic.get(&exercise.id).map(Vec::as_slice).unwrap_or(&[]);
            let values = working_values_for(exercise, slot, history, done, session_gap_hours);
            (exercise.id.clone(), values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::tests::exercise;
    use crate::history::tests::{at, entry};
    use crate::SetType;
    use chrono::Utc;
    use uuid::Uuid;

    fn series(series_number: u32, weight: f64, reps: u32) -> CompletedSeries {
        CompletedSeries {
            id: Uuid::new_v4(),
            series_number,
            weight,
            reps,
            recovery_seconds: 60,
            completed_at: Utc::now(),
            note: None,
        }
    }

    #[test]
    fn test_matching_historic_slot_wins() {
        let ex = exercise("bench", SetType::Normal, false, 3);
        let historic = vec![
            entry(Some("old"), 2, 40.0, 10, at(1, 10)),
            entry(Some("new"), 1, 60.0, 8, at(5, 10)),
            entry(Some("new"), 2, 62.5, 6, at(5, 10)),
        ];

        let values = working_values_for(&ex, 2, &historic, &[], 4);
        assert_eq!(values, WorkingValues::new(62.5, 6));
    }

    #[test]
    fn test_slot_beyond_history_uses_last_series() {
        let ex = exercise("bench", SetType::Normal, false, 4);
        let historic = vec![
            entry(Some("s"), 1, 60.0, 8, at(5, 10)),
            entry(Some("s"), 2, 62.5, 6, at(5, 10)),
        ];

        let values = working_values_for(&ex, 4, &historic, &[], 4);
        assert_eq!(values, WorkingValues::new(62.5, 6));
    }

    #[test]
    fn test_gap_in_history_falls_back_to_current_session() {
        let ex = exercise("bench", SetType::Normal, false, 3);
        let historic = vec![
            entry(Some("s"), 1, 60.0, 8, at(5, 10)),
            entry(Some("s"), 3, 55.0, 10, at(5, 10)),
        ];
        let completed = vec![series(1, 57.5, 9)];

        let values = working_values_for(&ex, 2, &historic, &completed, 4);
        assert_eq!(values, WorkingValues::new(57.5, 9));
    }

    #[test]
    fn test_plan_defaults_without_any_data() {
        let ex = exercise("bench", SetType::Normal, false, 3);
        let values = working_values_for(&ex, 1, &[], &[], 4);
        assert_eq!(values, WorkingValues::new(40.0, 8));
    }

    #[test]
    fn test_preload_all_uses_next_slot() {
        let a = exercise("a", SetType::Normal, false, 3);
        let b = exercise("b", SetType::Normal, false, 3);

        let mut historic = HistoricSeries::new();
        historic.insert(
            "a".into(),
            vec![
                entry(Some("s"), 1, 20.0, 12, at(2, 9)),
                entry(Some("s"), 2, 22.5, 10, at(2, 9)),
            ],
        );
        let mut completed = CompletedSeriesMap::new();
        completed.insert("a".into(), vec![series(1, 20.0, 12)]);

        let values = preload_all(&[a, b], &historic, &completed, 4);
        assert_eq!(values["a"], WorkingValues::new(22.5, 10));
        assert_eq!(values["b"], WorkingValues::new(40.0, 8));
    }
}
