//! Plateau detection engine.
//!
//! A pure recompute over historic series and current working values. Prior
//! sessions are reduced to their best performance (heaviest weight, most reps
//! at that weight); an exercise is plateaued when enough recent sessions failed
//! to beat the best that came before them and the working values for today do
//! not beat it either.

use crate::config::PlateauPolicy;
use crate::history::split_into_sessions;
use crate::{
    Exercise, ExerciseId, HistoricEntry, HistoricSeries, PlateauInfo, PlateauSeverity,
    ProgressionSuggestion, SuggestionKind, WorkingValues,
};
use std::collections::{BTreeMap, BTreeSet};

/// Best performance of a session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Performance {
    pub weight: f64,
    pub reps: u32,
}

impl Performance {
    /// Heavier, or the same weight for more reps
    pub fn beats(&self, other: &Performance) -> bool {
        self.weight > other.weight || (self.weight == other.weight && self.reps > other.reps)
    }
}

impl From<WorkingValues> for Performance {
    fn from(values: WorkingValues) -> Self {
        Self {
            weight: values.weight,
            reps: values.reps,
        }
    }
}

/// Best performance among the series of one session
pub fn best_performance(session: &[&HistoricEntry]) -> Option<Performance> {
    session
        .iter()
        .map(|e| Performance {
            weight: e.weight,
            reps: e.reps,
        })
        .reduce(|best, p| if p.beats(&best) { p } else { best })
}

/// Length of the trailing run of sessions that did not beat the best before
/// them, together with that best
///
/// The first session sets the baseline and counts toward the run.
pub fn stagnant_run(bests: &[Performance]) -> (usize, Option<Performance>) {
    let mut run = 0;
    let mut peak: Option<Performance> = None;

    for p in bests {
        match peak {
            Some(current_peak) if p.beats(&current_peak) => {
                peak = Some(*p);
                run = 0;
            }
            Some(_) => run += 1,
            None => {
                peak = Some(*p);
                run = 1;
            }
        }
    }

    (run, peak)
}

/// Severity for a number of stagnant sessions; non-decreasing in `stagnant`
pub fn classify(stagnant: usize, policy: &PlateauPolicy) -> PlateauSeverity {
    if stagnant >= policy.severe_after_sessions {
        PlateauSeverity::Severe
    } else if stagnant >= policy.moderate_after_sessions {
        PlateauSeverity::Moderate
    } else {
        PlateauSeverity::Mild
    }
}

fn round_load(weight: f64) -> f64 {
    (weight * 100.0).round() / 100.0
}

/// Ranked progression suggestions for an exercise stuck at `current`
pub fn suggest_progressions(
    exercise: &Exercise,
    current: WorkingValues,
    policy: &PlateauPolicy,
) -> Vec<ProgressionSuggestion> {
    let heavier = round_load(current.weight + policy.weight_increment);
    let more_reps = current.reps + policy.rep_increment;

    let bodyweight = current.weight <= 0.0;
    let reps_exhausted = current.reps >= policy.rep_ceiling;

    let (weight_confidence, reps_confidence) = if bodyweight {
        (0.3, 0.8)
    } else if reps_exhausted {
        (0.8, 0.4)
    } else {
        (0.6, 0.7)
    };

    let unit = if exercise.isometric { "seconds" } else { "reps" };
    let reps_description = if exercise.isometric {
        format!(
            "Hold {} seconds longer at {}kg",
            policy.rep_increment, current.weight
        )
    } else {
        format!(
            "Add {} reps at {}kg ({} reps)",
            policy.rep_increment, current.weight, more_reps
        )
    };

    let mut suggestions = vec![
        ProgressionSuggestion {
            kind: SuggestionKind::IncreaseWeight,
            description: format!(
                "Increase load to {}kg for {} {}",
                heavier, current.reps, unit
            ),
            weight: heavier,
            reps: current.reps,
            confidence: weight_confidence,
        },
        ProgressionSuggestion {
            kind: SuggestionKind::IncreaseReps,
            description: reps_description,
            weight: current.weight,
            reps: more_reps,
            confidence: reps_confidence,
        },
    ];

    suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    suggestions
}

/// Analyse one exercise
pub fn detect_for_exercise(
    exercise: &Exercise,
    historic: &[HistoricEntry],
    current: WorkingValues,
    policy: &PlateauPolicy,
) -> Option<PlateauInfo> {
    let sessions = split_into_sessions(historic, policy.session_gap_hours);
    let bests: Vec<Performance> = sessions
        .iter()
        .filter_map(|s| best_performance(s))
        .collect();

    let (stagnant, peak) = stagnant_run(&bests);
    let peak = peak?;

    if stagnant < policy.min_sessions_for_plateau.max(1) {
        return None;
    }
    if Performance::from(current).beats(&peak) {
        tracing::debug!(
            "{} working values {} already beat the {}kg x {} peak",
            exercise.id,
            current,
            peak.weight,
            peak.reps
        );
        return None;
    }

    let severity = classify(stagnant, policy);
    tracing::debug!(
        "Plateau on {}: {} stagnant sessions ({})",
        exercise.id,
        stagnant,
        severity
    );

    Some(PlateauInfo {
        exercise_id: exercise.id.clone(),
        exercise_name: exercise.name.clone(),
        severity,
        stagnant_sessions: stagnant,
        current,
        suggestions: suggest_progressions(exercise, current, policy),
    })
}

/// Full plateau scan; the result replaces any previous plateau map
///
/// Exercises in `dismissed` are never reported. Exercises without working
/// values are analysed against their plan defaults.
pub fn detect_plateaus(
    exercises: &[Exercise],
    historic: &HistoricSeries,
    working_values: &BTreeMap<ExerciseId, WorkingValues>,
    dismissed: &BTreeSet<ExerciseId>,
    policy: &PlateauPolicy,
) -> BTreeMap<ExerciseId, PlateauInfo> {
    let plateaus: BTreeMap<ExerciseId, PlateauInfo> = exercises
        .iter()
        .filter(|e| !dismissed.contains(&e.id))
        .filter_map(|exercise| {
            let entries = historic.get(&exercise.id)?;
            let current = working_values
                .get(&exercise.id)
                .copied()
                .unwrap_or_else(|| WorkingValues::from_plan(exercise));
            detect_for_exercise(exercise, entries, current, policy)
                .map(|info| (exercise.id.clone(), info))
        })
        .collect();

    tracing::info!(
        "Plateau scan: {} of {} exercises plateaued",
        plateaus.len(),
        exercises.len()
    );
    plateaus
}
